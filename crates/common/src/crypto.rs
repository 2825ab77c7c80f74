use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use xsalsa20poly1305::aead::{Aead, KeyInit};
use xsalsa20poly1305::{Key, Nonce, XSalsa20Poly1305};

const NONCE_SIZE: usize = 24;

pub fn blake3_hash(input: &[u8]) -> [u8; 32] {
    *blake3::hash(input).as_bytes()
}

/// Symmetric token sealing. The key is derived from the salt, the random
/// nonce is prepended to the ciphertext and the whole thing is base64-encoded.
pub fn encrypt(plaintext: &str, salt: &str) -> Result<String> {
    let key_bytes = blake3_hash(salt.as_bytes());
    let cipher = XSalsa20Poly1305::new(Key::from_slice(&key_bytes));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::fill(&mut nonce_bytes[..]);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("[encrypt] failed to seal payload: {}", e))?;

    let mut out = nonce_bytes.to_vec();
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

pub fn decrypt(token: &str, salt: &str) -> Result<String> {
    let raw = BASE64
        .decode(token)
        .map_err(|e| anyhow!("[decrypt] invalid base64 token: {}", e))?;
    if raw.len() <= NONCE_SIZE {
        return Err(anyhow!("[decrypt] token too short"));
    }

    let key_bytes = blake3_hash(salt.as_bytes());
    let cipher = XSalsa20Poly1305::new(Key::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(&raw[..NONCE_SIZE]);

    let plaintext = cipher
        .decrypt(nonce, &raw[NONCE_SIZE..])
        .map_err(|e| anyhow!("[decrypt] failed to open payload: {}", e))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("[decrypt] payload is not utf-8: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let token = encrypt("{\"user_id\":\"email_a@b.c\"}", "salt").unwrap();
        let opened = decrypt(&token, "salt").unwrap();
        assert_eq!(opened, "{\"user_id\":\"email_a@b.c\"}");
    }

    #[test]
    fn decrypt_rejects_wrong_salt() {
        let token = encrypt("payload", "salt-a").unwrap();
        assert!(decrypt(&token, "salt-b").is_err());
    }

    #[test]
    fn decrypt_rejects_garbage() {
        assert!(decrypt("not-base64!!", "salt").is_err());
        assert!(decrypt("YWJj", "salt").is_err());
    }

    #[test]
    fn nonce_makes_tokens_distinct() {
        let a = encrypt("same", "salt").unwrap();
        let b = encrypt("same", "salt").unwrap();
        assert_ne!(a, b);
    }
}
