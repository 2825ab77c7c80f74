use anyhow::anyhow;
use axum::extract::Request;
use axum::http::{header, StatusCode};

use bizli_common::{blake3_hash, get_current_timestamp};

use crate::response::AppError;

pub fn extract_bearer_token(req: &Request) -> Result<String, AppError> {
    let auth_header = req.headers().get(header::AUTHORIZATION);

    match auth_header {
        Some(value) => {
            let value = value
                .to_str()?
                .split_whitespace()
                .collect::<Vec<_>>();

            if value.len() != 2 {
                return Err(AppError::new(
                    StatusCode::UNAUTHORIZED,
                    anyhow!("invalid authorization header"),
                ));
            }

            if value[0] != "Bearer" {
                return Err(AppError::new(
                    StatusCode::UNAUTHORIZED,
                    anyhow!("invalid authorization header"),
                ));
            }

            Ok(value[1].to_string())
        }
        _ => {
            Err(AppError::new(
                StatusCode::UNAUTHORIZED,
                anyhow!("missing authorization header"),
            ))
        }
    }
}

pub fn setup_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// One counter step per 5 minutes; OTPs expire when the counter moves past
/// the window they were minted in.
pub fn generate_timebased_counter() -> u64 {
    get_current_timestamp() / 300
}

pub fn generate_otp(identity: &str, counter: u64, secret: &str) -> String {
    let digest = blake3_hash(format!("{}:{}:{}", identity, counter, secret).as_bytes());
    let code = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 1_000_000;
    format!("{:06}", code)
}

/// Accepts the current window and the one before it, so a code minted just
/// before a window boundary still works.
pub fn verify_otp(identity: &str, otp: &str, secret: &str) -> bool {
    let counter = generate_timebased_counter();
    otp == generate_otp(identity, counter, secret)
        || otp == generate_otp(identity, counter.saturating_sub(1), secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_six_digits_and_deterministic() {
        let a = generate_otp("email_jane@example.com", 42, "secret");
        let b = generate_otp("email_jane@example.com", 42, "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
        assert!(a.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn otp_depends_on_identity_counter_and_secret() {
        let base = generate_otp("email_jane@example.com", 42, "secret");
        assert_ne!(base, generate_otp("email_john@example.com", 42, "secret"));
        assert_ne!(base, generate_otp("email_jane@example.com", 43, "secret"));
        assert_ne!(base, generate_otp("email_jane@example.com", 42, "other"));
    }

    #[test]
    fn verify_accepts_current_and_previous_window() {
        let identity = "email_jane@example.com";
        let counter = generate_timebased_counter();
        assert!(verify_otp(identity, &generate_otp(identity, counter, "s"), "s"));
        assert!(verify_otp(identity, &generate_otp(identity, counter - 1, "s"), "s"));
        assert!(!verify_otp(identity, &generate_otp(identity, counter - 2, "s"), "s"));
        assert!(!verify_otp(identity, "000000x", "s"));
    }
}
