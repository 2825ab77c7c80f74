mod client;
mod crypto;
mod env;

pub use client::ModuleClient;
pub use crypto::{blake3_hash, decrypt, encrypt};
pub use env::EnvVars;

pub fn get_current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
