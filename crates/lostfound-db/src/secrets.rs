//! Generation and hashing of bearer tokens and one-time codes.

use rand::Rng;
use sha2::{Digest, Sha256};

use lostfound_core::defaults;

/// Generate a random alphanumeric string.
pub fn generate_secret(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generate a session token (`lf_at_` + 48 random characters).
pub fn generate_session_token() -> String {
    format!(
        "{}{}",
        defaults::SESSION_TOKEN_PREFIX,
        generate_secret(defaults::SESSION_TOKEN_LEN)
    )
}

/// Generate a six-digit login code.
pub fn generate_otp_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Hash a secret using SHA-256, hex encoded.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
