//! One-time secrets: email verification codes, password reset tokens and
//! generated API keys.

use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

/// Six-digit code, uniform over 100000..=999999
pub fn generate_numeric_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

/// `bytes` random bytes, hex encoded
pub fn generate_opaque_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Deterministic SHA-256 digest used to look up reset tokens by equality.
/// Never used for passwords.
pub fn hash_for_storage(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Random key for a new API client
pub fn generate_api_key() -> String {
    generate_opaque_token(32)
}
