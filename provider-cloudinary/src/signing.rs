//! Upload request signing.
//!
//! Parameters are sorted by name, joined as `k=v&k=v`, the API secret is
//! appended and the result hashed. `file`, `api_key`, `resource_type` and
//! the signature fields themselves never take part.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write;

pub const SIGNATURE_ALGORITHM: &str = "sha256";

pub fn sign(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());

    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{:02x}", byte);
            hex
        })
}
