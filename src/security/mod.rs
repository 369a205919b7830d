//! Password hashing.
//!
//! Iterated SHA-256 (100k rounds) with a per-user random salt, stored
//! as a single `salt$hash` field so it fits one column of the roster
//! document. One-way only: verification recomputes and compares in
//! constant time; nothing here can recover a password.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Salt byte length before hex encoding.
const SALT_BYTES: usize = 16;

/// Number of SHA-256 iterations for key stretching.
const HASH_ITERATIONS: u32 = 100_000;

/// Separator between the salt and digest halves of a stored hash.
const SEPARATOR: char = '$';

/// Hash a password under a fresh random salt. The result is opaque to
/// every other module and safe to store in a delimited text field.
pub fn hash_password(password: &str) -> String {
    let salt = generate_salt();
    let digest = derive(password, &salt);
    format!("{salt}{SEPARATOR}{digest}")
}

/// Verify a password attempt against a stored `salt$hash` value.
/// Malformed stored values never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, digest)) = stored.split_once(SEPARATOR) else {
        return false;
    };
    let attempt = derive(password, salt);
    constant_time_eq(attempt.as_bytes(), digest.as_bytes())
}

/// Burn the same work as a real verification. Called for unknown
/// accounts so response timing does not reveal whether an email exists.
pub fn dummy_verify(password: &str) {
    let _ = derive(password, "0000000000000000");
}

fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Iterated salted SHA-256, hex-encoded.
fn derive(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    let mut result = hash.finalize();

    for _ in 1..HASH_ITERATIONS {
        let mut h = Sha256::new();
        h.update(result);
        h.update(salt.as_bytes());
        result = h.finalize();
    }

    hex::encode(result)
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
