//! Password hashing and random token generation.
//!
//! Passwords are stretched with PBKDF2-HMAC-SHA256. Stored hashes have the
//! form `pbkdf2-sha256$<rounds>$<hex salt>$<hex key>`, so the round count
//! can be raised later without invalidating existing hashes.

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 32;

/// Iterations applied to newly hashed passwords.
pub const PBKDF2_ROUNDS: u32 = 20_000;

/// Derives one 32-byte PBKDF2 block keyed by `password`.
fn pbkdf2(password: &str, salt: &[u8], rounds: u32) -> Option<[u8; 32]> {
    let prf = HmacSha256::new_from_slice(password.as_bytes()).ok()?;

    let mut block = [0u8; 32];
    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    block.copy_from_slice(&mac.finalize().into_bytes());
    let mut key = block;

    for _ in 1..rounds {
        let mut mac = prf.clone();
        mac.update(&block);
        block.copy_from_slice(&mac.finalize().into_bytes());
        key.iter_mut().zip(block.iter()).for_each(|(k, b)| *k ^= b);
    }
    Some(key)
}

/// Hashes `password` with a fresh random salt and [`PBKDF2_ROUNDS`].
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    // HMAC takes keys of any length; an empty key field would never verify.
    let key = pbkdf2(password, &salt, PBKDF2_ROUNDS)
        .map(hex::encode)
        .unwrap_or_default();
    format!("{SCHEME}${PBKDF2_ROUNDS}${}${key}", hex::encode(salt))
}

/// Checks `password` against a hash produced by [`hash_password`].
///
/// The round count is read from the stored hash. Malformed stored hashes
/// never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(rounds), Some(salt_hex), Some(key_hex), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    if rounds == 0 {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(key_hex)) else {
        return false;
    };
    match pbkdf2(password, &salt, rounds) {
        Some(key) => constant_time_eq(&key, &expected),
        None => false,
    }
}

/// Generates an unguessable hex token, used for login tokens and API keys.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
