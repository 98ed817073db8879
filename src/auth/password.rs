//! Argon2id credential hashing and the per-role rotation policy.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::db::Role;

const ADMIN_SYMBOLS: &str = "!@#$%^&*";

/// Hash a plaintext credential into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// `Ok(false)` on mismatch; `Err` only when `hash` is not a PHC string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Checks a new credential against the rules for `role`, returning a
/// user-facing reason on rejection.
pub fn validate_password_policy(role: Role, password: &str) -> Result<(), String> {
    let length = password.chars().count();
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    let ok = match role {
        Role::Admin => {
            length >= 8 && has_letter && has_digit && password.chars().any(|c| ADMIN_SYMBOLS.contains(c))
        }
        Role::Teacher => length >= 6 && has_letter && has_digit,
        Role::Student => length >= 4 && password.chars().all(|c| c.is_ascii_digit()),
    };
    if ok {
        return Ok(());
    }

    Err(match role {
        Role::Admin => "Admin passwords need at least 8 characters with a letter, a digit and one of !@#$%^&*",
        Role::Teacher => "Teacher passwords need at least 6 characters with a letter and a digit",
        Role::Student => "Student passwords need at least 4 digits and nothing else",
    }
    .to_string())
}
