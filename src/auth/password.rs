//! Password hashing with Argon2id.
//!
//! Hashes are stored as PHC strings, which carry the algorithm, parameters,
//! and salt, so parameter upgrades only affect newly created hashes.

use argon2::{
    Argon2,
    password_hash::{Error, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use anyhow::{Result, anyhow};

/// Hash a plaintext password into a PHC string.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC string. A wrong password
/// is `Ok(false)`; only malformed hashes or internal failures are errors.
pub fn verify(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|err| anyhow!("invalid password hash: {err}"))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(Error::Password) => Ok(false),
        Err(err) => Err(anyhow!("failed to verify password: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let stored = hash("hunter2!").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify("hunter2!", &stored).unwrap());
        assert!(!verify("hunter3!", &stored).unwrap());
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash("hunter2!").unwrap();
        let b = hash("hunter2!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify("hunter2!", "not-a-phc-string").is_err());
    }
}
