use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("argon2 hash error: {0}")]
    Hash(argon2::password_hash::Error),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(argon2::password_hash::Error),
}

/// Salted argon2id digest in PHC string form.
pub fn hash(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(PasswordError::Hash)
}

/// `Ok(false)` on mismatch; `Err` only when the stored digest is unreadable.
pub fn verify(plain: &str, digest: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(digest).map_err(PasswordError::MalformedHash)?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
