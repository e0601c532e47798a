/// Credential hashing
use crate::error::{AppError, AppResult};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

/// Hash a plaintext password into a PHC string (Argon2id, random salt)
pub fn hash(plaintext: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check `candidate` against a stored hash.
///
/// An account without a password never matches. A stored value that is not a
/// valid PHC string also never matches.
pub fn compare(stored: Option<&str>, candidate: &str) -> bool {
    let Some(stored) = stored else {
        return false;
    };

    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}
