//! Argon2id password hashing. Work runs on the blocking pool.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;

use crate::api::handlers::error::ApiError;

/// Verified against when the account does not exist, so both paths cost the same.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_blocking("nagoyameshi-dummy").ok());

fn hash_blocking(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

fn verify_blocking(password: &str, phc: &str) -> bool {
    PasswordHash::new(phc).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Hash a password into a PHC string.
///
/// # Errors
/// Returns `ApiError::Internal` if hashing fails or the blocking task panics.
pub async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_blocking(&password))
        .await
        .map_err(|err| ApiError::Internal(format!("password hashing task failed: {err}")))?
        .map_err(|err| ApiError::Internal(format!("password hashing failed: {err}")))
}

/// Check a password against a stored PHC string (or the dummy when `None`).
///
/// # Errors
/// Returns `ApiError::Internal` if the blocking task panics.
pub async fn verify_password(password: String, phc: Option<String>) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || match phc {
        Some(phc) => verify_blocking(&password, &phc),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_blocking(&password, dummy);
            }
            false
        }
    })
    .await
    .map_err(|err| ApiError::Internal(format!("password verification task failed: {err}")))
}
