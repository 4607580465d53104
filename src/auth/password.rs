//! Password digests.
//!
//! Every password check in the service goes through [`verify_password`],
//! including the re-verification done before an account is deleted.

use crate::error::{AppError, AppResult};

/// Hash a plaintext password with bcrypt at the given cost.
pub fn hash_password(plain: &str, cost: u32) -> AppResult<String> {
    Ok(bcrypt::hash(plain, cost)?)
}

/// Check a plaintext password against a stored digest. A malformed digest
/// counts as a mismatch.
pub fn verify_password(plain: &str, digest: &str) -> bool {
    match bcrypt::verify(plain, digest) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Stored password digest could not be parsed: {}", e);
            false
        }
    }
}

/// [`hash_password`] on the blocking pool, for use from handlers.
pub async fn hash_password_blocking(plain: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain, cost))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// [`verify_password`] on the blocking pool, for use from handlers.
pub async fn verify_password_blocking(plain: String, digest: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &digest))
        .await
        .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))
}
