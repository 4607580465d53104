use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::UserSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("No Authorization cookie found")]
    Missing,

    #[error("Invalid or expired session")]
    InvalidOrExpired,
}

/// Create a new session for a user. Returns the token and its expiry.
pub fn issue_session(
    conn: &Connection,
    user_id: i64,
    hours: u64,
) -> Result<(String, DateTime<Utc>), rusqlite::Error> {
    let token = generate_token();
    let expires_at = Utc::now() + Duration::hours(hours as i64);

    conn.execute(
        "INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?1, ?2, ?3)",
        params![user_id, token, expires_at],
    )?;

    tracing::debug!(user_id, %expires_at, "Issued session");
    Ok((token, expires_at))
}

/// Resolve a session token to its user id. The session must expire strictly
/// after `now`.
pub fn resolve_session(
    conn: &Connection,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<i64, AuthError> {
    let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::Missing)?;

    let session = find_session(conn, token).map_err(|e| {
        tracing::error!("Session lookup failed: {}", e);
        AuthError::InvalidOrExpired
    })?;

    match session {
        Some(session) if session.expires_at > now => Ok(session.user_id),
        _ => Err(AuthError::InvalidOrExpired),
    }
}

pub fn find_session(conn: &Connection, token: &str) -> rusqlite::Result<Option<UserSession>> {
    conn.query_row(
        "SELECT id, user_id, token, expires_at FROM user_sessions WHERE token = ?1",
        params![token],
        |row| {
            Ok(UserSession {
                id: row.get(0)?,
                user_id: row.get(1)?,
                token: row.get(2)?,
                expires_at: row.get(3)?,
            })
        },
    )
    .optional()
}

/// Delete every session of a user. Returns how many were removed.
pub fn invalidate_all_sessions(conn: &Connection, user_id: i64) -> Result<usize, rusqlite::Error> {
    let removed = conn.execute(
        "DELETE FROM user_sessions WHERE user_id = ?1",
        params![user_id],
    )?;
    tracing::debug!(user_id, removed, "Invalidated sessions");
    Ok(removed)
}

/// Drop sessions that can no longer authenticate anyone.
pub fn purge_expired_sessions(conn: &Connection, now: DateTime<Utc>) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM user_sessions WHERE expires_at <= ?1",
        params![now],
    )
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}
