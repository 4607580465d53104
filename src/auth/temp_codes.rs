use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection};

use crate::auth::session::AuthError;
use crate::db::models::TempCode;

pub const CODE_LEN: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Tag of codes that confirm an email address.
pub const EMAIL_CONFIRMATION: &str = "email";

/// Store a fresh code for `user_id` tagged with `reason` and hand it to the
/// delivery stub. Returns the code.
pub fn issue_temp_code(
    conn: &Connection,
    user_id: i64,
    reason: &str,
    minutes: u64,
) -> Result<String, rusqlite::Error> {
    let code = generate_code();
    let expires_at = Utc::now() + Duration::minutes(minutes as i64);

    conn.execute(
        "INSERT INTO temp_codes (code, user_id, type, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![code, user_id, reason, expires_at],
    )?;

    deliver(user_id, reason, &code);
    Ok(code)
}

/// Consume a code: it must belong to the user, carry the same tag and not
/// be expired at `now`. A matching code is deleted so it cannot be reused.
pub fn consume_temp_code(
    conn: &Connection,
    user_id: i64,
    code: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    let found = find_code(conn, user_id, code, reason, now).map_err(|e| {
        tracing::error!("Temp code lookup failed: {}", e);
        AuthError::InvalidOrExpired
    })?;
    let found = found.ok_or(AuthError::InvalidOrExpired)?;

    conn.execute("DELETE FROM temp_codes WHERE id = ?1", params![found.id])
        .map_err(|e| {
            tracing::error!("Temp code delete failed: {}", e);
            AuthError::InvalidOrExpired
        })?;

    Ok(())
}

fn find_code(
    conn: &Connection,
    user_id: i64,
    code: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<TempCode>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, user_id, type, expires_at FROM temp_codes
         WHERE user_id = ?1 AND code = ?2 AND type = ?3
         ORDER BY id",
    )?;
    let codes = stmt
        .query_map(params![user_id, code, reason], |row| {
            Ok(TempCode {
                id: row.get(0)?,
                code: row.get(1)?,
                user_id: row.get(2)?,
                kind: row.get(3)?,
                expires_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(codes.into_iter().find(|c| c.expires_at > now))
}

/// Email delivery is not wired up; the code only goes to the log.
fn deliver(user_id: i64, reason: &str, code: &str) {
    tracing::info!(user_id, reason, code, "Temp code issued (delivery stub)");
}

/// Generate a random code of [`CODE_LEN`] uppercase letters and digits.
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}
