use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::session;
use crate::auth::temp_codes::{self, EMAIL_CONFIRMATION};
use crate::config::AuthConfig;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::validate;

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub surname: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SendCodeRequest {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ConfirmEmailRequest {
    pub code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_token: String,
    pub expires: DateTime<Utc>,
}

// -- Cookie helpers --

pub fn session_cookie(auth: &AuthConfig, token: &str, expires: DateTime<Utc>) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Expires={}",
        auth.cookie_name,
        token,
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    if auth.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(auth: &AuthConfig) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        auth.cookie_name
    )
}

pub(crate) fn with_cookie<T: IntoResponse>(cookie: String, body: T) -> AppResult<Response> {
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(format!("Invalid cookie header: {}", e)))?;
    Ok((StatusCode::OK, [(header::SET_COOKIE, value)], body).into_response())
}

/// Start a session for `user_id` and answer with the token as both body
/// and cookie.
fn issue_session_response(state: &AppState, conn: &rusqlite::Connection, user_id: i64) -> AppResult<Response> {
    let auth = &state.config.auth;
    let (token, expires) = session::issue_session(conn, user_id, auth.session_hours)?;
    let cookie = session_cookie(auth, &token, expires);
    with_cookie(
        cookie,
        Json(SessionOut {
            session_token: token,
            expires,
        }),
    )
}

// -- Handlers --

/// POST /auth/register: create an account and log it in
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    let username = validate::username(&req.username)?;
    let email = validate::email(&req.email)?;
    if req.password.is_empty() {
        return Err(AppError::BadRequest("Password is required".into()));
    }
    let name = validate::optional_name("name", req.name.as_deref())?;
    let surname = validate::optional_name("surname", req.surname.as_deref())?;

    let digest = hash_password_blocking(req.password, state.config.auth.bcrypt_cost).await?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO users (username, email, password, name, surname) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![username, email, digest, name, surname],
    )
    .map_err(|e| AppError::conflict_or(e, "Username or email is already in use"))?;
    let user_id = tx.last_insert_rowid();

    let response = issue_session_response(&state, &tx, user_id)?;
    tx.commit()?;

    tracing::info!(user_id, %username, "User registered");
    Ok(response)
}

/// POST /auth/login: verify credentials and start a session
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let user = {
        let conn = state.db.get()?;
        User::find_by_login(&conn, req.username_or_email.trim())?
            .ok_or(AppError::InvalidCredentials)?
    };

    if !verify_password_blocking(req.password, user.password).await? {
        tracing::info!(user_id = user.id, "Failed login attempt");
        return Err(AppError::InvalidCredentials);
    }

    let conn = state.db.get()?;
    let purged = session::purge_expired_sessions(&conn, Utc::now())?;
    if purged > 0 {
        tracing::debug!(purged, "Purged expired sessions");
    }

    issue_session_response(&state, &conn, user.id)
}

/// POST /auth/logout: end every session of the caller
pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        session::invalidate_all_sessions(&conn, user.id)?;
    }

    with_cookie(
        clear_session_cookie(&state.config.auth),
        Json(serde_json::json!({ "detail": "Logged out" })),
    )
}

/// POST /auth/send_code: issue a one-time code for the given purpose
pub async fn send_code(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<SendCodeRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let reason = req.reason.trim();
    if reason.is_empty() || reason.chars().count() > 24 {
        return Err(AppError::BadRequest(
            "Reason must be between 1 and 24 characters".into(),
        ));
    }

    let conn = state.db.get()?;
    temp_codes::issue_temp_code(&conn, user.id, reason, state.config.auth.temp_code_minutes)?;

    Ok(Json(serde_json::json!({
        "detail": "Code sent. Check your email (or logs...)"
    })))
}

/// POST /auth/confirm_email: consume an email confirmation code
pub async fn confirm_email(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ConfirmEmailRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let code = req.code.trim().to_ascii_uppercase();

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    temp_codes::consume_temp_code(&tx, user.id, &code, EMAIL_CONFIRMATION, Utc::now())
        .map_err(|_| AppError::BadRequest("Invalid or expired code".into()))?;
    tx.execute(
        "UPDATE users SET email_confirmed = 1 WHERE id = ?1",
        params![user.id],
    )?;
    tx.commit()?;

    Ok(Json(serde_json::json!({
        "detail": "Email confirmed successfully"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_cookie_has_expected_attributes() {
        let auth = AuthConfig::default();
        let expires = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        let cookie = session_cookie(&auth, "abc", expires);
        assert_eq!(
            cookie,
            "Authorization=abc; HttpOnly; SameSite=Strict; Path=/; Expires=Wed, 02 Jan 2030 03:04:05 GMT"
        );
    }

    #[test]
    fn secure_flag_follows_config() {
        let auth = AuthConfig {
            secure_cookie: true,
            ..AuthConfig::default()
        };
        let cookie = session_cookie(&auth, "abc", Utc::now());
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie(&AuthConfig::default());
        assert!(cookie.starts_with("Authorization=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
