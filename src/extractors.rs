use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use chrono::Utc;

use crate::auth::session::{self, AuthError};
use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller, resolved from the session cookie.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: i64,
}

/// Extractor that requires authentication.
/// Returns 401 if the cookie is missing or the session is unknown or expired.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie_value(parts, &state.config.auth.cookie_name);
        if token.is_none() {
            return Err(AuthError::Missing.into());
        }

        let conn = state.db.get()?;
        let id = session::resolve_session(&conn, token, Utc::now())?;
        Ok(CurrentUser { id })
    }
}

/// An authenticated caller whose account carries admin privileges.
/// Returns 401 like [`CurrentUser`], then 403 if the account is gone or not
/// an admin.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user: User,
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;

        let conn = state.db.get()?;
        match User::find(&conn, current.id)? {
            Some(user) if user.is_admin => Ok(AdminUser { user }),
            _ => Err(AppError::Forbidden("Admin privileges required".into())),
        }
    }
}

pub fn get_cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}
