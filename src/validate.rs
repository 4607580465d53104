//! Input checks shared by the JSON and multipart handlers. Each returns the
//! trimmed value on success and a 400 otherwise.

use crate::error::{AppError, AppResult};

pub const USERNAME_MAX: usize = 32;
pub const EMAIL_MAX: usize = 320;
pub const NAME_MAX: usize = 16;
pub const TITLE_MAX: usize = 64;
pub const POST_TEXT_MAX: usize = 8192;
pub const COMMENT_MAX: usize = 2048;

/// Usernames that collide with static routes under `/user/`.
const RESERVED_USERNAMES: &[&str] = &["me", "avatar"];

fn bounded(field: &str, value: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(AppError::BadRequest(format!(
            "{} must be {} characters or less",
            field, max
        )));
    }
    Ok(value.to_string())
}

pub fn username(value: &str) -> AppResult<String> {
    let username = bounded("username", value, USERNAME_MAX)?;
    if username.contains(['/', '?', '#']) || username.chars().any(char::is_whitespace) {
        return Err(AppError::BadRequest(
            "username may not contain whitespace, '/', '?' or '#'".into(),
        ));
    }
    if RESERVED_USERNAMES
        .iter()
        .any(|reserved| username.eq_ignore_ascii_case(reserved))
    {
        return Err(AppError::BadRequest(format!(
            "username '{}' is reserved",
            username
        )));
    }
    Ok(username)
}

pub fn email(value: &str) -> AppResult<String> {
    let email = bounded("email", value, EMAIL_MAX)?;
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::BadRequest("value is not a valid email address".into()));
    }
    Ok(email)
}

/// Optional short name field. Blank input counts as absent.
pub fn optional_name(field: &str, value: Option<&str>) -> AppResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => bounded(field, v, NAME_MAX).map(Some),
        None => Ok(None),
    }
}

pub fn title(value: &str) -> AppResult<String> {
    bounded("title", value, TITLE_MAX)
}

/// Optional post body. Blank input counts as absent. Inner whitespace and
/// line breaks are kept as written.
pub fn post_text(value: Option<&str>) -> AppResult<Option<String>> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) if v.chars().count() > POST_TEXT_MAX => Err(AppError::BadRequest(format!(
            "text must be {} characters or less",
            POST_TEXT_MAX
        ))),
        Some(v) => Ok(Some(v.to_string())),
        None => Ok(None),
    }
}

pub fn comment_text(value: &str) -> AppResult<String> {
    bounded("text", value, COMMENT_MAX)
}
