use axum::extract::{Multipart, Path, Query, State};
use axum::response::Response;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::auth::handlers::{clear_session_cookie, with_cookie};
use crate::auth::password::verify_password_blocking;
use crate::db::models::{PostOut, Profile, User};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed::{self, Page, PageParams, PageQuery};
use crate::routes::MultipartForm;
use crate::state::AppState;
use crate::storage::UploadPolicy;
use crate::validate;

// --- Forms ---

#[derive(Deserialize)]
pub struct DeleteAccountQuery {
    pub email: String,
    pub password: String,
}

/// Fields of a profile edit. `None` leaves the stored value as is.
#[derive(Debug, Default)]
struct ProfileEdit {
    username: Option<String>,
    email: Option<String>,
    name: Option<String>,
    surname: Option<String>,
    avatar: Option<String>,
}

impl ProfileEdit {
    fn from_form(form: &MultipartForm) -> AppResult<Self> {
        Ok(ProfileEdit {
            username: form.field("username").map(validate::username).transpose()?,
            email: form.field("email").map(validate::email).transpose()?,
            name: validate::optional_name("name", form.field("name"))?,
            surname: validate::optional_name("surname", form.field("surname"))?,
            avatar: None,
        })
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/me", get(get_me))
        .route("/user/me/edit", put(edit_me))
        .route("/user/avatar", post(upload_avatar).delete(delete_avatar))
        .route("/user/", delete(delete_me))
        .route("/user/{username}", get(get_profile))
        .route("/user/{username}/feed", get(user_feed))
}

// --- Handlers ---

async fn get_me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    let me = User::find(&conn, user.id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(me))
}

/// Multipart fields: `username`, `email`, `name`, `surname`, `avatar`, all
/// optional.
async fn edit_me(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<User>> {
    let mut form = MultipartForm::read(multipart).await?;
    let mut edit = ProfileEdit::from_form(&form)?;

    if let Some(upload) = form.take_file("avatar") {
        edit.avatar = Some(state.storage.store(&upload, UploadPolicy::Permissive).await?);
    }

    match apply_profile_edit(&state, user.id, &edit) {
        Ok((updated, old_avatar)) => {
            if let Some(new) = &edit.avatar {
                state.storage.replace(old_avatar.as_deref(), new).await;
            }
            tracing::info!(user_id = user.id, "Profile updated");
            Ok(Json(updated))
        }
        Err(e) => {
            if let Some(new) = &edit.avatar {
                state.storage.delete(new).await;
            }
            Err(e)
        }
    }
}

/// Multipart field `file`: the new avatar.
async fn upload_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut form = MultipartForm::read(multipart).await?;
    let upload = form
        .take_file("file")
        .ok_or_else(|| AppError::BadRequest("file is required".into()))?;
    let filename = state.storage.store(&upload, UploadPolicy::Permissive).await?;

    let edit = ProfileEdit {
        avatar: Some(filename.clone()),
        ..ProfileEdit::default()
    };
    match apply_profile_edit(&state, user.id, &edit) {
        Ok((_, old_avatar)) => state.storage.replace(old_avatar.as_deref(), &filename).await,
        Err(e) => {
            state.storage.delete(&filename).await;
            return Err(e);
        }
    }

    Ok(Json(serde_json::json!({
        "detail": "Avatar uploaded",
        "filename": filename,
    })))
}

async fn delete_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let removed = match clear_avatar(&state, user.id) {
        Ok(Some(avatar)) => avatar,
        Ok(None) | Err(AppError::NotFound(_)) => return Err(AppError::not_found("Avatar")),
        Err(e) => return Err(e),
    };
    state.storage.delete(&removed).await;

    Ok(Json(serde_json::json!({ "detail": "Avatar deleted" })))
}

/// Delete the caller's account after re-checking email and password.
async fn delete_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<DeleteAccountQuery>,
) -> AppResult<Response> {
    let me = {
        let conn = state.db.get()?;
        User::find(&conn, user.id)?.ok_or_else(|| AppError::not_found("User"))?
    };
    if me.email != query.email.trim()
        || !verify_password_blocking(query.password, me.password.clone()).await?
    {
        return Err(AppError::InvalidCredentials);
    }

    let files = {
        let mut conn = state.db.get()?;
        let tx = conn.transaction()?;
        let files = delete_user_rows(&tx, &me)?;
        tx.commit()?;
        files
    };
    remove_files(&state, &files).await;

    tracing::info!(user_id = user.id, "Account deleted");
    with_cookie(
        clear_session_cookie(&state.config.auth),
        Json(serde_json::json!({ "detail": format!("User {} deleted", user.id) })),
    )
}

async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Profile>> {
    let conn = state.db.get()?;
    let user = User::find_by_username(&conn, &username)?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user.into()))
}

async fn user_feed(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<PostOut>>> {
    let page = PageParams::try_from(query)?;
    let conn = state.db.get()?;
    let user = User::find_by_username(&conn, &username)?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(feed::post_feed(&conn, Some(user.id), page)?))
}

// --- Query helpers ---

/// Apply `edit` in one transaction. Returns the updated user and, when a new
/// avatar was set, the filename it replaced.
fn apply_profile_edit(
    state: &AppState,
    user_id: i64,
    edit: &ProfileEdit,
) -> AppResult<(User, Option<String>)> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    let current = User::find(&tx, user_id)?.ok_or_else(|| AppError::not_found("User"))?;

    if let Some(username) = &edit.username {
        if taken_by_other(&tx, "username", username, user_id)? {
            return Err(AppError::BadRequest("Username is already taken".into()));
        }
        tx.execute(
            "UPDATE users SET username = ?1 WHERE id = ?2",
            params![username, user_id],
        )
        .map_err(|e| AppError::conflict_or(e, "Username is already taken"))?;
    }

    if let Some(email) = &edit.email {
        if taken_by_other(&tx, "email", email, user_id)? {
            return Err(AppError::BadRequest("Email is already in use".into()));
        }
        if *email != current.email {
            tx.execute(
                "UPDATE users SET email = ?1, email_confirmed = 0 WHERE id = ?2",
                params![email, user_id],
            )
            .map_err(|e| AppError::conflict_or(e, "Email is already in use"))?;
        }
    }

    if let Some(name) = &edit.name {
        tx.execute("UPDATE users SET name = ?1 WHERE id = ?2", params![name, user_id])?;
    }
    if let Some(surname) = &edit.surname {
        tx.execute(
            "UPDATE users SET surname = ?1 WHERE id = ?2",
            params![surname, user_id],
        )?;
    }

    let replaced = match &edit.avatar {
        Some(avatar) => {
            tx.execute(
                "UPDATE users SET avatar = ?1 WHERE id = ?2",
                params![avatar, user_id],
            )?;
            current.avatar
        }
        None => None,
    };

    let updated = User::find(&tx, user_id)?.ok_or_else(|| AppError::not_found("User"))?;
    tx.commit()?;
    Ok((updated, replaced))
}

fn taken_by_other(conn: &Connection, column: &str, value: &str, user_id: i64) -> AppResult<bool> {
    let sql = format!(
        "SELECT COUNT(*) > 0 FROM users WHERE {} = ?1 AND id != ?2",
        column
    );
    Ok(conn.query_row(&sql, params![value, user_id], |row| row.get(0))?)
}

/// Unset a user's avatar. Returns the removed filename, or `None` when the
/// user had none. 404 when the user does not exist.
pub(crate) fn clear_avatar(state: &AppState, user_id: i64) -> AppResult<Option<String>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    let user = User::find(&tx, user_id)?.ok_or_else(|| AppError::not_found("User"))?;
    if user.avatar.is_some() {
        tx.execute("UPDATE users SET avatar = NULL WHERE id = ?1", params![user_id])?;
        tx.commit()?;
    }
    Ok(user.avatar)
}

/// Delete a user and everything that cascades from it. Returns the stored
/// files that belonged to the account; callers remove them after commit.
pub(crate) fn delete_user_rows(conn: &Connection, user: &User) -> AppResult<Vec<String>> {
    let files = user.owned_files(conn)?;
    conn.execute("DELETE FROM users WHERE id = ?1", params![user.id])?;
    Ok(files)
}

pub(crate) async fn remove_files(state: &AppState, files: &[String]) {
    for file in files {
        state.storage.delete(file).await;
    }
}
