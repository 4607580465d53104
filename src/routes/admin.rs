use axum::extract::{Path, State};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use rusqlite::params;

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::AdminUser;
use crate::routes::user::{clear_avatar, delete_user_rows, remove_files};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/{user_id}/toggle_admin", put(toggle_admin))
        .route("/admin/users/{user_id}", delete(delete_user))
        .route("/admin/users/{user_id}/avatar", delete(delete_user_avatar))
}

async fn list_users(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Vec<User>>> {
    let conn = state.db.get()?;
    Ok(Json(User::list(&conn)?))
}

async fn toggle_admin(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<User>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE users SET is_admin = NOT is_admin WHERE id = ?1",
        params![user_id],
    )?;
    if changed == 0 {
        return Err(AppError::not_found("User"));
    }
    let user = User::find(&tx, user_id)?.ok_or_else(|| AppError::not_found("User"))?;
    tx.commit()?;

    tracing::info!(
        admin_id = admin.user.id,
        user_id,
        is_admin = user.is_admin,
        "Admin flag toggled"
    );
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let files = {
        let mut conn = state.db.get()?;
        let tx = conn.transaction()?;
        let user = User::find(&tx, user_id)?.ok_or_else(|| AppError::not_found("User"))?;
        let files = delete_user_rows(&tx, &user)?;
        tx.commit()?;
        files
    };
    remove_files(&state, &files).await;

    tracing::info!(admin_id = admin.user.id, user_id, "User deleted by admin");
    Ok(Json(serde_json::json!({ "detail": format!("User {} deleted", user_id) })))
}

async fn delete_user_avatar(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let avatar = clear_avatar(&state, user_id)?
        .ok_or_else(|| AppError::NotFound("User has no avatar".into()))?;
    state.storage.delete(&avatar).await;

    tracing::info!(admin_id = admin.user.id, user_id, "Avatar removed by admin");
    Ok(Json(serde_json::json!({
        "detail": format!("Avatar deleted for user {}", user_id)
    })))
}
