use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::params;
use serde::Deserialize;

use crate::db::models::{Comment, CommentOut, Post, User};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed::{self, Page, PageParams};
use crate::state::AppState;
use crate::validate;

#[derive(Deserialize)]
pub struct CommentsQuery {
    pub post: i64,
    pub page: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub post_id: i64,
    pub text: String,
}

#[derive(Deserialize)]
pub struct DeleteCommentQuery {
    pub comment_id: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/comment",
        get(list_comments).post(create_comment).delete(delete_comment),
    )
}

async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentsQuery>,
) -> AppResult<Json<Page<CommentOut>>> {
    let page = PageParams::new(query.page)?;
    let conn = state.db.get()?;
    if !Post::exists(&conn, query.post)? {
        return Err(AppError::not_found("Post"));
    }
    Ok(Json(feed::comment_page(&conn, query.post, page)?))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<Json<CommentOut>> {
    let text = validate::comment_text(&req.text)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    if !Post::exists(&tx, req.post_id)? {
        return Err(AppError::not_found("Post"));
    }
    let created_at = Utc::now();
    tx.execute(
        "INSERT INTO comments (user_id, post_id, text, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user.id, req.post_id, text, created_at],
    )?;
    let id = tx.last_insert_rowid();
    let author = User::find(&tx, user.id)?.ok_or_else(|| AppError::not_found("User"))?;
    tx.commit()?;

    Ok(Json(CommentOut {
        id,
        user: author,
        post_id: req.post_id,
        text,
        created_at,
    }))
}

/// Authors may delete their own comments; admins may delete any.
async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<DeleteCommentQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    let comment =
        Comment::find(&tx, query.comment_id)?.ok_or_else(|| AppError::not_found("Comment"))?;
    let caller = User::find(&tx, user.id)?.ok_or_else(|| AppError::not_found("User"))?;

    if comment.user_id != caller.id && !caller.is_admin {
        return Err(AppError::Forbidden("Access denied".into()));
    }

    tx.execute("DELETE FROM comments WHERE id = ?1", params![comment.id])?;
    tx.commit()?;

    tracing::info!(
        comment_id = comment.id,
        user_id = caller.id,
        as_admin = comment.user_id != caller.id,
        "Comment deleted"
    );
    Ok(Json(serde_json::json!({ "detail": "Comment deleted" })))
}
