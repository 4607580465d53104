use axum::extract::{Multipart, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::params;
use serde::Deserialize;

use crate::db::models::{Post, PostOut};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed::{self, Page, PageParams, PageQuery};
use crate::rating;
use crate::routes::MultipartForm;
use crate::state::AppState;
use crate::storage::UploadPolicy;
use crate::validate;

// --- Forms ---

#[derive(Deserialize)]
pub struct RecipeQuery {
    pub id: i64,
}

#[derive(Deserialize)]
pub struct DeleteRecipeQuery {
    pub post_id: i64,
}

#[derive(Deserialize)]
pub struct RatePostRequest {
    pub post_id: i64,
    pub like: bool,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/recipe/feed", get(recipe_feed))
        .route("/recipe", get(get_recipe).post(create_recipe))
        .route("/recipe/", post(create_recipe).delete(delete_recipe))
        .route("/recipe/rate_post", post(rate_post))
}

// --- Handlers ---

async fn recipe_feed(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<PostOut>>> {
    let page = PageParams::try_from(query)?;
    let conn = state.db.get()?;
    Ok(Json(feed::post_feed(&conn, None, page)?))
}

async fn get_recipe(
    State(state): State<AppState>,
    Query(query): Query<RecipeQuery>,
) -> AppResult<Json<PostOut>> {
    let conn = state.db.get()?;
    Ok(Json(feed::post_detail(&conn, query.id)?))
}

/// Multipart fields: `title`, optional `text`, optional `preview` image.
async fn create_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<PostOut>> {
    let mut form = MultipartForm::read(multipart).await?;
    let title = validate::title(form.field("title").unwrap_or_default())?;
    let text = validate::post_text(form.field("text"))?;

    let preview = match form.take_file("preview") {
        Some(upload) => Some(state.storage.store(&upload, UploadPolicy::ImagesOnly).await?),
        None => None,
    };

    match insert_post(&state, user.id, &title, text.as_deref(), preview.as_deref()) {
        Ok(post) => {
            tracing::info!(post_id = post.id, user_id = user.id, "Recipe created");
            Ok(Json(post))
        }
        Err(e) => {
            if let Some(preview) = &preview {
                state.storage.delete(preview).await;
            }
            Err(e)
        }
    }
}

async fn delete_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<DeleteRecipeQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let preview = remove_post(&state, user.id, query.post_id)?;
    if let Some(preview) = preview {
        state.storage.delete(&preview).await;
    }

    tracing::info!(post_id = query.post_id, user_id = user.id, "Recipe deleted");
    Ok(Json(serde_json::json!({ "detail": "Post deleted" })))
}

async fn rate_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<RatePostRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    rating::rate_post(&conn, user.id, req.post_id, req.like)?;
    let rating = rating::post_rating(&conn, req.post_id)?;

    Ok(Json(serde_json::json!({
        "detail": "Post rated",
        "rating": rating,
    })))
}

// --- Query helpers ---

fn insert_post(
    state: &AppState,
    user_id: i64,
    title: &str,
    text: Option<&str>,
    preview: Option<&str>,
) -> AppResult<PostOut> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO posts (user_id, title, text, created_at, preview) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, title, text, Utc::now(), preview],
    )?;
    let post = feed::post_detail(&tx, tx.last_insert_rowid())?;
    tx.commit()?;
    Ok(post)
}

/// Delete a post owned by `user_id`. Returns the preview file it referenced.
fn remove_post(state: &AppState, user_id: i64, post_id: i64) -> AppResult<Option<String>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    let post = Post::find(&tx, post_id)?.ok_or_else(|| AppError::not_found("Post"))?;
    if post.user_id != user_id {
        return Err(AppError::Forbidden("Access denied".into()));
    }
    tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    tx.commit()?;
    Ok(post.preview)
}
