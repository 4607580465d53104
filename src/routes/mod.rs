pub mod admin;
pub mod auth;
pub mod comment;
pub mod file;
pub mod recipe;
pub mod user;

use std::collections::HashMap;

use axum::extract::{DefaultBodyLimit, Multipart};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppResult;
use crate::state::AppState;
use crate::storage::Upload;

/// Assemble the full application router.
pub fn app(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(root))
        .merge(auth::router())
        .merge(recipe::router())
        .merge(comment::router())
        .merge(user::router())
        .merge(file::router())
        .merge(admin::router())
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes()))
        .layer(TraceLayer::new_for_http());

    if state.config.server.allow_any_origin {
        app = app.layer(CorsLayer::very_permissive());
    }

    app.with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "API is working!" }))
}

/// Text fields and file parts of a multipart body.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, Upload>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    // Browsers send an empty part for an untouched file input
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.insert(
                        name,
                        Upload {
                            content_type,
                            file_name: Some(file_name),
                            bytes,
                        },
                    );
                }
                None => {
                    form.fields.insert(name, field.text().await?);
                }
            }
        }

        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}
