use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::error::AppResult;
use crate::state::AppState;
use crate::storage::is_image_name;

pub fn router() -> Router<AppState> {
    Router::new().route("/file/{filename}", get(serve_file))
}

/// Raw bytes of a stored file. Images get their own content type; anything
/// else is sent as an opaque download so browsers never render it.
async fn serve_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    let bytes = state.storage.read(&filename).await?;
    let content_type = if is_image_name(&filename) {
        mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string()
    } else {
        mime_guess::mime::APPLICATION_OCTET_STREAM.to_string()
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        bytes,
    ))
}
