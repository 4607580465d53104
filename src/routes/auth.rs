use axum::routing::post;
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/send_code", post(handlers::send_code))
        .route("/auth/confirm_email", post(handlers::confirm_email))
}
