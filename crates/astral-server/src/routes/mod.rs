pub mod auth;
pub mod docs;
pub mod health;

use astral_api::ApiError;
use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Routes mounted under `/api`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/auth", post(auth::authenticate))
        .route("/auth/{token}", delete(auth::logout))
        .route(
            "/docs",
            get(docs::list_documents)
                .head(docs::head_documents)
                .post(docs::upload_document),
        )
        .route(
            "/docs/{id}",
            get(docs::get_document)
                .head(docs::head_document)
                .delete(docs::delete_document),
        )
}

/// Unwrap a JSON body, answering 400 for malformed input.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        ApiError::bad_request(format!(
            "Failed to decode json body. Error: {}",
            rejection.body_text()
        ))
    })
}
