use astral_api::{ApiError, ApiResponse};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::json_body;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub token: String,
    pub login: String,
    #[serde(rename = "pswd")]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    #[serde(rename = "pswd")]
    pub password: String,
}

/// `POST /api/register`
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let input = json_body(payload)?;
    let user = state
        .authenticator
        .register(&input.token, &input.login, &input.password)
        .await?;
    Ok(ApiResponse::response(json!({ "login": user.login })))
}

/// `POST /api/auth`
pub async fn authenticate(
    State(state): State<AppState>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let input = json_body(payload)?;
    let token = state
        .authenticator
        .authenticate(&input.login, &input.password)
        .await?;
    Ok(ApiResponse::response(json!({ "token": token })))
}

/// `DELETE /api/auth/{token}`
pub async fn logout(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<ApiResponse, ApiError> {
    state.authenticator.logout(&token).await?;

    let mut body = Map::new();
    body.insert(token, Value::Bool(true));
    Ok(ApiResponse::response(Value::Object(body)))
}
