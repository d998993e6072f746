//! Login and logout handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{error_response, request_token};
use crate::mock_server::state::MockState;

/// Body of a login request.
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

/// POST /api/v1/login
pub async fn login(
    State(state): State<Arc<RwLock<MockState>>>,
    Json(body): Json<LoginBody>,
) -> Response {
    let mut state = state.write().await;

    if state.users.get(&body.username) != Some(&body.password) {
        return error_response(StatusCode::UNAUTHORIZED, "Unknown username or bad password");
    }

    let token = state.issue_id("token");
    state.tokens.insert(token.clone());

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "token": token,
            "username": body.username,
        })),
    )
        .into_response()
}

/// POST /api/v1/logout
pub async fn logout(
    State(state): State<Arc<RwLock<MockState>>>,
    headers: HeaderMap,
) -> StatusCode {
    if let Some(token) = request_token(&headers) {
        state.write().await.tokens.remove(token);
    }
    StatusCode::OK
}
