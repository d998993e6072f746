//! HTTP request handlers for the mock server.

pub mod auth;
pub mod import;
pub mod metadata;
pub mod rows;

pub use auth::*;
pub use import::*;
pub use metadata::*;
pub use rows::*;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::mock_server::state::MockState;
use crate::TOKEN_HEADER;

/// An error response in the server's `{"errors": [{"message": …}]}` shape.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "errors": [{"message": message.into()}]
        })),
    )
        .into_response()
}

/// The session token sent with a request.
pub(crate) fn request_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok())
}

/// Reject requests without a valid token when the state requires one.
pub(crate) fn authorize(state: &MockState, headers: &HeaderMap) -> Result<(), Response> {
    if state.is_authorized(request_token(headers)) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::UNAUTHORIZED,
            "No read permission on entity type",
        ))
    }
}

/// A 404 for an unknown entity type.
pub(crate) fn unknown_entity(entity: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Unknown entity type [{entity}]"),
    )
}
