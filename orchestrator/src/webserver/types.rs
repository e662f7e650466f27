use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Marker trait for response payloads returned from a handler via `json`.
pub trait ApiResponse: Serialize {}

pub fn json<T: ApiResponse>(response: T) -> Json<T> {
    Json(response)
}

/// Wraps any handler error as a 500 with the error's `Display` as the body;
/// handlers return `anyhow::Result` via `?` and this converts it at the
/// response boundary.
pub struct Error(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for Error {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
