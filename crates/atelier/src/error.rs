//! Typed-error to HTTP translation.

use atelier_protocol::http::ErrorBody;
use atelier_protocol::{CoreError, ErrorKind};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// Wrapper so `CoreError` can flow out of handlers with `?`.
pub struct ApiError(pub CoreError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl<E: Into<CoreError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::BadInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if kind == ErrorKind::Internal {
            error!("Internal error surfaced to HTTP: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: kind.as_str().to_string(),
            detail: None,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        for (error, expected) in [
            (CoreError::bad_input("x"), StatusCode::BAD_REQUEST),
            (CoreError::not_found("x"), StatusCode::NOT_FOUND),
            (CoreError::conflict("x"), StatusCode::CONFLICT),
            (CoreError::upstream("x"), StatusCode::BAD_GATEWAY),
            (CoreError::timeout("x"), StatusCode::GATEWAY_TIMEOUT),
            (CoreError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            let response = ApiError(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
