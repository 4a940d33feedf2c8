use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{ErrorKind, RepositoryError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }

    pub fn message(&self) -> &str {
        &self.body.message
    }
}

fn kind_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::CapacityExceeded => StatusCode::CONFLICT,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        if let Some(kind) = error.kind() {
            let message = match &error {
                ApplicationError::Domain(err) => err.to_string(),
                ApplicationError::Repository(err) => err.to_string(),
                other => other.to_string(),
            };
            return ApiError::new(kind_status(kind), kind.as_str(), message);
        }

        match error {
            ApplicationError::Authentication => {
                ApiError::authentication_failed("invalid username or password")
            }
            ApplicationError::Token(err) => ApiError::authentication_failed(err.to_string()),
            ApplicationError::Repository(RepositoryError::Conflict) => ApiError::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                "resource was modified concurrently, retry the request",
            ),
            other => {
                tracing::error!(error = %other, "请求处理失败");
                ApiError::internal_server_error("internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
