use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use hush_auth::AuthError;
use hush_crypto::CryptoError;
use hush_types::api::ErrorBody;

/// Every failure an HTTP handler can return. Rendered as
/// `{"message": ..., "status": ...}`; internal causes are logged, not sent.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Please log in")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("{0}")]
    Validation(String),

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Chat not found")]
    ChatNotFound,

    #[error("You are not a member of this chat")]
    NotMember,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::InvalidCode | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::ChatNotFound => StatusCode::NOT_FOUND,
            Self::NotMember => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Internal(e.into())
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        Self::Internal(e.into())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("spawn_blocking join error: {e}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(cause) = &self {
            error!("Request failed: {:#}", cause);
        }

        let status = self.status();
        let body = ErrorBody {
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_cause_is_not_exposed() {
        let err = ApiError::Internal(anyhow::anyhow!("database is locked"));
        assert_eq!(err.to_string(), "Internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn credential_failures_map_to_fixed_messages() {
        assert_eq!(ApiError::Unauthorized.to_string(), "Please log in");
        assert_eq!(ApiError::InvalidCode.to_string(), "Invalid or expired code");
        assert_eq!(ApiError::InvalidCode.status(), StatusCode::BAD_REQUEST);
    }
}
