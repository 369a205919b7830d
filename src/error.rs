//! Request-facing error taxonomy.
//!
//! Everything a handler can fail with maps to exactly one status code.
//! Credential failures share a single generic message so responses
//! never reveal whether an account exists, and persistence failures
//! never leak backend details to the client.

use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, delimiter-unsafe or duplicate input. 400.
    #[error("{0}")]
    Validation(String),

    /// Unknown account or wrong password. Deliberately generic. 401.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Missing, expired or unknown session token. 401.
    #[error("Not signed in")]
    Unauthorized,

    /// Valid session, insufficient role. 403.
    #[error("Admin only")]
    Forbidden,

    /// Target record absent for update/delete. 404.
    #[error("{0}")]
    NotFound(&'static str),

    /// The stored document moved underneath this request. 409.
    #[error("The record set changed while handling this request, please retry")]
    Conflict,

    /// Too many attempts from one client. 429.
    #[error("Too many attempts, try again shortly")]
    RateLimited,

    /// Persistence-layer failure. Details go to the log, not the
    /// client. 500.
    #[error("Server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { .. } => {
                tracing::warn!("Commit lost a pointer race: {e}");
                Self::Conflict
            }
            other => {
                tracing::error!("Persistence failure: {other}");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_the_taxonomy() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::RateLimited.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Internal.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_conflicts_become_409_everything_else_500() {
        let conflict = StoreError::Conflict {
            expected: None,
            found: Some("v2".into()),
        };
        assert!(matches!(ApiError::from(conflict), ApiError::Conflict));

        let backend = StoreError::Backend {
            status: 503,
            body: "down".into(),
        };
        assert!(matches!(ApiError::from(backend), ApiError::Internal));
    }

    #[test]
    fn credential_failures_share_one_message() {
        assert_eq!(
            ApiError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = ApiError::from(StoreError::Backend {
            status: 500,
            body: "secret backend detail".into(),
        });
        assert_eq!(err.to_string(), "Server error");
    }
}
