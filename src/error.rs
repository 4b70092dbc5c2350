//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! Lost races are reported as conflicts, distinct from server failures, so
//! clients can tell "someone else got it" from "try again".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ClanBuyStatus, FlashDropStatus};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2101,
///     "message": "flash drop is no longer available",
///     "details": "FROZEN"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the table on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Current status of the contested resource, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1099 | Validation      | 400 Bad Request              |
/// | 1100–1199 | Identity        | 401 Unauthorized / 403       |
/// | 2000–2099 | Not Found       | 404 Not Found                |
/// | 2100–2199 | Conflict        | 409 Conflict                 |
/// | 2200–2299 | Expired         | 410 Gone                     |
/// | 3000–3999 | Server          | 500 Internal Server Error    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No authenticated identity on a route that needs one.
    #[error("authentication required")]
    Unauthenticated,

    /// Authenticated, but not allowed to perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Flash drop with the given ID was not found.
    #[error("flash drop not found: {0}")]
    FlashDropNotFound(uuid::Uuid),

    /// No flash drop is currently running.
    #[error("no active flash drop")]
    NoActiveFlashDrop,

    /// No clan buy is shared under the given join token.
    #[error("clan buy not found")]
    ClanBuyNotFound,

    /// The drop left ACTIVE before this request got to it.
    #[error("flash drop is no longer available")]
    FlashDropConflict {
        /// Status observed after the rejected write.
        status: FlashDropStatus,
        /// Whether the caller is the user holding the drop.
        held_by_caller: bool,
    },

    /// The clan buy no longer accepts the requested change.
    #[error("clan buy is no longer available")]
    ClanBuyConflict {
        /// Status observed after the rejected write.
        status: ClanBuyStatus,
    },

    /// The drop's end time or purchase window has passed.
    #[error("flash drop has expired")]
    FlashDropExpired,

    /// The clan buy's join deadline has passed.
    #[error("clan buy has expired")]
    ClanBuyExpired,

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Unauthenticated => 1101,
            Self::Forbidden(_) => 1102,
            Self::FlashDropNotFound(_) => 2001,
            Self::NoActiveFlashDrop => 2002,
            Self::ClanBuyNotFound => 2003,
            Self::FlashDropConflict { .. } => 2101,
            Self::ClanBuyConflict { .. } => 2102,
            Self::FlashDropExpired => 2201,
            Self::ClanBuyExpired => 2202,
            Self::PersistenceError(_) => 3001,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::FlashDropNotFound(_) | Self::NoActiveFlashDrop | Self::ClanBuyNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::FlashDropConflict { .. } | Self::ClanBuyConflict { .. } => StatusCode::CONFLICT,
            Self::FlashDropExpired | Self::ClanBuyExpired => StatusCode::GONE,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Current status of the contested resource, for conflict responses.
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            Self::FlashDropConflict {
                status,
                held_by_caller: true,
            } => Some(format!("{status} (held by you)")),
            Self::FlashDropConflict { status, .. } => Some(status.to_string()),
            Self::ClanBuyConflict { status } => Some(status.to_string()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_409_with_status_details() {
        let err = GatewayError::FlashDropConflict {
            status: FlashDropStatus::Sold,
            held_by_caller: false,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.details().as_deref(), Some("SOLD"));
        assert_eq!(err.to_string(), "flash drop is no longer available");
    }

    #[test]
    fn expiry_is_gone_not_conflict() {
        assert_eq!(GatewayError::ClanBuyExpired.status_code(), StatusCode::GONE);
        assert_eq!(GatewayError::FlashDropExpired.error_code(), 2201);
    }

    #[test]
    fn identity_errors() {
        assert_eq!(
            GatewayError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::Forbidden("not the creator".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
