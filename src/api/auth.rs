//! Request extractors for the calling user and for internal callers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use crate::app_state::AppState;
use crate::domain::UserId;
use crate::error::GatewayError;

/// Header carrying the shared secret of admin and callback routes.
pub const INTERNAL_KEY_HEADER: &str = "x-internal-key";

/// The authenticated user of a request.
///
/// Rejects with 401 when the [`crate::identity::IdentityProvider`] finds
/// no identity.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .identity
            .authenticate(&parts.headers)
            .map(Self)
            .ok_or(GatewayError::Unauthenticated)
    }
}

/// A trusted internal caller presenting the configured API key.
///
/// Rejects with 401 when no key is configured or the presented one does
/// not match.
#[derive(Debug, Clone, Copy)]
pub struct InternalCaller;

impl FromRequestParts<AppState> for InternalCaller {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.internal_api_key.as_deref() else {
            return Err(GatewayError::Unauthenticated);
        };
        let provided = parts
            .headers
            .get(INTERNAL_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(Self)
        } else {
            tracing::warn!("rejected internal call with missing or wrong key");
            Err(GatewayError::Unauthenticated)
        }
    }
}
