//! Resolution of the calling user from request headers.
//!
//! Authentication itself happens upstream. The gateway only needs a stable
//! user ID per request, supplied through an [`IdentityProvider`].

use axum::http::{HeaderMap, HeaderName};

use crate::domain::UserId;

/// Resolves the authenticated user of a request.
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// Returns the caller's identity, or `None` for an anonymous request.
    fn authenticate(&self, headers: &HeaderMap) -> Option<UserId>;
}

/// Trusts a header set by an authenticating reverse proxy.
///
/// Only correct when the gateway is reachable exclusively through that
/// proxy, which must strip the header from client requests.
#[derive(Debug, Clone)]
pub struct TrustedHeaderIdentity {
    header: HeaderName,
}

impl TrustedHeaderIdentity {
    /// Reads the user ID from `header`.
    #[must_use]
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl IdentityProvider for TrustedHeaderIdentity {
    fn authenticate(&self, headers: &HeaderMap) -> Option<UserId> {
        let raw = headers.get(&self.header)?.to_str().ok()?;
        UserId::parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn provider() -> TrustedHeaderIdentity {
        TrustedHeaderIdentity::new(HeaderName::from_static("x-user-id"))
    }

    #[test]
    fn reads_configured_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user-42"));
        let user = provider().authenticate(&headers);
        assert_eq!(user.as_ref().map(UserId::as_str), Some("user-42"));
    }

    #[test]
    fn missing_or_blank_header_is_anonymous() {
        assert!(provider().authenticate(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static(""));
        assert!(provider().authenticate(&headers).is_none());
    }
}
