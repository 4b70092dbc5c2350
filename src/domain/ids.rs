//! Type-safe identifiers.
//!
//! Flash drops, clan buys and products are keyed by UUID v4 newtypes so
//! that one kind of identifier cannot be passed where another is expected.
//! [`UserId`] is an opaque string supplied by the identity provider.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a new random identifier (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wraps an existing [`uuid::Uuid`].
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner [`uuid::Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Unique identifier of a flash drop auction.
    FlashDropId
);

uuid_id!(
    /// Unique identifier of a clan buy. Never exposed as the shareable
    /// handle; clients address clan buys by their join token.
    ClanBuyId
);

uuid_id!(
    /// Reference to a catalog product owned by an external service.
    ProductId
);

/// Authenticated user identifier, as issued by the identity provider.
///
/// The core never interprets the value; it only compares identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Maximum accepted identifier length in bytes.
    pub const MAX_LEN: usize = 128;

    /// Wraps a raw identifier. Returns `None` for empty, oversized, or
    /// whitespace-padded values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.len() > Self::MAX_LEN || raw.trim() != raw {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_unique_ids() {
        assert_ne!(FlashDropId::new(), FlashDropId::new());
        assert_ne!(ClanBuyId::new(), ClanBuyId::new());
    }

    #[test]
    fn display_is_uuid_format() {
        let s = format!("{}", ProductId::new());
        assert_eq!(s.len(), 36);
        assert!(s.contains('-'));
    }

    #[test]
    fn id_serializes_transparently() {
        let uuid = uuid::Uuid::new_v4();
        let id = FlashDropId::from_uuid(uuid);
        let Ok(json) = serde_json::to_string(&id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn user_id_rejects_blank_and_padded() {
        assert!(UserId::parse("").is_none());
        assert!(UserId::parse(" alice").is_none());
        assert!(UserId::parse(&"x".repeat(UserId::MAX_LEN + 1)).is_none());
        let Some(id) = UserId::parse("alice") else {
            panic!("valid id rejected");
        };
        assert_eq!(id.as_str(), "alice");
    }
}
