//! Clan buy aggregate: a threshold group purchase shared by join token.
//!
//! A clan buy waits until `required_count` distinct users have joined and
//! then completes in the same step that admits the last member, so the
//! roster never reaches the threshold while the status still reads
//! WAITING.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ClanBuyId, ProductId, UserId};
use crate::error::GatewayError;

/// Smallest accepted group size. The creator alone is never a clan.
pub const MIN_REQUIRED_COUNT: u32 = 2;

/// Largest accepted group size.
pub const MAX_REQUIRED_COUNT: u32 = 50;

/// Entropy of a join token in bytes.
const JOIN_TOKEN_BYTES: usize = 32;

/// Lifecycle state of a clan buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClanBuyStatus {
    /// Collecting members.
    Waiting,
    /// Threshold reached. Terminal.
    Complete,
    /// Deadline passed before the threshold. Terminal.
    Expired,
    /// Withdrawn by the creator. Terminal.
    Cancelled,
}

impl ClanBuyStatus {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Complete => "COMPLETE",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// `true` for every state except WAITING.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

impl fmt::Display for ClanBuyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClanBuyStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(Self::Waiting),
            "COMPLETE" => Ok(Self::Complete),
            "EXPIRED" => Ok(Self::Expired),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(GatewayError::Internal(format!(
                "unknown clan buy status: {other}"
            ))),
        }
    }
}

/// Unguessable shareable handle of a clan buy.
///
/// 32 bytes from the OS CSPRNG, base64url without padding (43 chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JoinToken(String);

impl JoinToken {
    /// Generates a fresh token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; JOIN_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Accepts a client-supplied token if it is well-formed.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let decoded = URL_SAFE_NO_PAD.decode(raw).ok()?;
        (decoded.len() == JOIN_TOKEN_BYTES).then(|| Self(raw.to_string()))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JoinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanMember {
    /// Member identity.
    pub user_id: UserId,
    /// Instant the member was admitted.
    pub joined_at: DateTime<Utc>,
}

/// Parameters for starting a clan buy.
#[derive(Debug, Clone)]
pub struct NewClanBuy {
    /// Product bought as a group.
    pub product_id: ProductId,
    /// Discounted per-member price in minor units.
    pub clan_price: i64,
    /// User starting the clan; becomes the first member.
    pub creator_id: UserId,
    /// Group size that completes the clan.
    pub required_count: u32,
    /// Time to live from creation.
    pub ttl: Duration,
}

/// A threshold group purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanBuy {
    /// Identity.
    pub id: ClanBuyId,
    /// External catalog reference.
    pub product_id: ProductId,
    /// Creator, also the first member.
    pub creator_id: UserId,
    /// Shareable handle.
    pub join_token: JoinToken,
    /// Lifecycle state.
    pub status: ClanBuyStatus,
    /// Group size that completes the clan.
    pub required_count: u32,
    /// Per-member price in minor units.
    pub clan_price: i64,
    /// Distinct members ordered by join time.
    pub members: Vec<ClanMember>,
    /// Join deadline.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set on WAITING → COMPLETE.
    pub completed_at: Option<DateTime<Utc>>,
    /// Set on WAITING → EXPIRED or CANCELLED.
    pub closed_at: Option<DateTime<Utc>>,
}

impl ClanBuy {
    /// Validates `params` and seeds a WAITING clan with its creator.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] on a non-positive price or
    /// time to live, or a group size outside
    /// [`MIN_REQUIRED_COUNT`]`..=`[`MAX_REQUIRED_COUNT`].
    pub fn new(params: NewClanBuy, now: DateTime<Utc>) -> Result<Self, GatewayError> {
        if params.clan_price <= 0 {
            return Err(GatewayError::InvalidRequest(
                "clan_price must be positive".to_string(),
            ));
        }
        if !(MIN_REQUIRED_COUNT..=MAX_REQUIRED_COUNT).contains(&params.required_count) {
            return Err(GatewayError::InvalidRequest(format!(
                "required_count must be between {MIN_REQUIRED_COUNT} and {MAX_REQUIRED_COUNT}"
            )));
        }
        if params.ttl <= Duration::zero() {
            return Err(GatewayError::InvalidRequest(
                "ttl must be positive".to_string(),
            ));
        }
        let expires_at = now
            .checked_add_signed(params.ttl)
            .ok_or_else(|| GatewayError::InvalidRequest("ttl out of range".to_string()))?;

        Ok(Self {
            id: ClanBuyId::new(),
            product_id: params.product_id,
            creator_id: params.creator_id.clone(),
            join_token: JoinToken::generate(),
            status: ClanBuyStatus::Waiting,
            required_count: params.required_count,
            clan_price: params.clan_price,
            members: vec![ClanMember {
                user_id: params.creator_id,
                joined_at: now,
            }],
            expires_at,
            created_at: now,
            completed_at: None,
            closed_at: None,
        })
    }

    /// Roster size.
    #[must_use]
    pub fn member_count(&self) -> u32 {
        u32::try_from(self.members.len()).unwrap_or(u32::MAX)
    }

    /// `true` if `user_id` is on the roster.
    #[must_use]
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.members.iter().any(|m| &m.user_id == user_id)
    }

    /// `true` once `now` reached the join deadline.
    #[must_use]
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Admits `user_id`, completing the clan if this fills the last slot.
    ///
    /// Guarded by `status == WAITING`, `now < expires_at`, a free slot, and
    /// `user_id` not already on the roster.
    pub fn try_join(&mut self, user_id: &UserId, now: DateTime<Utc>) -> bool {
        if self.status != ClanBuyStatus::Waiting
            || self.is_past_deadline(now)
            || self.member_count() >= self.required_count
            || self.is_member(user_id)
        {
            return false;
        }
        self.members.push(ClanMember {
            user_id: user_id.clone(),
            joined_at: now,
        });
        if self.member_count() >= self.required_count {
            self.status = ClanBuyStatus::Complete;
            self.completed_at = Some(now);
        }
        true
    }

    /// WAITING → CANCELLED, only for the creator.
    pub fn try_cancel(&mut self, creator_id: &UserId, now: DateTime<Utc>) -> bool {
        if self.status != ClanBuyStatus::Waiting || &self.creator_id != creator_id {
            return false;
        }
        self.status = ClanBuyStatus::Cancelled;
        self.closed_at = Some(now);
        true
    }

    /// WAITING → EXPIRED once the deadline has passed.
    pub fn try_expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != ClanBuyStatus::Waiting || !self.is_past_deadline(now) {
            return false;
        }
        self.status = ClanBuyStatus::Expired;
        self.closed_at = Some(now);
        true
    }
}
