//! Flash drop aggregate and its ACTIVE → FROZEN → SOLD lifecycle.
//!
//! The `try_*` methods encode the guard of each conditional transition.
//! Stores apply them atomically (the in-memory store under its write lock,
//! PostgreSQL as the `WHERE` clause of a single `UPDATE`), so a transition
//! attempted from the wrong source state is rejected, never overwritten.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::price::{DecaySchedule, current_price};
use super::{FlashDropId, ProductId, UserId};
use crate::error::GatewayError;

/// Lifecycle state of a flash drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlashDropStatus {
    /// Price is decaying and the drop accepts claims.
    Active,
    /// One user holds the frozen price for the grace window.
    Frozen,
    /// Purchase confirmed by checkout. Terminal.
    Sold,
    /// Ended without a purchase. Terminal.
    Expired,
}

impl FlashDropStatus {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Frozen => "FROZEN",
            Self::Sold => "SOLD",
            Self::Expired => "EXPIRED",
        }
    }

    /// `true` for states no transition leaves.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Sold | Self::Expired)
    }

    /// Whether `self → next` is an edge of the lifecycle.
    ///
    /// `Frozen → Active` exists only for the reopen lapse policy.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Frozen)
                | (Self::Active, Self::Expired)
                | (Self::Frozen, Self::Sold)
                | (Self::Frozen, Self::Expired)
                | (Self::Frozen, Self::Active)
        )
    }
}

impl fmt::Display for FlashDropStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlashDropStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "FROZEN" => Ok(Self::Frozen),
            "SOLD" => Ok(Self::Sold),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(GatewayError::Internal(format!(
                "unknown flash drop status: {other}"
            ))),
        }
    }
}

/// What happens to a FROZEN drop whose grace window lapses unpaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LapsePolicy {
    /// FROZEN → EXPIRED. The drop is over.
    #[default]
    Expire,
    /// FROZEN → ACTIVE while the drop has not reached `ends_at`, so the
    /// competition restarts on the original decay curve.
    Reopen,
}

impl FromStr for LapsePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "expire" => Ok(Self::Expire),
            "reopen" => Ok(Self::Reopen),
            other => Err(format!("unknown lapse policy: {other}")),
        }
    }
}

/// The claim currently holding a drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeHold {
    /// The single user who won the claim.
    pub user_id: UserId,
    /// Instant the claim was accepted.
    pub frozen_at: DateTime<Utc>,
    /// Price captured atomically with the transition.
    pub frozen_price: i64,
}

/// Parameters for creating a flash drop.
#[derive(Debug, Clone)]
pub struct NewFlashDrop {
    /// Product being auctioned.
    pub product_id: ProductId,
    /// Price at start.
    pub starting_price: i64,
    /// Price floor.
    pub min_price: i64,
    /// Decrement per interval.
    pub price_decrement: i64,
    /// Interval length in seconds.
    pub interval_seconds: i64,
    /// Start instant; `None` starts immediately.
    pub starts_at: Option<DateTime<Utc>>,
    /// Overall end of the drop.
    pub ends_at: DateTime<Utc>,
    /// Purchase window after a claim, in seconds.
    pub grace_seconds: i64,
}

/// A time-decaying auction for a single unit of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashDrop {
    /// Identity.
    pub id: FlashDropId,
    /// External catalog reference.
    pub product_id: ProductId,
    /// Immutable decay parameters.
    pub schedule: DecaySchedule,
    /// Claims at or after this instant are refused.
    pub ends_at: DateTime<Utc>,
    /// Length of the FROZEN purchase window.
    pub grace_seconds: i64,
    /// Lifecycle state.
    pub status: FlashDropStatus,
    /// Present iff status is FROZEN or SOLD.
    pub hold: Option<FreezeHold>,
    /// Set on FROZEN → SOLD.
    pub sold_at: Option<DateTime<Utc>>,
    /// Audit timestamp of the last transition touching the price.
    pub last_price_update: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl FlashDrop {
    /// Validates `params` and builds an ACTIVE drop.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] on invalid prices, a
    /// non-positive interval or grace window, or `ends_at` not after the
    /// start.
    pub fn new(params: NewFlashDrop, now: DateTime<Utc>) -> Result<Self, GatewayError> {
        let started_at = params.starts_at.unwrap_or(now);
        let schedule = DecaySchedule {
            starting_price: params.starting_price,
            min_price: params.min_price,
            price_decrement: params.price_decrement,
            interval_seconds: params.interval_seconds,
            started_at,
        };
        schedule.validate()?;
        if params.ends_at <= started_at {
            return Err(GatewayError::InvalidRequest(
                "ends_at must be after the start".to_string(),
            ));
        }
        if params.grace_seconds <= 0 {
            return Err(GatewayError::InvalidRequest(
                "grace_seconds must be positive".to_string(),
            ));
        }
        Ok(Self {
            id: FlashDropId::new(),
            product_id: params.product_id,
            schedule,
            ends_at: params.ends_at,
            grace_seconds: params.grace_seconds,
            status: FlashDropStatus::Active,
            hold: None,
            sold_at: None,
            last_price_update: now,
            created_at: now,
        })
    }

    /// Price at `now`, recomputed from the schedule.
    #[must_use]
    pub fn current_price(&self, now: DateTime<Utc>) -> i64 {
        current_price(&self.schedule, now)
    }

    /// `true` once `now` reached the drop's end time.
    #[must_use]
    pub fn is_past_end(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }

    /// End of the purchase window of the current hold.
    #[must_use]
    pub fn grace_deadline(&self) -> Option<DateTime<Utc>> {
        let hold = self.hold.as_ref()?;
        hold.frozen_at
            .checked_add_signed(Duration::try_seconds(self.grace_seconds)?)
    }

    /// `true` if the drop is FROZEN and its purchase window has elapsed.
    #[must_use]
    pub fn is_freeze_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == FlashDropStatus::Frozen
            && self.grace_deadline().is_some_and(|deadline| now >= deadline)
    }

    /// User holding the drop, if any.
    #[must_use]
    pub fn holder(&self) -> Option<&UserId> {
        self.hold.as_ref().map(|h| &h.user_id)
    }

    /// ACTIVE → FROZEN, guarded by `status == ACTIVE && now < ends_at`.
    pub fn try_freeze(&mut self, user_id: &UserId, frozen_price: i64, now: DateTime<Utc>) -> bool {
        if self.status != FlashDropStatus::Active || self.is_past_end(now) {
            return false;
        }
        self.status = FlashDropStatus::Frozen;
        self.hold = Some(FreezeHold {
            user_id: user_id.clone(),
            frozen_at: now,
            frozen_price,
        });
        self.last_price_update = now;
        true
    }

    /// FROZEN → SOLD, guarded by holder identity and an open grace window.
    pub fn try_mark_sold(&mut self, buyer: &UserId, now: DateTime<Utc>) -> bool {
        if self.status != FlashDropStatus::Frozen
            || self.holder() != Some(buyer)
            || self.is_freeze_lapsed(now)
        {
            return false;
        }
        self.status = FlashDropStatus::Sold;
        self.sold_at = Some(now);
        true
    }

    /// ACTIVE → EXPIRED once `ends_at` has passed without a claim.
    pub fn try_expire_unclaimed(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != FlashDropStatus::Active || !self.is_past_end(now) {
            return false;
        }
        self.status = FlashDropStatus::Expired;
        true
    }

    /// Releases a lapsed FROZEN hold according to `policy`.
    ///
    /// The hold is cleared either way. Under [`LapsePolicy::Reopen`] the
    /// drop returns to ACTIVE unless it is already past `ends_at`.
    pub fn try_release_lapsed(&mut self, policy: LapsePolicy, now: DateTime<Utc>) -> bool {
        if !self.is_freeze_lapsed(now) {
            return false;
        }
        self.status = match policy {
            LapsePolicy::Reopen if !self.is_past_end(now) => FlashDropStatus::Active,
            _ => FlashDropStatus::Expired,
        };
        self.hold = None;
        self.last_price_update = now;
        true
    }
}
