//! Domain events reflecting committed state transitions.
//!
//! Every successful transition publishes a [`CoordinationEvent`] through
//! the [`super::EventBus`]. Events are emitted after the conditional write
//! has committed and are informational only: nothing decides a claim or a
//! join from them. The audit task appends them to the event log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ClanBuyId, ClanBuyStatus, FlashDropId, ProductId, UserId};

/// Domain event emitted after every committed transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CoordinationEvent {
    /// A flash drop was scheduled.
    FlashDropCreated {
        /// Drop identifier.
        flash_drop_id: FlashDropId,
        /// Product on sale.
        product_id: ProductId,
        /// Opening price.
        starting_price: i64,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A user won the claim race.
    FlashDropFrozen {
        /// Drop identifier.
        flash_drop_id: FlashDropId,
        /// Winning user.
        user_id: UserId,
        /// Captured price.
        frozen_price: i64,
        /// Claim timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Checkout confirmed the purchase.
    FlashDropSold {
        /// Drop identifier.
        flash_drop_id: FlashDropId,
        /// Buyer.
        user_id: UserId,
        /// Price paid.
        price: i64,
        /// Confirmation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The drop ended without a sale.
    FlashDropExpired {
        /// Drop identifier.
        flash_drop_id: FlashDropId,
        /// Holder whose purchase window lapsed, if the drop was frozen.
        lapsed_holder: Option<UserId>,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A lapsed hold was released and the drop accepts claims again.
    FlashDropReopened {
        /// Drop identifier.
        flash_drop_id: FlashDropId,
        /// Holder whose purchase window lapsed.
        lapsed_holder: Option<UserId>,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A clan buy was started.
    ClanBuyCreated {
        /// Clan identifier.
        clan_buy_id: ClanBuyId,
        /// Creator.
        creator_id: UserId,
        /// Group size needed.
        required_count: u32,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A member was admitted without completing the clan.
    ClanBuyJoined {
        /// Clan identifier.
        clan_buy_id: ClanBuyId,
        /// New member.
        user_id: UserId,
        /// Roster size after the join.
        member_count: u32,
        /// Join timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The last slot was filled.
    ClanBuyCompleted {
        /// Clan identifier.
        clan_buy_id: ClanBuyId,
        /// Member who filled the last slot.
        user_id: UserId,
        /// Final roster size.
        member_count: u32,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The clan left WAITING without completing.
    ClanBuyClosed {
        /// Clan identifier.
        clan_buy_id: ClanBuyId,
        /// EXPIRED or CANCELLED.
        status: ClanBuyStatus,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl CoordinationEvent {
    /// Identifier of the aggregate the event is about.
    #[must_use]
    pub fn subject_id(&self) -> uuid::Uuid {
        match self {
            Self::FlashDropCreated { flash_drop_id, .. }
            | Self::FlashDropFrozen { flash_drop_id, .. }
            | Self::FlashDropSold { flash_drop_id, .. }
            | Self::FlashDropExpired { flash_drop_id, .. }
            | Self::FlashDropReopened { flash_drop_id, .. } => *flash_drop_id.as_uuid(),
            Self::ClanBuyCreated { clan_buy_id, .. }
            | Self::ClanBuyJoined { clan_buy_id, .. }
            | Self::ClanBuyCompleted { clan_buy_id, .. }
            | Self::ClanBuyClosed { clan_buy_id, .. } => *clan_buy_id.as_uuid(),
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::FlashDropCreated { .. } => "flash_drop_created",
            Self::FlashDropFrozen { .. } => "flash_drop_frozen",
            Self::FlashDropSold { .. } => "flash_drop_sold",
            Self::FlashDropExpired { .. } => "flash_drop_expired",
            Self::FlashDropReopened { .. } => "flash_drop_reopened",
            Self::ClanBuyCreated { .. } => "clan_buy_created",
            Self::ClanBuyJoined { .. } => "clan_buy_joined",
            Self::ClanBuyCompleted { .. } => "clan_buy_completed",
            Self::ClanBuyClosed { .. } => "clan_buy_closed",
        }
    }
}
