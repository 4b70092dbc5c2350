//! Database rows and their conversion into domain aggregates.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::{
    ClanBuy, ClanBuyId, ClanMember, DecaySchedule, FlashDrop, FlashDropId, FreezeHold, JoinToken,
    ProductId, UserId,
};
use super::ReleasedHold;
use crate::error::GatewayError;

/// A row of the `flash_drops` table.
#[derive(Debug, Clone, FromRow)]
pub struct FlashDropRow {
    /// Primary key.
    pub id: Uuid,
    /// Product reference.
    pub product_id: Uuid,
    /// Opening price.
    pub starting_price: i64,
    /// Price floor.
    pub min_price: i64,
    /// Decrement per interval.
    pub price_decrement: i64,
    /// Interval length in seconds.
    pub interval_seconds: i64,
    /// Decay start.
    pub started_at: DateTime<Utc>,
    /// Drop end.
    pub ends_at: DateTime<Utc>,
    /// Purchase window in seconds.
    pub grace_seconds: i64,
    /// Status text.
    pub status: String,
    /// Holder, if frozen or sold.
    pub frozen_by_user_id: Option<String>,
    /// Claim instant.
    pub frozen_at: Option<DateTime<Utc>>,
    /// Captured price.
    pub frozen_price: Option<i64>,
    /// Sale instant.
    pub sold_at: Option<DateTime<Utc>>,
    /// Audit timestamp.
    pub last_price_update: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<FlashDropRow> for FlashDrop {
    type Error = GatewayError;

    fn try_from(row: FlashDropRow) -> Result<Self, Self::Error> {
        let hold = match (row.frozen_by_user_id, row.frozen_at, row.frozen_price) {
            (Some(user), Some(frozen_at), Some(frozen_price)) => Some(FreezeHold {
                user_id: parse_user(&user)?,
                frozen_at,
                frozen_price,
            }),
            (None, None, None) => None,
            _ => {
                return Err(GatewayError::Internal(format!(
                    "flash drop {} has a partial hold",
                    row.id
                )));
            }
        };
        Ok(Self {
            id: FlashDropId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            schedule: DecaySchedule {
                starting_price: row.starting_price,
                min_price: row.min_price,
                price_decrement: row.price_decrement,
                interval_seconds: row.interval_seconds,
                started_at: row.started_at,
            },
            ends_at: row.ends_at,
            grace_seconds: row.grace_seconds,
            status: row.status.parse()?,
            hold,
            sold_at: row.sold_at,
            last_price_update: row.last_price_update,
            created_at: row.created_at,
        })
    }
}

/// A released flash drop together with the holder captured before release.
#[derive(Debug, Clone, FromRow)]
pub struct ReleasedHoldRow {
    /// The drop after release.
    #[sqlx(flatten)]
    pub drop: FlashDropRow,
    /// Holder whose window lapsed.
    pub lapsed_holder: String,
}

impl ReleasedHoldRow {
    /// Converts into the domain pair.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if stored values are malformed.
    pub fn into_domain(self) -> Result<ReleasedHold, GatewayError> {
        Ok(ReleasedHold {
            drop: FlashDrop::try_from(self.drop)?,
            lapsed_holder: parse_user(&self.lapsed_holder)?,
        })
    }
}

/// A row of the `clan_buys` table with its roster aggregated into the same
/// statement, so both come from one snapshot.
#[derive(Debug, Clone, FromRow)]
pub struct ClanBuyRow {
    /// Primary key.
    pub id: Uuid,
    /// Product reference.
    pub product_id: Uuid,
    /// Creator identity.
    pub creator_id: String,
    /// Shareable handle.
    pub join_token: String,
    /// Status text.
    pub status: String,
    /// Group size needed.
    pub required_count: i32,
    /// Denormalized roster size.
    pub member_count: i32,
    /// Per-member price.
    pub clan_price: i64,
    /// Join deadline.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Expiry or cancellation timestamp.
    pub closed_at: Option<DateTime<Utc>>,
    /// Roster ordered by join time.
    pub members: Json<Vec<ClanMemberRow>>,
}

/// An entry of the `clan_buy_members` table, as aggregated into
/// [`ClanBuyRow::members`].
#[derive(Debug, Clone, Deserialize)]
pub struct ClanMemberRow {
    /// Member identity.
    pub user_id: String,
    /// Admission instant.
    pub joined_at: DateTime<Utc>,
}

impl ClanBuyRow {
    /// Converts the row and its roster into a [`ClanBuy`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if stored values are malformed or
    /// the roster disagrees with `member_count`.
    pub fn into_domain(self) -> Result<ClanBuy, GatewayError> {
        let Json(members) = self.members;
        if usize::try_from(self.member_count).ok() != Some(members.len()) {
            return Err(GatewayError::Internal(format!(
                "clan buy {} roster has {} rows but member_count is {}",
                self.id,
                members.len(),
                self.member_count
            )));
        }
        let members = members
            .into_iter()
            .map(|m| {
                Ok(ClanMember {
                    user_id: parse_user(&m.user_id)?,
                    joined_at: m.joined_at,
                })
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;
        let join_token = JoinToken::parse(&self.join_token).ok_or_else(|| {
            GatewayError::Internal(format!("clan buy {} has a malformed token", self.id))
        })?;
        let required_count = u32::try_from(self.required_count).map_err(|_| {
            GatewayError::Internal(format!("clan buy {} has a negative size", self.id))
        })?;

        Ok(ClanBuy {
            id: ClanBuyId::from_uuid(self.id),
            product_id: ProductId::from_uuid(self.product_id),
            creator_id: parse_user(&self.creator_id)?,
            join_token,
            status: self.status.parse()?,
            required_count,
            clan_price: self.clan_price,
            members,
            expires_at: self.expires_at,
            created_at: self.created_at,
            completed_at: self.completed_at,
            closed_at: self.closed_at,
        })
    }
}

/// A row of the `coordination_events` table.
#[derive(Debug, Clone, FromRow)]
pub struct StoredEvent {
    /// Auto-increment row ID.
    pub id: i64,
    /// Aggregate the event is about.
    pub subject_id: Uuid,
    /// Event type discriminator (e.g. `"flash_drop_frozen"`).
    pub event_type: String,
    /// JSONB payload with the serialized event.
    pub payload: serde_json::Value,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
}

fn parse_user(raw: &str) -> Result<UserId, GatewayError> {
    UserId::parse(raw).ok_or_else(|| GatewayError::Internal(format!("malformed user id: {raw:?}")))
}
