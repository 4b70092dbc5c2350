//! Clan buy DTOs for creation, reads, and joins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{ClanBuy, ClanBuyId, ClanBuyStatus, JoinToken, ProductId, UserId};

/// Request body for `POST /clan-buy/create`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateClanBuyRequest {
    /// Product the group is buying.
    pub product_id: ProductId,
    /// Per-member price in minor units.
    pub clan_price: i64,
    /// Group size including the creator (2 to 50). Defaults to the
    /// configured value.
    #[serde(default)]
    pub required_count: Option<u32>,
    /// Join window in seconds. Defaults to the configured value.
    #[serde(default)]
    pub ttl_secs: Option<i64>,
}

/// One roster entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClanMemberDto {
    /// Member identity.
    pub user_id: UserId,
    /// Admission instant.
    pub joined_at: DateTime<Utc>,
}

/// Clan buy state with its roster in join order.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClanBuyResponse {
    /// Clan identifier.
    pub clan_buy_id: ClanBuyId,
    /// Shareable handle for joining.
    pub join_token: JoinToken,
    /// Product the group is buying.
    pub product_id: ProductId,
    /// Creator identity.
    pub creator_id: UserId,
    /// Lifecycle status.
    pub status: ClanBuyStatus,
    /// Group size needed.
    pub required_count: u32,
    /// Current roster size.
    pub member_count: u32,
    /// Per-member price in minor units.
    pub clan_price: i64,
    /// Roster, earliest first.
    pub members: Vec<ClanMemberDto>,
    /// Join deadline.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Expiry or cancellation timestamp.
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<ClanBuy> for ClanBuyResponse {
    fn from(clan: ClanBuy) -> Self {
        let member_count = clan.member_count();
        Self {
            clan_buy_id: clan.id,
            join_token: clan.join_token,
            product_id: clan.product_id,
            creator_id: clan.creator_id,
            status: clan.status,
            required_count: clan.required_count,
            member_count,
            clan_price: clan.clan_price,
            members: clan
                .members
                .into_iter()
                .map(|m| ClanMemberDto {
                    user_id: m.user_id,
                    joined_at: m.joined_at,
                })
                .collect(),
            expires_at: clan.expires_at,
            created_at: clan.created_at,
            completed_at: clan.completed_at,
            closed_at: clan.closed_at,
        }
    }
}

/// Response body for `POST /clan-buy/{join_token}/join`.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinClanBuyResponse {
    /// Clan state after the join.
    #[serde(flatten)]
    pub clan_buy: ClanBuyResponse,
    /// `true` if the caller was already a member and nothing changed.
    pub already_member: bool,
}
