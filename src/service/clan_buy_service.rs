//! Clan buy service: creation, joining, and cancellation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{
    ClanBuy, ClanBuyStatus, CoordinationEvent, EventBus, JoinToken, NewClanBuy, ProductId, UserId,
};
use crate::error::GatewayError;
use crate::persistence::CoordinationStore;

/// Request to start a clan buy. Omitted fields take the service defaults.
#[derive(Debug, Clone)]
pub struct CreateClanBuy {
    /// Product the group is buying.
    pub product_id: ProductId,
    /// Per-member price in minor units.
    pub clan_price: i64,
    /// Group size, creator included.
    pub required_count: Option<u32>,
    /// Join window in seconds.
    pub ttl_secs: Option<i64>,
}

/// Result of a join request.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Clan state after the request.
    pub clan_buy: ClanBuy,
    /// `true` if the caller was already on the roster and nothing changed.
    pub already_member: bool,
}

/// Orchestration layer for clan buys.
#[derive(Debug, Clone)]
pub struct ClanBuyService {
    store: Arc<dyn CoordinationStore>,
    event_bus: EventBus,
    default_required_count: u32,
    default_ttl_secs: i64,
}

impl ClanBuyService {
    /// Creates a new `ClanBuyService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        event_bus: EventBus,
        default_required_count: u32,
        default_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            event_bus,
            default_required_count,
            default_ttl_secs,
        }
    }

    /// Starts a WAITING clan with `creator_id` as its first member.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] on a non-positive price or
    /// window, or a group size out of range.
    pub async fn create(
        &self,
        request: CreateClanBuy,
        creator_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ClanBuy, GatewayError> {
        let ttl_secs = request.ttl_secs.unwrap_or(self.default_ttl_secs);
        let ttl = Duration::try_seconds(ttl_secs)
            .ok_or_else(|| GatewayError::InvalidRequest("ttl_secs out of range".to_string()))?;
        let clan = ClanBuy::new(
            NewClanBuy {
                product_id: request.product_id,
                clan_price: request.clan_price,
                creator_id,
                required_count: request
                    .required_count
                    .unwrap_or(self.default_required_count),
                ttl,
            },
            now,
        )?;
        self.store.insert_clan_buy(&clan).await?;

        let _ = self.event_bus.publish(CoordinationEvent::ClanBuyCreated {
            clan_buy_id: clan.id,
            creator_id: clan.creator_id.clone(),
            required_count: clan.required_count,
            timestamp: now,
        });
        tracing::info!(
            clan_buy_id = %clan.id,
            creator = %clan.creator_id,
            required_count = clan.required_count,
            expires_at = %clan.expires_at,
            "clan buy created"
        );
        Ok(clan)
    }

    /// Loads a clan and its roster.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ClanBuyNotFound`] for an unknown token.
    pub async fn get(&self, token: &JoinToken) -> Result<ClanBuy, GatewayError> {
        self.store
            .clan_buy(token)
            .await?
            .ok_or(GatewayError::ClanBuyNotFound)
    }

    /// Adds `user_id` to the clan, completing it if the last slot fills.
    ///
    /// Joining twice is not an error: the second call returns the current
    /// state with [`JoinOutcome::already_member`] set.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ClanBuyNotFound`] for an unknown token.
    /// - [`GatewayError::ClanBuyConflict`] if the clan is complete or
    ///   cancelled.
    /// - [`GatewayError::ClanBuyExpired`] if the deadline passed.
    pub async fn join(
        &self,
        token: &JoinToken,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, GatewayError> {
        if let Some(clan) = self.store.join_clan_buy(token, user_id, now).await? {
            self.publish_join(&clan, user_id, now);
            return Ok(JoinOutcome {
                clan_buy: clan,
                already_member: false,
            });
        }

        let clan = self.get(token).await?;
        if clan.is_member(user_id) {
            return Ok(JoinOutcome {
                clan_buy: clan,
                already_member: true,
            });
        }
        tracing::debug!(clan_buy_id = %clan.id, user = %user_id, status = %clan.status, "join rejected");
        Err(classify_join_failure(&clan, now))
    }

    /// Cancels a WAITING clan on behalf of its creator.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ClanBuyNotFound`] for an unknown token.
    /// - [`GatewayError::Forbidden`] if `user_id` did not create the clan.
    /// - [`GatewayError::ClanBuyConflict`] if the clan left WAITING.
    pub async fn cancel(
        &self,
        token: &JoinToken,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ClanBuy, GatewayError> {
        let Some(clan) = self.store.cancel_clan_buy(token, user_id, now).await? else {
            let clan = self.get(token).await?;
            if &clan.creator_id != user_id {
                return Err(GatewayError::Forbidden(
                    "only the creator can cancel a clan buy".to_string(),
                ));
            }
            return Err(GatewayError::ClanBuyConflict {
                status: clan.status,
            });
        };

        let _ = self.event_bus.publish(CoordinationEvent::ClanBuyClosed {
            clan_buy_id: clan.id,
            status: ClanBuyStatus::Cancelled,
            timestamp: now,
        });
        tracing::info!(clan_buy_id = %clan.id, "clan buy cancelled");
        Ok(clan)
    }

    fn publish_join(&self, clan: &ClanBuy, user_id: &UserId, now: DateTime<Utc>) {
        let member_count = clan.member_count();
        if clan.status == ClanBuyStatus::Complete {
            let _ = self.event_bus.publish(CoordinationEvent::ClanBuyCompleted {
                clan_buy_id: clan.id,
                user_id: user_id.clone(),
                member_count,
                timestamp: now,
            });
            tracing::info!(clan_buy_id = %clan.id, user = %user_id, member_count, "clan buy completed");
        } else {
            let _ = self.event_bus.publish(CoordinationEvent::ClanBuyJoined {
                clan_buy_id: clan.id,
                user_id: user_id.clone(),
                member_count,
                timestamp: now,
            });
            tracing::info!(clan_buy_id = %clan.id, user = %user_id, member_count, "clan buy joined");
        }
    }
}

fn classify_join_failure(clan: &ClanBuy, now: DateTime<Utc>) -> GatewayError {
    match clan.status {
        ClanBuyStatus::Expired => GatewayError::ClanBuyExpired,
        ClanBuyStatus::Waiting if clan.is_past_deadline(now) => GatewayError::ClanBuyExpired,
        status => GatewayError::ClanBuyConflict { status },
    }
}
