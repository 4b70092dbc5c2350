//! In-process implementation of [`CoordinationStore`].
//!
//! Each table is a `HashMap` behind a [`tokio::sync::RwLock`]. Every
//! conditional write evaluates its guard and applies the transition while
//! holding the table's write lock, which gives the same all-or-nothing
//! behavior a row lock gives the PostgreSQL store. Meant for tests and for
//! single-process runs with persistence disabled.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CoordinationStore, ReleasedHold};
use crate::domain::{
    ClanBuy, ClanBuyId, CoordinationEvent, FlashDrop, FlashDropId, FlashDropStatus, JoinToken,
    LapsePolicy, UserId,
};
use crate::error::GatewayError;

/// Volatile store holding all state in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    flash_drops: RwLock<HashMap<FlashDropId, FlashDrop>>,
    clan_buys: RwLock<HashMap<JoinToken, ClanBuy>>,
    events: RwLock<Vec<CoordinationEvent>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit log, oldest first.
    pub async fn events(&self) -> Vec<CoordinationEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn insert_flash_drop(&self, drop: &FlashDrop) -> Result<(), GatewayError> {
        let mut map = self.flash_drops.write().await;
        if map.contains_key(&drop.id) {
            return Err(GatewayError::PersistenceError(format!(
                "flash drop {} already exists",
                drop.id
            )));
        }
        map.insert(drop.id, drop.clone());
        Ok(())
    }

    async fn flash_drop(&self, id: FlashDropId) -> Result<Option<FlashDrop>, GatewayError> {
        Ok(self.flash_drops.read().await.get(&id).cloned())
    }

    async fn current_flash_drop(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashDrop>, GatewayError> {
        let map = self.flash_drops.read().await;
        Ok(map
            .values()
            .filter(|d| d.schedule.started_at <= now)
            .filter(|d| match d.status {
                FlashDropStatus::Frozen => true,
                FlashDropStatus::Active => !d.is_past_end(now),
                FlashDropStatus::Sold | FlashDropStatus::Expired => false,
            })
            .max_by_key(|d| (d.schedule.started_at, d.id))
            .cloned())
    }

    async fn freeze_flash_drop(
        &self,
        id: FlashDropId,
        user_id: &UserId,
        frozen_price: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashDrop>, GatewayError> {
        let mut map = self.flash_drops.write().await;
        let Some(entry) = map.get_mut(&id) else {
            return Ok(None);
        };
        Ok(entry.try_freeze(user_id, frozen_price, now).then(|| entry.clone()))
    }

    async fn mark_flash_drop_sold(
        &self,
        id: FlashDropId,
        buyer: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashDrop>, GatewayError> {
        let mut map = self.flash_drops.write().await;
        let Some(entry) = map.get_mut(&id) else {
            return Ok(None);
        };
        Ok(entry.try_mark_sold(buyer, now).then(|| entry.clone()))
    }

    async fn expire_unclaimed_flash_drops(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<FlashDrop>, GatewayError> {
        let mut map = self.flash_drops.write().await;
        Ok(map
            .values_mut()
            .filter_map(|d| d.try_expire_unclaimed(now).then(|| d.clone()))
            .collect())
    }

    async fn release_lapsed_freezes(
        &self,
        policy: LapsePolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReleasedHold>, GatewayError> {
        let mut map = self.flash_drops.write().await;
        Ok(map
            .values_mut()
            .filter_map(|d| {
                let holder = d.holder().cloned()?;
                d.try_release_lapsed(policy, now).then(|| ReleasedHold {
                    drop: d.clone(),
                    lapsed_holder: holder,
                })
            })
            .collect())
    }

    async fn insert_clan_buy(&self, clan: &ClanBuy) -> Result<(), GatewayError> {
        let mut map = self.clan_buys.write().await;
        if map.contains_key(&clan.join_token) {
            return Err(GatewayError::PersistenceError(
                "join token already in use".to_string(),
            ));
        }
        map.insert(clan.join_token.clone(), clan.clone());
        Ok(())
    }

    async fn clan_buy(&self, token: &JoinToken) -> Result<Option<ClanBuy>, GatewayError> {
        Ok(self.clan_buys.read().await.get(token).cloned())
    }

    async fn join_clan_buy(
        &self,
        token: &JoinToken,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<ClanBuy>, GatewayError> {
        let mut map = self.clan_buys.write().await;
        let Some(entry) = map.get_mut(token) else {
            return Ok(None);
        };
        Ok(entry.try_join(user_id, now).then(|| entry.clone()))
    }

    async fn cancel_clan_buy(
        &self,
        token: &JoinToken,
        creator_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<ClanBuy>, GatewayError> {
        let mut map = self.clan_buys.write().await;
        let Some(entry) = map.get_mut(token) else {
            return Ok(None);
        };
        Ok(entry.try_cancel(creator_id, now).then(|| entry.clone()))
    }

    async fn expire_clan_buys(&self, now: DateTime<Utc>) -> Result<Vec<ClanBuyId>, GatewayError> {
        let mut map = self.clan_buys.write().await;
        Ok(map
            .values_mut()
            .filter_map(|c| c.try_expire(now).then_some(c.id))
            .collect())
    }

    async fn append_event(&self, event: &CoordinationEvent) -> Result<(), GatewayError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}
