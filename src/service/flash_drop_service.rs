//! Flash drop service: creation, the claim race, and purchase confirmation.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    CoordinationEvent, EventBus, FlashDrop, FlashDropId, FlashDropStatus, NewFlashDrop, UserId,
};
use crate::error::GatewayError;
use crate::persistence::CoordinationStore;

/// Orchestration layer for flash drops.
///
/// Stateless coordinator: every outcome is decided by a conditional write
/// on the [`CoordinationStore`]. Reads before a write only pick the error
/// to report, and a write that matches no row is re-read to classify why.
#[derive(Debug, Clone)]
pub struct FlashDropService {
    store: Arc<dyn CoordinationStore>,
    event_bus: EventBus,
    default_grace_seconds: i64,
}

impl FlashDropService {
    /// Creates a new `FlashDropService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        event_bus: EventBus,
        default_grace_seconds: i64,
    ) -> Self {
        Self {
            store,
            event_bus,
            default_grace_seconds,
        }
    }

    /// Purchase window applied when a creation request omits one.
    #[must_use]
    pub const fn default_grace_seconds(&self) -> i64 {
        self.default_grace_seconds
    }

    /// Validates and persists a new ACTIVE drop.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the parameters are
    /// invalid, or [`GatewayError::PersistenceError`] on storage failure.
    pub async fn create(
        &self,
        params: NewFlashDrop,
        now: DateTime<Utc>,
    ) -> Result<FlashDrop, GatewayError> {
        let drop = FlashDrop::new(params, now)?;
        self.store.insert_flash_drop(&drop).await?;

        let _ = self.event_bus.publish(CoordinationEvent::FlashDropCreated {
            flash_drop_id: drop.id,
            product_id: drop.product_id,
            starting_price: drop.schedule.starting_price,
            timestamp: now,
        });
        tracing::info!(
            flash_drop_id = %drop.id,
            product_id = %drop.product_id,
            starts_at = %drop.schedule.started_at,
            ends_at = %drop.ends_at,
            "flash drop created"
        );
        Ok(drop)
    }

    /// Loads a drop by ID.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::FlashDropNotFound`] if no such drop exists.
    pub async fn get(&self, id: FlashDropId) -> Result<FlashDrop, GatewayError> {
        self.store
            .flash_drop(id)
            .await?
            .ok_or_else(|| GatewayError::FlashDropNotFound(*id.as_uuid()))
    }

    /// The drop currently on sale: the latest started one that is FROZEN,
    /// or ACTIVE and before its end.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NoActiveFlashDrop`] if nothing is running.
    pub async fn current(&self, now: DateTime<Utc>) -> Result<FlashDrop, GatewayError> {
        self.store
            .current_flash_drop(now)
            .await?
            .ok_or(GatewayError::NoActiveFlashDrop)
    }

    /// Freezes the drop at its current price for `user_id`.
    ///
    /// At most one caller wins; everyone else gets a conflict carrying the
    /// status the drop is in now.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::FlashDropNotFound`] if the drop does not exist.
    /// - [`GatewayError::FlashDropConflict`] if it is no longer ACTIVE.
    /// - [`GatewayError::FlashDropExpired`] if its end time has passed.
    /// - [`GatewayError::InvalidRequest`] if it has not started yet.
    pub async fn claim(
        &self,
        id: FlashDropId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<FlashDrop, GatewayError> {
        let drop = self.get(id).await?;
        check_claimable(&drop, user_id, now)?;
        if now < drop.schedule.started_at {
            return Err(GatewayError::InvalidRequest(
                "flash drop has not started".to_string(),
            ));
        }

        let price = drop.current_price(now);
        let Some(frozen) = self
            .store
            .freeze_flash_drop(id, user_id, price, now)
            .await?
        else {
            tracing::debug!(flash_drop_id = %id, user = %user_id, "claim lost the race");
            return Err(self.classify_claim_failure(id, user_id, now).await);
        };

        let _ = self.event_bus.publish(CoordinationEvent::FlashDropFrozen {
            flash_drop_id: id,
            user_id: user_id.clone(),
            frozen_price: price,
            timestamp: now,
        });
        tracing::info!(flash_drop_id = %id, user = %user_id, frozen_price = price, "flash drop frozen");
        Ok(frozen)
    }

    /// Claims whichever drop [`Self::current`] returns.
    ///
    /// # Errors
    ///
    /// As [`Self::current`] and [`Self::claim`].
    pub async fn claim_current(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<FlashDrop, GatewayError> {
        let current = self.current(now).await?;
        self.claim(current.id, user_id, now).await
    }

    /// Records the purchase of a FROZEN drop by its holder.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::FlashDropNotFound`] if the drop does not exist.
    /// - [`GatewayError::FlashDropConflict`] if it is not FROZEN or
    ///   `buyer` is not the holder.
    /// - [`GatewayError::FlashDropExpired`] if the purchase window lapsed.
    pub async fn confirm_sale(
        &self,
        id: FlashDropId,
        buyer: &UserId,
        now: DateTime<Utc>,
    ) -> Result<FlashDrop, GatewayError> {
        let Some(sold) = self.store.mark_flash_drop_sold(id, buyer, now).await? else {
            let drop = self.get(id).await?;
            return Err(classify_sale_failure(&drop, buyer, now));
        };

        let Some(price) = sold.hold.as_ref().map(|h| h.frozen_price) else {
            return Err(GatewayError::Internal(format!(
                "flash drop {id} sold without a hold"
            )));
        };
        let _ = self.event_bus.publish(CoordinationEvent::FlashDropSold {
            flash_drop_id: id,
            user_id: buyer.clone(),
            price,
            timestamp: now,
        });
        tracing::info!(flash_drop_id = %id, user = %buyer, price, "flash drop sold");
        Ok(sold)
    }

    async fn classify_claim_failure(
        &self,
        id: FlashDropId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> GatewayError {
        let drop = match self.get(id).await {
            Ok(drop) => drop,
            Err(e) => return e,
        };
        match check_claimable(&drop, user_id, now) {
            Err(e) => e,
            // Released and reopened between our write and this read.
            Ok(()) => GatewayError::FlashDropConflict {
                status: drop.status,
                held_by_caller: false,
            },
        }
    }
}

fn check_claimable(drop: &FlashDrop, user_id: &UserId, now: DateTime<Utc>) -> Result<(), GatewayError> {
    if drop.status != FlashDropStatus::Active {
        return Err(GatewayError::FlashDropConflict {
            status: drop.status,
            held_by_caller: drop.holder() == Some(user_id),
        });
    }
    if drop.is_past_end(now) {
        return Err(GatewayError::FlashDropExpired);
    }
    Ok(())
}

fn classify_sale_failure(drop: &FlashDrop, buyer: &UserId, now: DateTime<Utc>) -> GatewayError {
    if drop.status != FlashDropStatus::Frozen || drop.holder() != Some(buyer) {
        return GatewayError::FlashDropConflict {
            status: drop.status,
            held_by_caller: drop.holder() == Some(buyer),
        };
    }
    if drop.is_freeze_lapsed(now) {
        return GatewayError::FlashDropExpired;
    }
    GatewayError::FlashDropConflict {
        status: drop.status,
        held_by_caller: true,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ClanBuy, ClanBuyId, JoinToken, LapsePolicy, ProductId};
    use crate::persistence::{MemoryStore, ReleasedHold};
    use chrono::Duration;

    fn user(name: &str) -> UserId {
        let Some(id) = UserId::parse(name) else {
            panic!("invalid user id");
        };
        id
    }

    fn params(now: DateTime<Utc>) -> NewFlashDrop {
        NewFlashDrop {
            product_id: ProductId::new(),
            starting_price: 100,
            min_price: 20,
            price_decrement: 10,
            interval_seconds: 10,
            starts_at: Some(now),
            ends_at: now + Duration::seconds(600),
            grace_seconds: 60,
        }
    }

    fn make_service() -> (FlashDropService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service =
            FlashDropService::new(Arc::<MemoryStore>::clone(&store), EventBus::new(64), 300);
        (service, store)
    }

    async fn seeded(now: DateTime<Utc>) -> (FlashDropService, Arc<MemoryStore>, FlashDrop) {
        let (service, store) = make_service();
        let Ok(drop) = service.create(params(now), now).await else {
            panic!("create failed");
        };
        (service, store, drop)
    }

    #[tokio::test]
    async fn claim_freezes_at_decayed_price() {
        let start = Utc::now();
        let (service, _, drop) = seeded(start).await;

        let at = start + Duration::seconds(25);
        let Ok(frozen) = service.claim(drop.id, &user("alice"), at).await else {
            panic!("claim failed");
        };
        assert_eq!(frozen.status, FlashDropStatus::Frozen);
        let Some(hold) = frozen.hold else {
            panic!("frozen drop has no hold");
        };
        assert_eq!(hold.frozen_price, 80);
        assert_eq!(hold.user_id, user("alice"));
        assert_eq!(hold.frozen_at, at);
    }

    #[tokio::test]
    async fn concurrent_claims_have_exactly_one_winner() {
        let now = Utc::now();
        let (service, store, drop) = seeded(now).await;
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for i in 0..32 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                let who = user(&format!("user-{i}"));
                (who.clone(), service.claim(drop.id, &who, now).await)
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            let Ok((who, result)) = handle.await else {
                panic!("task panicked");
            };
            match result {
                Ok(_) => winners.push(who),
                Err(GatewayError::FlashDropConflict { status, .. }) => {
                    assert_eq!(status, FlashDropStatus::Frozen);
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners.len(), 1);

        let Ok(Some(stored)) = store.flash_drop(drop.id).await else {
            panic!("drop vanished");
        };
        assert_eq!(stored.holder(), winners.first());
    }

    #[tokio::test]
    async fn holder_sees_conflict_flagged_as_theirs() {
        let now = Utc::now();
        let (service, _, drop) = seeded(now).await;
        let _ = service.claim(drop.id, &user("alice"), now).await;

        let Err(GatewayError::FlashDropConflict {
            held_by_caller, ..
        }) = service.claim(drop.id, &user("alice"), now).await
        else {
            panic!("expected conflict");
        };
        assert!(held_by_caller);
    }

    #[tokio::test]
    async fn claim_after_end_is_expired_and_writes_nothing() {
        let now = Utc::now();
        let (service, store, drop) = seeded(now).await;

        let late = drop.ends_at;
        let result = service.claim(drop.id, &user("bob"), late).await;
        assert!(matches!(result, Err(GatewayError::FlashDropExpired)));

        let Ok(Some(stored)) = store.flash_drop(drop.id).await else {
            panic!("drop vanished");
        };
        assert_eq!(stored, drop);
    }

    #[tokio::test]
    async fn unknown_drop_is_not_found() {
        let (service, _) = make_service();
        let result = service
            .claim(FlashDropId::new(), &user("bob"), Utc::now())
            .await;
        assert!(matches!(result, Err(GatewayError::FlashDropNotFound(_))));
    }

    #[tokio::test]
    async fn invalid_params_create_nothing() {
        let now = Utc::now();
        let (service, store) = make_service();
        let mut bad = params(now);
        bad.min_price = 500;
        assert!(matches!(
            service.create(bad, now).await,
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(store.current_flash_drop(now).await, Ok(None)));
    }

    #[tokio::test]
    async fn claim_current_without_drop_is_not_found() {
        let (service, _) = make_service();
        let result = service.claim_current(&user("bob"), Utc::now()).await;
        assert!(matches!(result, Err(GatewayError::NoActiveFlashDrop)));
    }

    #[tokio::test]
    async fn sale_needs_holder_within_window() {
        let now = Utc::now();
        let (service, _, drop) = seeded(now).await;
        let _ = service.claim(drop.id, &user("alice"), now).await;

        let stranger = service.confirm_sale(drop.id, &user("bob"), now).await;
        assert!(matches!(
            stranger,
            Err(GatewayError::FlashDropConflict {
                held_by_caller: false,
                ..
            })
        ));

        let lapsed = service
            .confirm_sale(drop.id, &user("alice"), now + Duration::seconds(60))
            .await;
        assert!(matches!(lapsed, Err(GatewayError::FlashDropExpired)));

        let Ok(sold) = service
            .confirm_sale(drop.id, &user("alice"), now + Duration::seconds(59))
            .await
        else {
            panic!("sale failed");
        };
        assert_eq!(sold.status, FlashDropStatus::Sold);

        let again = service.confirm_sale(drop.id, &user("alice"), now).await;
        assert!(matches!(
            again,
            Err(GatewayError::FlashDropConflict {
                status: FlashDropStatus::Sold,
                held_by_caller: true,
            })
        ));
    }

    /// Delegates to [`MemoryStore`] but reports sales with the hold missing.
    #[derive(Debug, Default)]
    struct HoldlessSales(MemoryStore);

    #[async_trait::async_trait]
    impl CoordinationStore for HoldlessSales {
        async fn insert_flash_drop(&self, drop: &FlashDrop) -> Result<(), GatewayError> {
            self.0.insert_flash_drop(drop).await
        }

        async fn flash_drop(&self, id: FlashDropId) -> Result<Option<FlashDrop>, GatewayError> {
            self.0.flash_drop(id).await
        }

        async fn current_flash_drop(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Option<FlashDrop>, GatewayError> {
            self.0.current_flash_drop(now).await
        }

        async fn freeze_flash_drop(
            &self,
            id: FlashDropId,
            user_id: &UserId,
            frozen_price: i64,
            now: DateTime<Utc>,
        ) -> Result<Option<FlashDrop>, GatewayError> {
            self.0.freeze_flash_drop(id, user_id, frozen_price, now).await
        }

        async fn mark_flash_drop_sold(
            &self,
            id: FlashDropId,
            buyer: &UserId,
            now: DateTime<Utc>,
        ) -> Result<Option<FlashDrop>, GatewayError> {
            let sold = self.0.mark_flash_drop_sold(id, buyer, now).await?;
            Ok(sold.map(|mut d| {
                d.hold = None;
                d
            }))
        }

        async fn expire_unclaimed_flash_drops(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<FlashDrop>, GatewayError> {
            self.0.expire_unclaimed_flash_drops(now).await
        }

        async fn release_lapsed_freezes(
            &self,
            policy: LapsePolicy,
            now: DateTime<Utc>,
        ) -> Result<Vec<ReleasedHold>, GatewayError> {
            self.0.release_lapsed_freezes(policy, now).await
        }

        async fn insert_clan_buy(&self, clan: &ClanBuy) -> Result<(), GatewayError> {
            self.0.insert_clan_buy(clan).await
        }

        async fn clan_buy(&self, token: &JoinToken) -> Result<Option<ClanBuy>, GatewayError> {
            self.0.clan_buy(token).await
        }

        async fn join_clan_buy(
            &self,
            token: &JoinToken,
            user_id: &UserId,
            now: DateTime<Utc>,
        ) -> Result<Option<ClanBuy>, GatewayError> {
            self.0.join_clan_buy(token, user_id, now).await
        }

        async fn cancel_clan_buy(
            &self,
            token: &JoinToken,
            creator_id: &UserId,
            now: DateTime<Utc>,
        ) -> Result<Option<ClanBuy>, GatewayError> {
            self.0.cancel_clan_buy(token, creator_id, now).await
        }

        async fn expire_clan_buys(&self, now: DateTime<Utc>) -> Result<Vec<ClanBuyId>, GatewayError> {
            self.0.expire_clan_buys(now).await
        }

        async fn append_event(&self, event: &CoordinationEvent) -> Result<(), GatewayError> {
            self.0.append_event(event).await
        }
    }

    #[tokio::test]
    async fn sale_without_hold_is_internal_error_and_publishes_nothing() {
        let now = Utc::now();
        let bus = EventBus::new(16);
        let service = FlashDropService::new(Arc::new(HoldlessSales::default()), bus.clone(), 300);
        let Ok(drop) = service.create(params(now), now).await else {
            panic!("create failed");
        };
        let _ = service.claim(drop.id, &user("alice"), now).await;

        let mut rx = bus.subscribe();
        let sold = service.confirm_sale(drop.id, &user("alice"), now).await;
        assert!(matches!(sold, Err(GatewayError::Internal(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn successful_claim_publishes_event() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let service = FlashDropService::new(store, bus, 300);
        let Ok(drop) = service.create(params(now), now).await else {
            panic!("create failed");
        };
        let _ = service.claim(drop.id, &user("alice"), now).await;

        let Ok(CoordinationEvent::FlashDropCreated { .. }) = rx.recv().await else {
            panic!("expected created event");
        };
        let Ok(CoordinationEvent::FlashDropFrozen { frozen_price, .. }) = rx.recv().await else {
            panic!("expected frozen event");
        };
        assert_eq!(frozen_price, 100);
    }
}
