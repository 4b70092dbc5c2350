//! Background expiry of timed-out flash drops and clan buys.
//!
//! Every sweep step is a conditional bulk write, so several replicas can
//! run the reaper against one database: each row transitions exactly once
//! and only the replica whose write matched it publishes the event.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::domain::{ClanBuyStatus, CoordinationEvent, EventBus, FlashDropStatus, LapsePolicy};
use crate::error::GatewayError;
use crate::persistence::CoordinationStore;

/// Transitions applied by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// ACTIVE drops that reached their end unclaimed.
    pub flash_drops_expired: usize,
    /// FROZEN drops whose purchase window lapsed and that are now EXPIRED.
    pub freezes_expired: usize,
    /// FROZEN drops whose purchase window lapsed and that are ACTIVE again.
    pub freezes_reopened: usize,
    /// WAITING clans that reached their deadline.
    pub clan_buys_expired: usize,
}

impl SweepReport {
    /// Total number of transitions.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.flash_drops_expired
            + self.freezes_expired
            + self.freezes_reopened
            + self.clan_buys_expired
    }

    /// `true` if the sweep changed nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Periodic sweeper moving overdue records to their terminal states.
#[derive(Debug)]
pub struct ExpiryReaper {
    store: Arc<dyn CoordinationStore>,
    event_bus: EventBus,
    lapse_policy: LapsePolicy,
    interval: Duration,
}

impl ExpiryReaper {
    /// Creates a reaper sweeping every `interval`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        event_bus: EventBus,
        lapse_policy: LapsePolicy,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            event_bus,
            lapse_policy,
            interval,
        }
    }

    /// Runs one sweep as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] if a bulk write fails.
    /// Steps that completed before the failure stay applied and their
    /// events are published.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, GatewayError> {
        let mut report = SweepReport::default();

        for drop in self.store.expire_unclaimed_flash_drops(now).await? {
            report.flash_drops_expired += 1;
            tracing::info!(flash_drop_id = %drop.id, "flash drop expired unclaimed");
            let _ = self.event_bus.publish(CoordinationEvent::FlashDropExpired {
                flash_drop_id: drop.id,
                lapsed_holder: None,
                timestamp: now,
            });
        }

        for released in self.store.release_lapsed_freezes(self.lapse_policy, now).await? {
            let flash_drop_id = released.drop.id;
            let lapsed_holder = Some(released.lapsed_holder);
            let event = if released.drop.status == FlashDropStatus::Active {
                report.freezes_reopened += 1;
                tracing::info!(%flash_drop_id, holder = ?lapsed_holder, "lapsed hold released, drop reopened");
                CoordinationEvent::FlashDropReopened {
                    flash_drop_id,
                    lapsed_holder,
                    timestamp: now,
                }
            } else {
                report.freezes_expired += 1;
                tracing::info!(%flash_drop_id, holder = ?lapsed_holder, "lapsed hold expired");
                CoordinationEvent::FlashDropExpired {
                    flash_drop_id,
                    lapsed_holder,
                    timestamp: now,
                }
            };
            let _ = self.event_bus.publish(event);
        }

        for clan_buy_id in self.store.expire_clan_buys(now).await? {
            report.clan_buys_expired += 1;
            tracing::info!(%clan_buy_id, "clan buy expired");
            let _ = self.event_bus.publish(CoordinationEvent::ClanBuyClosed {
                clan_buy_id,
                status: ClanBuyStatus::Expired,
                timestamp: now,
            });
        }

        Ok(report)
    }

    /// Sweeps on every tick until `cancel` fires. A failed sweep is logged
    /// and retried on the next tick.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis(), policy = ?self.lapse_policy, "expiry reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                () = cancel.cancelled() => {
                    tracing::info!("expiry reaper shutting down");
                    return;
                }
            }

            match self.sweep(Utc::now()).await {
                Ok(report) if !report.is_empty() => {
                    tracing::info!(
                        flash_drops_expired = report.flash_drops_expired,
                        freezes_expired = report.freezes_expired,
                        freezes_reopened = report.freezes_reopened,
                        clan_buys_expired = report.clan_buys_expired,
                        "sweep applied transitions"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "sweep failed"),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ProductId, UserId};
    use crate::persistence::MemoryStore;
    use crate::service::{ClanBuyService, CreateClanBuy, FlashDropService};
    use chrono::Duration as ChronoDuration;

    fn user(name: &str) -> UserId {
        let Some(id) = UserId::parse(name) else {
            panic!("invalid user id");
        };
        id
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        bus: EventBus,
        drops: FlashDropService,
        clans: ClanBuyService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(256);
        Fixture {
            drops: FlashDropService::new(Arc::<MemoryStore>::clone(&store), bus.clone(), 60),
            clans: ClanBuyService::new(Arc::<MemoryStore>::clone(&store), bus.clone(), 2, 30),
            store,
            bus,
        }
    }

    fn reaper(f: &Fixture, policy: LapsePolicy) -> ExpiryReaper {
        ExpiryReaper::new(
            Arc::<MemoryStore>::clone(&f.store),
            f.bus.clone(),
            policy,
            Duration::from_millis(10),
        )
    }

    async fn create_drop(f: &Fixture, now: DateTime<Utc>, lifetime: i64) -> crate::domain::FlashDrop {
        let params = crate::domain::NewFlashDrop {
            product_id: ProductId::new(),
            starting_price: 100,
            min_price: 20,
            price_decrement: 10,
            interval_seconds: 10,
            starts_at: Some(now),
            ends_at: now + ChronoDuration::seconds(lifetime),
            grace_seconds: 60,
        };
        let Ok(drop) = f.drops.create(params, now).await else {
            panic!("create failed");
        };
        drop
    }

    #[tokio::test]
    async fn expires_each_record_once() {
        let now = Utc::now();
        let f = fixture();
        let drop = create_drop(&f, now, 10).await;
        let Ok(clan) = f
            .clans
            .create(
                CreateClanBuy {
                    product_id: ProductId::new(),
                    clan_price: 900,
                    required_count: None,
                    ttl_secs: None,
                },
                user("creator"),
                now,
            )
            .await
        else {
            panic!("clan create failed");
        };

        let reaper = Arc::new(reaper(&f, LapsePolicy::Expire));
        let later = now + ChronoDuration::seconds(30);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let reaper = Arc::clone(&reaper);
            handles.push(tokio::spawn(async move { reaper.sweep(later).await }));
        }
        let mut total = SweepReport::default();
        for handle in handles {
            let Ok(Ok(report)) = handle.await else {
                panic!("sweep failed");
            };
            total.flash_drops_expired += report.flash_drops_expired;
            total.clan_buys_expired += report.clan_buys_expired;
        }
        assert_eq!(total.flash_drops_expired, 1);
        assert_eq!(total.clan_buys_expired, 1);

        let Ok(stored) = f.drops.get(drop.id).await else {
            panic!("drop vanished");
        };
        assert_eq!(stored.status, FlashDropStatus::Expired);
        let Ok(stored) = f.clans.get(&clan.join_token).await else {
            panic!("clan vanished");
        };
        assert_eq!(stored.status, ClanBuyStatus::Expired);
        assert_eq!(stored.closed_at, Some(later));
    }

    #[tokio::test]
    async fn lapsed_freeze_expires_by_default() {
        let now = Utc::now();
        let f = fixture();
        let drop = create_drop(&f, now, 600).await;
        let _ = f.drops.claim(drop.id, &user("alice"), now).await;
        let reaper = reaper(&f, LapsePolicy::Expire);

        let Ok(early) = reaper.sweep(now + ChronoDuration::seconds(59)).await else {
            panic!("sweep failed");
        };
        assert!(early.is_empty());

        let Ok(report) = reaper.sweep(now + ChronoDuration::seconds(60)).await else {
            panic!("sweep failed");
        };
        assert_eq!(report.freezes_expired, 1);

        let Ok(stored) = f.drops.get(drop.id).await else {
            panic!("drop vanished");
        };
        assert_eq!(stored.status, FlashDropStatus::Expired);
        assert!(stored.hold.is_none());

        let events = f.store.events().await;
        assert!(events.is_empty(), "reaper must not write the audit log directly");
    }

    #[tokio::test]
    async fn lapsed_freeze_reopens_under_reopen_policy() {
        let now = Utc::now();
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let drop = create_drop(&f, now, 600).await;
        let _ = f.drops.claim(drop.id, &user("alice"), now).await;
        let reaper = reaper(&f, LapsePolicy::Reopen);

        let at = now + ChronoDuration::seconds(60);
        let Ok(report) = reaper.sweep(at).await else {
            panic!("sweep failed");
        };
        assert_eq!(report.freezes_reopened, 1);

        let Ok(stored) = f.drops.get(drop.id).await else {
            panic!("drop vanished");
        };
        assert_eq!(stored.status, FlashDropStatus::Active);
        assert!(stored.hold.is_none());
        assert_eq!(stored.current_price(at), 40);

        let mut reopened = None;
        while let Ok(event) = rx.try_recv() {
            if let CoordinationEvent::FlashDropReopened { lapsed_holder, .. } = event {
                reopened = lapsed_holder;
            }
        }
        assert_eq!(reopened, Some(user("alice")));

        let Ok(_) = f.drops.claim(drop.id, &user("bob"), at).await else {
            panic!("reopened drop should be claimable");
        };
    }

    #[tokio::test]
    async fn reopen_past_end_expires_instead() {
        let now = Utc::now();
        let f = fixture();
        let drop = create_drop(&f, now, 30).await;
        let _ = f.drops.claim(drop.id, &user("alice"), now).await;

        let Ok(report) = reaper(&f, LapsePolicy::Reopen)
            .sweep(now + ChronoDuration::seconds(60))
            .await
        else {
            panic!("sweep failed");
        };
        assert_eq!(report.freezes_expired, 1);
        assert_eq!(report.freezes_reopened, 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let f = fixture();
        let reaper = Arc::new(reaper(&f, LapsePolicy::Expire));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&reaper).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }
}
