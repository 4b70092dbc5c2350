//! Persistence layer: the shared store all coordination goes through.
//!
//! [`CoordinationStore`] is the only place authority over flash drop and
//! clan buy state lives. Every transition method is a single conditional
//! write: it either applies the whole transition and returns the updated
//! aggregate, or changes nothing and returns `None` (or an empty list).
//! Callers never decide a transition from a separate read.
//!
//! Two implementations ship: [`postgres::PostgresStore`] for deployments and
//! [`memory::MemoryStore`] for tests and local runs without a database.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ClanBuy, ClanBuyId, CoordinationEvent, FlashDrop, FlashDropId, JoinToken, LapsePolicy, UserId,
};
use crate::error::GatewayError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// A FROZEN drop released by the lapse sweep.
#[derive(Debug, Clone)]
pub struct ReleasedHold {
    /// The drop after release (EXPIRED, or ACTIVE under the reopen policy).
    pub drop: FlashDrop,
    /// User who held the drop and let the purchase window pass.
    pub lapsed_holder: UserId,
}

/// Durable storage with atomic conditional updates.
#[async_trait]
pub trait CoordinationStore: Send + Sync + std::fmt::Debug {
    /// Persists a newly created flash drop.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn insert_flash_drop(&self, drop: &FlashDrop) -> Result<(), GatewayError>;

    /// Loads a flash drop by ID.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn flash_drop(&self, id: FlashDropId) -> Result<Option<FlashDrop>, GatewayError>;

    /// Most recently started drop that is FROZEN, or ACTIVE and before its
    /// end, with `started_at <= now`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn current_flash_drop(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashDrop>, GatewayError>;

    /// ACTIVE → FROZEN if the drop is still ACTIVE and before `ends_at`.
    ///
    /// `frozen_price` must be the decay price at `now`; the schedule is
    /// immutable, so a price computed from any earlier read is exact.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn freeze_flash_drop(
        &self,
        id: FlashDropId,
        user_id: &UserId,
        frozen_price: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashDrop>, GatewayError>;

    /// FROZEN → SOLD if `buyer` holds the drop and the window is open.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn mark_flash_drop_sold(
        &self,
        id: FlashDropId,
        buyer: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashDrop>, GatewayError>;

    /// ACTIVE → EXPIRED for every drop past `ends_at`. Returns the rows
    /// this call transitioned.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn expire_unclaimed_flash_drops(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<FlashDrop>, GatewayError>;

    /// Releases every FROZEN drop whose grace window lapsed, per `policy`.
    /// Returns the rows this call transitioned, with their new status and
    /// the user whose hold lapsed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn release_lapsed_freezes(
        &self,
        policy: LapsePolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReleasedHold>, GatewayError>;

    /// Persists a newly created clan buy together with its creator.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn insert_clan_buy(&self, clan: &ClanBuy) -> Result<(), GatewayError>;

    /// Loads a clan buy and its roster by join token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn clan_buy(&self, token: &JoinToken) -> Result<Option<ClanBuy>, GatewayError>;

    /// Admits `user_id` and completes the clan if the slot was the last,
    /// in one atomic step guarded as [`ClanBuy::try_join`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn join_clan_buy(
        &self,
        token: &JoinToken,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<ClanBuy>, GatewayError>;

    /// WAITING → CANCELLED if `creator_id` created the clan.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn cancel_clan_buy(
        &self,
        token: &JoinToken,
        creator_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<ClanBuy>, GatewayError>;

    /// WAITING → EXPIRED for every clan past its deadline. Returns the IDs
    /// this call transitioned.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn expire_clan_buys(&self, now: DateTime<Utc>) -> Result<Vec<ClanBuyId>, GatewayError>;

    /// Appends a committed transition to the audit log.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn append_event(&self, event: &CoordinationEvent) -> Result<(), GatewayError>;
}
