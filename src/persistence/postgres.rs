//! PostgreSQL implementation of [`CoordinationStore`].
//!
//! Each transition is one `UPDATE … WHERE <guard> RETURNING …` statement,
//! so a caller that loses a race changes nothing and sees zero rows. The
//! clan buy join inserts the membership row and bumps the parent in one
//! data-modifying CTE.
//!
//! A clan buy is always read together with its roster in one statement.
//! After a join or cancel the clan is read back inside the same
//! transaction while the parent row lock is still held, so the roster and
//! `member_count` cannot drift apart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::{CoordinationStore, ReleasedHold};
use super::models::{ClanBuyRow, FlashDropRow, ReleasedHoldRow, StoredEvent};
use crate::config::GatewayConfig;
use crate::domain::{
    ClanBuy, ClanBuyId, CoordinationEvent, FlashDrop, FlashDropId, JoinToken, LapsePolicy, UserId,
};
use crate::error::GatewayError;

const FLASH_DROP_COLUMNS: &str = "id, product_id, starting_price, min_price, price_decrement, \
     interval_seconds, started_at, ends_at, grace_seconds, status, frozen_by_user_id, frozen_at, \
     frozen_price, sold_at, last_price_update, created_at";

const SELECT_CLAN_BUY: &str = "SELECT c.id, c.product_id, c.creator_id, c.join_token, c.status, \
     c.required_count, c.member_count, c.clan_price, c.expires_at, c.created_at, \
     c.completed_at, c.closed_at, \
     COALESCE(( \
         SELECT json_agg(json_build_object('user_id', m.user_id, 'joined_at', m.joined_at) \
                         ORDER BY m.joined_at ASC, m.user_id ASC) \
         FROM clan_buy_members m WHERE m.clan_buy_id = c.id \
     ), '[]'::json) AS members \
     FROM clan_buys c";

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool from `config` and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                config.database_connect_timeout_secs,
            ))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        tracing::info!(
            max_connections = config.database_max_connections,
            "connected to postgres"
        );
        Ok(Self::new(pool))
    }

    /// Loads events for one aggregate in commit order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on database failure.
    pub async fn events_for(&self, subject_id: Uuid) -> Result<Vec<StoredEvent>, GatewayError> {
        let rows = sqlx::query_as::<_, StoredEvent>(
            "SELECT id, subject_id, event_type, payload, created_at FROM coordination_events \
             WHERE subject_id = $1 ORDER BY id ASC",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn clan_buy_by_id<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<ClanBuy>, GatewayError> {
    let row = sqlx::query_as::<_, ClanBuyRow>(&format!("{SELECT_CLAN_BUY} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.map(ClanBuyRow::into_domain).transpose()
}

fn to_drops(rows: Vec<FlashDropRow>) -> Result<Vec<FlashDrop>, GatewayError> {
    rows.into_iter().map(FlashDrop::try_from).collect()
}

fn to_i32(value: u32, field: &str) -> Result<i32, GatewayError> {
    i32::try_from(value).map_err(|_| GatewayError::InvalidRequest(format!("{field} out of range")))
}

#[async_trait]
impl CoordinationStore for PostgresStore {
    async fn insert_flash_drop(&self, drop: &FlashDrop) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO flash_drops (id, product_id, starting_price, min_price, price_decrement, \
             interval_seconds, started_at, ends_at, grace_seconds, status, last_price_update, \
             created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(drop.id.as_uuid())
        .bind(drop.product_id.as_uuid())
        .bind(drop.schedule.starting_price)
        .bind(drop.schedule.min_price)
        .bind(drop.schedule.price_decrement)
        .bind(drop.schedule.interval_seconds)
        .bind(drop.schedule.started_at)
        .bind(drop.ends_at)
        .bind(drop.grace_seconds)
        .bind(drop.status.as_str())
        .bind(drop.last_price_update)
        .bind(drop.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn flash_drop(&self, id: FlashDropId) -> Result<Option<FlashDrop>, GatewayError> {
        let row = sqlx::query_as::<_, FlashDropRow>(&format!(
            "SELECT {FLASH_DROP_COLUMNS} FROM flash_drops WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(FlashDrop::try_from).transpose()
    }

    async fn current_flash_drop(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashDrop>, GatewayError> {
        let row = sqlx::query_as::<_, FlashDropRow>(&format!(
            "SELECT {FLASH_DROP_COLUMNS} FROM flash_drops \
             WHERE started_at <= $1 \
               AND (status = 'FROZEN' OR (status = 'ACTIVE' AND ends_at > $1)) \
             ORDER BY started_at DESC, id DESC LIMIT 1"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(FlashDrop::try_from).transpose()
    }

    async fn freeze_flash_drop(
        &self,
        id: FlashDropId,
        user_id: &UserId,
        frozen_price: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashDrop>, GatewayError> {
        let row = sqlx::query_as::<_, FlashDropRow>(&format!(
            "UPDATE flash_drops \
             SET status = 'FROZEN', frozen_by_user_id = $2, frozen_at = $3, \
                 frozen_price = $4, last_price_update = $3 \
             WHERE id = $1 AND status = 'ACTIVE' AND ends_at > $3 \
             RETURNING {FLASH_DROP_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(user_id.as_str())
        .bind(now)
        .bind(frozen_price)
        .fetch_optional(&self.pool)
        .await?;
        row.map(FlashDrop::try_from).transpose()
    }

    async fn mark_flash_drop_sold(
        &self,
        id: FlashDropId,
        buyer: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<FlashDrop>, GatewayError> {
        let row = sqlx::query_as::<_, FlashDropRow>(&format!(
            "UPDATE flash_drops SET status = 'SOLD', sold_at = $3 \
             WHERE id = $1 AND status = 'FROZEN' AND frozen_by_user_id = $2 \
               AND frozen_at + make_interval(secs => grace_seconds) > $3 \
             RETURNING {FLASH_DROP_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(buyer.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(FlashDrop::try_from).transpose()
    }

    async fn expire_unclaimed_flash_drops(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<FlashDrop>, GatewayError> {
        let rows = sqlx::query_as::<_, FlashDropRow>(&format!(
            "UPDATE flash_drops SET status = 'EXPIRED' \
             WHERE status = 'ACTIVE' AND ends_at <= $1 \
             RETURNING {FLASH_DROP_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        to_drops(rows)
    }

    async fn release_lapsed_freezes(
        &self,
        policy: LapsePolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReleasedHold>, GatewayError> {
        let next_status = match policy {
            LapsePolicy::Expire => "'EXPIRED'",
            LapsePolicy::Reopen => "CASE WHEN d.ends_at > $1 THEN 'ACTIVE' ELSE 'EXPIRED' END",
        };
        let returning = FLASH_DROP_COLUMNS
            .split(", ")
            .map(|c| format!("d.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        // The locking subquery captures the holder before the UPDATE clears
        // it; a concurrent sweep blocks on the lock and then finds the row
        // no longer FROZEN.
        let rows = sqlx::query_as::<_, ReleasedHoldRow>(&format!(
            "UPDATE flash_drops d \
             SET status = {next_status}, frozen_by_user_id = NULL, frozen_at = NULL, \
                 frozen_price = NULL, last_price_update = $1 \
             FROM ( \
                 SELECT id, frozen_by_user_id AS lapsed_holder FROM flash_drops \
                 WHERE status = 'FROZEN' \
                   AND frozen_at + make_interval(secs => grace_seconds) <= $1 \
                 FOR UPDATE \
             ) lapsed \
             WHERE d.id = lapsed.id AND d.status = 'FROZEN' \
             RETURNING {returning}, lapsed.lapsed_holder"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReleasedHoldRow::into_domain).collect()
    }

    async fn insert_clan_buy(&self, clan: &ClanBuy) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO clan_buys (id, product_id, creator_id, join_token, status, \
             required_count, member_count, clan_price, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(clan.id.as_uuid())
        .bind(clan.product_id.as_uuid())
        .bind(clan.creator_id.as_str())
        .bind(clan.join_token.as_str())
        .bind(clan.status.as_str())
        .bind(to_i32(clan.required_count, "required_count")?)
        .bind(to_i32(clan.member_count(), "member_count")?)
        .bind(clan.clan_price)
        .bind(clan.expires_at)
        .bind(clan.created_at)
        .execute(&mut *tx)
        .await?;

        for member in &clan.members {
            sqlx::query(
                "INSERT INTO clan_buy_members (clan_buy_id, user_id, joined_at) \
                 VALUES ($1, $2, $3)",
            )
            .bind(clan.id.as_uuid())
            .bind(member.user_id.as_str())
            .bind(member.joined_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clan_buy(&self, token: &JoinToken) -> Result<Option<ClanBuy>, GatewayError> {
        let row =
            sqlx::query_as::<_, ClanBuyRow>(&format!("{SELECT_CLAN_BUY} WHERE c.join_token = $1"))
                .bind(token.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.map(ClanBuyRow::into_domain).transpose()
    }

    async fn join_clan_buy(
        &self,
        token: &JoinToken,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<ClanBuy>, GatewayError> {
        // The parent UPDATE takes the row lock; concurrent joiners queue on
        // it and re-check the guard against the committed count. A duplicate
        // that slips past NOT EXISTS trips the membership primary key and
        // rolls the whole transaction back.
        let mut tx = self.pool.begin().await?;
        let joined = sqlx::query_scalar::<_, Uuid>(
            "WITH target AS ( \
                 UPDATE clan_buys \
                 SET member_count = member_count + 1, \
                     status = CASE WHEN member_count + 1 >= required_count \
                                   THEN 'COMPLETE' ELSE status END, \
                     completed_at = CASE WHEN member_count + 1 >= required_count \
                                         THEN $3 ELSE completed_at END \
                 WHERE join_token = $1 \
                   AND status = 'WAITING' \
                   AND expires_at > $3 \
                   AND member_count < required_count \
                   AND NOT EXISTS ( \
                       SELECT 1 FROM clan_buy_members m \
                       WHERE m.clan_buy_id = clan_buys.id AND m.user_id = $2) \
                 RETURNING id \
             ) \
             INSERT INTO clan_buy_members (clan_buy_id, user_id, joined_at) \
             SELECT id, $2, $3 FROM target \
             RETURNING clan_buy_id",
        )
        .bind(token.as_str())
        .bind(user_id.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await;

        match joined {
            Ok(Some(clan_buy_id)) => {
                let clan = clan_buy_by_id(&mut *tx, clan_buy_id).await?;
                tx.commit().await?;
                Ok(clan)
            }
            Ok(None) => Ok(None),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tracing::debug!(user = %user_id, "duplicate concurrent join rejected");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_clan_buy(
        &self,
        token: &JoinToken,
        creator_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<ClanBuy>, GatewayError> {
        let mut tx = self.pool.begin().await?;
        let cancelled = sqlx::query_scalar::<_, Uuid>(
            "UPDATE clan_buys SET status = 'CANCELLED', closed_at = $3 \
             WHERE join_token = $1 AND creator_id = $2 AND status = 'WAITING' \
             RETURNING id",
        )
        .bind(token.as_str())
        .bind(creator_id.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(clan_buy_id) = cancelled else {
            return Ok(None);
        };
        let clan = clan_buy_by_id(&mut *tx, clan_buy_id).await?;
        tx.commit().await?;
        Ok(clan)
    }

    async fn expire_clan_buys(&self, now: DateTime<Utc>) -> Result<Vec<ClanBuyId>, GatewayError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "UPDATE clan_buys SET status = 'EXPIRED', closed_at = $1 \
             WHERE status = 'WAITING' AND expires_at <= $1 \
             RETURNING id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(ClanBuyId::from_uuid).collect())
    }

    async fn append_event(&self, event: &CoordinationEvent) -> Result<(), GatewayError> {
        let payload =
            serde_json::to_value(event).map_err(|e| GatewayError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO coordination_events (subject_id, event_type, payload) \
             VALUES ($1, $2, $3)",
        )
        .bind(event.subject_id())
        .bind(event.event_type_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
