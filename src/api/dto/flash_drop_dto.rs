//! Flash drop DTOs for creation, reads, claims, and sale confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::price::next_price_change_at;
use crate::domain::{FlashDrop, FlashDropId, FlashDropStatus, ProductId, UserId};

/// Request body for `POST /flash-drop`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFlashDropRequest {
    /// Product on sale.
    pub product_id: ProductId,
    /// Opening price in minor units.
    pub starting_price: i64,
    /// Price floor in minor units.
    pub min_price: i64,
    /// Amount subtracted per elapsed interval.
    pub price_decrement: i64,
    /// Interval length in seconds.
    pub interval_seconds: i64,
    /// Decay start. Defaults to the time of the request.
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// End of the drop; claims at or after it are refused.
    pub ends_at: DateTime<Utc>,
    /// Purchase window after a claim. Defaults to the configured value.
    #[serde(default)]
    pub grace_seconds: Option<i64>,
}

/// Request body for `POST /flash-drop/freeze`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct FreezeRequest {
    /// Drop to claim. Omit to claim the current drop.
    #[serde(default)]
    pub flash_drop_id: Option<FlashDropId>,
}

/// Request body for `POST /flash-drop/{id}/confirm`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmSaleRequest {
    /// User the checkout collaborator charged.
    pub buyer_id: String,
}

/// Hold details of a FROZEN or SOLD drop.
#[derive(Debug, Serialize, ToSchema)]
pub struct FreezeDto {
    /// User holding the drop.
    pub frozen_by: UserId,
    /// Claim instant.
    pub frozen_at: DateTime<Utc>,
    /// Captured price in minor units.
    pub frozen_price: i64,
    /// Checkout must confirm before this instant.
    pub purchase_deadline: Option<DateTime<Utc>>,
}

/// Flash drop state as served to polling clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct FlashDropResponse {
    /// Drop identifier.
    pub flash_drop_id: FlashDropId,
    /// Product on sale.
    pub product_id: ProductId,
    /// Lifecycle status.
    pub status: FlashDropStatus,
    /// Decayed price at `server_time`, or the captured price once held.
    pub current_price: i64,
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
    /// End of the drop.
    pub ends_at: DateTime<Utc>,
    /// Next price step while ACTIVE, absent at the floor.
    pub next_price_change_at: Option<DateTime<Utc>>,
    /// Hold details while FROZEN or SOLD.
    pub freeze: Option<FreezeDto>,
    /// Sale confirmation instant.
    pub sold_at: Option<DateTime<Utc>>,
    /// Instant the price was computed at.
    pub server_time: DateTime<Utc>,
}

impl FlashDropResponse {
    /// Renders `drop` with its price computed at `now`.
    #[must_use]
    pub fn from_drop(drop: &FlashDrop, now: DateTime<Utc>) -> Self {
        let freeze = drop.hold.as_ref().map(|hold| FreezeDto {
            frozen_by: hold.user_id.clone(),
            frozen_at: hold.frozen_at,
            frozen_price: hold.frozen_price,
            purchase_deadline: drop.grace_deadline(),
        });
        let current_price = freeze
            .as_ref()
            .map_or_else(|| drop.current_price(now), |f| f.frozen_price);
        let next_price_change_at = match drop.status {
            FlashDropStatus::Active => next_price_change_at(&drop.schedule, now)
                .filter(|at| *at < drop.ends_at),
            _ => None,
        };
        Self {
            flash_drop_id: drop.id,
            product_id: drop.product_id,
            status: drop.status,
            current_price,
            starting_price: drop.schedule.starting_price,
            min_price: drop.schedule.min_price,
            price_decrement: drop.schedule.price_decrement,
            interval_seconds: drop.schedule.interval_seconds,
            started_at: drop.schedule.started_at,
            ends_at: drop.ends_at,
            next_price_change_at,
            freeze,
            sold_at: drop.sold_at,
            server_time: now,
        }
    }
}

/// Response body for a successful `POST /flash-drop/freeze`.
#[derive(Debug, Serialize, ToSchema)]
pub struct FreezeResponse {
    /// Claimed drop.
    pub flash_drop_id: FlashDropId,
    /// Always `FROZEN`.
    pub status: FlashDropStatus,
    /// Price the caller will pay.
    pub frozen_price: i64,
    /// Claim instant.
    pub frozen_at: DateTime<Utc>,
    /// Checkout must confirm before this instant.
    pub purchase_deadline: Option<DateTime<Utc>>,
}

impl FreezeResponse {
    /// Builds the response from a freshly frozen drop. Returns `None` if
    /// the drop carries no hold.
    #[must_use]
    pub fn from_frozen(drop: &FlashDrop) -> Option<Self> {
        let hold = drop.hold.as_ref()?;
        Some(Self {
            flash_drop_id: drop.id,
            status: drop.status,
            frozen_price: hold.frozen_price,
            frozen_at: hold.frozen_at,
            purchase_deadline: drop.grace_deadline(),
        })
    }
}
