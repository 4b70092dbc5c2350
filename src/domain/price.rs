//! Time-decaying flash drop price.
//!
//! The price is a pure function of the immutable [`DecaySchedule`] and the
//! instant it is evaluated at. Nothing here holds state: every replica and
//! every poll recomputes the same value, so there is no price timer to keep
//! in sync.
//!
//! ```text
//! elapsed   = max(0, now - started_at)            (whole seconds)
//! intervals = floor(elapsed / interval_seconds)
//! price     = max(min_price, starting_price - intervals * price_decrement)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Immutable auction parameters of a flash drop. Prices are minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecaySchedule {
    /// Price at `started_at`.
    pub starting_price: i64,
    /// Floor the price never decays below.
    pub min_price: i64,
    /// Amount subtracted once per elapsed interval.
    pub price_decrement: i64,
    /// Length of one decay interval in seconds.
    pub interval_seconds: i64,
    /// Instant the decay starts counting from.
    pub started_at: DateTime<Utc>,
}

impl DecaySchedule {
    /// Checks the schedule parameters.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] when a price is negative,
    /// the floor exceeds the starting price, or the interval is not positive.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.min_price < 0 {
            return Err(GatewayError::InvalidRequest(
                "min_price must not be negative".to_string(),
            ));
        }
        if self.min_price > self.starting_price {
            return Err(GatewayError::InvalidRequest(
                "min_price must not exceed starting_price".to_string(),
            ));
        }
        if self.price_decrement < 0 {
            return Err(GatewayError::InvalidRequest(
                "price_decrement must not be negative".to_string(),
            ));
        }
        if self.interval_seconds <= 0 {
            return Err(GatewayError::InvalidRequest(
                "interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of whole decay intervals elapsed at `now`.
    #[must_use]
    pub fn intervals_elapsed(&self, now: DateTime<Utc>) -> i64 {
        if self.interval_seconds <= 0 {
            return 0;
        }
        let elapsed = (now - self.started_at).num_seconds().max(0);
        elapsed / self.interval_seconds
    }
}

/// Price of the drop at `now`.
///
/// Monotonically non-increasing in `now` and never below `min_price`.
/// Saturating arithmetic keeps very long elapsed times on the floor.
#[must_use]
pub fn current_price(schedule: &DecaySchedule, now: DateTime<Utc>) -> i64 {
    let discount = schedule
        .intervals_elapsed(now)
        .saturating_mul(schedule.price_decrement);
    schedule
        .starting_price
        .saturating_sub(discount)
        .max(schedule.min_price)
}

/// Instant of the next price step after `now`, or `None` once the price
/// sits on its floor (or never moves).
#[must_use]
pub fn next_price_change_at(schedule: &DecaySchedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if schedule.price_decrement == 0 || current_price(schedule, now) <= schedule.min_price {
        return None;
    }
    let next_step = schedule.intervals_elapsed(now).checked_add(1)?;
    let offset = next_step.checked_mul(schedule.interval_seconds)?;
    schedule
        .started_at
        .checked_add_signed(Duration::try_seconds(offset)?)
}
