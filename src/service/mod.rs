//! Service layer: business logic orchestration.
//!
//! [`FlashDropService`] and [`ClanBuyService`] turn requests into
//! conditional writes on the store and emit events through the
//! [`super::domain::EventBus`]. [`ExpiryReaper`] moves overdue records to
//! terminal states on a timer, and [`spawn_event_log`] persists the events.

pub mod clan_buy_service;
pub mod event_log;
pub mod flash_drop_service;
pub mod reaper;

pub use clan_buy_service::{ClanBuyService, CreateClanBuy, JoinOutcome};
pub use event_log::spawn_event_log;
pub use flash_drop_service::FlashDropService;
pub use reaper::{ExpiryReaper, SweepReport};
