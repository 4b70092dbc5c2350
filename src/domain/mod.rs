//! Domain layer: flash drops, clan buys, pricing, and the event system.
//!
//! Aggregates carry the guards of their own transitions (`try_*` methods);
//! stores decide *when* those guards are evaluated atomically.

pub mod clan_buy;
pub mod event;
pub mod event_bus;
pub mod flash_drop;
pub mod ids;
pub mod price;

pub use clan_buy::{ClanBuy, ClanBuyStatus, ClanMember, JoinToken, NewClanBuy};
pub use event::CoordinationEvent;
pub use event_bus::EventBus;
pub use flash_drop::{FlashDrop, FlashDropStatus, FreezeHold, LapsePolicy, NewFlashDrop};
pub use ids::{ClanBuyId, FlashDropId, ProductId, UserId};
pub use price::DecaySchedule;
