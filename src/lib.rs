//! # drop-gateway
//!
//! REST gateway coordinating two real-time commerce mechanisms:
//!
//! - **Flash drops**: a single-unit auction whose price decays on a fixed
//!   schedule until one user claims it. The claim freezes the price and
//!   gives the holder a purchase window.
//! - **Clan buys**: a group purchase shared by an unguessable join token
//!   that completes the moment the required number of users have joined.
//!
//! Every contested transition is a single conditional write on the shared
//! store, so request handlers stay stateless and any number of replicas
//! can serve traffic. Clients poll; there is no push channel.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP polling)
//!     │
//!     ├── REST Handlers + AuthUser / InternalCaller (api/)
//!     │
//!     ├── FlashDropService, ClanBuyService (service/)
//!     ├── ExpiryReaper ── timer (service/)
//!     ├── EventBus ── event log task (domain/, service/)
//!     │
//!     ├── FlashDrop, ClanBuy, price decay (domain/)
//!     │
//!     └── CoordinationStore: PostgreSQL | in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod persistence;
pub mod service;

use std::sync::Arc;

use axum::Router;

use crate::app_state::AppState;
use crate::config::GatewayConfig;
use crate::domain::EventBus;
use crate::identity::TrustedHeaderIdentity;
use crate::persistence::CoordinationStore;
use crate::service::{ClanBuyService, FlashDropService};

/// Wires services over `store` and returns the application state.
#[must_use]
pub fn build_state(
    config: &GatewayConfig,
    store: Arc<dyn CoordinationStore>,
    event_bus: &EventBus,
) -> AppState {
    AppState {
        flash_drops: Arc::new(FlashDropService::new(
            Arc::clone(&store),
            event_bus.clone(),
            config.flash_drop_grace_secs,
        )),
        clan_buys: Arc::new(ClanBuyService::new(
            store,
            event_bus.clone(),
            config.clan_buy_required_count,
            config.clan_buy_ttl_secs,
        )),
        identity: Arc::new(TrustedHeaderIdentity::new(config.user_id_header.clone())),
        internal_api_key: config.internal_api_key.as_deref().map(Arc::from),
    }
}

/// Builds the routed application without transport layers.
pub fn build_app(state: AppState) -> Router {
    api::build_router().with_state(state)
}
