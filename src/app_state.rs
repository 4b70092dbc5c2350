//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::identity::IdentityProvider;
use crate::service::{ClanBuyService, FlashDropService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Flash drop operations.
    pub flash_drops: Arc<FlashDropService>,
    /// Clan buy operations.
    pub clan_buys: Arc<ClanBuyService>,
    /// Resolves the calling user.
    pub identity: Arc<dyn IdentityProvider>,
    /// Secret expected in `x-internal-key` on admin and callback routes.
    pub internal_api_key: Option<Arc<str>>,
}
