//! REST endpoint handlers organized by resource.

pub mod clan_buy;
pub mod flash_drop;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(flash_drop::routes())
        .merge(clan_buy::routes())
}
