//! REST API layer: route handlers, DTOs, extractors, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root. With the `swagger-ui` feature the OpenAPI document is served at
//! `/api-docs/openapi.json` and browsable at `/swagger-ui`.

pub mod auth;
pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document covering every REST endpoint.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "drop-gateway",
        description = "Flash drop auctions and clan buy group purchases."
    ),
    paths(
        handlers::flash_drop::get_active,
        handlers::flash_drop::freeze,
        handlers::flash_drop::create_flash_drop,
        handlers::flash_drop::get_flash_drop,
        handlers::flash_drop::confirm_sale,
        handlers::clan_buy::create_clan_buy,
        handlers::clan_buy::get_clan_buy,
        handlers::clan_buy::join_clan_buy,
        handlers::clan_buy::cancel_clan_buy,
        handlers::system::health_handler,
    ),
    components(schemas(crate::error::ErrorResponse, crate::error::ErrorBody)),
    tags(
        (name = "Flash Drop", description = "Time-decaying single-unit auctions"),
        (name = "Clan Buy", description = "Threshold group purchases"),
        (name = "System", description = "Operational endpoints"),
    )
)]
#[derive(Debug)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
