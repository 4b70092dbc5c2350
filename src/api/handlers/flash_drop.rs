//! Flash drop handlers: current drop, claim, admin creation, and checkout
//! confirmation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::auth::{AuthUser, InternalCaller};
use crate::api::dto::{
    ConfirmSaleRequest, CreateFlashDropRequest, FlashDropResponse, FreezeRequest, FreezeResponse,
};
use crate::app_state::AppState;
use crate::domain::{FlashDropId, NewFlashDrop, UserId};
use crate::error::{ErrorResponse, GatewayError};

/// `GET /flash-drop/active` — The drop currently on sale.
///
/// # Errors
///
/// Returns [`GatewayError::NoActiveFlashDrop`] if nothing is running.
#[utoipa::path(
    get,
    path = "/api/v1/flash-drop/active",
    tag = "Flash Drop",
    summary = "Current flash drop",
    description = "Returns the most recently started drop that is ACTIVE or FROZEN, with its price recomputed at request time. Clients poll this endpoint.",
    responses(
        (status = 200, description = "Current drop", body = FlashDropResponse),
        (status = 404, description = "No drop is running", body = ErrorResponse),
    )
)]
pub async fn get_active(State(state): State<AppState>) -> Result<impl IntoResponse, GatewayError> {
    let now = Utc::now();
    let drop = state.flash_drops.current(now).await?;
    Ok(Json(FlashDropResponse::from_drop(&drop, now)))
}

/// `POST /flash-drop/freeze` — Claim a drop at its current price.
///
/// # Errors
///
/// Returns a [`GatewayError`] if the caller is anonymous, the drop is gone,
/// already claimed, or over.
#[utoipa::path(
    post,
    path = "/api/v1/flash-drop/freeze",
    tag = "Flash Drop",
    summary = "Claim a flash drop",
    description = "Atomically freezes the drop at its current price for the caller. Exactly one concurrent caller wins; the others receive 409 with the drop's status. Omit `flash_drop_id` to claim the current drop.",
    request_body(content = FreezeRequest, description = "Optional target drop"),
    responses(
        (status = 200, description = "Drop frozen for the caller", body = FreezeResponse),
        (status = 401, description = "No user identity", body = ErrorResponse),
        (status = 404, description = "No such drop, or none running", body = ErrorResponse),
        (status = 409, description = "Drop no longer available", body = ErrorResponse),
        (status = 410, description = "Drop has ended", body = ErrorResponse),
    )
)]
pub async fn freeze(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Option<Json<FreezeRequest>>,
) -> Result<impl IntoResponse, GatewayError> {
    let now = Utc::now();
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let frozen = match request.flash_drop_id {
        Some(id) => state.flash_drops.claim(id, &user, now).await?,
        None => state.flash_drops.claim_current(&user, now).await?,
    };
    let response = FreezeResponse::from_frozen(&frozen)
        .ok_or_else(|| GatewayError::Internal("frozen drop without hold".to_string()))?;
    Ok(Json(response))
}

/// `POST /flash-drop` — Schedule a new drop.
///
/// # Errors
///
/// Returns [`GatewayError`] if the internal key is missing or the
/// parameters are invalid.
#[utoipa::path(
    post,
    path = "/api/v1/flash-drop",
    tag = "Flash Drop",
    summary = "Create a flash drop",
    description = "Admin route guarded by the `x-internal-key` header. Validates the decay parameters and stores an ACTIVE drop.",
    request_body = CreateFlashDropRequest,
    responses(
        (status = 201, description = "Drop created", body = FlashDropResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse),
        (status = 401, description = "Missing or wrong internal key", body = ErrorResponse),
    )
)]
pub async fn create_flash_drop(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Json(req): Json<CreateFlashDropRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let now = Utc::now();
    let params = NewFlashDrop {
        product_id: req.product_id,
        starting_price: req.starting_price,
        min_price: req.min_price,
        price_decrement: req.price_decrement,
        interval_seconds: req.interval_seconds,
        starts_at: req.starts_at,
        ends_at: req.ends_at,
        grace_seconds: req
            .grace_seconds
            .unwrap_or_else(|| state.flash_drops.default_grace_seconds()),
    };
    let drop = state.flash_drops.create(params, now).await?;
    Ok((
        StatusCode::CREATED,
        Json(FlashDropResponse::from_drop(&drop, now)),
    ))
}

/// `GET /flash-drop/{id}` — A drop by ID.
///
/// # Errors
///
/// Returns [`GatewayError::FlashDropNotFound`] for an unknown ID.
#[utoipa::path(
    get,
    path = "/api/v1/flash-drop/{id}",
    tag = "Flash Drop",
    summary = "Get a flash drop",
    description = "Returns any drop, including terminal ones, with its price recomputed at request time.",
    params(("id" = FlashDropId, Path, description = "Flash drop ID")),
    responses(
        (status = 200, description = "Drop state", body = FlashDropResponse),
        (status = 404, description = "Drop not found", body = ErrorResponse),
    )
)]
pub async fn get_flash_drop(
    State(state): State<AppState>,
    Path(id): Path<FlashDropId>,
) -> Result<impl IntoResponse, GatewayError> {
    let drop = state.flash_drops.get(id).await?;
    Ok(Json(FlashDropResponse::from_drop(&drop, Utc::now())))
}

/// `POST /flash-drop/{id}/confirm` — Checkout callback marking a sale.
///
/// # Errors
///
/// Returns [`GatewayError`] if the internal key is missing, the buyer does
/// not hold the drop, or the purchase window lapsed.
#[utoipa::path(
    post,
    path = "/api/v1/flash-drop/{id}/confirm",
    tag = "Flash Drop",
    summary = "Confirm a flash drop sale",
    description = "Called by the checkout collaborator once the holder has paid. Moves the drop from FROZEN to SOLD if `buyer_id` holds it and the purchase window is open.",
    params(("id" = FlashDropId, Path, description = "Flash drop ID")),
    request_body = ConfirmSaleRequest,
    responses(
        (status = 200, description = "Drop sold", body = FlashDropResponse),
        (status = 400, description = "Malformed buyer ID", body = ErrorResponse),
        (status = 401, description = "Missing or wrong internal key", body = ErrorResponse),
        (status = 404, description = "Drop not found", body = ErrorResponse),
        (status = 409, description = "Drop not held by the buyer", body = ErrorResponse),
        (status = 410, description = "Purchase window lapsed", body = ErrorResponse),
    )
)]
pub async fn confirm_sale(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(id): Path<FlashDropId>,
    Json(req): Json<ConfirmSaleRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let buyer = UserId::parse(&req.buyer_id)
        .ok_or_else(|| GatewayError::InvalidRequest("buyer_id is malformed".to_string()))?;
    let now = Utc::now();
    let sold = state.flash_drops.confirm_sale(id, &buyer, now).await?;
    Ok(Json(FlashDropResponse::from_drop(&sold, now)))
}

/// Flash drop routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/flash-drop", post(create_flash_drop))
        .route("/flash-drop/active", get(get_active))
        .route("/flash-drop/freeze", post(freeze))
        .route("/flash-drop/{id}", get(get_flash_drop))
        .route("/flash-drop/{id}/confirm", post(confirm_sale))
}
