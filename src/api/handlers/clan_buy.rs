//! Clan buy handlers: create, inspect, join, and cancel.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::auth::AuthUser;
use crate::api::dto::{ClanBuyResponse, CreateClanBuyRequest, JoinClanBuyResponse};
use crate::app_state::AppState;
use crate::domain::JoinToken;
use crate::error::{ErrorResponse, GatewayError};
use crate::service::CreateClanBuy;

/// A malformed token cannot name any clan, so it reads as not found.
fn parse_token(raw: &str) -> Result<JoinToken, GatewayError> {
    JoinToken::parse(raw).ok_or(GatewayError::ClanBuyNotFound)
}

/// `POST /clan-buy/create` — Start a group purchase.
///
/// # Errors
///
/// Returns [`GatewayError`] if the caller is anonymous or the parameters
/// are invalid.
#[utoipa::path(
    post,
    path = "/api/v1/clan-buy/create",
    tag = "Clan Buy",
    summary = "Create a clan buy",
    description = "Starts a WAITING clan with the caller as its first member and returns the join token to share.",
    request_body = CreateClanBuyRequest,
    responses(
        (status = 201, description = "Clan created", body = ClanBuyResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse),
        (status = 401, description = "No user identity", body = ErrorResponse),
    )
)]
pub async fn create_clan_buy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateClanBuyRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let request = CreateClanBuy {
        product_id: req.product_id,
        clan_price: req.clan_price,
        required_count: req.required_count,
        ttl_secs: req.ttl_secs,
    };
    let clan = state.clan_buys.create(request, user, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(ClanBuyResponse::from(clan))))
}

/// `GET /clan-buy/{join_token}` — Clan state and roster.
///
/// # Errors
///
/// Returns [`GatewayError::ClanBuyNotFound`] for an unknown token.
#[utoipa::path(
    get,
    path = "/api/v1/clan-buy/{join_token}",
    tag = "Clan Buy",
    summary = "Get a clan buy",
    params(("join_token" = String, Path, description = "Shared join token")),
    responses(
        (status = 200, description = "Clan state", body = ClanBuyResponse),
        (status = 404, description = "Clan not found", body = ErrorResponse),
    )
)]
pub async fn get_clan_buy(
    State(state): State<AppState>,
    Path(join_token): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let token = parse_token(&join_token)?;
    let clan = state.clan_buys.get(&token).await?;
    Ok(Json(ClanBuyResponse::from(clan)))
}

/// `POST /clan-buy/{join_token}/join` — Join a clan.
///
/// # Errors
///
/// Returns [`GatewayError`] if the caller is anonymous, the clan is
/// unknown, full, cancelled, or past its deadline.
#[utoipa::path(
    post,
    path = "/api/v1/clan-buy/{join_token}/join",
    tag = "Clan Buy",
    summary = "Join a clan buy",
    description = "Adds the caller to the roster. The join that fills the last slot completes the clan in the same step. Joining twice returns the current state with `already_member` set.",
    params(("join_token" = String, Path, description = "Shared join token")),
    responses(
        (status = 200, description = "Joined, or already a member", body = JoinClanBuyResponse),
        (status = 401, description = "No user identity", body = ErrorResponse),
        (status = 404, description = "Clan not found", body = ErrorResponse),
        (status = 409, description = "Clan complete or cancelled", body = ErrorResponse),
        (status = 410, description = "Clan expired", body = ErrorResponse),
    )
)]
pub async fn join_clan_buy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(join_token): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let token = parse_token(&join_token)?;
    let outcome = state.clan_buys.join(&token, &user, Utc::now()).await?;
    Ok(Json(JoinClanBuyResponse {
        clan_buy: ClanBuyResponse::from(outcome.clan_buy),
        already_member: outcome.already_member,
    }))
}

/// `POST /clan-buy/{join_token}/cancel` — Creator cancels a waiting clan.
///
/// # Errors
///
/// Returns [`GatewayError`] if the caller did not create the clan or it
/// is no longer WAITING.
#[utoipa::path(
    post,
    path = "/api/v1/clan-buy/{join_token}/cancel",
    tag = "Clan Buy",
    summary = "Cancel a clan buy",
    params(("join_token" = String, Path, description = "Shared join token")),
    responses(
        (status = 200, description = "Clan cancelled", body = ClanBuyResponse),
        (status = 401, description = "No user identity", body = ErrorResponse),
        (status = 403, description = "Caller is not the creator", body = ErrorResponse),
        (status = 404, description = "Clan not found", body = ErrorResponse),
        (status = 409, description = "Clan no longer waiting", body = ErrorResponse),
    )
)]
pub async fn cancel_clan_buy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(join_token): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let token = parse_token(&join_token)?;
    let clan = state.clan_buys.cancel(&token, &user, Utc::now()).await?;
    Ok(Json(ClanBuyResponse::from(clan)))
}

/// Clan buy routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/clan-buy/create", post(create_clan_buy))
        .route("/clan-buy/{join_token}", get(get_clan_buy))
        .route("/clan-buy/{join_token}/join", post(join_clan_buy))
        .route("/clan-buy/{join_token}/cancel", post(cancel_clan_buy))
}
