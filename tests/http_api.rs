//! HTTP boundary tests: routes, identity, and status code mapping, run
//! against the router over the in-memory store.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use drop_gateway::config::GatewayConfig;
use drop_gateway::domain::EventBus;
use drop_gateway::persistence::MemoryStore;

const ADMIN_KEY: &str = "test-internal-key";

fn app() -> Router {
    let config = GatewayConfig {
        internal_api_key: Some(ADMIN_KEY.to_string()),
        ..GatewayConfig::default()
    };
    let state = drop_gateway::build_state(&config, Arc::new(MemoryStore::new()), &EventBus::new(64));
    drop_gateway::build_app(state)
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let Ok(req) = builder.body(body) else {
        panic!("failed to build request");
    };
    req
}

fn admin(method: &str, uri: &str, body: Value) -> Request<Body> {
    let mut req = request(method, uri, None, Some(body));
    let Ok(value) = ADMIN_KEY.parse() else {
        panic!("invalid header value");
    };
    req.headers_mut().insert("x-internal-key", value);
    req
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let Ok(response) = app.clone().oneshot(req).await else {
        panic!("router failed");
    };
    let status = response.status();
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("failed to read body");
    };
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn drop_body() -> Value {
    json!({
        "product_id": uuid::Uuid::new_v4(),
        "starting_price": 10_000,
        "min_price": 2_000,
        "price_decrement": 500,
        "interval_seconds": 10,
        "ends_at": (Utc::now() + Duration::seconds(600)).to_rfc3339(),
    })
}

#[tokio::test]
async fn health_is_public() {
    let (status, body) = send(&app(), request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn no_active_drop_is_404() {
    let (status, body) = send(&app(), request("GET", "/api/v1/flash-drop/active", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 2002);
}

#[tokio::test]
async fn freeze_without_identity_is_401() {
    let (status, body) = send(&app(), request("POST", "/api/v1/flash-drop/freeze", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], 1101);
}

#[tokio::test]
async fn admin_routes_need_the_internal_key() {
    let app = app();
    let (status, _) = send(
        &app,
        request("POST", "/api/v1/flash-drop", Some("alice"), Some(drop_body())),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, admin("POST", "/api/v1/flash-drop", drop_body())).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn invalid_drop_is_400() {
    let mut body = drop_body();
    body["min_price"] = json!(50_000);
    let (status, body) = send(&app(), admin("POST", "/api/v1/flash-drop", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 1001);
}

#[tokio::test]
async fn first_freeze_wins_and_second_conflicts() {
    let app = app();
    let (status, created) = send(&app, admin("POST", "/api/v1/flash-drop", drop_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["flash_drop_id"].as_str().unwrap_or_default().to_string();

    let (status, active) = send(&app, request("GET", "/api/v1/flash-drop/active", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["status"], "ACTIVE");
    assert_eq!(active["flash_drop_id"], created["flash_drop_id"]);

    let (status, frozen) = send(
        &app,
        request("POST", "/api/v1/flash-drop/freeze", Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(frozen["status"], "FROZEN");
    assert!(frozen["frozen_price"].as_i64().is_some_and(|p| (2_000..=10_000).contains(&p)));

    let (status, conflict) = send(
        &app,
        request(
            "POST",
            "/api/v1/flash-drop/freeze",
            Some("bob"),
            Some(json!({ "flash_drop_id": id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["error"]["code"], 2101);
    assert_eq!(conflict["error"]["details"], "FROZEN");

    let (status, body) = send(
        &app,
        admin(
            "POST",
            &format!("/api/v1/flash-drop/{id}/confirm"),
            json!({ "buyer_id": "bob" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], 2101);

    let (status, sold) = send(
        &app,
        admin(
            "POST",
            &format!("/api/v1/flash-drop/{id}/confirm"),
            json!({ "buyer_id": "alice" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sold["status"], "SOLD");

    let (status, _) = send(&app, request("GET", "/api/v1/flash-drop/active", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn clan_buy_fills_and_rejects_latecomers() {
    let app = app();
    let (status, created) = send(
        &app,
        request(
            "POST",
            "/api/v1/clan-buy/create",
            Some("creator"),
            Some(json!({ "product_id": uuid::Uuid::new_v4(), "clan_price": 1_999 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "WAITING");
    assert_eq!(created["member_count"], 1);
    let token = created["join_token"].as_str().unwrap_or_default().to_string();
    assert_eq!(token.len(), 43);

    let join = format!("/api/v1/clan-buy/{token}/join");
    let (status, joined) = send(&app, request("POST", &join, Some("friend"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["status"], "COMPLETE");
    assert_eq!(joined["member_count"], 2);
    assert_eq!(joined["already_member"], false);

    let (status, again) = send(&app, request("POST", &join, Some("friend"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["already_member"], true);

    let (status, late) = send(&app, request("POST", &join, Some("latecomer"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(late["error"]["details"], "COMPLETE");

    let (status, view) = send(
        &app,
        request("GET", &format!("/api/v1/clan-buy/{token}"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["members"][0]["user_id"], "creator");
    assert_eq!(view["members"][1]["user_id"], "friend");
}

#[tokio::test]
async fn clan_buy_cancel_is_creator_only() {
    let app = app();
    let (_, created) = send(
        &app,
        request(
            "POST",
            "/api/v1/clan-buy/create",
            Some("creator"),
            Some(json!({
                "product_id": uuid::Uuid::new_v4(),
                "clan_price": 500,
                "required_count": 5,
            })),
        ),
    )
    .await;
    let token = created["join_token"].as_str().unwrap_or_default().to_string();
    let cancel = format!("/api/v1/clan-buy/{token}/cancel");

    let (status, _) = send(&app, request("POST", &cancel, Some("friend"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, request("POST", &cancel, Some("creator"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");

    let (status, _) = send(&app, request("POST", &cancel, Some("creator"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_or_malformed_token_is_404() {
    let app = app();
    for token in ["short", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"] {
        let (status, body) = send(
            &app,
            request("POST", &format!("/api/v1/clan-buy/{token}/join"), Some("u"), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 2003);
    }
}
