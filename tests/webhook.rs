use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use figment::Figment;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use buy_notifier::config::Config;
use buy_notifier::dedup::DedupStore;
use buy_notifier::metrics::Metrics;
use buy_notifier::notify::{Channel, Notifier, NotifySettings};
use buy_notifier::signature;
use buy_notifier::webhook::{build_router, AppState};

const SECRET: &str = "test-secret";

fn test_config() -> Config {
    let mut config: Config = Figment::new().extract().unwrap();
    config.webhook_secret = SECRET.to_string();
    config
}

async fn app_with_channels(channels: Vec<Channel>) -> (Router, DedupStore) {
    let config = test_config();
    let dedup = DedupStore::connect("sqlite::memory:", 100).await.unwrap();
    let metrics = Arc::new(Metrics::new());
    let notifier = Arc::new(
        Notifier::new(
            channels,
            NotifySettings::from_config(&config),
            Arc::clone(&metrics),
        )
        .unwrap(),
    );
    let state = AppState {
        config: Arc::new(config),
        dedup: dedup.clone(),
        notifier,
        metrics,
    };
    (build_router(state), dedup)
}

async fn app() -> (Router, DedupStore) {
    app_with_channels(vec![Channel::Console]).await
}

fn purchase_body() -> String {
    json!({
        "event": "purchase.confirmed",
        "orderId": "ORDER-1",
        "buyer": "0xBEEFCAFE00112233",
        "tokenSymbol": "TKN",
        "tokenDecimals": 18,
        "amountToken": "1234500000000000000",
        "pricePerTokenUSD": "0.2"
    })
    .to_string()
}

fn signed_request(body: &str, sig: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/public-sale")
        .header("content-type", "application/json")
        .header("x-webhook-signature", sig)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn valid_purchase_is_accepted_and_recorded() {
    let (app, dedup) = app().await;
    let body = purchase_body();
    let sig = signature::sign(SECRET, body.as_bytes());

    let response = app.oneshot(signed_request(&body, &sig)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({"ok": true}));
    assert!(dedup.has("ORDER-1").await.unwrap());
}

#[tokio::test]
async fn duplicate_order_short_circuits() {
    let (app, _dedup) = app().await;
    let body = purchase_body();
    let sig = signature::sign(SECRET, body.as_bytes());

    let first = app
        .clone()
        .oneshot(signed_request(&body, &sig))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(signed_request(&body, &sig)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(
        response_json(second).await,
        json!({"ok": true, "dedup": true})
    );
}

#[tokio::test]
async fn bad_signature_is_rejected_without_side_effects() {
    let (app, dedup) = app().await;
    let body = purchase_body();

    let response = app
        .clone()
        .oneshot(signed_request(&body, "deadbeef"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response_json(response).await,
        json!({"ok": false, "error": "invalid_signature"})
    );
    assert!(!dedup.has("ORDER-1").await.unwrap());

    // Missing header entirely
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/public-sale")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!dedup.has("ORDER-1").await.unwrap());
}

#[tokio::test]
async fn invalid_json_with_valid_signature_is_a_bad_request() {
    let (app, _dedup) = app().await;
    let body = "{not json";
    let sig = signature::sign(SECRET, body.as_bytes());

    let response = app.oneshot(signed_request(body, &sig)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response_json(response).await,
        json!({"ok": false, "error": "invalid_json"})
    );
}

#[tokio::test]
async fn missing_order_id_is_a_bad_request() {
    let (app, _dedup) = app().await;
    let body = json!({"event": "purchase.confirmed", "buyer": "0xabc"}).to_string();
    let sig = signature::sign(SECRET, body.as_bytes());

    let response = app.oneshot(signed_request(&body, &sig)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response_json(response).await,
        json!({"ok": false, "error": "missing_orderId"})
    );
}

#[tokio::test]
async fn non_purchase_events_are_acknowledged_as_noops() {
    let (app, dedup) = app().await;
    let body = json!({"event": "refund.issued", "orderId": "ORDER-9"}).to_string();
    let sig = signature::sign(SECRET, body.as_bytes());

    let response = app.oneshot(signed_request(&body, &sig)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response_json(response).await,
        json!({"ok": true, "skipped": true})
    );
    assert!(!dedup.has("ORDER-9").await.unwrap());
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (app, _dedup) = app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({"ok": true}));
}

#[tokio::test]
async fn channel_failure_does_not_stop_other_channels_or_dedup_commit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/telegram"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let channels = vec![
        Channel::Discord {
            webhook_url: format!("{}/discord", server.uri()),
        },
        Channel::Telegram {
            api_url: format!("{}/telegram", server.uri()),
            chat_id: "42".to_string(),
        },
    ];
    let (app, dedup) = app_with_channels(channels).await;

    let body = purchase_body();
    let sig = signature::sign(SECRET, body.as_bytes());
    let response = app.oneshot(signed_request(&body, &sig)).await.unwrap();

    // The inbound caller only cares that the event was accepted.
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({"ok": true}));
    assert!(dedup.has("ORDER-1").await.unwrap());
    server.verify().await;
}
