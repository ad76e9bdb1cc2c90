mod common;

use axum::http::{Request, StatusCode};
use common::{d, minutes, Harness, T0};
use tower::util::ServiceExt;
use whirlpool_rebalancer::api;

fn app(h: &Harness) -> axum::Router {
    api::create_router(api::AppState::new(h.repo.clone(), h.config.clone()))
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_and_ready() {
    let h = Harness::new().await;

    let (status, body) = get_json(app(&h), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(app(&h), "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["trackedPositions"], 0);

    h.tracked_position("100", T0).await;
    let (_, body) = get_json(app(&h), "/ready").await;
    assert_eq!(body["trackedPositions"], 1);
}

#[tokio::test]
async fn test_positions_lists_ledger_with_history() {
    let h = Harness::new().await;
    let (_, body) = get_json(app(&h), "/v1/positions").await;
    assert_eq!(body["positions"].as_array().unwrap().len(), 0);

    let address = h.tracked_position("100", T0).await;
    let (status, body) = get_json(app(&h), "/v1/positions").await;
    assert_eq!(status, StatusCode::OK);

    let positions = body["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 1);
    let position = &positions[0];
    assert_eq!(position["address"], address.as_str());
    assert!(position["outOfRangeSince"].is_null());
    assert_eq!(position["remainingSpent"]["a"].as_f64(), Some(0.015));
    assert_eq!(position["redepositAttemptsRemaining"], 0);
    assert_eq!(position["history"]["address"], address.as_str());
    assert!(position["history"]["closed"].is_null());
}

#[tokio::test]
async fn test_history_filters_by_address() {
    let h = Harness::new().await;
    let first = h.tracked_position("100", T0).await;
    h.gateway.remove_position(&first);
    h.rebalancer
        .sync_positions(&h.live().await, minutes(1))
        .await
        .unwrap();
    let second = h.tracked_position("100", minutes(2)).await;

    let (_, body) = get_json(app(&h), "/v1/positions/history").await;
    let all = body["history"].as_array().unwrap();
    assert_eq!(all.len(), 2);
    // Newest first.
    assert_eq!(all[0]["address"], second.as_str());

    let uri = format!("/v1/positions/history?address={}", first.as_str());
    let (status, body) = get_json(app(&h), &uri).await;
    assert_eq!(status, StatusCode::OK);
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["closed"], minutes(1).as_ms());
}

#[tokio::test]
async fn test_history_rejects_empty_address() {
    let h = Harness::new().await;
    let (status, body) = get_json(app(&h), "/v1/positions/history?address=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("address"));
}

#[tokio::test]
async fn test_holdings_per_leg() {
    let h = Harness::new().await;
    h.repo
        .increment_token_holdings(&h.config.token_b(), d("1.5"), T0)
        .await
        .unwrap();

    let (status, body) = get_json(app(&h), "/v1/holdings").await;
    assert_eq!(status, StatusCode::OK);
    let holdings = body["holdings"].as_array().unwrap();
    assert_eq!(holdings.len(), 2);
    assert_eq!(holdings[0]["symbol"], "SOL");
    assert_eq!(holdings[0]["amount"].as_f64(), Some(0.0));
    assert_eq!(holdings[1]["symbol"], "USDC");
    assert_eq!(holdings[1]["mint"], h.usdc().as_str());
    assert_eq!(holdings[1]["amount"].as_f64(), Some(1.5));
}
