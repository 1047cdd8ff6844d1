use actix_web::{http::StatusCode, test::TestRequest};
use p2p_order_engine::test_utils::buy_order;
use serde_json::{json, Value};

use super::helpers::TestBackend;

async fn advertised(backend: &TestBackend, id: &str, base: i64, cap: i64) -> Value {
    let body = serde_json::to_value(buy_order(id, "alice", "m1")).unwrap();
    let (status, _) = backend.send(TestRequest::post().uri("/orders").set_json(body)).await;
    assert_eq!(status, StatusCode::OK);
    let entry = json!({
        "order_id": id,
        "premium_bps_base": base,
        "max_premium_bps": cap,
        "bump_step_bps": 10,
        "bump_interval_sec": 60,
        "auto_bump_enabled": true,
        "ttl_secs": 600
    });
    let (status, entry) = backend.send(TestRequest::post().uri("/mempool").set_json(entry)).await;
    assert_eq!(status, StatusCode::OK, "{entry}");
    entry
}

#[actix_web::test]
async fn manual_bumps_stop_at_the_cap() {
    let backend = TestBackend::new().await;
    let entry = advertised(&backend, "o1", 20, 35).await;
    assert_eq!(entry["premium_bps_current"], 20);
    let uri = format!("/mempool/{}/bump", entry["id"]);

    let (status, bump) = backend.send(TestRequest::post().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bump, json!({"new_premium_bps": 30, "max_reached": false}));

    let (_, bump) = backend.send(TestRequest::post().uri(&uri)).await;
    assert_eq!(bump, json!({"new_premium_bps": 35, "max_reached": true}));

    let (_, bump) = backend.send(TestRequest::post().uri(&uri)).await;
    assert_eq!(bump, json!({"new_premium_bps": 35, "max_reached": true}));

    let (status, body) = backend.send(TestRequest::post().uri("/mempool/9999/bump")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
    backend.tear_down().await;
}

#[actix_web::test]
async fn invalid_entries_are_refused() {
    let backend = TestBackend::new().await;
    let entry = json!({
        "order_id": "missing",
        "premium_bps_base": 10,
        "max_premium_bps": 20,
        "bump_interval_sec": 60,
        "ttl_secs": 600
    });
    let (status, _) = backend.send(TestRequest::post().uri("/mempool").set_json(entry)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = serde_json::to_value(buy_order("o1", "alice", "m1")).unwrap();
    backend.send(TestRequest::post().uri("/orders").set_json(body)).await;
    let entry = json!({
        "order_id": "o1",
        "premium_bps_base": 40,
        "max_premium_bps": 20,
        "bump_interval_sec": 60,
        "ttl_secs": 600
    });
    let (status, body) = backend.send(TestRequest::post().uri("/mempool").set_json(entry)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("cap"));
    backend.tear_down().await;
}

#[actix_web::test]
async fn the_pool_can_be_sorted_and_filtered() {
    let backend = TestBackend::new().await;
    advertised(&backend, "o1", 20, 100).await;
    advertised(&backend, "o2", 80, 100).await;

    let (status, pool) = backend.send(TestRequest::get().uri("/mempool?sort=premium_desc")).await;
    assert_eq!(status, StatusCode::OK);
    let ids = pool.as_array().unwrap().iter().map(|i| i["entry"]["order_id"].clone()).collect::<Vec<_>>();
    assert_eq!(ids, vec![json!("o2"), json!("o1")]);

    let (_, pool) = backend.send(TestRequest::get().uri("/mempool?filter=high_premium")).await;
    let pool = pool.as_array().unwrap();
    assert_eq!(pool.len(), 1);
    assert_eq!(pool[0]["entry"]["order_id"], "o2");

    let (status, body) = backend.send(TestRequest::get().uri("/mempool?filter=cheap")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("cheap"));

    // Closed orders drop out of the pool
    let cancel = json!({"actorType": "user", "actorId": "alice"});
    backend.send(TestRequest::delete().uri("/orders/o2").set_json(cancel)).await;
    let (_, pool) = backend.send(TestRequest::get().uri("/mempool")).await;
    assert_eq!(pool.as_array().unwrap().len(), 1);
    backend.tear_down().await;
}
