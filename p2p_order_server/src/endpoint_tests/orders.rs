use actix_web::{http::StatusCode, test::TestRequest};
use p2p_order_engine::{db_types::OrderId, test_utils::buy_order, traits::EscrowError};
use serde_json::{json, Value};

use super::{helpers::TestBackend, mocks::MockEscrow};

async fn create(backend: &TestBackend, id: &str) -> Value {
    let body = serde_json::to_value(buy_order(id, "alice", "m1")).unwrap();
    let (status, order) = backend.send(TestRequest::post().uri("/orders").set_json(body)).await;
    assert_eq!(status, StatusCode::OK);
    order
}

fn merchant() -> Value {
    json!({"actorType": "merchant", "actorId": "m1"})
}

fn with_actor(actor: Value, extra: Value) -> Value {
    let mut body = actor;
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    body
}

#[actix_web::test]
async fn health_check() {
    let backend = TestBackend::new().await;
    let (status, body) = backend.send(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("👍️\n"));
    backend.tear_down().await;
}

#[actix_web::test]
async fn create_and_fetch_an_order() {
    let backend = TestBackend::new().await;
    let order = create(&backend, "o1").await;
    assert_eq!(order["id"], "o1");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["order_version"], 1);
    assert_eq!(order["type"], "buy");

    // Posting the same order again is harmless
    let again = create(&backend, "o1").await;
    assert_eq!(again["order_version"], 1);

    let (status, fetched) = backend.send(TestRequest::get().uri("/orders/o1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["order_number"], order["order_number"]);

    let (status, body) = backend.send(TestRequest::get().uri("/orders/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
    backend.tear_down().await;
}

#[actix_web::test]
async fn malformed_bodies_are_json_errors() {
    let backend = TestBackend::new().await;
    let (status, body) = backend.send(TestRequest::post().uri("/orders").set_json(json!({"type": "buy"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    backend.tear_down().await;
}

#[actix_web::test]
async fn transitions_respect_the_lifecycle_and_versions() {
    let backend = TestBackend::new().await;
    create(&backend, "o1").await;

    let accept = with_actor(merchant(), json!({"status": "accepted", "expected_version": 1}));
    let (status, order) = backend.send(TestRequest::patch().uri("/orders/o1").set_json(accept.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "accepted");
    assert_eq!(order["order_version"], 2);

    // The same request again is now stale
    let (status, body) = backend.send(TestRequest::patch().uri("/orders/o1").set_json(accept)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Expected version 1"));

    // Completion has to go through the escrow release
    let complete = with_actor(merchant(), json!({"status": "completed"}));
    let (status, _) = backend.send(TestRequest::patch().uri("/orders/o1").set_json(complete)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, order) = backend.send(TestRequest::get().uri("/orders/o1")).await;
    assert_eq!(order["order_version"], 2);
    backend.tear_down().await;
}

#[actix_web::test]
async fn cancel_a_pending_order() {
    let backend = TestBackend::new().await;
    create(&backend, "o1").await;
    let body = json!({"actorType": "user", "actorId": "alice", "reason": "changed my mind"});
    let (status, order) = backend.send(TestRequest::delete().uri("/orders/o1").set_json(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "cancelled");
    assert_eq!(order["cancellation_reason"], "changed my mind");

    // Strangers cannot cancel, and cancelled orders stay cancelled
    let body = json!({"actorType": "user", "actorId": "mallory"});
    let (status, _) = backend.send(TestRequest::delete().uri("/orders/o1").set_json(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    backend.tear_down().await;
}

#[actix_web::test]
async fn escrowed_orders_are_refunded_before_cancelling() {
    let backend = TestBackend::new().await;
    create(&backend, "o1").await;
    let accept = with_actor(merchant(), json!({"status": "accepted"}));
    backend.send(TestRequest::patch().uri("/orders/o1").set_json(accept)).await;

    let lock = with_actor(merchant(), json!({"tx_hash": "tx-lock", "escrow_address": "escrow-1"}));
    let (status, order) = backend.send(TestRequest::post().uri("/orders/o1/escrow").set_json(lock)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "escrowed");
    assert_eq!(order["order_version"], 4);
    assert_eq!(order["escrow"]["escrow_tx_hash"], "tx-lock");

    // The escrow service is down: nothing changes
    let mut escrow = MockEscrow::new();
    escrow.expect_refund().times(1).returning(|_| Err(EscrowError::Unavailable("offline".into())));
    let cancel = json!({"actorType": "user", "actorId": "alice"});
    let (status, _) =
        backend.send_with_escrow(escrow, TestRequest::delete().uri("/orders/o1").set_json(cancel.clone())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let (_, order) = backend.send(TestRequest::get().uri("/orders/o1")).await;
    assert_eq!(order["status"], "escrowed");

    let mut escrow = MockEscrow::new();
    escrow
        .expect_refund()
        .withf(|order| order.id == OrderId::from("o1"))
        .times(1)
        .returning(|_| Ok("tx-refund".to_string()));
    let (status, order) =
        backend.send_with_escrow(escrow, TestRequest::delete().uri("/orders/o1").set_json(cancel)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "cancelled");
    assert_eq!(order["escrow"]["refund_tx_hash"], "tx-refund");
    backend.tear_down().await;
}

#[actix_web::test]
async fn release_completes_the_trade() {
    let backend = TestBackend::new().await;
    create(&backend, "o1").await;
    let alice = json!({"actorType": "user", "actorId": "alice"});
    let steps = [
        (merchant(), "accepted"),
        (alice.clone(), "payment_pending"),
        (alice.clone(), "payment_sent"),
        (merchant(), "payment_confirmed"),
    ];
    let lock = with_actor(merchant(), json!({"tx_hash": "tx-lock"}));
    for (i, (actor, status)) in steps.into_iter().enumerate() {
        let (code, order) = backend
            .send(TestRequest::patch().uri("/orders/o1").set_json(with_actor(actor, json!({"status": status}))))
            .await;
        assert_eq!(code, StatusCode::OK, "step to {status} failed: {order}");
        if i == 0 {
            let (code, _) = backend.send(TestRequest::post().uri("/orders/o1/escrow").set_json(lock.clone())).await;
            assert_eq!(code, StatusCode::OK);
        }
    }

    let mut escrow = MockEscrow::new();
    escrow.expect_release().times(1).returning(|_| Ok("tx-release".to_string()));
    let (status, order) =
        backend.send_with_escrow(escrow, TestRequest::patch().uri("/orders/o1/escrow").set_json(merchant())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "completed");
    assert_eq!(order["escrow"]["release_tx_hash"], "tx-release");
    backend.tear_down().await;
}

#[actix_web::test]
async fn disputes_are_raised_by_parties_and_settled_by_compliance() {
    let backend = TestBackend::new().await;
    create(&backend, "o1").await;
    let accept = with_actor(merchant(), json!({"status": "accepted"}));
    backend.send(TestRequest::patch().uri("/orders/o1").set_json(accept)).await;

    let dispute = json!({"actorType": "user", "actorId": "alice", "reason": "no response"});
    let (status, order) = backend.send(TestRequest::post().uri("/orders/o1/dispute").set_json(dispute)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "disputed");

    let resolve = with_actor(merchant(), json!({"resolution": "resume"}));
    let (status, _) = backend.send(TestRequest::patch().uri("/orders/o1/dispute").set_json(resolve)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let resolve = json!({"actorType": "compliance", "actorId": "c1", "resolution": "resume"});
    let (status, order) = backend.send(TestRequest::patch().uri("/orders/o1/dispute").set_json(resolve)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "accepted");
    backend.tear_down().await;
}

#[actix_web::test]
async fn extensions_need_the_other_party() {
    let backend = TestBackend::new().await;
    create(&backend, "o1").await;
    let request = json!({"actorType": "user", "actorId": "alice", "minutes": 15});
    let (status, order) = backend.send(TestRequest::post().uri("/orders/o1/extension").set_json(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["pending_extension"]["minutes"], 15);

    let own_answer = json!({"actorType": "user", "actorId": "alice", "accept": true});
    let (status, _) = backend.send(TestRequest::patch().uri("/orders/o1/extension").set_json(own_answer)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let answer = with_actor(merchant(), json!({"accept": true}));
    let (status, order) = backend.send(TestRequest::patch().uri("/orders/o1/extension").set_json(answer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["extension_count"], 1);
    assert!(order["pending_extension"].is_null());
    backend.tear_down().await;
}

#[actix_web::test]
async fn orders_by_party_and_search() {
    let backend = TestBackend::new().await;
    create(&backend, "o1").await;
    create(&backend, "o2").await;
    let body = serde_json::to_value(buy_order("o3", "bob", "m2")).unwrap();
    backend.send(TestRequest::post().uri("/orders").set_json(body)).await;
    let accept = with_actor(merchant(), json!({"status": "accepted"}));
    backend.send(TestRequest::patch().uri("/orders/o2").set_json(accept)).await;

    let (status, orders) = backend.send(TestRequest::get().uri("/merchants/m1/orders")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 2);

    let (_, orders) = backend.send(TestRequest::get().uri("/users/bob/orders")).await;
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["id"], "o3");

    let (status, orders) = backend.send(TestRequest::get().uri("/orders?merchant_id=m1&status=accepted")).await;
    assert_eq!(status, StatusCode::OK);
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["id"], "o2");

    let (status, body) = backend.send(TestRequest::get().uri("/orders?status=lost")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    backend.tear_down().await;
}
