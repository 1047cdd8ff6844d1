use chrono::{Duration, Utc};
use p2p_common::Bps;
use p2p_order_engine::{
    db_types::{NewMempoolEntry, OrderId, OrderStatusType},
    events::EventProducers,
    test_utils::{
        buy_order,
        prepare_env::{prepare_test_env, random_db_path},
    },
    traits::OrderStore,
    MempoolApi,
    OrderFlowApi,
    SqliteDatabase,
};
use p2p_order_server::{bump_worker::run_bump_pass, expiry_worker::run_expiry_pass};

async fn tear_down(db: SqliteDatabase) {
    let mut db = db;
    let _ = db.close().await;
    if let Some(path) = db.url().strip_prefix("sqlite://") {
        let _ = std::fs::remove_file(path);
    }
}

#[tokio::test]
async fn expiry_pass_expires_overdue_orders_only() {
    let db = prepare_test_env(&random_db_path()).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    api.create_order(buy_order("o1", "alice", "m1")).await.unwrap();
    api.create_order(buy_order("o2", "bob", "m1").with_ttl(Duration::hours(2))).await.unwrap();

    let result = run_expiry_pass(&api, Utc::now()).await.expect("expiry pass failed");
    assert_eq!(result.expired_count(), 0);

    let result = run_expiry_pass(&api, Utc::now() + Duration::minutes(31)).await.expect("expiry pass failed");
    assert_eq!(result.expired_count(), 1);
    assert_eq!(result.failed_count(), 0);
    let expired = api.fetch_order(&OrderId::from("o1")).await.unwrap();
    assert_eq!(expired.status, OrderStatusType::Expired);
    assert_eq!(expired.order_version, 2);
    let open = api.fetch_order(&OrderId::from("o2")).await.unwrap();
    assert_eq!(open.status, OrderStatusType::Pending);
    tear_down(db).await;
}

#[tokio::test]
async fn bump_pass_raises_due_entries_once_per_interval() {
    let db = prepare_test_env(&random_db_path()).await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    orders.create_order(buy_order("o1", "alice", "m1")).await.unwrap();
    orders.create_order(buy_order("o2", "bob", "m1")).await.unwrap();
    let api = MempoolApi::new(db.clone(), EventProducers::default());
    let entry = |id: &str, auto_bump_enabled: bool| NewMempoolEntry {
        order_id: OrderId::from(id),
        premium_bps_base: Bps::from(20),
        max_premium_bps: Bps::from(25),
        bump_step_bps: Bps::from(10),
        bump_interval_sec: 60,
        auto_bump_enabled,
        ttl_secs: 3600,
    };
    let auto = api.advertise(entry("o1", true)).await.unwrap();
    api.advertise(entry("o2", false)).await.unwrap();

    let run = run_bump_pass(&api, Utc::now()).await.expect("bump pass failed");
    assert_eq!(run.bumped_count(), 0);

    let later = Utc::now() + Duration::seconds(61);
    let run = run_bump_pass(&api, later).await.expect("bump pass failed");
    assert_eq!(run.bumped_count(), 1);
    assert_eq!(run.failure_count(), 0);
    assert_eq!(run.bumped[0].id, auto.id);
    assert_eq!(run.bumped[0].premium_bps_current, Bps::from(25));

    // At its cap the entry is no longer a candidate
    let run = run_bump_pass(&api, later + Duration::seconds(120)).await.expect("bump pass failed");
    assert_eq!(run.bumped_count(), 0);
    tear_down(db).await;
}
