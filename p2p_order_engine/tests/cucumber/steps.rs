use std::time::Duration;

use chrono::Utc;
use cucumber::{given, then, when};
use p2p_order_engine::{
    db_types::{Actor, ActorType, DisputeResolution, OrderId, OrderStatusType},
    test_utils::{buy_order, sell_order},
};

use crate::cucumber::{world::OrderManagementSystem, OrderWorld};

fn actor(kind: &str, id: &str) -> Actor {
    let kind = kind.parse::<ActorType>().expect("Not a valid actor type");
    Actor::new(kind, id)
}

#[given("a fresh install")]
async fn fresh_database(world: &mut OrderWorld) {
    let system = OrderManagementSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a {word} order {word} from user {word} with merchant {word}")]
async fn create_order(world: &mut OrderWorld, order_type: String, id: String, user: String, merchant: String) {
    let order = match order_type.as_str() {
        "buy" => buy_order(&id, &user, &merchant),
        "sell" => sell_order(&id, &user, &merchant),
        other => panic!("Unknown order type {other}"),
    };
    world.api().create_order(order).await.expect("Error creating order");
}

#[when(expr = "{word} {word} accepts order {word}")]
async fn accept(world: &mut OrderWorld, kind: String, id: String, order_id: String) {
    let result = world.api().accept_order(&OrderId::from(order_id), &actor(&kind, &id)).await;
    world.record(result);
}

#[when(expr = "{word} {word} locks escrow for order {word} in tx {word}")]
async fn lock_escrow(world: &mut OrderWorld, kind: String, id: String, order_id: String, tx: String) {
    let result =
        world.api().confirm_escrow_locked(&OrderId::from(order_id), &actor(&kind, &id), &tx, Some("escrow-pda".into())).await;
    world.record(result);
}

#[when(expr = "{word} {word} starts paying for order {word}")]
async fn start_payment(world: &mut OrderWorld, kind: String, id: String, order_id: String) {
    let result = world.api().start_payment(&OrderId::from(order_id), &actor(&kind, &id)).await;
    world.record(result);
}

#[when(expr = "{word} {word} marks order {word} as paid")]
async fn payment_sent(world: &mut OrderWorld, kind: String, id: String, order_id: String) {
    let result = world.api().mark_payment_sent(&OrderId::from(order_id), &actor(&kind, &id)).await;
    world.record(result);
}

#[when(expr = "{word} {word} confirms payment for order {word}")]
async fn confirm_payment(world: &mut OrderWorld, kind: String, id: String, order_id: String) {
    let result = world.api().confirm_payment(&OrderId::from(order_id), &actor(&kind, &id)).await;
    world.record(result);
}

#[when(expr = "{word} {word} releases the escrow for order {word}")]
async fn release(world: &mut OrderWorld, kind: String, id: String, order_id: String) {
    let result = world.api().release_escrow(&OrderId::from(order_id), &actor(&kind, &id)).await;
    world.record(result);
}

#[when(expr = "{word} {word} cancels order {word}")]
async fn cancel(world: &mut OrderWorld, kind: String, id: String, order_id: String) {
    let result = world.api().cancel_order(&OrderId::from(order_id), &actor(&kind, &id), Some("changed my mind".into())).await;
    world.record(result);
}

#[when(expr = "{word} {word} disputes order {word} because {string}")]
async fn dispute(world: &mut OrderWorld, kind: String, id: String, order_id: String, reason: String) {
    let result = world.api().raise_dispute(&OrderId::from(order_id), &actor(&kind, &id), reason, None).await;
    world.record(result);
}

#[when(expr = "{word} {word} resolves the dispute on order {word} with {word}")]
async fn resolve(world: &mut OrderWorld, kind: String, id: String, order_id: String, resolution: String) {
    let resolution = resolution.parse::<DisputeResolution>().expect("Not a valid resolution");
    let result = world.api().resolve_dispute(&OrderId::from(order_id), &actor(&kind, &id), resolution).await;
    world.record(result);
}

#[when(expr = "{word} {word} asks for {int} more minutes on order {word}")]
async fn request_extension(world: &mut OrderWorld, kind: String, id: String, minutes: i64, order_id: String) {
    let result = world.api().request_extension(&OrderId::from(order_id), &actor(&kind, &id), minutes).await;
    world.record(result);
}

#[when(expr = "{word} {word} {word} the extension on order {word}")]
async fn respond_extension(world: &mut OrderWorld, kind: String, id: String, answer: String, order_id: String) {
    let accept = match answer.as_str() {
        "accepts" => true,
        "declines" => false,
        other => panic!("Unknown answer {other}"),
    };
    let result = world.api().respond_to_extension(&OrderId::from(order_id), &actor(&kind, &id), accept).await;
    world.record(result);
}

#[when(expr = "the expiry job runs {int} minutes from now")]
async fn run_expiry(world: &mut OrderWorld, minutes: i64) {
    let now = Utc::now() + chrono::Duration::minutes(minutes);
    let result = world.api().expire_overdue_orders(now).await.expect("Error running expiry job");
    assert!(result.failed.is_empty(), "Some orders failed to expire: {:?}", result.failed);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut OrderWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[then("the last action succeeds")]
async fn last_action_succeeds(world: &mut OrderWorld) {
    match &world.last_result {
        Some(Ok(_)) => {},
        Some(Err(e)) => panic!("Expected success, got: {e}"),
        None => panic!("No action was taken"),
    }
}

#[then(expr = "the last action fails with {string}")]
async fn last_action_fails(world: &mut OrderWorld, fragment: String) {
    match &world.last_result {
        Some(Err(e)) => assert!(e.contains(&fragment), "Expected error containing '{fragment}', got '{e}'"),
        Some(Ok(order)) => panic!("Expected failure, but order {} is now {}", order.id, order.status),
        None => panic!("No action was taken"),
    }
}

#[then(expr = "order {word} is {word} at version {int}")]
async fn check_status(world: &mut OrderWorld, order_id: String, status: String, version: i64) {
    let status = status.parse::<OrderStatusType>().expect("Not a valid status");
    let order = world.api().fetch_order(&OrderId::from(order_id)).await.expect("Error fetching order");
    assert_eq!(order.status, status);
    assert_eq!(order.minimal_status, status.minimal());
    assert_eq!(order.order_version, version);
}

#[then(expr = "order {word} was cancelled by a {word}")]
async fn check_cancelled_by(world: &mut OrderWorld, order_id: String, kind: String) {
    let kind = kind.parse::<ActorType>().expect("Not a valid actor type");
    let order = world.api().fetch_order(&OrderId::from(order_id)).await.expect("Error fetching order");
    assert_eq!(order.cancelled_by, Some(kind));
}

#[then(expr = "order {word} has used {int} extension(s)")]
async fn check_extensions(world: &mut OrderWorld, order_id: String, count: i32) {
    let order = world.api().fetch_order(&OrderId::from(order_id)).await.expect("Error fetching order");
    assert_eq!(order.extension_count, count);
    assert!(order.pending_extension.is_none(), "An extension request is still pending");
}

#[then(expr = "the published versions for order {word} are {string}")]
async fn check_event_versions(world: &mut OrderWorld, order_id: String, versions: String) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let id = OrderId::from(order_id);
    let expected = versions.split(',').map(|v| v.trim().parse::<i64>().expect("Not a version")).collect::<Vec<_>>();
    let published = world
        .events()
        .into_iter()
        .filter(|e| e.order_id() == &id)
        .filter_map(|e| e.order_version())
        .collect::<Vec<_>>();
    assert_eq!(published, expected);
}
