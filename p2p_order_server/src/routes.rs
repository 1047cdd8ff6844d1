//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, escrow calls) should be
//! expressed as futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus
//! don’t block execution.
//!
//! Every mutation names its actor in the request body (`actorType`, `actorId`). There is no authentication layer; the
//! lifecycle rules decide whether that actor may make the change.
use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use p2p_order_engine::{
    db_types::{Actor, NewMempoolEntry, NewOrder, OrderId},
    order_objects::{
        ActorParams,
        CancelParams,
        DisputeParams,
        EscrowLockParams,
        ExtensionRequestParams,
        ExtensionResponseParams,
        ResolveDisputeParams,
        TransitionParams,
    },
    traits::{EscrowService, MempoolStore, OrderQueryFilter, OrderStore},
    MempoolApi,
    OrderFlowApi,
};

use crate::{
    data_objects::{OrderSearchQuery, PoolQuery},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

/// The storage the auction needs: orders and pool entries from the same backend.
pub trait PoolBackend: OrderStore + MempoolStore {}

impl<T: OrderStore + MempoolStore> PoolBackend for T {}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(search_orders => Get "/orders" impl OrderStore, EscrowService);
/// `GET /orders?user_id=..&merchant_id=..&since=..&until=..&status=pending,accepted`
pub async fn search_orders<B: OrderStore, E: EscrowService>(
    query: web::Query<OrderSearchQuery>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders search for [{query}]");
    let filter = OrderQueryFilter::try_from(query.into_inner())?;
    let orders = api.search_orders(filter).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(create_order => Post "/orders" impl OrderStore, EscrowService);
/// Creates an order in `pending` status. Posting an order with an id that already exists returns the stored order.
pub async fn create_order<B: OrderStore, E: EscrowService>(
    body: web::Json<NewOrder>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order = body.into_inner();
    debug!("💻️ POST new {} order from user {} to merchant {}", order.order_type, order.user_id, order.merchant_id);
    let order = api.create_order(order).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(order_by_id => Get "/orders/{order_id}" impl OrderStore, EscrowService);
pub async fn order_by_id<B: OrderStore, E: EscrowService>(
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order {order_id}");
    let order = api.fetch_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(transition_order => Patch "/orders/{order_id}" impl OrderStore, EscrowService);
/// A plain status change. Send `expected_version` to have the change refused if the order has moved on.
pub async fn transition_order<B: OrderStore, E: EscrowService>(
    path: web::Path<OrderId>,
    body: web::Json<TransitionParams>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let params = body.into_inner();
    debug!("💻️ PATCH order {order_id} to {} by {}", params.status, params.actor);
    let order = api.transition(&order_id, params.status, &params.actor, params.expected_version).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(cancel_order => Delete "/orders/{order_id}" impl OrderStore, EscrowService);
/// Cancels the order. Escrowed funds are refunded to the seller first.
pub async fn cancel_order<B: OrderStore, E: EscrowService>(
    path: web::Path<OrderId>,
    body: web::Json<CancelParams>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let CancelParams { actor, reason } = body.into_inner();
    debug!("💻️ DELETE order {order_id} by {actor}");
    let order = api.cancel_order(&order_id, &actor, reason).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Escrow  ----------------------------------------------------
route!(report_escrow_lock => Post "/orders/{order_id}/escrow" impl OrderStore, EscrowService);
pub async fn report_escrow_lock<B: OrderStore, E: EscrowService>(
    path: web::Path<OrderId>,
    body: web::Json<EscrowLockParams>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let EscrowLockParams { actor, tx_hash, escrow_address } = body.into_inner();
    debug!("💻️ POST escrow lock {tx_hash} for order {order_id} by {actor}");
    let order = api.confirm_escrow_locked(&order_id, &actor, &tx_hash, escrow_address).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(release_escrow => Patch "/orders/{order_id}/escrow" impl OrderStore, EscrowService);
/// Releases the escrow to the buyer, completing the order.
pub async fn release_escrow<B: OrderStore, E: EscrowService>(
    path: web::Path<OrderId>,
    body: web::Json<ActorParams>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let actor = body.into_inner().actor;
    debug!("💻️ PATCH escrow release for order {order_id} by {actor}");
    let order = api.release_escrow(&order_id, &actor).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Disputes  ----------------------------------------------------
route!(raise_dispute => Post "/orders/{order_id}/dispute" impl OrderStore, EscrowService);
pub async fn raise_dispute<B: OrderStore, E: EscrowService>(
    path: web::Path<OrderId>,
    body: web::Json<DisputeParams>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let DisputeParams { actor, reason, description } = body.into_inner();
    debug!("💻️ POST dispute on order {order_id} by {actor}: {reason}");
    let order = api.raise_dispute(&order_id, &actor, reason, description).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(resolve_dispute => Patch "/orders/{order_id}/dispute" impl OrderStore, EscrowService);
pub async fn resolve_dispute<B: OrderStore, E: EscrowService>(
    path: web::Path<OrderId>,
    body: web::Json<ResolveDisputeParams>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let ResolveDisputeParams { actor, resolution } = body.into_inner();
    debug!("💻️ PATCH dispute on order {order_id} by {actor}: {resolution}");
    let order = api.resolve_dispute(&order_id, &actor, resolution).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Extensions  ----------------------------------------------------
route!(request_extension => Post "/orders/{order_id}/extension" impl OrderStore, EscrowService);
pub async fn request_extension<B: OrderStore, E: EscrowService>(
    path: web::Path<OrderId>,
    body: web::Json<ExtensionRequestParams>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let ExtensionRequestParams { actor, minutes } = body.into_inner();
    debug!("💻️ POST {minutes} minute extension for order {order_id} by {actor}");
    let order = api.request_extension(&order_id, &actor, minutes).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(respond_to_extension => Patch "/orders/{order_id}/extension" impl OrderStore, EscrowService);
pub async fn respond_to_extension<B: OrderStore, E: EscrowService>(
    path: web::Path<OrderId>,
    body: web::Json<ExtensionResponseParams>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let ExtensionResponseParams { actor, accept } = body.into_inner();
    debug!("💻️ PATCH extension for order {order_id} by {actor}. Accepted: {accept}");
    let order = api.respond_to_extension(&order_id, &actor, accept).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Parties  ----------------------------------------------------
route!(merchant_orders => Get "/merchants/{merchant_id}/orders" impl OrderStore, EscrowService);
/// Orders where the merchant is the counterparty or the buying merchant.
pub async fn merchant_orders<B: OrderStore, E: EscrowService>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let actor = Actor::merchant(path.into_inner());
    debug!("💻️ GET orders for {actor}");
    let orders = api.orders_for_actor(&actor).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(user_orders => Get "/users/{user_id}/orders" impl OrderStore, EscrowService);
pub async fn user_orders<B: OrderStore, E: EscrowService>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, E>>,
) -> Result<HttpResponse, ServerError> {
    let actor = Actor::user(path.into_inner());
    debug!("💻️ GET orders for {actor}");
    let orders = api.orders_for_actor(&actor).await?;
    Ok(HttpResponse::Ok().json(orders))
}

//----------------------------------------------   Mempool  ----------------------------------------------------
route!(advertise_order => Post "/mempool" impl PoolBackend);
/// Puts a live order into the matching pool at its base premium.
pub async fn advertise_order<B: PoolBackend>(
    body: web::Json<NewMempoolEntry>,
    api: web::Data<MempoolApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let entry = body.into_inner();
    debug!("💻️ POST order {} to the pool at {}", entry.order_id, entry.premium_bps_base);
    let entry = api.advertise(entry).await?;
    Ok(HttpResponse::Ok().json(entry))
}

route!(bump_entry => Post "/mempool/{entry_id}/bump" impl PoolBackend);
/// Raises the entry's premium by one step. Answers `{new_premium_bps, max_reached}`.
pub async fn bump_entry<B: PoolBackend>(
    path: web::Path<i64>,
    api: web::Data<MempoolApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let entry_id = path.into_inner();
    debug!("💻️ POST manual bump for pool entry #{entry_id}");
    let bump = api.bump_entry(entry_id).await?;
    Ok(HttpResponse::Ok().json(bump))
}

route!(pool => Get "/mempool" impl PoolBackend);
/// `GET /mempool?sort=premium_desc&filter=mineable,high_premium`
pub async fn pool<B: PoolBackend>(
    query: web::Query<PoolQuery>,
    api: web::Data<MempoolApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let query = query.into_inner();
    let filters = query.filters()?;
    debug!("💻️ GET pool sorted by {:?} with filters {filters:?}", query.sort);
    let items = api.pool(Utc::now(), query.sort, &filters).await?;
    Ok(HttpResponse::Ok().json(items))
}
