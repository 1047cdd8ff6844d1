use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use futures_util::FutureExt;
use log::*;
use p2p_order_engine::{
    events::{channels_for, EventHandlers, EventHooks, EventProducers},
    traits::{EscrowService, MempoolStore, OrderStore},
    MempoolApi,
    OrderFlowApi,
    SqliteDatabase,
};

use crate::{
    bump_worker::start_bump_worker,
    config::ServerConfig,
    errors::ServerError,
    escrow_client::HttpEscrowService,
    expiry_worker::start_expiry_worker,
    helpers::connect_database,
    routes::{
        health,
        AdvertiseOrderRoute,
        BumpEntryRoute,
        CancelOrderRoute,
        CreateOrderRoute,
        MerchantOrdersRoute,
        OrderByIdRoute,
        PoolRoute,
        RaiseDisputeRoute,
        ReleaseEscrowRoute,
        ReportEscrowLockRoute,
        RequestExtensionRoute,
        ResolveDisputeRoute,
        RespondToExtensionRoute,
        SearchOrdersRoute,
        TransitionOrderRoute,
        UserOrdersRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = connect_database(&config).await?;
    let handlers = EventHandlers::new(config.event_buffer_size, create_event_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    if config.run_embedded_workers {
        start_expiry_worker(db.clone(), producers.clone(), config.expiry_poll_interval);
        start_bump_worker(db.clone(), producers.clone(), config.bump_poll_interval);
    }
    let escrow = HttpEscrowService::new(&config.escrow)?;
    let srv = create_server_instance(config, db, escrow, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// The server's own subscribers. Realtime fan-out to clients is done by the broker the events are published to; here we
/// only keep a record of what went where.
pub fn create_event_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_event(|ev| {
        async move {
            let channels = channels_for(&ev).iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ");
            info!(
                "📬️ {} for order {} (version {:?}) published to [{channels}]",
                ev.name(),
                ev.order_id(),
                ev.order_version()
            );
        }
        .boxed()
    });
    hooks.on_premium_bumped(|ev| {
        async move {
            info!(
                "📬️ Pool entry #{} for order {} bumped to {}{}",
                ev.entry_id,
                ev.order_id,
                ev.new_premium_bps,
                if ev.max_reached { " (cap reached)" } else { "" }
            );
        }
        .boxed()
    });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    escrow: HttpEscrowService,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let default_ttl = config.default_order_ttl();
    let srv = HttpServer::new(move || {
        let orders_api =
            OrderFlowApi::with_escrow(db.clone(), escrow.clone(), producers.clone()).with_default_ttl(default_ttl);
        let mempool_api = MempoolApi::new(db.clone(), producers.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("p2p::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(mempool_api))
            .configure(configure_routes::<SqliteDatabase, HttpEscrowService>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers every route, plus extractor settings that turn malformed requests into JSON errors.
///
/// The caller supplies `OrderFlowApi<B, E>` and `MempoolApi<B>` as app data.
pub fn configure_routes<B, E>(cfg: &mut web::ServiceConfig)
where
    B: OrderStore + MempoolStore + 'static,
    E: EscrowService + 'static,
{
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default().error_handler(|err, _req| ServerError::InvalidRequestQuery(err.to_string()).into()),
    )
    .service(health)
    .service(SearchOrdersRoute::<B, E>::new())
    .service(CreateOrderRoute::<B, E>::new())
    .service(OrderByIdRoute::<B, E>::new())
    .service(TransitionOrderRoute::<B, E>::new())
    .service(CancelOrderRoute::<B, E>::new())
    .service(ReportEscrowLockRoute::<B, E>::new())
    .service(ReleaseEscrowRoute::<B, E>::new())
    .service(RaiseDisputeRoute::<B, E>::new())
    .service(ResolveDisputeRoute::<B, E>::new())
    .service(RequestExtensionRoute::<B, E>::new())
    .service(RespondToExtensionRoute::<B, E>::new())
    .service(MerchantOrdersRoute::<B, E>::new())
    .service(UserOrdersRoute::<B, E>::new())
    .service(AdvertiseOrderRoute::<B>::new())
    .service(BumpEntryRoute::<B>::new())
    .service(PoolRoute::<B>::new());
}
