use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use log::*;
use p2p_order_engine::{
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{EscrowService, NoEscrowService, OrderStore},
    MempoolApi,
    OrderFlowApi,
    SqliteDatabase,
};
use serde_json::Value;

use crate::server::configure_routes;

/// A fresh database per test. Each request builds the app over it, so state carries over between requests.
pub struct TestBackend {
    pub db: SqliteDatabase,
}

impl TestBackend {
    pub async fn new() -> Self {
        let _ = env_logger::try_init();
        let db = prepare_test_env(&random_db_path()).await;
        Self { db }
    }

    pub async fn send(&self, req: TestRequest) -> (StatusCode, Value) {
        self.send_with_escrow(NoEscrowService, req).await
    }

    pub async fn send_with_escrow<E: EscrowService + 'static>(&self, escrow: E, req: TestRequest) -> (StatusCode, Value) {
        let orders_api = OrderFlowApi::with_escrow(self.db.clone(), escrow, EventProducers::default());
        let mempool_api = MempoolApi::new(self.db.clone(), EventProducers::default());
        let app = App::new()
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(mempool_api))
            .configure(configure_routes::<SqliteDatabase, E>);
        let service = test::init_service(app).await;
        debug!("Making request");
        let (_, res) = test::try_call_service(&service, req.to_request()).await.expect("Request failed").into_parts();
        let status = res.status();
        let body = res.into_body().try_into_bytes().expect("Could not read body");
        let value = serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
        (status, value)
    }

    pub async fn tear_down(self) {
        let mut db = self.db;
        if let Err(e) = db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Some(path) = db.url().strip_prefix("sqlite://") {
            let _ = std::fs::remove_file(path);
        }
    }
}
