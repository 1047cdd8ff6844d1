use std::future::Future;

use log::*;
use p2p_order_engine::{
    auction::PoolItem,
    db_types::{Actor, ActorType, MempoolEntry, NewMempoolEntry, NewOrder, Order, OrderId, OrderStatusType},
    events::ChatMessagePayload,
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
    ManualBump,
};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Response,
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    chat::{MessageSender, OutgoingMessage},
    SyncError,
};

/// Where the pipeline gets full orders from: the initial load of a session, and the refetch after events that
/// did not carry enough data.
pub trait OrderFetcher: Send + Sync + 'static {
    fn fetch_orders_for(&self, actor: &Actor) -> impl Future<Output = Result<Vec<Order>, SyncError>> + Send;
    fn fetch_order(&self, id: &OrderId) -> impl Future<Output = Result<Order, SyncError>> + Send;
}

/// A client for the order server's REST interface.
#[derive(Debug, Clone)]
pub struct RestOrderClient {
    client: Client,
    server: Url,
}

impl RestOrderClient {
    pub fn new(server: Url) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder().user_agent("P2P order sync client").default_headers(headers).build()?;
        Ok(Self { client, server })
    }

    pub fn server(&self) -> &str {
        self.server.as_str()
    }

    pub fn url(&self, path: &str) -> Result<Url, SyncError> {
        Ok(self.server.join(path)?)
    }

    pub async fn health(&self) -> Result<String, SyncError> {
        let res = self.client.get(self.url("/health")?).send().await?;
        Ok(res.text().await?)
    }

    pub async fn create_order(&self, order: &NewOrder) -> Result<Order, SyncError> {
        let res = self.client.post(self.url("/orders")?).json(order).send().await?;
        expect_json(res).await
    }

    pub async fn transition(&self, id: &OrderId, params: &TransitionParams) -> Result<Order, SyncError> {
        let res = self.client.patch(self.order_url(id, "")?).json(params).send().await?;
        expect_json(res).await
    }

    pub async fn accept(&self, id: &OrderId, actor: &Actor) -> Result<Order, SyncError> {
        let params = TransitionParams { actor: actor.clone(), status: OrderStatusType::Accepted, expected_version: None };
        self.transition(id, &params).await
    }

    pub async fn cancel(&self, id: &OrderId, params: &CancelParams) -> Result<Order, SyncError> {
        let res = self.client.delete(self.order_url(id, "")?).json(params).send().await?;
        expect_json(res).await
    }

    pub async fn report_escrow(&self, id: &OrderId, params: &EscrowLockParams) -> Result<Order, SyncError> {
        let res = self.client.post(self.order_url(id, "/escrow")?).json(params).send().await?;
        expect_json(res).await
    }

    pub async fn release_escrow(&self, id: &OrderId, actor: &Actor) -> Result<Order, SyncError> {
        let params = ActorParams { actor: actor.clone() };
        let res = self.client.patch(self.order_url(id, "/escrow")?).json(&params).send().await?;
        expect_json(res).await
    }

    pub async fn raise_dispute(&self, id: &OrderId, params: &DisputeParams) -> Result<Order, SyncError> {
        let res = self.client.post(self.order_url(id, "/dispute")?).json(params).send().await?;
        expect_json(res).await
    }

    pub async fn resolve_dispute(&self, id: &OrderId, params: &ResolveDisputeParams) -> Result<Order, SyncError> {
        let res = self.client.patch(self.order_url(id, "/dispute")?).json(params).send().await?;
        expect_json(res).await
    }

    pub async fn request_extension(&self, id: &OrderId, params: &ExtensionRequestParams) -> Result<Order, SyncError> {
        let res = self.client.post(self.order_url(id, "/extension")?).json(params).send().await?;
        expect_json(res).await
    }

    pub async fn respond_to_extension(
        &self,
        id: &OrderId,
        params: &ExtensionResponseParams,
    ) -> Result<Order, SyncError> {
        let res = self.client.patch(self.order_url(id, "/extension")?).json(params).send().await?;
        expect_json(res).await
    }

    pub async fn advertise(&self, entry: &NewMempoolEntry) -> Result<MempoolEntry, SyncError> {
        let res = self.client.post(self.url("/mempool")?).json(entry).send().await?;
        expect_json(res).await
    }

    pub async fn bump(&self, entry_id: i64) -> Result<ManualBump, SyncError> {
        let res = self.client.post(self.url(&format!("/mempool/{entry_id}/bump"))?).send().await?;
        expect_json(res).await
    }

    pub async fn pool(&self) -> Result<Vec<PoolItem>, SyncError> {
        let res = self.client.get(self.url("/mempool")?).send().await?;
        expect_json(res).await
    }

    pub async fn messages(&self, id: &OrderId) -> Result<Vec<ChatMessagePayload>, SyncError> {
        let res = self.client.get(self.order_url(id, "/messages")?).send().await?;
        expect_json(res).await
    }

    fn order_url(&self, id: &OrderId, suffix: &str) -> Result<Url, SyncError> {
        self.url(&format!("/orders/{id}{suffix}"))
    }
}

impl OrderFetcher for RestOrderClient {
    async fn fetch_orders_for(&self, actor: &Actor) -> Result<Vec<Order>, SyncError> {
        let path = match actor.kind {
            ActorType::User => format!("/users/{}/orders", actor.id),
            ActorType::Merchant => format!("/merchants/{}/orders", actor.id),
            _ => return Err(SyncError::UnsupportedActor(actor.to_string())),
        };
        trace!("📡️ Fetching orders for {actor}");
        let res = self.client.get(self.url(&path)?).send().await?;
        expect_json(res).await
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Order, SyncError> {
        let res = self.client.get(self.order_url(id, "")?).send().await?;
        expect_json(res).await
    }
}

impl MessageSender for RestOrderClient {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<ChatMessagePayload, SyncError> {
        let res = self.client.post(self.order_url(&message.order_id, "/messages")?).json(message).send().await?;
        expect_json(res).await
    }
}

async fn expect_json<T: DeserializeOwned>(res: Response) -> Result<T, SyncError> {
    let status = res.status();
    if !status.is_success() {
        let message = res.text().await.unwrap_or_default();
        debug!("📡️ Request failed with {status}: {message}");
        return Err(SyncError::Rejected { status: status.as_u16(), message });
    }
    Ok(res.json::<T>().await?)
}
