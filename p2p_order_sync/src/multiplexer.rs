//! Sessions: one per connected actor.
//!
//! Connecting an actor subscribes it to its channels, starts its pipeline and, if configured, opens the fallback
//! socket. All of them feed the same pipeline. Disconnecting releases everything the session holds.
use std::{collections::HashMap, sync::Arc};

use log::*;
use p2p_order_engine::{
    db_types::{Actor, ActorType, Order, OrderId},
    events::ChannelName,
};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    broker::{BrokerMessage, ChannelSource},
    chat::{send_message, ChatLog, ChatMessage, MessageSender},
    config::SyncConfig,
    fetcher::OrderFetcher,
    hooks::SyncHooks,
    pipeline::{Pipeline, PipelineHandle, PipelineInput},
    projection::SharedProjection,
    socket::{spawn_socket, SocketConnector, WsConnector},
    SyncError,
};

/// Where a session's events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// `merchants-global`
    Broadcast,
    /// The actor's own `user-<id>` or `merchant-<id>` channel
    Personal,
    FallbackSocket,
    /// An `order-<id>` chat channel
    Order,
}

/// A live feed into a session's pipeline. Released by cancelling its task.
pub struct Subscription {
    name: String,
    source: SourceKind,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(name: String, source: SourceKind, cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { name, source, cancel, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub(crate) async fn release(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("📡️ Subscription to {} ended badly: {e}", self.name);
        }
    }
}

/// Feeds a broker channel into a pipeline.
pub(crate) fn forward_channel(
    channel: ChannelName,
    source: SourceKind,
    mut rx: broadcast::Receiver<BrokerMessage>,
    tx: mpsc::Sender<PipelineInput>,
) -> Subscription {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let name = channel.to_string();
    let task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = token.cancelled() => break,
                message = rx.recv() => message,
            };
            let input = match message {
                Ok(BrokerMessage::Order(event)) => PipelineInput::Event { event, source },
                Ok(BrokerMessage::Chat(event)) => PipelineInput::Chat(event),
                Err(RecvError::Lagged(n)) => {
                    warn!("📡️ {n} messages on {channel} were missed");
                    PipelineInput::Lagged(channel.to_string())
                },
                Err(RecvError::Closed) => {
                    debug!("📡️ Channel {channel} closed");
                    break;
                },
            };
            if tx.send(input).await.is_err() {
                break;
            }
        }
    });
    Subscription::new(name, source, cancel, task)
}

/// The channels an actor listens on. Only users and merchants trade.
pub fn channels_for_actor(actor: &Actor) -> Result<Vec<(ChannelName, SourceKind)>, SyncError> {
    match actor.kind {
        ActorType::User => Ok(vec![(ChannelName::User(actor.id.clone()), SourceKind::Personal)]),
        ActorType::Merchant => Ok(vec![
            (ChannelName::MerchantsGlobal, SourceKind::Broadcast),
            (ChannelName::Merchant(actor.id.clone()), SourceKind::Personal),
        ]),
        _ => Err(SyncError::UnsupportedActor(actor.to_string())),
    }
}

pub struct Session {
    actor: Actor,
    subscriptions: Vec<Subscription>,
    pipeline: PipelineHandle,
}

impl Session {
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn projection(&self) -> SharedProjection {
        self.pipeline.projection()
    }

    pub fn chat(&self) -> Arc<Mutex<ChatLog>> {
        self.pipeline.chat()
    }

    /// The session's channel and socket feeds. Per-order chat channels are managed by the pipeline and not listed.
    pub fn subscriptions(&self) -> Vec<(&str, SourceKind)> {
        self.subscriptions.iter().map(|s| (s.name(), s.source())).collect()
    }

    /// Applies the server's response to one of this actor's own mutations.
    ///
    /// A response that lost the race against a newer event is refused with [`SyncError::StaleUpdate`]; the newer state
    /// stays.
    pub async fn apply_local(&self, order: Order) -> Result<(), SyncError> {
        self.pipeline.apply_local(order).await
    }

    pub async fn send_message<S: MessageSender>(
        &self,
        sender: &S,
        order_id: &OrderId,
        body: &str,
    ) -> Result<ChatMessage, SyncError> {
        let chat = self.chat();
        send_message(&chat, sender, order_id, &self.actor, body).await
    }

    async fn close(self) {
        for sub in self.subscriptions {
            sub.release().await;
        }
        self.pipeline.shutdown().await;
    }
}

pub struct ChannelMultiplexer<T, F, C = WsConnector> {
    source: T,
    fetcher: Arc<F>,
    connector: Arc<C>,
    config: SyncConfig,
    sessions: HashMap<Actor, Session>,
}

impl<T, F> ChannelMultiplexer<T, F, WsConnector>
where
    T: ChannelSource,
    F: OrderFetcher,
{
    pub fn new(source: T, fetcher: F, config: SyncConfig) -> Self {
        Self { source, fetcher: Arc::new(fetcher), connector: Arc::new(WsConnector), config, sessions: HashMap::new() }
    }
}

impl<T, F, C> ChannelMultiplexer<T, F, C>
where
    T: ChannelSource,
    F: OrderFetcher,
    C: SocketConnector,
{
    pub fn with_connector<C2: SocketConnector>(self, connector: C2) -> ChannelMultiplexer<T, F, C2> {
        ChannelMultiplexer {
            source: self.source,
            fetcher: self.fetcher,
            connector: Arc::new(connector),
            config: self.config,
            sessions: self.sessions,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Starts a session for `actor`. An existing session for the same actor is closed first.
    pub async fn connect(&mut self, actor: Actor, hooks: SyncHooks) -> Result<&Session, SyncError> {
        let channels = channels_for_actor(&actor)?;
        self.disconnect(&actor).await;
        let settings = self.config.pipeline_settings();
        let pipeline = Pipeline::spawn(actor.clone(), self.source.clone(), self.fetcher.clone(), hooks, &settings);
        let mut subscriptions = Vec::with_capacity(channels.len() + 1);
        for (channel, kind) in channels {
            match self.source.subscribe(&channel) {
                Ok(rx) => subscriptions.push(forward_channel(channel, kind, rx, pipeline.sender())),
                Err(e) => {
                    error!("📡️ Could not subscribe {actor} to {channel}: {e}");
                    let session = Session { actor, subscriptions, pipeline };
                    session.close().await;
                    return Err(e);
                },
            }
        }
        if let Some(url) = &self.config.socket_url {
            let socket =
                spawn_socket(self.connector.clone(), url.clone(), actor.clone(), self.config.reconnect, pipeline.sender());
            subscriptions.push(socket);
        }
        info!("📡️ {actor} connected with {} feeds", subscriptions.len());
        let session = Session { actor: actor.clone(), subscriptions, pipeline };
        Ok(self.sessions.entry(actor).or_insert(session))
    }

    /// Closes the actor's session. Returns false if there was none.
    pub async fn disconnect(&mut self, actor: &Actor) -> bool {
        match self.sessions.remove(actor) {
            Some(session) => {
                session.close().await;
                info!("📡️ {actor} disconnected");
                true
            },
            None => false,
        }
    }

    pub async fn disconnect_all(&mut self) {
        for (actor, session) in self.sessions.drain() {
            session.close().await;
            debug!("📡️ {actor} disconnected");
        }
    }

    pub fn session(&self, actor: &Actor) -> Option<&Session> {
        self.sessions.get(actor)
    }

    pub fn is_connected(&self, actor: &Actor) -> bool {
        self.sessions.contains_key(actor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn merchants_hear_the_global_feed() {
        let channels = channels_for_actor(&Actor::merchant("m1")).unwrap();
        assert_eq!(channels, vec![
            (ChannelName::MerchantsGlobal, SourceKind::Broadcast),
            (ChannelName::Merchant("m1".into()), SourceKind::Personal),
        ]);
        let channels = channels_for_actor(&Actor::user("alice")).unwrap();
        assert_eq!(channels, vec![(ChannelName::User("alice".into()), SourceKind::Personal)]);
        assert!(matches!(channels_for_actor(&Actor::system()), Err(SyncError::UnsupportedActor(_))));
    }
}
