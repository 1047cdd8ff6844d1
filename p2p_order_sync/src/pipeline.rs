//! The per-session event pipeline.
//!
//! Every event source of a session (the broker channels, the fallback socket, the per-order chat channels) feeds one
//! task. The task deduplicates, batches and flushes into the projection, so the projection has a single writer and
//! callbacks fire one at a time.
//!
//! ```text
//!  channels ─┐
//!  socket ───┼─► dedup ─► batcher ─(window)─► version gate ─► projection ─► callbacks
//!  chat ─────┘                                      └─(missing data / stale)─► one refetch
//! ```
use std::{collections::HashMap, sync::Arc, time::Duration};

use log::*;
use p2p_order_engine::{
    db_types::{Actor, Order, OrderId},
    events::{ChannelName, ChatEvent, OrderEvent},
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    batcher::EventBatcher,
    broker::ChannelSource,
    chat::{is_chat_concern, ChatLog},
    dedup::{dedup_key, DedupCache},
    fetcher::OrderFetcher,
    hooks::SyncHooks,
    multiplexer::{forward_channel, SourceKind, Subscription},
    projection::{Projection, SharedProjection},
    SyncError,
};

pub(crate) enum PipelineInput {
    Event { event: OrderEvent, source: SourceKind },
    Chat(ChatEvent),
    /// A channel dropped messages; the projection can no longer be trusted to be complete
    Lagged(String),
    Error(SyncError),
    ApplyLocal(Order, oneshot::Sender<Result<(), SyncError>>),
}

#[derive(Debug, Clone)]
pub(crate) struct PipelineSettings {
    pub batch_window: Duration,
    pub dedup_window: Duration,
    pub eviction_age: Duration,
    pub dedup_soft_cap: usize,
    pub queue_size: usize,
}

pub(crate) struct Pipeline<T, F> {
    actor: Actor,
    source: T,
    fetcher: Arc<F>,
    hooks: SyncHooks,
    projection: SharedProjection,
    chat: Arc<Mutex<ChatLog>>,
    dedup: DedupCache,
    batcher: EventBatcher,
    batch_window: Duration,
    chat_channels: HashMap<OrderId, Subscription>,
    tx: mpsc::Sender<PipelineInput>,
}

/// The session's grip on its pipeline task.
pub(crate) struct PipelineHandle {
    tx: mpsc::Sender<PipelineInput>,
    projection: SharedProjection,
    chat: Arc<Mutex<ChatLog>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn sender(&self) -> mpsc::Sender<PipelineInput> {
        self.tx.clone()
    }

    pub fn projection(&self) -> SharedProjection {
        self.projection.clone()
    }

    pub fn chat(&self) -> Arc<Mutex<ChatLog>> {
        self.chat.clone()
    }

    pub async fn apply_local(&self, order: Order) -> Result<(), SyncError> {
        let (reply, answer) = oneshot::channel();
        self.tx.send(PipelineInput::ApplyLocal(order, reply)).await.map_err(|_| SyncError::SessionClosed)?;
        answer.await.map_err(|_| SyncError::SessionClosed)?
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("🔄️ The sync pipeline task ended badly: {e}");
        }
    }
}

impl<T, F> Pipeline<T, F>
where
    T: ChannelSource,
    F: OrderFetcher,
{
    pub fn spawn(
        actor: Actor,
        source: T,
        fetcher: Arc<F>,
        hooks: SyncHooks,
        settings: &PipelineSettings,
    ) -> PipelineHandle {
        let (tx, rx) = mpsc::channel(settings.queue_size.max(1));
        let projection = Projection::shared();
        let chat = Arc::new(Mutex::new(ChatLog::default()));
        let cancel = CancellationToken::new();
        let pipeline = Self {
            actor,
            source,
            fetcher,
            hooks,
            projection: projection.clone(),
            chat: chat.clone(),
            dedup: DedupCache::new(settings.dedup_window, settings.eviction_age, settings.dedup_soft_cap),
            batcher: EventBatcher::default(),
            batch_window: settings.batch_window,
            chat_channels: HashMap::new(),
            tx: tx.clone(),
        };
        let task = tokio::spawn(pipeline.run(rx, cancel.clone()));
        PipelineHandle { tx, projection, chat, cancel, task }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<PipelineInput>, cancel: CancellationToken) {
        debug!("🔄️ Sync pipeline for {} started", self.actor);
        self.load_orders(false).await;
        let mut flush_at: Option<Instant> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    flush_at = None;
                    self.flush().await;
                },
                input = rx.recv() => match input {
                    Some(input) => {
                        if self.handle(input).await {
                            flush_at = Some(Instant::now() + self.batch_window);
                        }
                    },
                    None => break,
                },
            }
        }
        self.stop().await;
    }

    /// Returns true if the input opened a new batch window.
    async fn handle(&mut self, input: PipelineInput) -> bool {
        match input {
            PipelineInput::Event { event, source } => {
                let key = dedup_key(&event);
                if self.dedup.is_duplicate(&key) {
                    trace!("🔄️ Duplicate {key} from {source:?} dropped");
                    return false;
                }
                self.batcher.enqueue(event)
            },
            PipelineInput::Chat(event) => {
                self.chat.lock().await.apply_event(&event);
                self.hooks.chat_event(event).await;
                false
            },
            PipelineInput::Lagged(channel) => {
                warn!("🔄️ Events were lost on {channel}. Reloading orders for {}", self.actor);
                self.load_orders(true).await;
                false
            },
            PipelineInput::Error(error) => {
                self.hooks.sync_error(error).await;
                false
            },
            PipelineInput::ApplyLocal(order, reply) => {
                let result = self.apply_local(order).await;
                let _ = reply.send(result);
                false
            },
        }
    }

    async fn flush(&mut self) {
        let batch = self.batcher.drain();
        let mut refetch = batch.needs_refetch;
        let mut applied = Vec::with_capacity(batch.survivors.len());
        {
            let mut projection = self.projection.write().await;
            for survivor in batch.survivors {
                let decision = projection.apply_event(&survivor.event, survivor.base.as_ref());
                if decision.accept {
                    if projection.snapshot(survivor.event.order_id()).is_none() {
                        refetch = true;
                    }
                    applied.push(survivor.event);
                } else if decision.needs_refetch() {
                    refetch = true;
                }
            }
        }
        debug!("🔄️ Flushed {} events for {}: {} applied", batch.received, self.actor, applied.len());
        for event in applied {
            let id = event.order_id().clone();
            self.hooks.order_event(event).await;
            self.update_chat_channel(&id).await;
        }
        if refetch {
            self.load_orders(true).await;
        }
    }

    /// The one consolidated fetch for the actor's orders. Fetched orders still go through the version gate.
    async fn load_orders(&mut self, notify: bool) {
        let orders = match self.fetcher.fetch_orders_for(&self.actor).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!("🔄️ Could not fetch the orders for {}: {e}", self.actor);
                self.hooks.sync_error(SyncError::SyncIncomplete(e.to_string())).await;
                return;
            },
        };
        let mut changes = Vec::new();
        {
            let mut projection = self.projection.write().await;
            for order in orders {
                let previous = projection.get(&order.id).map(|o| o.status);
                if projection.apply_snapshot(order.clone()).accept {
                    changes.push(match previous {
                        Some(previous) => OrderEvent::status_changed(&order, previous),
                        None => OrderEvent::created(&order),
                    });
                }
            }
        }
        debug!("🔄️ Loaded orders for {}: {} changed", self.actor, changes.len());
        for event in changes {
            let id = event.order_id().clone();
            if notify {
                self.hooks.order_event(event).await;
            }
            self.update_chat_channel(&id).await;
        }
    }

    /// The response to one of the actor's own mutations. It is authoritative, but not beyond the version gate.
    async fn apply_local(&mut self, order: Order) -> Result<(), SyncError> {
        let id = order.id.clone();
        let version = order.order_version;
        let (decision, previous, current) = {
            let mut projection = self.projection.write().await;
            let previous = projection.get(&id).map(|o| o.status);
            let current = projection.get(&id).and_then(|o| o.version());
            (projection.apply_snapshot(order.clone()), previous, current)
        };
        if !decision.accept {
            debug!("🔄️ Local update of {id} v{version} not applied: {}", decision.reason);
            return Err(SyncError::StaleUpdate { order_id: id, incoming: Some(version), current });
        }
        let event = match previous {
            Some(previous) => OrderEvent::status_changed(&order, previous),
            None => OrderEvent::created(&order),
        };
        self.hooks.order_event(event).await;
        self.update_chat_channel(&id).await;
        Ok(())
    }

    /// Opens the order's chat channel while it is a live order of this actor, and closes it afterwards.
    async fn update_chat_channel(&mut self, id: &OrderId) {
        let wanted = {
            let projection = self.projection.read().await;
            projection.get(id).map(|o| is_chat_concern(o, &self.actor)).unwrap_or(false)
        };
        let open = self.chat_channels.contains_key(id);
        if wanted && !open {
            let channel = ChannelName::Order(id.clone());
            match self.source.subscribe(&channel) {
                Ok(rx) => {
                    debug!("📡️ Chat for order {id} opened for {}", self.actor);
                    let sub = forward_channel(channel, SourceKind::Order, rx, self.tx.clone());
                    self.chat_channels.insert(id.clone(), sub);
                },
                Err(e) => {
                    warn!("📡️ Could not open the chat channel for {id}: {e}");
                    self.hooks.sync_error(e).await;
                },
            }
        } else if !wanted && open {
            if let Some(sub) = self.chat_channels.remove(id) {
                debug!("📡️ Chat for order {id} closed for {}", self.actor);
                sub.release().await;
            }
        }
    }

    async fn stop(&mut self) {
        for (_, sub) in self.chat_channels.drain() {
            sub.release().await;
        }
        self.batcher.clear();
        self.dedup.clear();
        debug!("🔄️ Sync pipeline for {} stopped", self.actor);
    }
}
