//! The fallback socket: a websocket alongside the broker channels that carries compact order events.
//!
//! The socket reconnects on its own with exponential back-off. Once the attempts are spent it gives up and reports
//! [`SyncError::TransportUnavailable`]; nothing retries until the actor is connected again.
use std::{future::Future, sync::Arc, time::Duration};

use futures_util::{stream::BoxStream, SinkExt, StreamExt};
use log::*;
use p2p_order_engine::{
    db_types::{Actor, ActorType, MinimalStatus, OrderId, OrderStatusType},
    events::{ExtensionPayload, OrderEvent, StatusPayload},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::{
    multiplexer::{SourceKind, Subscription},
    pipeline::PipelineInput,
    SyncError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_millis(1000), max_delay: Duration::from_millis(16_000), max_attempts: 5 }
    }
}

impl ReconnectPolicy {
    /// How long to wait before reconnect attempt number `attempt` (counting from zero), or `None` once the attempts
    /// are used up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// Frames on the fallback socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SocketEnvelope {
    Subscribe {
        #[serde(rename = "actorType")]
        actor_type: ActorType,
        #[serde(rename = "actorId")]
        actor_id: String,
    },
    OrderEvent {
        event_type: String,
        order_id: OrderId,
        #[serde(default)]
        status: Option<OrderStatusType>,
        #[serde(default)]
        minimal_status: Option<MinimalStatus>,
        #[serde(default)]
        order_version: Option<i64>,
        #[serde(rename = "previousStatus", default)]
        previous_status: Option<OrderStatusType>,
    },
}

impl SocketEnvelope {
    pub fn subscribe(actor: &Actor) -> Self {
        Self::Subscribe { actor_type: actor.kind, actor_id: actor.id.clone() }
    }

    /// The compact frame for an order event. Socket frames never carry the order itself.
    pub fn from_order_event(event: &OrderEvent) -> Self {
        let (status, minimal_status, previous_status) = match event {
            OrderEvent::Created(p) | OrderEvent::StatusUpdated(p) | OrderEvent::Cancelled(p) => {
                (Some(p.status), p.minimal_status, p.previous_status)
            },
            OrderEvent::ExtensionRequested(_) | OrderEvent::ExtensionResponse(_) => (None, None, None),
        };
        Self::OrderEvent {
            event_type: event.name().to_string(),
            order_id: event.order_id().clone(),
            status,
            minimal_status,
            order_version: event.order_version(),
            previous_status,
        }
    }

    /// The order event carried by this frame, if any. The event is always partial.
    pub fn into_order_event(self) -> Option<OrderEvent> {
        let Self::OrderEvent { event_type, order_id, status, minimal_status, order_version, previous_status } = self
        else {
            return None;
        };
        let status_payload = |status: Option<OrderStatusType>| {
            status.map(|status| StatusPayload {
                order_id: order_id.clone(),
                status,
                minimal_status: minimal_status.or(Some(status.minimal())),
                order_version,
                previous_status,
                data: None,
            })
        };
        let extension_payload = || ExtensionPayload {
            order_id: order_id.clone(),
            order_version,
            requested_by: None,
            minutes: None,
            accepted: None,
            data: None,
        };
        match event_type.as_str() {
            "ORDER_CREATED" => status_payload(status).map(OrderEvent::Created),
            "ORDER_STATUS_UPDATED" => status_payload(status).map(OrderEvent::StatusUpdated),
            "ORDER_CANCELLED" => status_payload(status.or(Some(OrderStatusType::Cancelled))).map(OrderEvent::Cancelled),
            "ORDER_EXTENSION_REQUESTED" => Some(OrderEvent::ExtensionRequested(extension_payload())),
            "ORDER_EXTENSION_RESPONSE" => Some(OrderEvent::ExtensionResponse(extension_payload())),
            other => {
                debug!("📡️ Ignoring socket event type {other}");
                None
            },
        }
    }
}

pub type EnvelopeStream = BoxStream<'static, Result<SocketEnvelope, SyncError>>;

pub trait SocketConnector: Send + Sync + 'static {
    /// Opens the socket and sends the subscribe frame. The stream ends when the server closes the connection.
    fn connect(
        &self,
        url: &str,
        subscribe: SocketEnvelope,
    ) -> impl Future<Output = Result<EnvelopeStream, SyncError>> + Send;
}

/// Websocket connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl SocketConnector for WsConnector {
    async fn connect(&self, url: &str, subscribe: SocketEnvelope) -> Result<EnvelopeStream, SyncError> {
        let (mut ws, _) = connect_async(url).await.map_err(|e| SyncError::TransportUnavailable(e.to_string()))?;
        let hello = serde_json::to_string(&subscribe)?;
        ws.send(Message::Text(hello)).await.map_err(|e| SyncError::TransportUnavailable(e.to_string()))?;
        let frames = ws.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<SocketEnvelope>(&text) {
                    Ok(envelope) => Some(Ok(envelope)),
                    Err(e) => {
                        warn!("📡️ Ignoring unreadable socket frame: {e}");
                        None
                    },
                },
                Ok(_) => None,
                Err(e) => Some(Err(SyncError::TransportUnavailable(e.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketOutcome {
    Stopped,
    GaveUp,
}

pub(crate) fn spawn_socket<C: SocketConnector>(
    connector: Arc<C>,
    url: String,
    actor: Actor,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<PipelineInput>,
) -> Subscription {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let name = url.clone();
    let task = tokio::spawn(async move {
        let outcome = run_socket(connector.as_ref(), &url, &actor, policy, &tx, &token).await;
        debug!("📡️ Fallback socket task for {actor} finished: {outcome:?}");
    });
    Subscription::new(name, SourceKind::FallbackSocket, cancel, task)
}

pub(crate) async fn run_socket<C: SocketConnector>(
    connector: &C,
    url: &str,
    actor: &Actor,
    policy: ReconnectPolicy,
    tx: &mpsc::Sender<PipelineInput>,
    cancel: &CancellationToken,
) -> SocketOutcome {
    let mut attempt = 0u32;
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return SocketOutcome::Stopped,
            result = connector.connect(url, SocketEnvelope::subscribe(actor)) => result,
        };
        match connected {
            Ok(mut frames) => {
                info!("📡️ Fallback socket connected to {url} for {actor}");
                attempt = 0;
                loop {
                    let frame = tokio::select! {
                        _ = cancel.cancelled() => return SocketOutcome::Stopped,
                        frame = frames.next() => frame,
                    };
                    match frame {
                        Some(Ok(envelope)) => {
                            let Some(event) = envelope.into_order_event() else { continue };
                            let input = PipelineInput::Event { event, source: SourceKind::FallbackSocket };
                            if tx.send(input).await.is_err() {
                                return SocketOutcome::Stopped;
                            }
                        },
                        Some(Err(e)) => {
                            warn!("📡️ Fallback socket error: {e}");
                            break;
                        },
                        None => {
                            info!("📡️ Fallback socket at {url} closed");
                            break;
                        },
                    }
                }
            },
            Err(e) => warn!("📡️ Could not connect the fallback socket to {url}: {e}"),
        }
        let Some(delay) = policy.delay(attempt) else {
            let error = SyncError::TransportUnavailable(format!(
                "gave up on the fallback socket at {url} after {attempt} reconnect attempts"
            ));
            error!("📡️ {error}");
            let _ = tx.send(PipelineInput::Error(error)).await;
            return SocketOutcome::GaveUp;
        };
        attempt += 1;
        debug!("📡️ Reconnecting to {url} in {}ms (attempt {attempt})", delay.as_millis());
        tokio::select! {
            _ = cancel.cancelled() => return SocketOutcome::Stopped,
            _ = tokio::time::sleep(delay) => {},
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures_util::stream;

    use super::*;

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy { base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(4), max_attempts: 5 }
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (0..6).map(|a| policy.delay(a).map(|d| d.as_millis()).unwrap_or(0)).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 0]);
        let tight = ReconnectPolicy { max_delay: Duration::from_millis(3000), ..policy };
        assert_eq!(tight.delay(4), Some(Duration::from_millis(3000)));
    }

    #[derive(Default)]
    struct Unreachable {
        calls: AtomicU32,
    }

    impl SocketConnector for Unreachable {
        async fn connect(&self, _url: &str, _subscribe: SocketEnvelope) -> Result<EnvelopeStream, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::TransportUnavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn gives_up_after_the_last_reconnect() {
        let connector = Unreachable::default();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let outcome =
            run_socket(&connector, "ws://localhost:1", &Actor::user("alice"), fast_policy(), &tx, &cancel).await;
        assert_eq!(outcome, SocketOutcome::GaveUp);
        // The first connection plus five reconnects
        assert_eq!(connector.calls.load(Ordering::SeqCst), 6);
        assert!(matches!(rx.try_recv(), Ok(PipelineInput::Error(SyncError::TransportUnavailable(_)))));
    }

    /// Connects every time, delivers one frame and hangs up.
    #[derive(Default)]
    struct Flaky {
        calls: AtomicU32,
    }

    impl SocketConnector for Flaky {
        async fn connect(&self, _url: &str, _subscribe: SocketEnvelope) -> Result<EnvelopeStream, SyncError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= 8 {
                return Err(SyncError::TransportUnavailable("server gone".into()));
            }
            let frame = SocketEnvelope::OrderEvent {
                event_type: "ORDER_STATUS_UPDATED".into(),
                order_id: OrderId::from("o1"),
                status: Some(OrderStatusType::Accepted),
                minimal_status: None,
                order_version: Some(n as i64 + 2),
                previous_status: Some(OrderStatusType::Pending),
            };
            Ok(stream::iter(vec![Ok(frame)]).boxed())
        }
    }

    #[tokio::test]
    async fn a_good_connection_resets_the_attempt_count() {
        let connector = Flaky::default();
        let (tx, mut rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let outcome =
            run_socket(&connector, "ws://localhost:1", &Actor::user("alice"), fast_policy(), &tx, &cancel).await;
        assert_eq!(outcome, SocketOutcome::GaveUp);
        // Eight good connections, then all five reconnects fail
        assert_eq!(connector.calls.load(Ordering::SeqCst), 8 + 5);
        let mut events = 0;
        while let Ok(input) = rx.try_recv() {
            if let PipelineInput::Event { event, source } = input {
                assert_eq!(source, SourceKind::FallbackSocket);
                assert!(event.snapshot().is_none());
                events += 1;
            }
        }
        assert_eq!(events, 8);
    }

    #[tokio::test]
    async fn cancelling_stops_the_retries() {
        let connector = Unreachable::default();
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let policy = ReconnectPolicy { base_delay: Duration::from_secs(60), ..ReconnectPolicy::default() };
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.cancel();
        });
        let outcome = run_socket(&connector, "ws://localhost:1", &Actor::user("alice"), policy, &tx, &cancel).await;
        assert_eq!(outcome, SocketOutcome::Stopped);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn compact_frames() {
        let json = r#"{"type":"order_event","event_type":"ORDER_CANCELLED","order_id":"o9","order_version":4}"#;
        let envelope: SocketEnvelope = serde_json::from_str(json).unwrap();
        let event = envelope.into_order_event().unwrap();
        assert!(matches!(event, OrderEvent::Cancelled(_)));
        assert_eq!(event.order_version(), Some(4));
        assert_eq!(event.status(), Some(OrderStatusType::Cancelled));

        let hello = serde_json::to_value(SocketEnvelope::subscribe(&Actor::merchant("m1"))).unwrap();
        assert_eq!(hello, serde_json::json!({"type": "subscribe", "actorType": "merchant", "actorId": "m1"}));
    }
}
