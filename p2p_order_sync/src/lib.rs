//! P2P Order Sync
//!
//! The client side of the order engine. A sync session keeps a local projection of every order an actor can see, and
//! keeps it converging on the server's state no matter how events arrive: late, twice, out of order, over more than
//! one transport, or without the order data itself.
//!
//! The pieces, from the wire inwards:
//! 1. Feeds. Broker channels ([`broker`]), the fallback websocket ([`socket`]), and the per-order chat channels.
//!    [`ChannelMultiplexer`] wires an actor's feeds into one session.
//! 2. The pipeline: events are deduplicated ([`dedup`]), coalesced per order over a short window ([`batcher`]) and
//!    only then applied.
//! 3. The [`version_gate`], which every write to the [`projection`] goes through. Events without enough data trigger
//!    a single refetch through an [`OrderFetcher`].
//! 4. Consumer callbacks ([`SyncHooks`]), fired after the projection has changed.
pub mod batcher;
pub mod broker;
pub mod chat;
pub mod config;
pub mod dedup;
mod errors;
pub mod fetcher;
pub mod hooks;
pub mod multiplexer;
mod pipeline;
pub mod projection;
pub mod socket;
pub mod version_gate;

pub use broker::{BrokerMessage, ChannelSource, LocalBroker};
pub use config::SyncConfig;
pub use errors::SyncError;
pub use fetcher::{OrderFetcher, RestOrderClient};
pub use hooks::SyncHooks;
pub use multiplexer::{ChannelMultiplexer, Session, SourceKind};
pub use version_gate::{should_accept_update, GateDecision, VersionStamp};
