//! P2P Order Engine
//!
//! The engine owns the authoritative side of peer-to-peer escrow trades: the order lifecycle, the store that persists
//! orders, the events published when they change, and the priority auction that orders the shared matching pool.
//!
//! The library is divided into the following sections:
//! 1. The data model ([`mod@db_types`]) and the lifecycle state machine ([`mod@order_lifecycle`]). The state machine
//!    is pure: it decides whether a change is allowed and what the order looks like afterwards.
//! 2. Storage backends ([`mod@traits`]). SQLite is the bundled backend. You should not need to touch the database
//!    directly; use the public API instead.
//! 3. The public API ([`OrderFlowApi`], [`MempoolApi`]), which ties the state machine, the store, the escrow service
//!    and the event hooks together.
//!
//! The engine emits events that can be subscribed to (see [`mod@events`]). Every accepted order change produces
//! exactly one event, carrying the new `order_version` and a full snapshot of the order.
mod api;
mod db;

pub mod auction;
pub mod db_types;
pub mod events;
pub mod order_lifecycle;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    order_objects,
    AuctionStepFailure,
    BumpRunResult,
    ManualBump,
    MempoolApi,
    MempoolError,
    OrderFlowApi,
    OrderFlowError,
};
#[cfg(feature = "sqlite")]
pub use db::sqlite::{db_url, new_pool, SqliteDatabase};
