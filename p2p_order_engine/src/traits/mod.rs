//! # Storage and escrow backends
//!
//! This module defines the contracts the order engine relies on. The engine never talks to a database or to the
//! on-chain escrow program directly; it goes through these traits instead.
//!
//! * [`OrderStore`] persists orders. It is the only component that writes `status` and `order_version`, and it does
//!   so with optimistic concurrency: a save names the version it was computed from and fails with
//!   [`OrderStoreError::VersionConflict`] if someone else got there first.
//! * [`MempoolStore`] persists the auction pool entries used by the auto-bump worker.
//! * [`EscrowService`] is the opaque escrow RPC. It returns transaction hashes and nothing else.
mod data_objects;
mod escrow_service;
mod mempool_store;
mod order_store;

pub use data_objects::{BumpResult, ExpiryResult, OrderQueryFilter};
pub use escrow_service::{EscrowError, EscrowService, NoEscrowService};
pub use mempool_store::MempoolStore;
pub use order_store::{OrderStore, OrderStoreError};
