//! # P2P order server
//! This crate hosts the server side of the P2P escrow desk. It is responsible for:
//! * Serving the REST interface over the order engine: creating orders, moving them through their lifecycle, escrow
//!   locks and releases, disputes, extensions and the matching pool.
//! * Expiring orders that are past their deadline.
//! * Running the auto-bump auction over the pool, either embedded or as the separate `auction_worker` binary.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/orders`, `/orders/{id}` and its `/escrow`, `/dispute` and `/extension` sub-resources.
//! * `/merchants/{id}/orders` and `/users/{id}/orders`.
//! * `/mempool`, `/mempool/{id}/bump`.

pub mod bump_worker;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod escrow_client;
pub mod expiry_worker;
pub mod helpers;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
