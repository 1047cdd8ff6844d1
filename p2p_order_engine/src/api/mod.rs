//! The public face of the engine.
//!
//! * [`OrderFlowApi`] drives orders through their lifecycle and publishes an event for every accepted change.
//! * [`MempoolApi`] runs the priority auction over the matching pool.
mod errors;
mod mempool_api;
mod objects;
mod order_flow_api;
pub mod order_objects;

pub use errors::{AuctionStepFailure, MempoolError, OrderFlowError};
pub use mempool_api::MempoolApi;
pub use objects::{BumpRunResult, ManualBump};
pub use order_flow_api::OrderFlowApi;
