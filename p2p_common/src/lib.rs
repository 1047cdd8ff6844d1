//! Value types shared by the order engine, the sync client and the server.
mod bps;

pub mod helpers;
pub mod op;
mod secret;

pub use bps::{Bps, BpsConversionError, BPS_PER_PERCENT, MAX_BOOST_FEE_BPS};
pub use secret::Secret;
