//! The boost decay curve shown to takers before they commit.
//!
//! A taker may attach a one-off boost fee `F` to an order. The effective fee holds at `F` for the first 15 seconds,
//! decays linearly to zero between 15 s and 60 s, and is zero from then on:
//!
//! ```text
//!   fee(t) = F                       t <= 15
//!   fee(t) = F * (1 - (t - 15)/45)   15 < t < 60
//!   fee(t) = 0                       t >= 60
//! ```
use p2p_common::MAX_BOOST_FEE_BPS;

pub const FULL_FEE_SECS: f64 = 15.0;
pub const ZERO_FEE_SECS: f64 = 60.0;

/// The effective boost fee, in percent, `elapsed_secs` after the boost was attached. `max_fee_pct` is clamped to
/// 0–50% first.
pub fn boost_fee(max_fee_pct: f64, elapsed_secs: f64) -> f64 {
    let fee = clamp_fee(max_fee_pct);
    if elapsed_secs <= FULL_FEE_SECS {
        fee
    } else if elapsed_secs < ZERO_FEE_SECS {
        fee * (1.0 - (elapsed_secs - FULL_FEE_SECS) / (ZERO_FEE_SECS - FULL_FEE_SECS))
    } else {
        0.0
    }
}

fn clamp_fee(pct: f64) -> f64 {
    if pct.is_nan() {
        return 0.0;
    }
    pct.clamp(0.0, MAX_BOOST_FEE_BPS.as_percent())
}
