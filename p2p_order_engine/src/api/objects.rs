use p2p_common::Bps;
use serde::{Deserialize, Serialize};

use crate::{api::AuctionStepFailure, db_types::MempoolEntry};

/// The answer to a manual bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualBump {
    pub new_premium_bps: Bps,
    pub max_reached: bool,
}

/// What one pass of the auto-bump worker did.
#[derive(Debug, Clone, Default)]
pub struct BumpRunResult {
    pub bumped: Vec<MempoolEntry>,
    /// Due entries that turned out to be at their cap already
    pub skipped: Vec<i64>,
    pub failures: Vec<AuctionStepFailure>,
}

impl BumpRunResult {
    pub fn bumped_count(&self) -> usize {
        self.bumped.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}
