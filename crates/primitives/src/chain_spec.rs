//! Process-wide configuration: fork activation timestamps.
//!
//! Per the design notes, global state beyond the engine instance is
//! forbidden; fork-activation timestamps belong to the [`ChainSpec`] handed
//! to the engine at construction, mirroring the teacher's
//! `reth_primitives::ChainSpec`.

use serde::{Deserialize, Serialize};

/// The hardforks this engine knows how to gate behavior on, in chronological
/// order. Each variant after `Paris` (the merge) introduces payload fields
/// the validator must additionally enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hardfork {
    Paris,
    Shanghai,
    Cancun,
    Prague,
    Amsterdam,
    V7,
}

/// Fork-activation timestamps for the chain this engine is running.
///
/// `None` means "not scheduled" - the fork is treated as inactive at every
/// timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub shanghai_time: Option<u64>,
    pub cancun_time: Option<u64>,
    pub prague_time: Option<u64>,
    pub amsterdam_time: Option<u64>,
    pub v7_time: Option<u64>,
}

impl Default for ChainSpec {
    /// A spec with every fork activated at genesis (timestamp 0), convenient
    /// for tests and for standalone tooling that doesn't care about historical
    /// replay.
    fn default() -> Self {
        Self {
            shanghai_time: Some(0),
            cancun_time: Some(0),
            prague_time: Some(0),
            amsterdam_time: Some(0),
            v7_time: Some(0),
        }
    }
}

impl ChainSpec {
    fn is_active(scheduled: Option<u64>, timestamp: u64) -> bool {
        scheduled.is_some_and(|t| timestamp >= t)
    }

    pub fn is_shanghai_active_at_timestamp(&self, timestamp: u64) -> bool {
        Self::is_active(self.shanghai_time, timestamp)
    }

    pub fn is_cancun_active_at_timestamp(&self, timestamp: u64) -> bool {
        Self::is_active(self.cancun_time, timestamp)
    }

    pub fn is_prague_active_at_timestamp(&self, timestamp: u64) -> bool {
        Self::is_active(self.prague_time, timestamp)
    }

    pub fn is_amsterdam_active_at_timestamp(&self, timestamp: u64) -> bool {
        Self::is_active(self.amsterdam_time, timestamp)
    }

    pub fn is_v7_active_at_timestamp(&self, timestamp: u64) -> bool {
        Self::is_active(self.v7_time, timestamp)
    }

    /// The latest hardfork active at the given timestamp, or `None` if even
    /// `Paris` (the merge) hasn't happened - which this engine never expects,
    /// since it is a post-merge-only engine.
    pub fn fork_at(&self, timestamp: u64) -> Hardfork {
        if self.is_v7_active_at_timestamp(timestamp) {
            Hardfork::V7
        } else if self.is_amsterdam_active_at_timestamp(timestamp) {
            Hardfork::Amsterdam
        } else if self.is_prague_active_at_timestamp(timestamp) {
            Hardfork::Prague
        } else if self.is_cancun_active_at_timestamp(timestamp) {
            Hardfork::Cancun
        } else if self.is_shanghai_active_at_timestamp(timestamp) {
            Hardfork::Shanghai
        } else {
            Hardfork::Paris
        }
    }
}
