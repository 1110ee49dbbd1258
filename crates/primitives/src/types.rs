//! The core data model: block bookkeeping, withdrawals, forkchoice state,
//! checkpoints, proposer boost, and reorg events.

use crate::{Address, Hash};
use serde::{Deserialize, Serialize};

/// A `(number, hash)` pair, used wherever callers need both without a full
/// [`BlockInfo`] lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockNumHash {
    pub number: u64,
    pub hash: Hash,
}

/// Immutable-after-insertion metadata about a block known to the engine.
///
/// Invariant: `parent_hash != hash`, except the genesis block, which carries
/// `parent_hash = Hash::ZERO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: Hash,
    pub parent_hash: Hash,
    pub number: u64,
    pub timestamp: u64,
    pub slot: u64,
}

impl BlockInfo {
    /// The epoch this block's slot belongs to (`slot / 32`).
    pub fn epoch(&self) -> u64 {
        self.slot / crate::EPOCH_SLOTS
    }

    pub fn num_hash(&self) -> BlockNumHash {
        BlockNumHash { number: self.number, hash: self.hash }
    }
}

/// A single validator withdrawal carried by a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub index: u64,
    pub validator_index: u64,
    pub address: Address,
    pub amount: u64,
}

/// The forkchoice triple the CL supplies on every update.
///
/// `head` must be nonzero. `safe`/`finalized` may be zero, meaning
/// "unchanged/unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForkchoiceState {
    pub head: Hash,
    pub safe: Hash,
    pub finalized: Hash,
}

impl ForkchoiceState {
    pub fn head_is_zero(&self) -> bool {
        self.head.is_zero()
    }
}

/// A justified/finalized checkpoint, derived from a [`BlockInfo`] lookup of
/// the safe or finalized hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: u64,
    pub root: Hash,
}

/// Fork-choice weight bonus recorded for the timely-arriving proposal of a
/// slot. At most one is active at a time; it is cleared on slot boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerBoost {
    pub slot: u64,
    pub block_root: Hash,
    pub boost_weight: u64,
}

/// Emitted whenever the forkchoice tracker moves the canonical head to a
/// block that is not a descendant of the previous head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorgEvent {
    pub slot: u64,
    pub old_head: Hash,
    pub new_head: Hash,
    pub depth: u64,
    pub old_number: u64,
    pub new_number: u64,
}
