//! Commonly used types shared across the execution-layer engine crates.
//!
//! This crate is intentionally small: it holds the data model from the
//! engine specification (block headers the engine cares about, withdrawals,
//! forkchoice state, checkpoints, proposer boost, reorg events) plus the
//! handful of pure-function cryptographic helpers (`keccak256`, `sha256`,
//! header RLP encoding) that the rest of the workspace treats as external
//! collaborators.

pub mod chain_spec;
pub mod constants;
pub mod crypto;
pub mod payload;
pub mod payload_id;
pub mod types;

pub use alloy_primitives::{Address, B256 as Hash, U256};
pub use chain_spec::{ChainSpec, Hardfork};
pub use constants::*;
pub use payload::{
    BlockAccessList, DaConfig, ExecutionPayload, ExecutionRequest, PayloadAttributes,
    ProofRequirements, ProofSubmission,
};
pub use payload_id::PayloadId;
pub use types::{
    BlockInfo, BlockNumHash, Checkpoint, ForkchoiceState, ProposerBoost, ReorgEvent, Withdrawal,
};
