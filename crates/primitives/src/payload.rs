//! The `ExecutionPayload` data model.
//!
//! Per the design notes (§9), the source's embedded-struct versioning
//! (`ExecutionPayloadV4 ⊃ V3 ⊃ V2 ⊃ V1`) is re-expressed here as a single
//! record with optional, fork-gated fields rather than inheritance layers -
//! newer versions only ever *add* fields.

use crate::{Address, Hash};
use alloy_primitives::{Bloom, Bytes, U256};
use serde::{Deserialize, Serialize};

/// An EIP-7685 typed execution-layer request record (Prague, V4+).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub request_type: u8,
    pub data: Bytes,
}

/// A placeholder for the Amsterdam (V5) block-access-list commitment. The
/// BAL's internal schema is out of this engine's scope (it is produced and
/// consumed opaquely); what matters for validation is that it can be
/// compared byte-for-byte against a value rebuilt from execution output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockAccessList(pub Bytes);

/// A single DA proof submission attached to a V7 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub data: Bytes,
}

impl ProofSubmission {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// DA configuration the builder attests to when proposing a V7 payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaConfig {
    pub sample_size: u64,
    pub redundancy_factor: u64,
    pub committee_size: u64,
}

impl DaConfig {
    pub fn all_fields_nonzero(&self) -> bool {
        self.sample_size != 0 && self.redundancy_factor != 0 && self.committee_size != 0
    }
}

/// Attached to V7 payload attributes: constrains how many of the `total_proofs`
/// DA proofs must actually be present (`min_proofs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequirements {
    pub min_proofs: u64,
    pub total_proofs: u64,
    pub da_config: DaConfig,
}

impl ProofRequirements {
    /// `0 < min_proofs ≤ total_proofs` and every DA config field is nonzero.
    pub fn is_self_consistent(&self) -> bool {
        self.min_proofs > 0
            && self.min_proofs <= self.total_proofs
            && self.da_config.all_fields_nonzero()
    }
}

/// A candidate execution block: header fields plus the raw transaction list
/// and withdrawals.
///
/// Fork-gated fields are `Option`s populated according to the payload
/// version the caller used (V3 through V7); see the payload validator for
/// which gates require which fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPayload {
    pub parent_hash: Hash,
    pub fee_recipient: Address,
    pub state_root: Hash,
    pub receipts_root: Hash,
    pub logs_bloom: Bloom,
    pub prev_randao: Hash,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub base_fee_per_gas: U256,
    pub block_hash: Hash,
    /// Raw, opaque, still-encoded transaction byte strings.
    pub transactions: Vec<Bytes>,

    /// Present from Shanghai onward (V2+). `None` pre-Shanghai.
    pub withdrawals: Option<Vec<crate::Withdrawal>>,

    /// EIP-4844 fields, present from Cancun (V3) onward.
    pub blob_gas_used: Option<u64>,
    pub excess_blob_gas: Option<u64>,
    pub parent_beacon_block_root: Option<Hash>,

    /// EIP-7685 requests, present from Prague (V4) onward. `Some(vec![])` is
    /// a valid "no requests" payload; `None` means pre-Prague.
    pub execution_requests: Option<Vec<ExecutionRequest>>,

    /// Amsterdam (V5) block-access-list commitment.
    pub block_access_list: Option<BlockAccessList>,

    /// V7 DA proof submissions and their accompanying KZG commitments.
    pub proof_submissions: Option<Vec<ProofSubmission>>,
    pub blob_commitments: Option<Vec<Bytes>>,
}

impl ExecutionPayload {
    pub fn has_blob_transactions(&self) -> bool {
        self.blob_gas_used.is_some_and(|g| g > 0)
    }
}

/// Fields carried by `engine_forkchoiceUpdated` when the CL asks the engine to
/// build a payload on top of the new head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadAttributes {
    pub timestamp: u64,
    pub prev_randao: Hash,
    pub suggested_fee_recipient: Address,
    pub withdrawals: Option<Vec<crate::Withdrawal>>,
    pub parent_beacon_block_root: Option<Hash>,
    /// V4+: inclusion-list transactions the proposer must honor, and the slot
    /// they apply to.
    pub inclusion_list: Option<Vec<Bytes>>,
    pub slot: Option<u64>,
    /// V7: the DA proof envelope the builder must satisfy.
    pub proof_requirements: Option<ProofRequirements>,
}
