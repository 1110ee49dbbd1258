//! Effective-gas-price transaction ordering and block header synthesis
//! (component C7).
//!
//! Grounded on the teacher's `optimism_payload_builder` in
//! `crates/payload/basic/src/optimism.rs`: a single pass over a candidate
//! list, cooperative cancellation checked per iteration, running totals for
//! gas/blob-gas/fees, and a skip-don't-fail response to individual bad
//! candidates (full tx execution is an external collaborator here, so
//! "skip" means "do not include", not "run and roll back").

use engine_primitives::{
    BlockInfo, Hash, Withdrawal, MAX_BLOB_GAS_PER_BLOCK,
};
use alloy_primitives::{Address, Bytes, U256};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a candidate transaction prices itself; legacy and EIP-1559 txs
/// compute their effective gas price differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeKind {
    Legacy { gas_price: U256 },
    Eip1559 { fee_cap: U256, tip_cap: U256 },
}

/// A transaction eligible for inclusion. The transaction body itself is
/// opaque (`raw`); decoding and execution are external collaborators (§1).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub hash: Hash,
    pub raw: Bytes,
    pub gas: u64,
    pub fee: FeeKind,
    pub blob_gas: u64,
    pub blob_fee_cap: Option<U256>,
}

impl Candidate {
    pub fn fee_cap(&self) -> U256 {
        match self.fee {
            FeeKind::Legacy { gas_price } => gas_price,
            FeeKind::Eip1559 { fee_cap, .. } => fee_cap,
        }
    }

    pub fn is_blob_tx(&self) -> bool {
        self.blob_gas > 0
    }

    /// `min(fee_cap, base_fee + tip_cap)` for EIP-1559 txs, `gas_price` for
    /// legacy txs. A nil/zero field is treated as the zero big integer.
    pub fn effective_gas_price(&self, base_fee: U256) -> U256 {
        match self.fee {
            FeeKind::Legacy { gas_price } => gas_price,
            FeeKind::Eip1559 { fee_cap, tip_cap } => {
                let capped = base_fee.saturating_add(tip_cap);
                fee_cap.min(capped)
            }
        }
    }
}

/// Why a candidate was left out of the assembled block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    FeeCapBelowBaseFee,
    GasBudgetExceeded,
    BlobGasBudgetExceeded,
    BlobFeeCapBelowBlobBaseFee,
}

/// A per-transaction record of whether it was included and, if not, why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionRecord {
    pub hash: Hash,
    pub included: bool,
    pub reason: Option<ExclusionReason>,
}

/// The block header synthesized by the assembler. Real state roots/receipts
/// roots are filled in by an external execution collaborator; this crate
/// only fixes the fields the assembly algorithm itself determines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedHeader {
    pub parent_hash: Hash,
    pub number: u64,
    pub timestamp: u64,
    pub fee_recipient: Address,
    pub withdrawals: Option<Vec<Withdrawal>>,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub base_fee_per_gas: U256,
    pub blob_base_fee_per_gas: U256,
    pub mix_digest: Hash,
    pub blob_gas_used: Option<u64>,
}

/// The outcome of one assembly pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOutcome {
    pub header: SynthesizedHeader,
    pub included: Vec<Hash>,
    /// Raw bytes of `included`, same order, for callers that need to hand
    /// the assembled block's transaction list onward (e.g. the RPC layer).
    pub included_raw: Vec<Bytes>,
    pub trace: Vec<InclusionRecord>,
    pub gas_used: u64,
    pub blob_gas_used: u64,
    pub reward: U256,
    pub timed_out: bool,
}

/// Assembles a block from `candidates` against the given fee/gas context.
///
/// `deadline` is polled once per candidate; `cancel`, if supplied, is
/// polled alongside it (mirrors the teacher's `cancel.is_cancelled()` early
/// return in its build loop).
pub fn assemble(
    candidates: &[Candidate],
    parent: &BlockInfo,
    prev_randao: Hash,
    timestamp: u64,
    fee_recipient: Address,
    withdrawals: Option<Vec<Withdrawal>>,
    base_fee: U256,
    blob_base_fee: U256,
    gas_limit: u64,
    deadline: Instant,
    cancel: Option<&CancellationToken>,
) -> AssemblyOutcome {
    let mut sorted: Vec<&Candidate> = candidates.iter().collect();
    sorted.sort_by(|a, b| {
        b.effective_gas_price(base_fee).cmp(&a.effective_gas_price(base_fee))
    });

    let mut included = Vec::new();
    let mut included_raw = Vec::new();
    let mut trace = Vec::new();
    let mut gas_used = 0u64;
    let mut blob_gas_used = 0u64;
    let mut reward = U256::ZERO;
    let mut timed_out = false;

    for candidate in sorted {
        if Instant::now() >= deadline || cancel.is_some_and(|c| c.is_cancelled()) {
            timed_out = true;
            break;
        }

        if candidate.fee_cap() < base_fee {
            trace.push(InclusionRecord {
                hash: candidate.hash,
                included: false,
                reason: Some(ExclusionReason::FeeCapBelowBaseFee),
            });
            continue;
        }
        if candidate.gas > gas_limit.saturating_sub(gas_used) {
            trace.push(InclusionRecord {
                hash: candidate.hash,
                included: false,
                reason: Some(ExclusionReason::GasBudgetExceeded),
            });
            continue;
        }
        if candidate.is_blob_tx() {
            if blob_gas_used + candidate.blob_gas > MAX_BLOB_GAS_PER_BLOCK {
                trace.push(InclusionRecord {
                    hash: candidate.hash,
                    included: false,
                    reason: Some(ExclusionReason::BlobGasBudgetExceeded),
                });
                continue;
            }
            if candidate.blob_fee_cap.unwrap_or(U256::ZERO) < blob_base_fee {
                trace.push(InclusionRecord {
                    hash: candidate.hash,
                    included: false,
                    reason: Some(ExclusionReason::BlobFeeCapBelowBlobBaseFee),
                });
                continue;
            }
        }

        let effective_price = candidate.effective_gas_price(base_fee);
        gas_used += candidate.gas;
        if candidate.is_blob_tx() {
            blob_gas_used += candidate.blob_gas;
        }
        if effective_price > base_fee {
            reward += (effective_price - base_fee) * U256::from(candidate.gas);
        }

        included.push(candidate.hash);
        included_raw.push(candidate.raw.clone());
        trace.push(InclusionRecord { hash: candidate.hash, included: true, reason: None });
    }

    let header = SynthesizedHeader {
        parent_hash: parent.hash,
        number: parent.number + 1,
        timestamp,
        fee_recipient,
        withdrawals,
        gas_limit,
        gas_used,
        base_fee_per_gas: base_fee,
        blob_base_fee_per_gas: blob_base_fee,
        mix_digest: prev_randao,
        blob_gas_used: if blob_gas_used > 0 { Some(blob_gas_used) } else { None },
    };

    AssemblyOutcome { header, included, included_raw, trace, gas_used, blob_gas_used, reward, timed_out }
}
