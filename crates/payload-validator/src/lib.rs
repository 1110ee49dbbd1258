//! Fork-aware structural and contextual validation of execution payloads
//! (component C5).
//!
//! Validation is split into a context-free pass (checkable from the payload
//! alone) and a contextual pass (checked against the parent header), mirroring
//! the teacher's `ensure_well_formed_payload` / contextual-check split in its
//! beacon engine so that every failure is diagnosable rather than collapsed
//! into the first violation found.

use alloy_rlp::Encodable;
use engine_primitives::{
    chain_spec::Hardfork, crypto::keccak256, BlockInfo, ChainSpec, ExecutionPayload, Hash,
    PayloadAttributes, GAS_PER_BLOB, MAX_BLOB_GAS_PER_BLOCK, MAX_EXTRA_DATA_BYTES,
    MAX_TRANSACTION_SIZE, MAX_WITHDRAWALS_PER_PAYLOAD, MIN_BASE_FEE, MIN_GAS_LIMIT,
};
use engine_versioned_hash::validate_blob_tx;
use std::collections::HashSet;
use thiserror::Error;

/// The outcome of validating a payload, matching the Engine API's
/// `newPayload` response shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadStatus {
    Valid { latest_valid_hash: Hash },
    InvalidBlockHash { computed: Hash, declared: Hash },
    Invalid { message: String, latest_valid_hash: Option<Hash> },
    Syncing,
    /// Context-free checks passed but the payload was not executed against
    /// the canonical chain (e.g. its parent is known only optimistically).
    /// The engine core is the only caller that currently produces this.
    Accepted,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    Violation(String),
}

/// Parent-chain context a contextual validation pass needs. Supplied by the
/// caller (typically the forkchoice/engine core) rather than fetched here;
/// this crate never performs I/O.
#[derive(Debug, Clone)]
pub struct ParentContext {
    pub info: BlockInfo,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee_per_gas: u64,
    pub excess_blob_gas: u64,
    pub blob_gas_used: u64,
}

pub struct PayloadValidator {
    chain_spec: ChainSpec,
}

impl PayloadValidator {
    pub fn new(chain_spec: ChainSpec) -> Self {
        Self { chain_spec }
    }

    /// Context-free checks: everything derivable from the payload alone.
    /// Returns every violation found, not just the first.
    pub fn context_free_checks(&self, payload: &ExecutionPayload) -> Vec<String> {
        let mut violations = Vec::new();

        if payload.extra_data.len() > MAX_EXTRA_DATA_BYTES {
            violations.push(format!(
                "extra_data length {} exceeds {MAX_EXTRA_DATA_BYTES}",
                payload.extra_data.len()
            ));
        }
        if payload.base_fee_per_gas.is_zero() {
            violations.push("base_fee_per_gas must be nonzero".to_string());
        }
        if payload.timestamp == 0 {
            violations.push("timestamp must be nonzero".to_string());
        }
        if payload.gas_used > payload.gas_limit {
            violations.push(format!(
                "gas_used {} exceeds gas_limit {}",
                payload.gas_used, payload.gas_limit
            ));
        }
        if let Some(blob_gas_used) = payload.blob_gas_used {
            if blob_gas_used % GAS_PER_BLOB != 0 {
                violations.push(format!("blob_gas_used {blob_gas_used} not a multiple of {GAS_PER_BLOB}"));
            }
            if blob_gas_used > MAX_BLOB_GAS_PER_BLOCK {
                violations.push(format!(
                    "blob_gas_used {blob_gas_used} exceeds {MAX_BLOB_GAS_PER_BLOCK}"
                ));
            }
        }
        if let Some(withdrawals) = &payload.withdrawals {
            if withdrawals.len() > MAX_WITHDRAWALS_PER_PAYLOAD {
                violations.push(format!(
                    "withdrawals count {} exceeds {MAX_WITHDRAWALS_PER_PAYLOAD}",
                    withdrawals.len()
                ));
            }
            let mut seen = HashSet::new();
            for w in withdrawals {
                if !seen.insert(w.index) {
                    violations.push(format!("duplicate withdrawal index {}", w.index));
                }
                if w.address.is_zero() {
                    violations.push("withdrawal has a zero address".to_string());
                }
            }
        }
        for (i, tx) in payload.transactions.iter().enumerate() {
            if tx.is_empty() {
                violations.push(format!("transaction {i} is empty"));
            }
            if tx.len() > MAX_TRANSACTION_SIZE {
                violations.push(format!(
                    "transaction {i} size {} exceeds {MAX_TRANSACTION_SIZE}",
                    tx.len()
                ));
            }
        }

        violations
    }

    /// Contextual checks against the parent header. Returns every violation
    /// found, along with the recomputed base fee / excess blob gas (the
    /// caller needs these to reconstruct the header for the block-hash
    /// check, so they are surfaced rather than recomputed twice).
    pub fn contextual_checks(
        &self,
        payload: &ExecutionPayload,
        parent: &ParentContext,
    ) -> (Vec<String>, u64, u64) {
        let mut violations = Vec::new();

        if payload.parent_hash != parent.info.hash {
            violations.push("parent_hash does not match the parent block's hash".to_string());
        }
        if payload.timestamp <= parent.info.timestamp {
            violations.push("timestamp does not strictly increase over the parent".to_string());
        }

        let max_gas_delta = parent.gas_limit / 1024;
        let gas_delta = payload.gas_limit.abs_diff(parent.gas_limit);
        if gas_delta > max_gas_delta || payload.gas_limit < MIN_GAS_LIMIT {
            violations.push(format!(
                "gas_limit {} is outside the bounded delta from parent gas_limit {}",
                payload.gas_limit, parent.gas_limit
            ));
        }

        let expected_base_fee = next_base_fee(parent.gas_limit, parent.gas_used, parent.base_fee_per_gas);
        let declared_base_fee = payload.base_fee_per_gas.to::<u64>();
        if declared_base_fee != expected_base_fee {
            violations.push(format!(
                "base_fee_per_gas {declared_base_fee} does not match the expected recurrence value {expected_base_fee}"
            ));
        }

        let expected_excess_blob_gas =
            next_excess_blob_gas(parent.excess_blob_gas, parent.blob_gas_used);
        if let Some(declared) = payload.excess_blob_gas {
            if declared != expected_excess_blob_gas {
                violations.push(format!(
                    "excess_blob_gas {declared} does not match the expected recurrence value {expected_excess_blob_gas}"
                ));
            }
        }

        (violations, expected_base_fee, expected_excess_blob_gas)
    }

    /// Fork-gate checks: which fields must be present given the active
    /// hardfork at `payload.timestamp`.
    pub fn fork_gate_checks(&self, payload: &ExecutionPayload) -> Vec<String> {
        let mut violations = Vec::new();
        let fork = self.chain_spec.fork_at(payload.timestamp);

        if fork >= Hardfork::Shanghai && payload.withdrawals.is_none() {
            violations.push("Shanghai-active payload is missing withdrawals".to_string());
        }

        if fork >= Hardfork::Cancun {
            if payload.blob_gas_used.is_none() || payload.excess_blob_gas.is_none() {
                violations.push("Cancun-active payload is missing blob-gas fields".to_string());
            }
            match payload.parent_beacon_block_root {
                Some(root) if !root.is_zero() => {}
                _ => violations.push(
                    "Cancun-active payload requires a nonzero parent_beacon_block_root".to_string(),
                ),
            }
        }

        if fork >= Hardfork::Prague {
            match &payload.execution_requests {
                None => violations.push("Prague-active payload is missing execution_requests".to_string()),
                Some(requests) => {
                    let mut last_type = None;
                    for req in requests {
                        if let Some(last) = last_type {
                            if req.request_type <= last {
                                violations.push(
                                    "execution_requests request_type bytes are not monotonic".to_string(),
                                );
                            }
                        }
                        last_type = Some(req.request_type);
                    }
                }
            }
        }

        if fork >= Hardfork::Amsterdam && payload.block_access_list.is_none() {
            violations.push("Amsterdam-active payload is missing a block_access_list".to_string());
        }

        if fork >= Hardfork::V7 {
            // `attrs_requirements` is build-time-only context (attached to the
            // payload attributes that produced this block, not the payload
            // itself); `validate_attrs` is responsible for that half of the V7
            // gate, so it is not re-checked here.
            violations.extend(self.validate_v7(payload, None));
        }

        violations
    }

    /// V5 block-access-list comparison: the BAL attached to the payload must
    /// match, byte-for-byte, the BAL rebuilt from execution output.
    pub fn validate_block_access_list(
        &self,
        payload: &ExecutionPayload,
        rebuilt: &engine_primitives::BlockAccessList,
    ) -> Result<(), String> {
        match &payload.block_access_list {
            Some(attached) if attached == rebuilt => Ok(()),
            Some(_) => Err("block_access_list does not match the rebuilt value".to_string()),
            None => Err("block_access_list is required at this fork".to_string()),
        }
    }

    /// V7 checks: proof submissions and (if present) proof requirements.
    pub fn validate_v7(
        &self,
        payload: &ExecutionPayload,
        attrs_requirements: Option<&engine_primitives::ProofRequirements>,
    ) -> Vec<String> {
        let mut violations = Vec::new();

        match &payload.proof_submissions {
            None => violations.push("V7 payload is missing proof_submissions".to_string()),
            Some(submissions) => {
                for (i, s) in submissions.iter().enumerate() {
                    if s.is_empty() {
                        violations.push(format!("proof_submissions[{i}] is empty"));
                    }
                }
                if payload.has_blob_transactions() && payload.blob_commitments.is_none() {
                    violations.push(
                        "payload uses blob gas but carries no blob_commitments".to_string(),
                    );
                }
            }
        }

        if let Some(requirements) = attrs_requirements {
            if !requirements.is_self_consistent() {
                violations.push("proof_requirements is not self-consistent".to_string());
            }
        }

        violations
    }

    /// Reconstructs the canonical header and compares its Keccak-256 digest
    /// against `payload.block_hash`.
    pub fn check_block_hash(
        &self,
        payload: &ExecutionPayload,
        recomputed_base_fee: u64,
        recomputed_excess_blob_gas: u64,
    ) -> Result<(), (Hash, Hash)> {
        let header = CanonicalHeader::from_payload(payload, recomputed_base_fee, recomputed_excess_blob_gas);
        let computed = header.hash();
        if computed == payload.block_hash {
            Ok(())
        } else {
            Err((computed, payload.block_hash))
        }
    }

    /// Cross-checks the payload's blob-carrying transactions (component C3):
    /// every `expected_blob_hashes` entry supplied by the caller (the
    /// `newPayload` RPC parameter) must carry the KZG version byte and match
    /// the versioned hash recomputed from `payload.blob_commitments`.
    pub fn validate_versioned_hashes(
        &self,
        payload: &ExecutionPayload,
        expected_blob_hashes: &[Hash],
    ) -> Vec<String> {
        if !payload.has_blob_transactions() && expected_blob_hashes.is_empty() {
            return Vec::new();
        }
        let Some(commitments) = &payload.blob_commitments else {
            return vec!["blob-gas-using payload carries no blob_commitments".to_string()];
        };
        let refs: Vec<&[u8]> = commitments.iter().map(|c| c.as_ref()).collect();
        match validate_blob_tx(expected_blob_hashes, &refs) {
            Ok(()) => Vec::new(),
            Err(e) => vec![e.to_string()],
        }
    }

    /// Runs the full pipeline and produces a single [`PayloadStatus`].
    pub fn validate(
        &self,
        payload: &ExecutionPayload,
        parent: Option<&ParentContext>,
        expected_blob_hashes: &[Hash],
    ) -> PayloadStatus {
        let Some(parent) = parent else {
            return PayloadStatus::Syncing;
        };

        let mut violations = self.context_free_checks(payload);
        violations.extend(self.fork_gate_checks(payload));
        violations.extend(self.validate_versioned_hashes(payload, expected_blob_hashes));

        let (contextual_violations, expected_base_fee, expected_excess_blob_gas) =
            self.contextual_checks(payload, parent);
        violations.extend(contextual_violations);

        if !violations.is_empty() {
            return PayloadStatus::Invalid {
                message: violations.join("; "),
                latest_valid_hash: Some(parent.info.hash),
            };
        }

        match self.check_block_hash(payload, expected_base_fee, expected_excess_blob_gas) {
            Ok(()) => PayloadStatus::Valid { latest_valid_hash: payload.block_hash },
            Err((computed, declared)) => PayloadStatus::InvalidBlockHash { computed, declared },
        }
    }

    /// `timestamp > 0`, strictly greater than head's timestamp; nonzero
    /// `parent_beacon_block_root` required from Cancun onward; V4+ requires
    /// `proof_requirements` self-consistency when attached.
    pub fn validate_attrs(
        &self,
        attrs: &PayloadAttributes,
        head: &BlockInfo,
    ) -> Result<(), ValidationError> {
        if attrs.timestamp == 0 || attrs.timestamp <= head.timestamp {
            return Err(ValidationError::Violation(
                "attributes timestamp must be nonzero and strictly greater than head's".to_string(),
            ));
        }
        let fork = self.chain_spec.fork_at(attrs.timestamp);
        if fork >= Hardfork::Cancun {
            match attrs.parent_beacon_block_root {
                Some(root) if !root.is_zero() => {}
                _ => {
                    return Err(ValidationError::Violation(
                        "attributes require a nonzero parent_beacon_block_root at this fork".to_string(),
                    ))
                }
            }
        }
        if fork >= Hardfork::V7 {
            if let Some(requirements) = &attrs.proof_requirements {
                if !requirements.is_self_consistent() {
                    return Err(ValidationError::Violation(
                        "attributes proof_requirements is not self-consistent".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// EIP-1559 base-fee recurrence. `target = parent_gas_limit / 2`
/// (elasticity = 2).
pub fn next_base_fee(parent_gas_limit: u64, parent_gas_used: u64, parent_base_fee: u64) -> u64 {
    let target = parent_gas_limit / 2;
    if parent_gas_used == target {
        return parent_base_fee;
    }
    if parent_gas_used > target {
        let gas_delta = (parent_gas_used - target) as u128;
        let delta = ((parent_base_fee as u128 * gas_delta) / target as u128 / 8).max(1);
        (parent_base_fee as u128 + delta) as u64
    } else {
        let gas_delta = (target - parent_gas_used) as u128;
        let delta = (parent_base_fee as u128 * gas_delta) / target as u128 / 8;
        let next = (parent_base_fee as u128).saturating_sub(delta).max(1) as u64;
        next.max(MIN_BASE_FEE)
    }
}

/// EIP-4844 excess-blob-gas recurrence, target 3 blobs per block.
pub fn next_excess_blob_gas(parent_excess_blob_gas: u64, parent_blob_gas_used: u64) -> u64 {
    let target = 3 * GAS_PER_BLOB;
    (parent_excess_blob_gas + parent_blob_gas_used).saturating_sub(target)
}

const EMPTY_UNCLE_HASH: &str = "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d4934";

/// The canonical header field order used for the block-hash check:
/// `(parent_hash, uncle_hash, coinbase, state_root, tx_hash, receipt_hash,
/// bloom, difficulty, number, gas_limit, gas_used, time, extra, mix_digest,
/// nonce, base_fee, blob_gas_used, excess_blob_gas)`.
struct CanonicalHeader<'a> {
    payload: &'a ExecutionPayload,
    base_fee: u64,
    excess_blob_gas: u64,
}

impl<'a> CanonicalHeader<'a> {
    fn from_payload(payload: &'a ExecutionPayload, base_fee: u64, excess_blob_gas: u64) -> Self {
        Self { payload, base_fee, excess_blob_gas }
    }

    fn tx_root(&self) -> Hash {
        keccak256(engine_primitives::crypto::rlp_encode(&self.payload.transactions))
    }

    fn hash(&self) -> Hash {
        let p = self.payload;
        let uncle_hash: Hash = EMPTY_UNCLE_HASH.parse().expect("valid constant");
        let tx_hash = self.tx_root();

        let mut buf = Vec::new();

        // Fields are encoded individually into one flat buffer via a
        // length-prefixed list, matching the teacher's header RLP encoding
        // convention (`Encodable` per field, wrapped by a list header).
        struct Fields<'b> {
            parent_hash: Hash,
            uncle_hash: Hash,
            coinbase: engine_primitives::Address,
            state_root: Hash,
            tx_hash: Hash,
            receipt_hash: Hash,
            bloom: &'b alloy_primitives::Bloom,
            difficulty: u64,
            number: u64,
            gas_limit: u64,
            gas_used: u64,
            time: u64,
            extra: &'b alloy_primitives::Bytes,
            mix_digest: Hash,
            nonce: u64,
            base_fee: u64,
            blob_gas_used: Option<u64>,
            excess_blob_gas: Option<u64>,
        }

        impl Encodable for Fields<'_> {
            fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
                let mut payload = Vec::new();
                self.parent_hash.encode(&mut payload);
                self.uncle_hash.encode(&mut payload);
                self.coinbase.encode(&mut payload);
                self.state_root.encode(&mut payload);
                self.tx_hash.encode(&mut payload);
                self.receipt_hash.encode(&mut payload);
                self.bloom.encode(&mut payload);
                self.difficulty.encode(&mut payload);
                self.number.encode(&mut payload);
                self.gas_limit.encode(&mut payload);
                self.gas_used.encode(&mut payload);
                self.time.encode(&mut payload);
                self.extra.encode(&mut payload);
                self.mix_digest.encode(&mut payload);
                self.nonce.encode(&mut payload);
                self.base_fee.encode(&mut payload);
                if let Some(v) = self.blob_gas_used {
                    v.encode(&mut payload);
                }
                if let Some(v) = self.excess_blob_gas {
                    v.encode(&mut payload);
                }
                alloy_rlp::Header { list: true, payload_length: payload.len() }.encode(out);
                out.put_slice(&payload);
            }

            fn length(&self) -> usize {
                // Unused: we only ever call `encode` above into a flat buffer.
                0
            }
        }

        let fields = Fields {
            parent_hash: p.parent_hash,
            uncle_hash,
            coinbase: p.fee_recipient,
            state_root: p.state_root,
            tx_hash,
            receipt_hash: p.receipts_root,
            bloom: &p.logs_bloom,
            difficulty: 0,
            number: p.block_number,
            gas_limit: p.gas_limit,
            gas_used: p.gas_used,
            time: p.timestamp,
            extra: &p.extra_data,
            mix_digest: p.prev_randao,
            nonce: 0,
            base_fee: self.base_fee,
            blob_gas_used: p.blob_gas_used,
            excess_blob_gas: Some(self.excess_blob_gas).filter(|_| p.blob_gas_used.is_some()),
        };

        fields.encode(&mut buf);
        keccak256(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_fee_stays_flat_at_target_usage() {
        assert_eq!(next_base_fee(30_000_000, 15_000_000, 1_000_000_000), 1_000_000_000);
    }

    #[test]
    fn base_fee_rises_above_target_usage() {
        let next = next_base_fee(30_000_000, 20_000_000, 1_000_000_000);
        assert!(next > 1_000_000_000);
    }

    #[test]
    fn base_fee_falls_below_target_usage_but_never_under_minimum() {
        let next = next_base_fee(30_000_000, 1_000, 8);
        assert!(next >= MIN_BASE_FEE);
    }

    #[test]
    fn excess_blob_gas_recurrence_saturates_at_zero() {
        assert_eq!(next_excess_blob_gas(0, 0), 0);
        assert_eq!(next_excess_blob_gas(0, GAS_PER_BLOB), 0);
        assert_eq!(next_excess_blob_gas(3 * GAS_PER_BLOB, 4 * GAS_PER_BLOB), 4 * GAS_PER_BLOB);
    }
}
