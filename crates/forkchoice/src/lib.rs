//! Forkchoice head/safe/finalized tracking, reorg detection, proposer boost,
//! and payload-id allocation (component C6).
//!
//! Mirrors the teacher's `on_forkchoice_updated` / `lowest_buffered_ancestor`
//! machinery in `crates/consensus/beacon/src/engine/mod.rs`: pointer commits
//! are atomic, ancestry walks are bounded, and attribute-validation failures
//! never roll back an already-committed forkchoice state.

use engine_block_store::BlockStore;
use engine_metrics::EngineMetrics;
use engine_payload_validator::ValidationError;
use engine_primitives::{
    crypto::sha256, BlockInfo, Checkpoint, ForkchoiceState, Hash, PayloadAttributes, PayloadId,
    ProposerBoost, ReorgEvent, EPOCH_SLOTS, MAX_ANCESTRY_WALK,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForkchoiceError {
    #[error("forkchoice head must be nonzero")]
    HeadZero,
    #[error("safe block is not an ancestor of head")]
    SafeNotAncestorOfHead,
    #[error("finalized block is not an ancestor of safe")]
    FinalizedNotAncestorOfSafe,
}

/// The result of applying a new forkchoice state, independent of whether
/// build attributes were supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The head is not yet known to the block store; no state changed.
    Syncing,
    /// The pointers were committed. `reorg` is set if the new head is not a
    /// descendant of the previous head. `payload_id` is set iff attributes
    /// were supplied and passed `validate_attrs`; the caller is responsible
    /// for handing this id to a payload tracker/builder.
    Applied {
        latest_valid_hash: Hash,
        reorg: Option<ReorgEvent>,
        payload_id: Option<PayloadId>,
        attrs_error: Option<ValidationError>,
    },
}

type ReorgListener = Box<dyn Fn(&ReorgEvent) + Send + Sync>;

struct Inner {
    state: ForkchoiceState,
    head_info: Option<BlockInfo>,
    checkpoints: Vec<Checkpoint>,
    proposer_boost: Option<ProposerBoost>,
    issued_payload_ids: HashSet<PayloadId>,
    listeners: Vec<ReorgListener>,
}

/// Owns the canonical head/safe/finalized pointers and everything derived
/// from them.
pub struct ForkchoiceCore {
    inner: RwLock<Inner>,
    block_store: Arc<BlockStore>,
    metrics: EngineMetrics,
}

impl ForkchoiceCore {
    pub fn new(block_store: Arc<BlockStore>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: ForkchoiceState::default(),
                head_info: None,
                checkpoints: Vec::new(),
                proposer_boost: None,
                issued_payload_ids: HashSet::new(),
                listeners: Vec::new(),
            }),
            block_store,
            metrics: EngineMetrics::default(),
        }
    }

    /// Registers a reorg listener. Listeners run synchronously under the
    /// forkchoice write lock and must not block.
    pub fn on_reorg<F>(&self, listener: F)
    where
        F: Fn(&ReorgEvent) + Send + Sync + 'static,
    {
        self.inner.write().listeners.push(Box::new(listener));
    }

    pub fn current_state(&self) -> ForkchoiceState {
        self.inner.read().state
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.inner.read().checkpoints.clone()
    }

    /// Returns the active proposer-boost weight for `root`, or zero if no
    /// boost is active or it targets a different root.
    pub fn boost_for(&self, root: Hash) -> u64 {
        match &self.inner.read().proposer_boost {
            Some(boost) if boost.block_root == root => boost.boost_weight,
            _ => 0,
        }
    }

    /// Records a proposer boost for `slot`. At most one boost is retained per
    /// slot; a later call for the same slot replaces the earlier one, a call
    /// for a new slot supersedes any boost for an older slot.
    pub fn note_proposer_boost(&self, boost: ProposerBoost) {
        let mut guard = self.inner.write();
        let should_replace = match &guard.proposer_boost {
            Some(existing) => boost.slot >= existing.slot,
            None => true,
        };
        if should_replace {
            guard.proposer_boost = Some(boost);
        }
    }

    /// Bounded ancestry walk from `from` looking for `target`, following
    /// parent pointers through the block store. No I/O occurs beyond block
    /// store reads.
    fn is_ancestor(&self, from: Hash, target: Hash) -> bool {
        if from == target {
            return true;
        }
        let mut current = from;
        for _ in 0..MAX_ANCESTRY_WALK {
            let Some(info) = self.block_store.get(current) else { return false };
            if info.parent_hash == current {
                // broken-chain sentinel
                return false;
            }
            if info.parent_hash == target {
                return true;
            }
            current = info.parent_hash;
        }
        false
    }

    /// Finds the most recent common ancestor of `a` and `b`, bounded at
    /// `MAX_ANCESTRY_WALK` steps per side, returning the ancestor hash and the
    /// depth of `a` above it.
    fn common_ancestor(&self, a: Hash, b: Hash) -> Option<(Hash, u64)> {
        let mut a_chain = Vec::with_capacity(MAX_ANCESTRY_WALK);
        let mut current = a;
        a_chain.push(current);
        for _ in 0..MAX_ANCESTRY_WALK {
            let Some(info) = self.block_store.get(current) else { break };
            if info.parent_hash == current {
                break;
            }
            current = info.parent_hash;
            a_chain.push(current);
        }

        let mut current = b;
        let mut depth = 0u64;
        if let Some(pos) = a_chain.iter().position(|h| *h == current) {
            return Some((current, pos as u64));
        }
        for _ in 0..MAX_ANCESTRY_WALK {
            let Some(info) = self.block_store.get(current) else { return None };
            if info.parent_hash == current {
                return None;
            }
            current = info.parent_hash;
            depth += 1;
            if let Some(pos) = a_chain.iter().position(|h| *h == current) {
                return Some((current, pos as u64));
            }
        }
        None
    }

    /// Allocates a fresh, collision-free payload id seeded from the head
    /// hash, the attributes timestamp, and the remaining attribute fields.
    /// The id is opaque; callers must not depend on its internal structure.
    fn allocate_payload_id(&self, head: Hash, attrs: &PayloadAttributes, guard: &mut Inner) -> PayloadId {
        let mut nonce = 0u64;
        loop {
            let mut preimage = Vec::new();
            preimage.extend_from_slice(head.as_slice());
            preimage.extend_from_slice(&attrs.timestamp.to_be_bytes());
            preimage.extend_from_slice(attrs.prev_randao.as_slice());
            preimage.extend_from_slice(attrs.suggested_fee_recipient.as_slice());
            if let Some(withdrawals) = &attrs.withdrawals {
                for w in withdrawals {
                    preimage.extend_from_slice(&w.index.to_be_bytes());
                }
            }
            if let Some(root) = attrs.parent_beacon_block_root {
                preimage.extend_from_slice(root.as_slice());
            }
            preimage.extend_from_slice(&nonce.to_be_bytes());

            let digest = sha256(&preimage);
            let mut id_bytes = [0u8; 8];
            id_bytes.copy_from_slice(&digest[..8]);
            let id = PayloadId::new(id_bytes);

            if guard.issued_payload_ids.insert(id) {
                return id;
            }
            nonce += 1;
        }
    }

    /// Applies a new forkchoice state, optionally building on top of it.
    pub fn apply(
        &self,
        state: ForkchoiceState,
        attrs: Option<&PayloadAttributes>,
        validator: &engine_payload_validator::PayloadValidator,
    ) -> Result<ApplyOutcome, ForkchoiceError> {
        if state.head_is_zero() {
            return Err(ForkchoiceError::HeadZero);
        }

        let Some(head_info) = self.block_store.get(state.head) else {
            trace!(target: "engine::forkchoice", head = %state.head, "head unknown, reporting syncing");
            return Ok(ApplyOutcome::Syncing);
        };

        if !state.safe.is_zero() && state.safe != state.head && !self.is_ancestor(state.head, state.safe)
        {
            return Err(ForkchoiceError::SafeNotAncestorOfHead);
        }
        if !state.finalized.is_zero()
            && state.finalized != state.safe
            && !self.is_ancestor(state.safe, state.finalized)
        {
            return Err(ForkchoiceError::FinalizedNotAncestorOfSafe);
        }

        let mut guard = self.inner.write();
        let previous_head = guard.state.head;

        let reorg = if !previous_head.is_zero()
            && previous_head != state.head
            && !self.is_ancestor(state.head, previous_head)
        {
            let reorg_event = self.common_ancestor(previous_head, state.head).map(|(_, depth)| {
                let old_number = guard.head_info.as_ref().map(|i| i.number).unwrap_or(0);
                ReorgEvent {
                    slot: head_info.slot,
                    old_head: previous_head,
                    new_head: state.head,
                    depth,
                    old_number,
                    new_number: head_info.number,
                }
            });
            if let Some(event) = &reorg_event {
                warn!(target: "engine::forkchoice", old = %event.old_head, new = %event.new_head, depth = event.depth, "reorg detected");
                for listener in &guard.listeners {
                    listener(event);
                }
                self.metrics.reorgs_total.increment(1);
                self.metrics.reorg_depth.record(event.depth as f64);
            }
            reorg_event
        } else {
            None
        };

        guard.state.head = state.head;
        guard.head_info = Some(head_info);
        if !state.safe.is_zero() {
            guard.state.safe = state.safe;
            if let Some(info) = self.block_store.get(state.safe) {
                Self::push_checkpoint(&mut guard.checkpoints, info);
            }
        }
        if !state.finalized.is_zero() {
            guard.state.finalized = state.finalized;
            if let Some(info) = self.block_store.get(state.finalized) {
                Self::push_checkpoint(&mut guard.checkpoints, info);
            }
        }
        self.metrics.forkchoice_updated_messages.increment(1);

        let (payload_id, attrs_error) = match attrs {
            None => (None, None),
            Some(attrs) => {
                let head_for_validation =
                    guard.head_info.expect("head_info was just set above");
                match validator.validate_attrs(attrs, &head_for_validation) {
                    Ok(()) => {
                        let id = self.allocate_payload_id(state.head, attrs, &mut guard);
                        (Some(id), None)
                    }
                    Err(e) => (None, Some(e)),
                }
            }
        };

        Ok(ApplyOutcome::Applied {
            latest_valid_hash: state.head,
            reorg,
            payload_id,
            attrs_error,
        })
    }

    fn push_checkpoint(checkpoints: &mut Vec<Checkpoint>, info: BlockInfo) {
        let checkpoint = Checkpoint { epoch: info.slot / EPOCH_SLOTS, root: info.hash };
        if checkpoints.last() != Some(&checkpoint) {
            checkpoints.push(checkpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_primitives::ChainSpec;

    fn hash(byte: u8) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        Hash::from(bytes)
    }

    fn block(number: u64, slot: u64, this: Hash, parent: Hash) -> BlockInfo {
        BlockInfo { hash: this, parent_hash: parent, number, timestamp: 1_000 + number, slot }
    }

    fn setup() -> (ForkchoiceCore, engine_payload_validator::PayloadValidator) {
        let store = Arc::new(BlockStore::new(1024));
        store.put(block(0, 0, hash(0), hash(0))).unwrap();
        store.put(block(1, 1, hash(1), hash(0))).unwrap();
        store.put(block(2, 2, hash(2), hash(1))).unwrap();
        let validator = engine_payload_validator::PayloadValidator::new(ChainSpec::default());
        (ForkchoiceCore::new(store), validator)
    }

    #[test]
    fn head_zero_is_rejected() {
        let (core, validator) = setup();
        let err = core.apply(ForkchoiceState::default(), None, &validator).unwrap_err();
        assert_eq!(err, ForkchoiceError::HeadZero);
    }

    #[test]
    fn unknown_head_reports_syncing() {
        let (core, validator) = setup();
        let state = ForkchoiceState { head: hash(99), safe: Hash::ZERO, finalized: Hash::ZERO };
        let outcome = core.apply(state, None, &validator).unwrap();
        assert_eq!(outcome, ApplyOutcome::Syncing);
    }

    #[test]
    fn simple_forward_progress_commits_pointers() {
        let (core, validator) = setup();
        let state = ForkchoiceState { head: hash(2), safe: hash(1), finalized: hash(0) };
        let outcome = core.apply(state, None, &validator).unwrap();
        match outcome {
            ApplyOutcome::Applied { latest_valid_hash, reorg, .. } => {
                assert_eq!(latest_valid_hash, hash(2));
                assert!(reorg.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(core.current_state().head, hash(2));
    }

    #[test]
    fn safe_not_ancestor_of_head_is_rejected() {
        let (core, validator) = setup();
        let state = ForkchoiceState { head: hash(1), safe: hash(2), finalized: Hash::ZERO };
        let err = core.apply(state, None, &validator).unwrap_err();
        assert_eq!(err, ForkchoiceError::SafeNotAncestorOfHead);
    }

    #[test]
    fn reorg_to_a_sibling_chain_is_detected_and_listener_notified() {
        let store = Arc::new(BlockStore::new(1024));
        store.put(block(0, 0, hash(0), hash(0))).unwrap();
        store.put(block(1, 1, hash(1), hash(0))).unwrap();
        store.put(block(1, 1, hash(10), hash(0))).unwrap();
        let validator = engine_payload_validator::PayloadValidator::new(ChainSpec::default());
        let core = ForkchoiceCore::new(store);

        core.apply(
            ForkchoiceState { head: hash(1), safe: Hash::ZERO, finalized: Hash::ZERO },
            None,
            &validator,
        )
        .unwrap();

        let observed = Arc::new(parking_lot::Mutex::new(None));
        let observed_clone = observed.clone();
        core.on_reorg(move |event| {
            *observed_clone.lock() = Some(event.clone());
        });

        let outcome = core
            .apply(
                ForkchoiceState { head: hash(10), safe: Hash::ZERO, finalized: Hash::ZERO },
                None,
                &validator,
            )
            .unwrap();

        match outcome {
            ApplyOutcome::Applied { reorg: Some(event), .. } => {
                assert_eq!(event.old_head, hash(1));
                assert_eq!(event.new_head, hash(10));
            }
            other => panic!("expected a reorg, got {other:?}"),
        }
        assert!(observed.lock().is_some());
    }

    #[test]
    fn attrs_validate_and_allocate_a_payload_id() {
        let (core, validator) = setup();
        core.apply(
            ForkchoiceState { head: hash(1), safe: Hash::ZERO, finalized: Hash::ZERO },
            None,
            &validator,
        )
        .unwrap();

        let attrs = PayloadAttributes {
            timestamp: 5_000,
            prev_randao: hash(7),
            suggested_fee_recipient: Default::default(),
            withdrawals: None,
            parent_beacon_block_root: Some(hash(8)),
            inclusion_list: None,
            slot: Some(3),
            proof_requirements: None,
        };
        let outcome = core
            .apply(
                ForkchoiceState { head: hash(2), safe: Hash::ZERO, finalized: Hash::ZERO },
                Some(&attrs),
                &validator,
            )
            .unwrap();
        match outcome {
            ApplyOutcome::Applied { payload_id, attrs_error, .. } => {
                assert!(payload_id.is_some());
                assert!(attrs_error.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn committing_pointers_survives_an_attrs_error() {
        let (core, validator) = setup();
        core.apply(
            ForkchoiceState { head: hash(1), safe: Hash::ZERO, finalized: Hash::ZERO },
            None,
            &validator,
        )
        .unwrap();

        // timestamp not strictly greater than head's -> attrs invalid, but the
        // pointer move to hash(2) must still take effect.
        let attrs = PayloadAttributes {
            timestamp: 0,
            prev_randao: hash(7),
            suggested_fee_recipient: Default::default(),
            withdrawals: None,
            parent_beacon_block_root: Some(hash(8)),
            inclusion_list: None,
            slot: None,
            proof_requirements: None,
        };
        let outcome = core
            .apply(
                ForkchoiceState { head: hash(2), safe: Hash::ZERO, finalized: Hash::ZERO },
                Some(&attrs),
                &validator,
            )
            .unwrap();
        match outcome {
            ApplyOutcome::Applied { payload_id, attrs_error, .. } => {
                assert!(payload_id.is_none());
                assert!(attrs_error.is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(core.current_state().head, hash(2));
    }
}
