//! `EngineCore` (C10): the orchestration layer that wires the
//! forkchoice/validator/assembler/tracker components together behind the
//! three verbs a consensus-layer driver calls (`new_payload`,
//! `forkchoice_update`, `get_payload`).
//!
//! Grounded on the teacher's `BeaconConsensusEngine` in
//! `crates/consensus/beacon/src/engine/mod.rs`: one orchestrator struct
//! holding references to its collaborators, a `Processor`/`StateDb` trait
//! seam standing in for the teacher's EVM executor and state provider, and
//! an `InvalidHeaderCache` mirroring the teacher's own of the same name.

use engine_block_assembler::Candidate;
use engine_block_store::BlockStore;
use engine_forkchoice::{ApplyOutcome, ForkchoiceCore, ForkchoiceError};
use engine_metrics::EngineMetrics;
use engine_payload_builder::{BuiltPayload, GetResult as TrackerGetResult, PayloadBuilder, PayloadTracker};
use engine_payload_validator::{ParentContext, PayloadStatus, PayloadValidator};
use engine_primitives::{
    BlockInfo, ChainSpec, ExecutionPayload, Hash, PayloadAttributes, PayloadId,
};
use parking_lot::RwLock;
use schnellru::{ByLength, LruMap};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

/// The opaque result of executing a block against a state snapshot. Real
/// state/receipts roots are produced by the external `Processor`; this
/// engine only threads them back into the `ParentContext` it keeps for the
/// next block's contextual validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub state_root: Hash,
    pub receipts_root: Hash,
    /// The block-access-list rebuilt from execution, compared byte-for-byte
    /// against `payload.block_access_list` once present (Amsterdam/V5+).
    /// `None` when the processor doesn't compute one, e.g. pre-Amsterdam or
    /// the no-op stand-in.
    pub block_access_list: Option<engine_primitives::BlockAccessList>,
}

/// A cheap-to-copy state snapshot, consumed by [`Processor::process`]. The
/// real implementation (an external collaborator) must make `copy` O(1),
/// e.g. via a persistent/COW data structure; this engine never mutates a
/// snapshot after handing it to the processor.
pub trait StateDb: Send + Sync {
    fn copy(&self) -> Box<dyn StateDb>;
}

/// The EVM / state-transition executor, external per scope. `process` is
/// the only hook this engine needs: decode+execute the block against
/// `state`, returning roots to reconcile or an error message to surface as
/// `INVALID`.
pub trait Processor: Send + Sync {
    fn process(&self, payload: &ExecutionPayload, state: &dyn StateDb) -> Result<ProcessOutput, String>;
}

/// A do-nothing processor: reports success without executing anything.
/// Used in examples and tests only, standing in for a real EVM per the
/// engine's Non-goals.
pub struct NoopProcessor;

impl Processor for NoopProcessor {
    fn process(&self, payload: &ExecutionPayload, _state: &dyn StateDb) -> Result<ProcessOutput, String> {
        Ok(ProcessOutput {
            state_root: payload.state_root,
            receipts_root: payload.receipts_root,
            block_access_list: None,
        })
    }
}

/// A trivial state snapshot whose `copy` is a real (cheap) clone. Used in
/// examples and tests only.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateDb;

impl StateDb for InMemoryStateDb {
    fn copy(&self) -> Box<dyn StateDb> {
        Box::new(self.clone())
    }
}

/// Supplies transaction candidates for a build. The mempool is external per
/// scope; this is the seam a real mempool integration would implement.
pub trait CandidateSource: Send + Sync {
    fn candidates(&self, parent_hash: Hash) -> Vec<Candidate>;
}

/// A candidate source that never has anything to offer. Used when no
/// mempool is wired in (e.g. tests, or a node that only drives
/// `new_payload`/`forkchoice_update` without ever building).
pub struct EmptyCandidateSource;

impl CandidateSource for EmptyCandidateSource {
    fn candidates(&self, _parent_hash: Hash) -> Vec<Candidate> {
        Vec::new()
    }
}

/// Locally observable sync status, mirroring the teacher's
/// `NetworkSyncUpdater` flag. No peer networking is implemented; this only
/// reports whether the most recent `new_payload`/`forkchoice_update` saw an
/// unknown parent/head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Forkchoice(#[from] ForkchoiceError),
    #[error("payload tracker is full and no entry could be freed")]
    TrackerFull,
    #[error("no such payload id")]
    UnknownPayload,
    #[error("payload build failed: {0}")]
    BuildFailed(String),
    #[error("payload build is not yet complete")]
    NotReady,
}

/// Outcome of `forkchoice_update`, carrying a payload id when attributes
/// were supplied and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkchoiceUpdateResult {
    pub payload_status: ForkchoiceStatus,
    pub payload_id: Option<PayloadId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkchoiceStatus {
    Valid,
    Syncing,
    InvalidPayloadAttributes,
}

const BUILD_DEADLINE: Duration = Duration::from_millis(2_000);
const DEFAULT_GAS_LIMIT: u64 = 30_000_000;
const INVALID_HEADER_CACHE_CAPACITY: u32 = 4096;

struct Headers {
    contexts: HashMap<Hash, ParentContext>,
}

/// Wires C2 (`BlockStore`), C5 (`PayloadValidator`), C6 (`ForkchoiceCore`),
/// C7/C8/C9 (assembly + build tracking) together behind the engine API
/// verbs. One instance per running node.
pub struct EngineCore {
    block_store: Arc<BlockStore>,
    forkchoice: ForkchoiceCore,
    validator: PayloadValidator,
    tracker: PayloadTracker,
    builders: RwLock<HashMap<PayloadId, Arc<PayloadBuilder>>>,
    candidate_source: Box<dyn CandidateSource>,
    processor: Box<dyn Processor>,
    headers: RwLock<Headers>,
    invalid_headers: RwLock<LruMap<Hash, Hash, ByLength>>,
    sync_state: RwLock<SyncState>,
    metrics: EngineMetrics,
    gas_limit: u64,
}

impl EngineCore {
    pub fn new(
        chain_spec: ChainSpec,
        block_store_capacity: usize,
        processor: Box<dyn Processor>,
        candidate_source: Box<dyn CandidateSource>,
    ) -> Self {
        let block_store = Arc::new(BlockStore::new(block_store_capacity));
        Self {
            forkchoice: ForkchoiceCore::new(block_store.clone()),
            block_store,
            validator: PayloadValidator::new(chain_spec),
            tracker: PayloadTracker::new(4096, Duration::from_secs(30), Duration::from_secs(300)),
            builders: RwLock::new(HashMap::new()),
            candidate_source,
            processor,
            headers: RwLock::new(Headers { contexts: HashMap::new() }),
            invalid_headers: RwLock::new(LruMap::new(ByLength::new(INVALID_HEADER_CACHE_CAPACITY))),
            sync_state: RwLock::new(SyncState::Idle),
            metrics: EngineMetrics::default(),
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }

    /// Registers a reorg listener. Forwarded straight to the forkchoice
    /// core, which is the sole owner of reorg bookkeeping; this method
    /// exists so callers configure the engine as a single unit rather than
    /// reaching into its collaborators directly.
    pub fn on_reorg<F>(&self, listener: F)
    where
        F: Fn(&engine_primitives::ReorgEvent) + Send + Sync + 'static,
    {
        self.forkchoice.on_reorg(listener);
    }

    pub fn sync_state(&self) -> SyncState {
        *self.sync_state.read()
    }

    /// Seeds a known block (typically genesis) directly into the block
    /// store and its header context, bypassing `new_payload`'s validation
    /// pipeline. Used at node bootstrap and in tests.
    pub fn seed_block(&self, info: BlockInfo, ctx: ParentContext) -> Result<(), engine_block_store::BlockStoreError> {
        self.block_store.put(info)?;
        self.headers.write().contexts.insert(info.hash, ctx);
        Ok(())
    }

    pub fn current_forkchoice_state(&self) -> engine_primitives::ForkchoiceState {
        self.forkchoice.current_state()
    }

    /// Accepts a pushed payload: validates it against its parent, runs it
    /// through the `Processor`, and records it in the block store on
    /// success. Mirrors the teacher's `on_new_payload`.
    pub fn new_payload(
        &self,
        payload: ExecutionPayload,
        expected_blob_hashes: &[Hash],
        state: &dyn StateDb,
    ) -> PayloadStatus {
        if let Some(cached) = self.invalid_headers.write().get(&payload.block_hash).copied() {
            return PayloadStatus::Invalid {
                message: "payload's ancestry is already known invalid".to_string(),
                latest_valid_hash: Some(cached),
            };
        }

        let parent_ctx = self.headers.read().contexts.get(&payload.parent_hash).cloned();
        let status = self.validator.validate(&payload, parent_ctx.as_ref(), expected_blob_hashes);

        match &status {
            PayloadStatus::Valid { latest_valid_hash } => {
                let snapshot = state.copy();
                match self.processor.process(&payload, snapshot.as_ref()) {
                    Ok(output) => {
                        if let Some(rebuilt) = &output.block_access_list {
                            if let Err(message) =
                                self.validator.validate_block_access_list(&payload, rebuilt)
                            {
                                self.invalid_headers
                                    .write()
                                    .insert(payload.block_hash, payload.parent_hash);
                                return PayloadStatus::Invalid {
                                    message,
                                    latest_valid_hash: Some(payload.parent_hash),
                                };
                            }
                        }
                        let info = BlockInfo {
                            hash: payload.block_hash,
                            parent_hash: payload.parent_hash,
                            number: payload.block_number,
                            timestamp: payload.timestamp,
                            slot: parent_ctx.map(|p| p.info.slot + 1).unwrap_or_default(),
                        };
                        if let Err(e) = self.block_store.put(info) {
                            error!(target: "engine::core", error = %e, "failed to store processed block");
                        }
                        self.headers.write().contexts.insert(
                            payload.block_hash,
                            ParentContext {
                                info,
                                gas_used: payload.gas_used,
                                gas_limit: payload.gas_limit,
                                base_fee_per_gas: payload.base_fee_per_gas.to::<u64>(),
                                excess_blob_gas: payload.excess_blob_gas.unwrap_or_default(),
                                blob_gas_used: payload.blob_gas_used.unwrap_or_default(),
                            },
                        );
                        *self.sync_state.write() = SyncState::Idle;
                        self.metrics.new_payload_messages.increment(1);
                        PayloadStatus::Valid { latest_valid_hash: *latest_valid_hash }
                    }
                    Err(message) => {
                        self.invalid_headers.write().insert(payload.block_hash, payload.parent_hash);
                        PayloadStatus::Invalid { message, latest_valid_hash: Some(payload.parent_hash) }
                    }
                }
            }
            PayloadStatus::Invalid { latest_valid_hash, .. } => {
                if let Some(valid) = latest_valid_hash {
                    self.invalid_headers.write().insert(payload.block_hash, *valid);
                }
                self.metrics.new_payload_messages.increment(1);
                status
            }
            PayloadStatus::Syncing => {
                *self.sync_state.write() = SyncState::Syncing;
                status
            }
            PayloadStatus::InvalidBlockHash { .. } | PayloadStatus::Accepted => status,
        }
    }

    /// Applies a forkchoice update, starting a payload build if attributes
    /// were supplied and validated. Mirrors the teacher's
    /// `on_forkchoice_updated` / `PayloadTracker.start` / `PayloadBuilder.spawn`
    /// hand-off that `ForkchoiceCore::apply` deliberately does not perform
    /// itself (see the forkchoice crate's grounding note).
    pub fn forkchoice_update(
        &self,
        state: engine_primitives::ForkchoiceState,
        attrs: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdateResult, EngineError> {
        let outcome = self.forkchoice.apply(state, attrs.as_ref(), &self.validator)?;

        match outcome {
            ApplyOutcome::Syncing => {
                *self.sync_state.write() = SyncState::Syncing;
                Ok(ForkchoiceUpdateResult { payload_status: ForkchoiceStatus::Syncing, payload_id: None })
            }
            ApplyOutcome::Applied { payload_id, attrs_error, .. } => {
                *self.sync_state.write() = SyncState::Idle;
                if attrs_error.is_some() {
                    return Ok(ForkchoiceUpdateResult {
                        payload_status: ForkchoiceStatus::InvalidPayloadAttributes,
                        payload_id: None,
                    });
                }
                if let (Some(id), Some(attrs)) = (payload_id, attrs) {
                    self.start_build(id, state.head, &attrs)?;
                }
                Ok(ForkchoiceUpdateResult { payload_status: ForkchoiceStatus::Valid, payload_id })
            }
        }
    }

    fn start_build(&self, id: PayloadId, parent_hash: Hash, attrs: &PayloadAttributes) -> Result<(), EngineError> {
        let tracked_id = self
            .tracker
            .track(id, parent_hash, attrs.timestamp)
            .map_err(|_| EngineError::TrackerFull)?;
        if tracked_id != id {
            // an equivalent in-flight build already exists; nothing more to start.
            return Ok(());
        }
        let _ = self.tracker.mark_building(id);

        let parent_info = self.block_store.get(parent_hash).unwrap_or(BlockInfo {
            hash: parent_hash,
            parent_hash: Hash::ZERO,
            number: 0,
            timestamp: 0,
            slot: 0,
        });
        let parent_ctx = self.headers.read().contexts.get(&parent_hash).cloned();
        let base_fee = parent_ctx
            .as_ref()
            .map(|ctx| {
                engine_payload_validator::next_base_fee(ctx.gas_limit, ctx.gas_used, ctx.base_fee_per_gas)
            })
            .unwrap_or(engine_primitives::MIN_BASE_FEE);
        let excess_blob_gas = parent_ctx
            .as_ref()
            .map(|ctx| engine_payload_validator::next_excess_blob_gas(ctx.excess_blob_gas, ctx.blob_gas_used))
            .unwrap_or(0);

        let candidates = self.candidate_source.candidates(parent_hash);
        let builder = Arc::new(PayloadBuilder::new(id));
        self.builders.write().insert(id, builder.clone());
        builder.start(
            candidates,
            parent_info,
            attrs.prev_randao,
            attrs.timestamp,
            attrs.suggested_fee_recipient,
            attrs.withdrawals.clone(),
            engine_primitives::U256::from(base_fee),
            engine_primitives::U256::from(excess_blob_gas),
            self.gas_limit,
            Instant::now() + BUILD_DEADLINE,
        );
        info!(target: "engine::core", %id, "payload build started");
        Ok(())
    }

    /// Resolves a previously-allocated payload id, promoting a completed
    /// build from its `PayloadBuilder` into the tracker/LRU and returning
    /// it. A build still in flight reports `NotReady`.
    pub async fn get_payload(&self, id: PayloadId) -> Result<BuiltPayload, EngineError> {
        if let Some(builder) = self.builders.read().get(&id).cloned() {
            if let Some(built) = builder.result_now() {
                let _ = self.tracker.mark_ready(id, built.clone());
                return Ok(built);
            }
        }

        match self.tracker.get_result(id) {
            TrackerGetResult::Ready(built) => Ok(built),
            TrackerGetResult::Failed(reason) => Err(EngineError::BuildFailed(reason)),
            TrackerGetResult::NotReady => Err(EngineError::NotReady),
            TrackerGetResult::Unknown => Err(EngineError::UnknownPayload),
        }
    }
}
