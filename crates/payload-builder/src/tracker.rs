//! `PayloadTracker` state machine (component C9).
//!
//! Grounded on the teacher's `PayloadBuilderService`/`PayloadStore` in
//! `crates/payload/builder/src/service.rs` for the tracked-by-id,
//! resolve-by-id shape, generalized here into an explicit state machine
//! since this crate has no background service loop of its own.

use crate::builder::BuiltPayload;
use engine_metrics::PayloadTrackerMetrics;
use engine_primitives::{Hash, PayloadId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("tracker is full and no entry could be freed")]
    TrackerFull,
    #[error("payload {0:?} is not in the expected state for this transition")]
    InvalidTransition(PayloadId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedState {
    Pending,
    Building,
    Ready(BuiltPayload),
    Failed(String),
}

impl TrackedState {
    fn is_terminal(&self) -> bool {
        matches!(self, TrackedState::Ready(_) | TrackedState::Failed(_))
    }
}

struct Record {
    parent_hash: Hash,
    timestamp: u64,
    state: TrackedState,
    created_at: Instant,
}

/// What `get_result` reports for a tracked id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    Ready(BuiltPayload),
    Failed(String),
    NotReady,
    /// `id` was never registered via `track` (or has since been evicted) —
    /// distinct from `NotReady` so callers can tell "still building" from
    /// "no such id", per the id-returned-by-forkchoice-update invariant.
    Unknown,
}

struct Inner {
    records: HashMap<PayloadId, Record>,
    dedup_index: HashMap<(Hash, u64), PayloadId>,
}

/// Tracks the lifecycle of every payload build the engine has started,
/// bounded by capacity and two TTLs (one for in-flight builds, one for
/// completed ones).
pub struct PayloadTracker {
    inner: RwLock<Inner>,
    capacity: usize,
    build_ttl: Duration,
    completed_ttl: Duration,
    metrics: PayloadTrackerMetrics,
}

impl PayloadTracker {
    pub fn new(capacity: usize, build_ttl: Duration, completed_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner { records: HashMap::new(), dedup_index: HashMap::new() }),
            capacity,
            build_ttl,
            completed_ttl,
            metrics: PayloadTrackerMetrics::default(),
        }
    }

    /// Registers a build attempt under `id` (already allocated by the
    /// forkchoice core). Returns the id of an existing non-terminal entry if
    /// `(parent_hash, timestamp)` was already tracked (idempotence law).
    pub fn track(&self, id: PayloadId, parent_hash: Hash, timestamp: u64) -> Result<PayloadId, TrackerError> {
        let mut guard = self.inner.write();

        if let Some(existing_id) = guard.dedup_index.get(&(parent_hash, timestamp)).copied() {
            if let Some(record) = guard.records.get(&existing_id) {
                if !matches!(record.state, TrackedState::Failed(_)) {
                    return Ok(existing_id);
                }
            }
        }

        self.evict_expired(&mut guard);
        if guard.records.len() >= self.capacity {
            self.evict_oldest_terminal(&mut guard);
        }
        if guard.records.len() >= self.capacity {
            return Err(TrackerError::TrackerFull);
        }

        guard.records.insert(
            id,
            Record { parent_hash, timestamp, state: TrackedState::Pending, created_at: Instant::now() },
        );
        guard.dedup_index.insert((parent_hash, timestamp), id);
        self.metrics.tracked.set(guard.records.len() as f64);
        Ok(id)
    }

    pub fn mark_building(&self, id: PayloadId) -> Result<(), TrackerError> {
        let mut guard = self.inner.write();
        let record = guard.records.get_mut(&id).ok_or(TrackerError::InvalidTransition(id))?;
        if !matches!(record.state, TrackedState::Pending) {
            return Err(TrackerError::InvalidTransition(id));
        }
        record.state = TrackedState::Building;
        Ok(())
    }

    pub fn mark_ready(&self, id: PayloadId, result: BuiltPayload) -> Result<(), TrackerError> {
        let mut guard = self.inner.write();
        let record = guard.records.get_mut(&id).ok_or(TrackerError::InvalidTransition(id))?;
        if !matches!(record.state, TrackedState::Pending | TrackedState::Building) {
            return Err(TrackerError::InvalidTransition(id));
        }
        record.state = TrackedState::Ready(result);
        Ok(())
    }

    pub fn mark_failed(&self, id: PayloadId, reason: String) -> Result<(), TrackerError> {
        let mut guard = self.inner.write();
        let record = guard.records.get_mut(&id).ok_or(TrackerError::InvalidTransition(id))?;
        record.state = TrackedState::Failed(reason);
        Ok(())
    }

    pub fn get_result(&self, id: PayloadId) -> GetResult {
        match self.inner.read().records.get(&id).map(|r| r.state.clone()) {
            Some(TrackedState::Ready(built)) => GetResult::Ready(built),
            Some(TrackedState::Failed(reason)) => GetResult::Failed(reason),
            Some(TrackedState::Pending | TrackedState::Building) => GetResult::NotReady,
            None => GetResult::Unknown,
        }
    }

    fn evict_expired(&self, guard: &mut Inner) {
        let now = Instant::now();
        let expired: Vec<PayloadId> = guard
            .records
            .iter()
            .filter(|(_, record)| {
                let ttl = if record.state.is_terminal() { self.completed_ttl } else { self.build_ttl };
                now.duration_since(record.created_at) > ttl
            })
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            Self::remove(guard, id);
        }
    }

    fn evict_oldest_terminal(&self, guard: &mut Inner) {
        let oldest = guard
            .records
            .iter()
            .filter(|(_, record)| record.state.is_terminal())
            .min_by_key(|(_, record)| record.created_at)
            .map(|(id, _)| *id);
        if let Some(id) = oldest {
            Self::remove(guard, id);
        }
    }

    fn remove(guard: &mut Inner, id: PayloadId) {
        if let Some(record) = guard.records.remove(&id) {
            guard.dedup_index.remove(&(record.parent_hash, record.timestamp));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SimpleReceipt;
    use alloy_primitives::U256;
    use engine_block_assembler::SynthesizedHeader;

    fn hash(byte: u8) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        Hash::from(bytes)
    }

    fn id(byte: u8) -> PayloadId {
        PayloadId::new([byte; 8])
    }

    fn dummy_payload(id: PayloadId) -> BuiltPayload {
        BuiltPayload {
            id,
            header: SynthesizedHeader {
                parent_hash: hash(0),
                number: 1,
                timestamp: 1_700_000_000,
                fee_recipient: alloy_primitives::Address::ZERO,
                withdrawals: None,
                gas_limit: 1_000_000,
                gas_used: 0,
                base_fee_per_gas: U256::from(1u64),
                blob_base_fee_per_gas: U256::ZERO,
                mix_digest: hash(0),
                blob_gas_used: None,
            },
            included_transactions: Vec::new(),
            transactions: Vec::new(),
            receipts: Vec::<SimpleReceipt>::new(),
            fees: U256::ZERO,
            trace: Vec::new(),
            timed_out: false,
        }
    }

    #[test]
    fn track_dedupes_on_parent_and_timestamp() {
        let tracker = PayloadTracker::new(10, Duration::from_secs(60), Duration::from_secs(60));
        let first = tracker.track(id(1), hash(5), 100).unwrap();
        let second = tracker.track(id(2), hash(5), 100).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn state_transitions_follow_the_lifecycle() {
        let tracker = PayloadTracker::new(10, Duration::from_secs(60), Duration::from_secs(60));
        let pid = tracker.track(id(1), hash(5), 100).unwrap();
        assert_eq!(tracker.get_result(pid), GetResult::NotReady);

        tracker.mark_building(pid).unwrap();
        assert!(tracker.mark_building(pid).is_err());

        tracker.mark_ready(pid, dummy_payload(pid)).unwrap();
        assert_eq!(tracker.get_result(pid), GetResult::Ready(dummy_payload(pid)));
    }

    #[test]
    fn mark_failed_is_reachable_from_any_state() {
        let tracker = PayloadTracker::new(10, Duration::from_secs(60), Duration::from_secs(60));
        let pid = tracker.track(id(1), hash(5), 100).unwrap();
        tracker.mark_failed(pid, "boom".to_string()).unwrap();
        assert_eq!(tracker.get_result(pid), GetResult::Failed("boom".to_string()));
    }

    #[test]
    fn tracker_full_when_capacity_exhausted_by_live_entries() {
        let tracker = PayloadTracker::new(1, Duration::from_secs(60), Duration::from_secs(60));
        tracker.track(id(1), hash(5), 100).unwrap();
        let err = tracker.track(id(2), hash(6), 200).unwrap_err();
        assert_eq!(err, TrackerError::TrackerFull);
    }
}
