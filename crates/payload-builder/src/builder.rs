//! The single-build payload job (component C8).
//!
//! Grounded on the teacher's `BuiltPayload`/`PayloadBuilderAttributes` in
//! `crates/payload/builder/src/payload.rs`: an immutable, cloneable built
//! payload published once assembly completes, carrying the block value
//! (`fees`) alongside the block itself.

use alloy_primitives::{Address, Bytes, U256};
use engine_block_assembler::{assemble, Candidate, InclusionRecord, SynthesizedHeader};
use engine_metrics::PayloadBuilderMetrics;
use engine_primitives::{BlockInfo, Hash, PayloadId, Withdrawal};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// A transaction's receipt, in the simplified shape this engine produces.
/// Real execution (an external collaborator) replaces this with the actual
/// receipt once it is wired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleReceipt {
    pub tx_type: u8,
    pub status: bool,
    pub cumulative_gas: u64,
    pub gas: u64,
    pub tx_hash: Hash,
    pub index: u64,
}

/// The immutable result of a completed build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPayload {
    pub id: PayloadId,
    pub header: SynthesizedHeader,
    pub included_transactions: Vec<Hash>,
    pub transactions: Vec<Bytes>,
    pub receipts: Vec<SimpleReceipt>,
    pub fees: U256,
    pub trace: Vec<InclusionRecord>,
    pub timed_out: bool,
}

impl BuiltPayload {
    pub fn included_count(&self) -> usize {
        self.included_transactions.len()
    }

    pub fn excluded_count(&self) -> usize {
        self.trace.len() - self.included_transactions.len()
    }
}

enum BuildState {
    Pending,
    Complete(BuiltPayload),
}

/// A single build attempt scheduled against a fixed deadline. A second
/// `start` on the same builder is a no-op.
pub struct PayloadBuilder {
    id: PayloadId,
    state: Arc<RwLock<BuildState>>,
    started: Arc<AtomicBool>,
    notify: Arc<tokio::sync::Notify>,
    cancel: CancellationToken,
    metrics: PayloadBuilderMetrics,
}

impl PayloadBuilder {
    pub fn new(id: PayloadId) -> Self {
        Self {
            id,
            state: Arc::new(RwLock::new(BuildState::Pending)),
            started: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(tokio::sync::Notify::new()),
            cancel: CancellationToken::new(),
            metrics: PayloadBuilderMetrics::default(),
        }
    }

    pub fn id(&self) -> PayloadId {
        self.id
    }

    /// Runs assembly once against `candidates`. A second call is a no-op.
    pub fn start(
        &self,
        candidates: Vec<Candidate>,
        parent: BlockInfo,
        prev_randao: Hash,
        timestamp: u64,
        fee_recipient: Address,
        withdrawals: Option<Vec<Withdrawal>>,
        base_fee: U256,
        blob_base_fee: U256,
        gas_limit: u64,
        deadline: Instant,
    ) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.metrics.builds_started.increment(1);

        let id = self.id;
        let state = self.state.clone();
        let notify = self.notify.clone();
        let cancel = self.cancel.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let outcome = assemble(
                &candidates,
                &parent,
                prev_randao,
                timestamp,
                fee_recipient,
                withdrawals,
                base_fee,
                blob_base_fee,
                gas_limit,
                deadline,
                Some(&cancel),
            );

            // Gas-per-tx bookkeeping belongs to the external execution
            // collaborator; here every included tx is charged an equal share
            // of the header's gas_used for the simplified receipt.
            let per_tx_gas = outcome.gas_used / (outcome.included.len().max(1) as u64);
            let receipts = outcome
                .included
                .iter()
                .enumerate()
                .scan(0u64, |cumulative, (index, hash)| {
                    *cumulative += per_tx_gas;
                    Some(SimpleReceipt {
                        tx_type: 0,
                        status: true,
                        cumulative_gas: *cumulative,
                        gas: per_tx_gas,
                        tx_hash: *hash,
                        index: index as u64,
                    })
                })
                .collect();

            let built = BuiltPayload {
                id,
                header: outcome.header,
                included_transactions: outcome.included,
                transactions: outcome.included_raw,
                receipts,
                fees: outcome.reward,
                trace: outcome.trace,
                timed_out: outcome.timed_out,
            };

            if built.timed_out {
                metrics.builds_timed_out.increment(1);
            } else {
                metrics.builds_completed.increment(1);
            }
            metrics.included_tx_count.record(built.included_count() as f64);
            metrics.excluded_tx_count.record(built.excluded_count() as f64);

            *state.write() = BuildState::Complete(built);
            notify.notify_waiters();
        });
    }

    /// Awaits completion and returns the built payload.
    pub async fn wait(&self) -> BuiltPayload {
        loop {
            if let Some(built) = self.result_now() {
                return built;
            }
            self.notify.notified().await;
        }
    }

    /// Returns the result if the build has completed, without blocking.
    pub fn result_now(&self) -> Option<BuiltPayload> {
        match &*self.state.read() {
            BuildState::Complete(built) => Some(built.clone()),
            BuildState::Pending => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(&*self.state.read(), BuildState::Complete(_))
    }

    /// Requests cooperative cancellation of an in-flight build.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_block_assembler::FeeKind;
    use std::time::Duration;

    fn hash(byte: u8) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        Hash::from(bytes)
    }

    fn legacy(hash_byte: u8, gas_price: u64, gas: u64) -> Candidate {
        Candidate {
            hash: hash(hash_byte),
            raw: alloy_primitives::Bytes::from_static(b"tx"),
            gas,
            fee: FeeKind::Legacy { gas_price: U256::from(gas_price) },
            blob_gas: 0,
            blob_fee_cap: None,
        }
    }

    #[tokio::test]
    async fn a_completed_build_is_available_via_wait_and_result_now() {
        let parent = BlockInfo { hash: hash(1), parent_hash: hash(0), number: 5, timestamp: 100, slot: 5 };
        let builder = PayloadBuilder::new(PayloadId::new([1; 8]));
        builder.start(
            vec![legacy(2, 100, 21_000)],
            parent,
            hash(9),
            1_700_000_000,
            Address::ZERO,
            None,
            U256::from(10u64),
            U256::ZERO,
            1_000_000,
            Instant::now() + Duration::from_secs(5),
        );
        let built = builder.wait().await;
        assert_eq!(built.included_count(), 1);
        assert!(builder.is_complete());
        assert_eq!(builder.result_now().unwrap().id, PayloadId::new([1; 8]));
    }

    #[tokio::test]
    async fn a_second_start_is_a_no_op() {
        let parent = BlockInfo { hash: hash(1), parent_hash: hash(0), number: 5, timestamp: 100, slot: 5 };
        let builder = PayloadBuilder::new(PayloadId::new([2; 8]));
        builder.start(
            vec![legacy(2, 100, 21_000)],
            parent,
            hash(9),
            1_700_000_000,
            Address::ZERO,
            None,
            U256::from(10u64),
            U256::ZERO,
            1_000_000,
            Instant::now() + Duration::from_secs(5),
        );
        let first = builder.wait().await;
        builder.start(
            vec![legacy(3, 50, 21_000)],
            parent,
            hash(9),
            1_700_000_000,
            Address::ZERO,
            None,
            U256::from(10u64),
            U256::ZERO,
            1_000_000,
            Instant::now(),
        );
        let second = builder.wait().await;
        assert_eq!(first, second);
    }
}
