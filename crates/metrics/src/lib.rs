//! Metrics structs shared across the engine crates.
//!
//! The teacher generates these with `#[derive(Metrics)]` from a
//! proc-macro crate; this workspace's metric surface is small and fixed
//! enough that the handful of structs below are hand-written against the
//! same `metrics` facade (`counter!`/`histogram!`/`gauge!`) instead of
//! carrying a whole derive-macro crate for four call sites.

pub use metrics;

use metrics::{Counter, Gauge, Histogram};

/// Metrics recorded by `engine-core`'s forkchoice/new-payload handling.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub forkchoice_updated_messages: Counter,
    pub new_payload_messages: Counter,
    pub make_canonical_latency: Histogram,
    pub reorgs_total: Counter,
    pub reorg_depth: Histogram,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self {
            forkchoice_updated_messages: metrics::counter!("engine.forkchoice_updated_messages"),
            new_payload_messages: metrics::counter!("engine.new_payload_messages"),
            make_canonical_latency: metrics::histogram!("engine.make_canonical_latency"),
            reorgs_total: metrics::counter!("engine.reorgs_total"),
            reorg_depth: metrics::histogram!("engine.reorg_depth"),
        }
    }
}

/// Metrics recorded by the payload builder service.
#[derive(Debug, Clone)]
pub struct PayloadBuilderMetrics {
    pub builds_started: Counter,
    pub builds_completed: Counter,
    pub builds_timed_out: Counter,
    pub builds_failed: Counter,
    pub build_duration: Histogram,
    pub included_tx_count: Histogram,
    pub excluded_tx_count: Histogram,
}

impl Default for PayloadBuilderMetrics {
    fn default() -> Self {
        Self {
            builds_started: metrics::counter!("payload_builder.builds_started"),
            builds_completed: metrics::counter!("payload_builder.builds_completed"),
            builds_timed_out: metrics::counter!("payload_builder.builds_timed_out"),
            builds_failed: metrics::counter!("payload_builder.builds_failed"),
            build_duration: metrics::histogram!("payload_builder.build_duration"),
            included_tx_count: metrics::histogram!("payload_builder.included_tx_count"),
            excluded_tx_count: metrics::histogram!("payload_builder.excluded_tx_count"),
        }
    }
}

/// Metrics recorded by the payload tracker / LRU cache.
#[derive(Debug, Clone)]
pub struct PayloadTrackerMetrics {
    pub hits: Counter,
    pub misses: Counter,
    pub evictions: Counter,
    pub tracked: Gauge,
}

impl Default for PayloadTrackerMetrics {
    fn default() -> Self {
        Self {
            hits: metrics::counter!("payload_tracker.hits"),
            misses: metrics::counter!("payload_tracker.misses"),
            evictions: metrics::counter!("payload_tracker.evictions"),
            tracked: metrics::gauge!("payload_tracker.tracked"),
        }
    }
}

/// Metrics recorded by the engine JSON-RPC server.
#[derive(Debug, Clone)]
pub struct RpcServerMetrics {
    pub requests_received: Counter,
    pub requests_too_large: Counter,
    pub requests_failed: Counter,
}

impl Default for RpcServerMetrics {
    fn default() -> Self {
        Self {
            requests_received: metrics::counter!("rpc.requests_received"),
            requests_too_large: metrics::counter!("rpc.requests_too_large"),
            requests_failed: metrics::counter!("rpc.requests_failed"),
        }
    }
}

/// Metrics recorded by the block store.
#[derive(Debug, Clone)]
pub struct BlockStoreMetrics {
    pub blocks_inserted: Counter,
    pub blocks_pruned: Counter,
    pub stored: Gauge,
}

impl Default for BlockStoreMetrics {
    fn default() -> Self {
        Self {
            blocks_inserted: metrics::counter!("block_store.blocks_inserted"),
            blocks_pruned: metrics::counter!("block_store.blocks_pruned"),
            stored: metrics::gauge!("block_store.stored"),
        }
    }
}
