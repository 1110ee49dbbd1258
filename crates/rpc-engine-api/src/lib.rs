//! The engine JSON-RPC method table (C11).
//!
//! Grounded on the teacher's Optimism engine API trait
//! (`crates/optimism/rpc/src/engine.rs`-equivalent reference in the pack):
//! a `#[rpc(server, namespace = "engine")]` trait gives the method names and
//! arities, a thin `EngineApi<...>` struct implements it by delegating to
//! the orchestration layer, and every handler is `trace!`-logged on entry
//! the way reth's RPC handlers are.

use alloy_primitives::Bytes;
use async_trait::async_trait;
use engine_core::{EngineCore, EngineError, ForkchoiceStatus, StateDb};
use engine_metrics::RpcServerMetrics;
use engine_payload_builder::BuiltPayload;
use engine_payload_validator::PayloadStatus as CorePayloadStatus;
use engine_primitives::{
    ExecutionPayload, ExecutionRequest, ForkchoiceState, Hash, PayloadAttributes, PayloadId,
};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Maximum accepted JSON-RPC request body. 128 MiB mirrors the teacher's
/// default HTTP body-size ceiling; the engine namespace carries large
/// payloads (execution payloads with many transactions) so it is generous.
/// Enforced by the HTTP transport itself (`ServerBuilder::max_request_body_size`
/// in `bin/engine-node`), which rejects an oversized body before it reaches
/// this crate's handlers at all.
pub const MAX_REQUEST_BODY_BYTES: usize = 128 * 1024 * 1024;

/// Engine-specific JSON-RPC error codes (execution-apis `engine` namespace).
const UNKNOWN_PAYLOAD_CODE: i32 = -38001;
const INVALID_FORKCHOICE_STATE_CODE: i32 = -38002;
const INVALID_PAYLOAD_ATTRIBUTES_CODE: i32 = -38003;
const UNSUPPORTED_FORK_CODE: i32 = -38005;

#[derive(Debug, Error)]
pub enum EngineApiError {
    #[error("unknown payload id")]
    UnknownPayload,
    #[error("invalid forkchoice state: {0}")]
    InvalidForkchoiceState(String),
    #[error("invalid payload attributes: {0}")]
    InvalidPayloadAttributes(String),
    #[error("method called for a fork that does not support it")]
    UnsupportedFork,
    #[error(transparent)]
    Internal(#[from] EngineError),
}

impl From<EngineApiError> for ErrorObjectOwned {
    fn from(err: EngineApiError) -> Self {
        let code = match &err {
            EngineApiError::UnknownPayload => UNKNOWN_PAYLOAD_CODE,
            EngineApiError::InvalidForkchoiceState(_) => INVALID_FORKCHOICE_STATE_CODE,
            EngineApiError::InvalidPayloadAttributes(_) => INVALID_PAYLOAD_ATTRIBUTES_CODE,
            EngineApiError::UnsupportedFork => UNSUPPORTED_FORK_CODE,
            EngineApiError::Internal(_) => jsonrpsee::types::error::INTERNAL_ERROR_CODE,
        };
        ErrorObjectOwned::owned(code, err.to_string(), None::<String>)
    }
}

fn map_engine_error(err: EngineError) -> ErrorObjectOwned {
    match err {
        EngineError::UnknownPayload => EngineApiError::UnknownPayload.into(),
        EngineError::Forkchoice(e) => EngineApiError::InvalidForkchoiceState(e.to_string()).into(),
        other => EngineApiError::Internal(other).into(),
    }
}

/// Wire-level mirror of `engine_payload_validator::PayloadStatus`, shaped to
/// match §6's `{status, latest_valid_hash, validation_error}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStatusResponse {
    pub status: PayloadStatusKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_valid_hash: Option<Hash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadStatusKind {
    Valid,
    Invalid,
    Syncing,
    Accepted,
    InvalidBlockHash,
}

impl From<CorePayloadStatus> for PayloadStatusResponse {
    fn from(status: CorePayloadStatus) -> Self {
        match status {
            CorePayloadStatus::Valid { latest_valid_hash } => Self {
                status: PayloadStatusKind::Valid,
                latest_valid_hash: Some(latest_valid_hash),
                validation_error: None,
            },
            CorePayloadStatus::Invalid { message, latest_valid_hash } => Self {
                status: PayloadStatusKind::Invalid,
                latest_valid_hash,
                validation_error: Some(message),
            },
            CorePayloadStatus::Syncing => {
                Self { status: PayloadStatusKind::Syncing, latest_valid_hash: None, validation_error: None }
            }
            CorePayloadStatus::Accepted => {
                Self { status: PayloadStatusKind::Accepted, latest_valid_hash: None, validation_error: None }
            }
            CorePayloadStatus::InvalidBlockHash { computed, declared } => Self {
                status: PayloadStatusKind::InvalidBlockHash,
                latest_valid_hash: None,
                validation_error: Some(format!(
                    "block hash mismatch: declared {declared}, computed {computed}"
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceUpdatedResponse {
    pub payload_status: PayloadStatusResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_id: Option<PayloadId>,
}

/// The empty, pre-real-KZG-pipeline blob bundle shape. This engine does not
/// produce blob sidecars itself (DA/commitment production is an external
/// collaborator, §1 Non-goals); a built payload with no blob transactions
/// always reports the empty bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobsBundle {
    pub commitments: Vec<Bytes>,
    pub proofs: Vec<Bytes>,
    pub blobs: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPayloadResponse {
    pub execution_payload: ExecutionPayload,
    pub block_value: alloy_primitives::U256,
    pub blobs_bundle: BlobsBundle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_requests: Option<Vec<ExecutionRequest>>,
}

fn to_execution_payload(built: &BuiltPayload) -> ExecutionPayload {
    let header = &built.header;
    ExecutionPayload {
        parent_hash: header.parent_hash,
        fee_recipient: header.fee_recipient,
        state_root: Hash::ZERO,
        receipts_root: Hash::ZERO,
        logs_bloom: Default::default(),
        prev_randao: header.mix_digest,
        block_number: header.number,
        gas_limit: header.gas_limit,
        gas_used: header.gas_used,
        timestamp: header.timestamp,
        extra_data: Bytes::new(),
        base_fee_per_gas: header.base_fee_per_gas,
        block_hash: Hash::ZERO,
        transactions: built.transactions.clone(),
        withdrawals: header.withdrawals.clone(),
        blob_gas_used: header.blob_gas_used,
        excess_blob_gas: None,
        parent_beacon_block_root: None,
        execution_requests: None,
        block_access_list: None,
        proof_submissions: None,
        blob_commitments: None,
    }
}

/// Engine API methods supported by this engine, returned verbatim (minus
/// whatever the caller didn't ask for) from `exchangeCapabilities`.
pub const SUPPORTED_CAPABILITIES: &[&str] = &[
    "engine_newPayloadV3",
    "engine_newPayloadV4",
    "engine_newPayloadV5",
    "engine_forkchoiceUpdatedV3",
    "engine_forkchoiceUpdatedV4",
    "engine_getPayloadV3",
    "engine_getPayloadV4",
    "engine_getPayloadV6",
    "engine_exchangeCapabilities",
    "engine_getClientVersionV1",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientVersionV1 {
    pub code: String,
    pub name: String,
    pub version: String,
    pub commit: String,
}

fn self_client_version() -> ClientVersionV1 {
    ClientVersionV1 {
        code: "EE".to_string(),
        name: "engine-node".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("GIT_SHA").unwrap_or("unknown").to_string(),
    }
}

#[rpc(server, namespace = "engine")]
pub trait EngineApi {
    #[method(name = "newPayloadV3")]
    async fn new_payload_v3(
        &self,
        payload: ExecutionPayload,
        expected_blob_hashes: Vec<Hash>,
        parent_beacon_block_root: Hash,
    ) -> RpcResult<PayloadStatusResponse>;

    #[method(name = "newPayloadV4")]
    async fn new_payload_v4(
        &self,
        payload: ExecutionPayload,
        expected_blob_hashes: Vec<Hash>,
        parent_beacon_block_root: Hash,
        execution_requests: Vec<ExecutionRequest>,
    ) -> RpcResult<PayloadStatusResponse>;

    #[method(name = "newPayloadV5")]
    async fn new_payload_v5(
        &self,
        payload: ExecutionPayload,
        expected_blob_hashes: Vec<Hash>,
        parent_beacon_block_root: Hash,
        execution_requests: Vec<ExecutionRequest>,
    ) -> RpcResult<PayloadStatusResponse>;

    #[method(name = "forkchoiceUpdatedV3")]
    async fn forkchoice_updated_v3(
        &self,
        state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdatedResponse>;

    #[method(name = "forkchoiceUpdatedV4")]
    async fn forkchoice_updated_v4(
        &self,
        state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdatedResponse>;

    #[method(name = "getPayloadV3")]
    async fn get_payload_v3(&self, payload_id: PayloadId) -> RpcResult<GetPayloadResponse>;

    #[method(name = "getPayloadV4")]
    async fn get_payload_v4(&self, payload_id: PayloadId) -> RpcResult<GetPayloadResponse>;

    #[method(name = "getPayloadV6")]
    async fn get_payload_v6(&self, payload_id: PayloadId) -> RpcResult<GetPayloadResponse>;

    #[method(name = "exchangeCapabilities")]
    async fn exchange_capabilities(&self, methods: Vec<String>) -> RpcResult<Vec<String>>;

    #[method(name = "getClientVersionV1")]
    async fn get_client_version_v1(&self, peer: ClientVersionV1) -> RpcResult<Vec<ClientVersionV1>>;
}

/// Implements [`EngineApiServer`] by delegating to an [`EngineCore`].
pub struct EngineApiImpl {
    core: Arc<EngineCore>,
    metrics: RpcServerMetrics,
}

impl EngineApiImpl {
    pub fn new(core: Arc<EngineCore>) -> Self {
        Self { core, metrics: RpcServerMetrics::default() }
    }

    async fn new_payload(
        &self,
        payload: ExecutionPayload,
        expected_blob_hashes: &[Hash],
        state: &dyn StateDb,
    ) -> PayloadStatusResponse {
        self.metrics.requests_received.increment(1);
        self.core.new_payload(payload, expected_blob_hashes, state).into()
    }

    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attrs: Option<PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdatedResponse> {
        self.metrics.requests_received.increment(1);
        let result = self.core.forkchoice_update(state, attrs).map_err(|e| {
            self.metrics.requests_failed.increment(1);
            map_engine_error(e)
        })?;
        let payload_status = match result.payload_status {
            ForkchoiceStatus::Valid => {
                PayloadStatusResponse { status: PayloadStatusKind::Valid, latest_valid_hash: Some(state.head), validation_error: None }
            }
            ForkchoiceStatus::Syncing => {
                PayloadStatusResponse { status: PayloadStatusKind::Syncing, latest_valid_hash: None, validation_error: None }
            }
            ForkchoiceStatus::InvalidPayloadAttributes => PayloadStatusResponse {
                status: PayloadStatusKind::Invalid,
                latest_valid_hash: None,
                validation_error: Some("invalid payload attributes".to_string()),
            },
        };
        Ok(ForkchoiceUpdatedResponse { payload_status, payload_id: result.payload_id })
    }

    async fn get_payload(&self, payload_id: PayloadId) -> RpcResult<GetPayloadResponse> {
        self.metrics.requests_received.increment(1);
        let built = self.core.get_payload(payload_id).await.map_err(|e| {
            self.metrics.requests_failed.increment(1);
            map_engine_error(e)
        })?;
        Ok(GetPayloadResponse {
            execution_payload: to_execution_payload(&built),
            block_value: built.fees,
            blobs_bundle: BlobsBundle::default(),
            execution_requests: None,
        })
    }
}

struct DummyStateDb;
impl StateDb for DummyStateDb {
    fn copy(&self) -> Box<dyn StateDb> {
        Box::new(DummyStateDb)
    }
}

#[async_trait]
impl EngineApiServer for EngineApiImpl {
    async fn new_payload_v3(
        &self,
        payload: ExecutionPayload,
        expected_blob_hashes: Vec<Hash>,
        _parent_beacon_block_root: Hash,
    ) -> RpcResult<PayloadStatusResponse> {
        trace!(target: "rpc::engine", "Serving engine_newPayloadV3");
        Ok(self.new_payload(payload, &expected_blob_hashes, &DummyStateDb).await)
    }

    async fn new_payload_v4(
        &self,
        payload: ExecutionPayload,
        expected_blob_hashes: Vec<Hash>,
        _parent_beacon_block_root: Hash,
        _execution_requests: Vec<ExecutionRequest>,
    ) -> RpcResult<PayloadStatusResponse> {
        trace!(target: "rpc::engine", "Serving engine_newPayloadV4");
        Ok(self.new_payload(payload, &expected_blob_hashes, &DummyStateDb).await)
    }

    async fn new_payload_v5(
        &self,
        payload: ExecutionPayload,
        expected_blob_hashes: Vec<Hash>,
        _parent_beacon_block_root: Hash,
        _execution_requests: Vec<ExecutionRequest>,
    ) -> RpcResult<PayloadStatusResponse> {
        trace!(target: "rpc::engine", "Serving engine_newPayloadV5");
        Ok(self.new_payload(payload, &expected_blob_hashes, &DummyStateDb).await)
    }

    async fn forkchoice_updated_v3(
        &self,
        state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdatedResponse> {
        trace!(target: "rpc::engine", "Serving engine_forkchoiceUpdatedV3");
        self.forkchoice_updated(state, payload_attributes).await
    }

    async fn forkchoice_updated_v4(
        &self,
        state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdatedResponse> {
        trace!(target: "rpc::engine", "Serving engine_forkchoiceUpdatedV4");
        self.forkchoice_updated(state, payload_attributes).await
    }

    async fn get_payload_v3(&self, payload_id: PayloadId) -> RpcResult<GetPayloadResponse> {
        trace!(target: "rpc::engine", id = %payload_id, "Serving engine_getPayloadV3");
        self.get_payload(payload_id).await
    }

    async fn get_payload_v4(&self, payload_id: PayloadId) -> RpcResult<GetPayloadResponse> {
        trace!(target: "rpc::engine", id = %payload_id, "Serving engine_getPayloadV4");
        self.get_payload(payload_id).await
    }

    async fn get_payload_v6(&self, payload_id: PayloadId) -> RpcResult<GetPayloadResponse> {
        trace!(target: "rpc::engine", id = %payload_id, "Serving engine_getPayloadV6");
        self.get_payload(payload_id).await
    }

    async fn exchange_capabilities(&self, methods: Vec<String>) -> RpcResult<Vec<String>> {
        trace!(target: "rpc::engine", "Serving engine_exchangeCapabilities");
        if methods.is_empty() {
            return Ok(SUPPORTED_CAPABILITIES.iter().map(|s| s.to_string()).collect());
        }
        Ok(SUPPORTED_CAPABILITIES
            .iter()
            .map(|s| s.to_string())
            .filter(|supported| methods.contains(supported))
            .collect())
    }

    async fn get_client_version_v1(&self, peer: ClientVersionV1) -> RpcResult<Vec<ClientVersionV1>> {
        trace!(target: "rpc::engine", peer = %peer.name, "Serving engine_getClientVersionV1");
        Ok(vec![self_client_version()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{EmptyCandidateSource, NoopProcessor};
    use engine_primitives::ChainSpec;

    fn api() -> EngineApiImpl {
        let core = Arc::new(EngineCore::new(
            ChainSpec::default(),
            1024,
            Box::new(NoopProcessor),
            Box::new(EmptyCandidateSource),
        ));
        EngineApiImpl::new(core)
    }

    #[tokio::test]
    async fn get_payload_for_unknown_id_maps_to_unknown_payload_error() {
        let api = api();
        let result = api.get_payload_v3(PayloadId::new([1; 8])).await;
        let err = result.unwrap_err();
        assert_eq!(err.code(), UNKNOWN_PAYLOAD_CODE);
    }

    #[tokio::test]
    async fn forkchoice_update_with_unknown_head_reports_syncing() {
        let api = api();
        let result = api
            .forkchoice_updated_v3(
                ForkchoiceState { head: Hash::from([9u8; 32]), safe: Hash::ZERO, finalized: Hash::ZERO },
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.payload_status.status, PayloadStatusKind::Syncing);
    }

    #[tokio::test]
    async fn exchange_capabilities_intersects_the_caller_list() {
        let api = api();
        let result = api
            .exchange_capabilities(vec![
                "engine_newPayloadV3".to_string(),
                "engine_totallyMadeUp".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(result, vec!["engine_newPayloadV3".to_string()]);
    }

    #[tokio::test]
    async fn exchange_capabilities_with_empty_request_returns_everything() {
        let api = api();
        let result = api.exchange_capabilities(vec![]).await.unwrap();
        assert_eq!(result.len(), SUPPORTED_CAPABILITIES.len());
    }

    #[tokio::test]
    async fn get_client_version_v1_returns_a_single_record() {
        let api = api();
        let peer = ClientVersionV1 {
            code: "LH".to_string(),
            name: "lighthouse".to_string(),
            version: "5.0.0".to_string(),
            commit: "deadbeef".to_string(),
        };
        let result = api.get_client_version_v1(peer).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "engine-node");
    }
}
