use engine_core::{EmptyCandidateSource, EngineCore, ForkchoiceStatus, InMemoryStateDb, NoopProcessor, SyncState};
use engine_payload_validator::ParentContext;
use engine_primitives::{
    BlockInfo, ChainSpec, ExecutionPayload, ForkchoiceState, Hash, PayloadAttributes, U256,
};
use std::time::Duration;

fn hash(byte: u8) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[31] = byte;
    Hash::from(bytes)
}

fn genesis() -> (BlockInfo, ParentContext) {
    let info = BlockInfo { hash: hash(1), parent_hash: Hash::ZERO, number: 0, timestamp: 1_000, slot: 0 };
    let ctx = ParentContext {
        info,
        gas_used: 15_000_000,
        gas_limit: 30_000_000,
        base_fee_per_gas: 1_000_000_000,
        excess_blob_gas: 0,
        blob_gas_used: 0,
    };
    (info, ctx)
}

fn engine() -> EngineCore {
    EngineCore::new(
        ChainSpec::default(),
        1024,
        Box::new(NoopProcessor),
        Box::new(EmptyCandidateSource),
    )
}

#[test]
fn forkchoice_update_with_unknown_head_reports_syncing() {
    let engine = engine();
    let result = engine.forkchoice_update(ForkchoiceState { head: hash(99), safe: Hash::ZERO, finalized: Hash::ZERO }, None).unwrap();
    assert_eq!(result.payload_status, ForkchoiceStatus::Syncing);
    assert_eq!(engine.sync_state(), SyncState::Syncing);
}

#[test]
fn new_payload_with_unknown_parent_reports_syncing() {
    let engine = engine();
    let payload = ExecutionPayload {
        parent_hash: hash(250),
        fee_recipient: Default::default(),
        state_root: hash(2),
        receipts_root: hash(3),
        logs_bloom: Default::default(),
        prev_randao: hash(4),
        block_number: 1,
        gas_limit: 30_000_000,
        gas_used: 0,
        timestamp: 2_000,
        extra_data: Default::default(),
        base_fee_per_gas: U256::from(1_000_000_000u64),
        block_hash: hash(5),
        transactions: vec![],
        withdrawals: Some(vec![]),
        blob_gas_used: None,
        excess_blob_gas: None,
        parent_beacon_block_root: None,
        execution_requests: None,
        block_access_list: None,
        proof_submissions: None,
        blob_commitments: None,
    };
    let status = engine.new_payload(payload, &[], &InMemoryStateDb);
    assert_matches::assert_matches!(status, engine_payload_validator::PayloadStatus::Syncing);
    assert_eq!(engine.sync_state(), SyncState::Syncing);
}

#[tokio::test]
async fn forkchoice_update_with_attrs_allocates_a_payload_id_and_builds() {
    let engine = engine();
    let (info, ctx) = genesis();
    engine.seed_block(info, ctx).unwrap();

    let attrs = PayloadAttributes {
        timestamp: 2_000,
        prev_randao: hash(7),
        suggested_fee_recipient: Default::default(),
        withdrawals: Some(vec![]),
        parent_beacon_block_root: None,
        inclusion_list: None,
        slot: None,
        proof_requirements: None,
    };

    let result = engine
        .forkchoice_update(ForkchoiceState { head: info.hash, safe: Hash::ZERO, finalized: Hash::ZERO }, Some(attrs))
        .unwrap();
    assert_eq!(result.payload_status, ForkchoiceStatus::Valid);
    let id = result.payload_id.expect("attrs should allocate a payload id");

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match engine.get_payload(id).await {
                Ok(built) => {
                    assert_eq!(built.included_count(), 0);
                    break;
                }
                Err(engine_core::EngineError::NotReady) => tokio::task::yield_now().await,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    })
    .await
    .expect("build should complete within the timeout");
}

#[tokio::test]
async fn get_payload_for_an_unknown_id_is_rejected() {
    let engine = engine();
    let result = engine.get_payload(engine_primitives::PayloadId::new([9; 8])).await;
    assert_matches::assert_matches!(result, Err(engine_core::EngineError::UnknownPayload));
}
