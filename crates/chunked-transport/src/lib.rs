//! `ChunkedEnvelope`: an optional transport helper for splitting and
//! reassembling a payload blob (C8, §4.8).
//!
//! No teacher file implements chunked transport (out of reth's scope, which
//! hands complete payloads over JSON-RPC); built directly from the spec's
//! algorithm, reusing `engine_primitives::crypto::keccak256` and the
//! workspace's `thiserror` error-enum convention for consistency.

use alloy_primitives::Bytes;
use engine_primitives::{crypto::keccak256, Hash};
use thiserror::Error;

pub const MIN_CHUNK_SIZE: usize = 1024;
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;
pub const MAX_CHUNKS_PER_PAYLOAD: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk size {0} is outside the allowed range [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]")]
    ChunkSizeOutOfRange(usize),
    #[error("splitting at this chunk size would need {0} chunks, exceeding the {MAX_CHUNKS_PER_PAYLOAD} limit")]
    TooManyChunks(usize),
    #[error("no chunks were provided for reassembly")]
    Empty,
    #[error("chunks disagree on `total`: expected {expected}, saw {actual}")]
    TotalMismatch { expected: u32, actual: u32 },
    #[error("chunks disagree on `parent_hash`")]
    ParentHashMismatch,
    #[error("chunk index {index} is out of the declared range [0, {total})")]
    IndexOutOfRange { index: u32, total: u32 },
    #[error("duplicate chunk index {0}")]
    DuplicateIndex(u32),
    #[error("chunk {index} is missing from the set (declared total {total})")]
    MissingChunk { index: u32, total: u32 },
    #[error("chunk {index} data_hash does not match keccak256(data)")]
    DataHashMismatch { index: u32 },
    #[error("reassembled payload hash does not match the declared parent_hash")]
    PayloadHashMismatch,
}

/// One chunk of a larger payload, carrying enough to verify itself and its
/// place in the whole independent of the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub total: u32,
    pub data: Bytes,
    pub data_hash: Hash,
    pub parent_hash: Hash,
}

/// Splits `payload` into chunks of `chunk_size` bytes (the last chunk may be
/// shorter). `chunk_size` must be within `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`
/// and must not require more than `MAX_CHUNKS_PER_PAYLOAD` chunks.
pub fn chunk(payload: &[u8], chunk_size: usize) -> Result<Vec<Chunk>, ChunkError> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(ChunkError::ChunkSizeOutOfRange(chunk_size));
    }
    let total = payload.len().div_ceil(chunk_size).max(1);
    if total > MAX_CHUNKS_PER_PAYLOAD {
        return Err(ChunkError::TooManyChunks(total));
    }

    let parent_hash = keccak256(payload);
    let chunks = payload
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, data)| Chunk {
            index: index as u32,
            total: total as u32,
            data: Bytes::copy_from_slice(data),
            data_hash: keccak256(data),
            parent_hash,
        })
        .collect();
    Ok(chunks)
}

/// Reassembles `chunks` into the original payload, verifying every
/// integrity constraint the spec names before trusting the result.
pub fn reassemble(mut chunks: Vec<Chunk>) -> Result<Bytes, ChunkError> {
    let first = chunks.first().ok_or(ChunkError::Empty)?;
    let total = first.total;
    let parent_hash = first.parent_hash;

    for c in &chunks {
        if c.total != total {
            return Err(ChunkError::TotalMismatch { expected: total, actual: c.total });
        }
        if c.parent_hash != parent_hash {
            return Err(ChunkError::ParentHashMismatch);
        }
        if c.index >= total {
            return Err(ChunkError::IndexOutOfRange { index: c.index, total });
        }
        if keccak256(&c.data) != c.data_hash {
            return Err(ChunkError::DataHashMismatch { index: c.index });
        }
    }

    chunks.sort_by_key(|c| c.index);
    for window in chunks.windows(2) {
        if window[0].index == window[1].index {
            return Err(ChunkError::DuplicateIndex(window[0].index));
        }
    }
    for (expected_index, c) in chunks.iter().enumerate() {
        if c.index != expected_index as u32 {
            return Err(ChunkError::MissingChunk { index: expected_index as u32, total });
        }
    }

    let mut payload = Vec::new();
    for c in &chunks {
        payload.extend_from_slice(&c.data);
    }

    if keccak256(&payload) != parent_hash {
        return Err(ChunkError::PayloadHashMismatch);
    }

    Ok(Bytes::from(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_payload() {
        let payload = vec![7u8; MIN_CHUNK_SIZE * 3 + 17];
        let chunks = chunk(&payload, MIN_CHUNK_SIZE).unwrap();
        assert_eq!(chunks.len(), 4);
        let reassembled = reassemble(chunks).unwrap();
        assert_eq!(reassembled.as_ref(), payload.as_slice());
    }

    #[test]
    fn rejects_a_chunk_size_below_the_minimum() {
        let err = chunk(&[0u8; 10], 16).unwrap_err();
        assert_eq!(err, ChunkError::ChunkSizeOutOfRange(16));
    }

    #[test]
    fn rejects_too_many_chunks() {
        let payload = vec![0u8; MIN_CHUNK_SIZE * (MAX_CHUNKS_PER_PAYLOAD + 1)];
        let err = chunk(&payload, MIN_CHUNK_SIZE).unwrap_err();
        assert_matches::assert_matches!(err, ChunkError::TooManyChunks(_));
    }

    #[test]
    fn detects_a_corrupted_chunk() {
        let payload = vec![9u8; MIN_CHUNK_SIZE * 2];
        let mut chunks = chunk(&payload, MIN_CHUNK_SIZE).unwrap();
        chunks[0].data = Bytes::copy_from_slice(&[0u8; MIN_CHUNK_SIZE]);
        let err = reassemble(chunks).unwrap_err();
        assert_eq!(err, ChunkError::DataHashMismatch { index: 0 });
    }

    #[test]
    fn detects_a_missing_chunk() {
        let payload = vec![9u8; MIN_CHUNK_SIZE * 3];
        let mut chunks = chunk(&payload, MIN_CHUNK_SIZE).unwrap();
        chunks.remove(1);
        let err = reassemble(chunks).unwrap_err();
        assert_matches::assert_matches!(err, ChunkError::MissingChunk { .. });
    }

    #[test]
    fn detects_mismatched_total_across_chunks() {
        let payload = vec![9u8; MIN_CHUNK_SIZE * 2];
        let mut chunks = chunk(&payload, MIN_CHUNK_SIZE).unwrap();
        chunks[1].total = 99;
        let err = reassemble(chunks).unwrap_err();
        assert_matches::assert_matches!(err, ChunkError::TotalMismatch { .. });
    }
}
