//! EIP-4844 versioned-hash computation and blob-transaction hash-list
//! validation (component C3).
//!
//! Pure functions of their inputs; no hidden state.

use engine_primitives::{crypto::sha256, Hash, KZG_COMMITMENT_SIZE};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionedHashError {
    #[error("kzg commitment must be {KZG_COMMITMENT_SIZE} bytes, got {0}")]
    CommitmentSize(usize),
    #[error("expected {expected} versioned hashes, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("versioned hash mismatch at index {0}")]
    HashMismatch(usize),
    #[error("blob hash at index {0} does not carry the KZG version byte")]
    WrongVersion(usize),
}

/// The canonical KZG version byte used by this engine.
pub const KZG_VERSION: u8 = engine_primitives::KZG_VERSIONED_HASH_VERSION;

/// Computes the versioned hash of a 48-byte KZG commitment: `sha256(commitment)`
/// with byte 0 replaced by `version`.
pub fn versioned_hash(commitment: &[u8], version: u8) -> Result<Hash, VersionedHashError> {
    if commitment.len() != KZG_COMMITMENT_SIZE {
        return Err(VersionedHashError::CommitmentSize(commitment.len()));
    }
    let mut digest = sha256(commitment);
    digest[0] = version;
    Ok(Hash::from(digest))
}

/// Recomputes the versioned hash of each commitment and compares, index-wise,
/// against `expected`.
pub fn verify_against(expected: &[Hash], commitments: &[&[u8]]) -> Result<(), VersionedHashError> {
    if expected.len() != commitments.len() {
        return Err(VersionedHashError::CountMismatch {
            expected: expected.len(),
            actual: commitments.len(),
        });
    }
    for (i, (exp, commitment)) in expected.iter().zip(commitments.iter()).enumerate() {
        let computed = versioned_hash(commitment, KZG_VERSION)?;
        if computed != *exp {
            return Err(VersionedHashError::HashMismatch(i));
        }
    }
    Ok(())
}

/// Validates a blob transaction's embedded `blob_hashes` against the KZG
/// commitments that back them: every hash must carry the KZG version byte,
/// and the recomputed hashes must match `blob_hashes` exactly.
///
/// The binary transaction decoder is an external collaborator (§1); this
/// function takes the already-decoded `blob_hashes` list rather than a raw
/// transaction.
pub fn validate_blob_tx(
    blob_hashes: &[Hash],
    commitments: &[&[u8]],
) -> Result<(), VersionedHashError> {
    for (i, hash) in blob_hashes.iter().enumerate() {
        if hash.as_slice()[0] != KZG_VERSION {
            return Err(VersionedHashError::WrongVersion(i));
        }
    }
    verify_against(blob_hashes, commitments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commitment(fill: u8) -> Vec<u8> {
        vec![fill; KZG_COMMITMENT_SIZE]
    }

    #[test]
    fn versioned_hash_rejects_wrong_size() {
        let err = versioned_hash(&[0u8; 10], KZG_VERSION).unwrap_err();
        assert_eq!(err, VersionedHashError::CommitmentSize(10));
    }

    #[test]
    fn versioned_hash_carries_version_byte() {
        let h = versioned_hash(&commitment(7), KZG_VERSION).unwrap();
        assert_eq!(h.as_slice()[0], KZG_VERSION);
        let raw_sha = sha256(&commitment(7));
        assert_eq!(&h.as_slice()[1..], &raw_sha[1..]);
    }

    #[test]
    fn verify_against_detects_count_mismatch() {
        let commitments = [commitment(1), commitment(2)];
        let refs: Vec<&[u8]> = commitments.iter().map(|c| c.as_slice()).collect();
        let expected = [versioned_hash(&commitment(1), KZG_VERSION).unwrap()];
        let err = verify_against(&expected, &refs).unwrap_err();
        assert_eq!(err, VersionedHashError::CountMismatch { expected: 1, actual: 2 });
    }

    #[test]
    fn verify_against_detects_hash_mismatch() {
        let commitments = [commitment(1)];
        let refs: Vec<&[u8]> = commitments.iter().map(|c| c.as_slice()).collect();
        let wrong = [versioned_hash(&commitment(9), KZG_VERSION).unwrap()];
        let err = verify_against(&wrong, &refs).unwrap_err();
        assert_eq!(err, VersionedHashError::HashMismatch(0));
    }

    #[test]
    fn validate_blob_tx_roundtrip() {
        let commitments = [commitment(3), commitment(4)];
        let refs: Vec<&[u8]> = commitments.iter().map(|c| c.as_slice()).collect();
        let blob_hashes: Vec<Hash> =
            refs.iter().map(|c| versioned_hash(c, KZG_VERSION).unwrap()).collect();
        assert!(validate_blob_tx(&blob_hashes, &refs).is_ok());
    }

    #[test]
    fn validate_blob_tx_rejects_wrong_version_byte() {
        let mut bad_hash = versioned_hash(&commitment(3), KZG_VERSION).unwrap();
        let mut bytes = *bad_hash.as_ref();
        bytes[0] = 0x00;
        bad_hash = Hash::from(bytes);
        let commitments = [commitment(3)];
        let refs: Vec<&[u8]> = commitments.iter().map(|c| c.as_slice()).collect();
        let err = validate_blob_tx(&[bad_hash], &refs).unwrap_err();
        assert_eq!(err, VersionedHashError::WrongVersion(0));
    }
}
