//! Merkle branch builder/verifier over a beacon-block-body commitment
//! (component C4).
//!
//! The body tree is a complete binary tree over fields padded to the next
//! power of two with zero-hash leaves. Siblings combine as
//! `keccak256(left || right)`; generalized-index bit `idx mod 2 == 0` means
//! the current node is a left child.

use engine_primitives::{crypto::keccak256, Hash};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InclusionProofError {
    #[error("proof is missing")]
    MissingProof,
    #[error("proof is structurally invalid (zero leaf or empty branch)")]
    InvalidProof,
    #[error("recomputed root does not match the expected root")]
    ProofMismatch,
}

/// A Merkle branch proving `leaf` is the field at generalized `index` under
/// some root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub leaf: Hash,
    pub branch: Vec<Hash>,
    pub index: u64,
}

fn hash_pair(left: Hash, right: Hash) -> Hash {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_slice());
    buf[32..].copy_from_slice(right.as_slice());
    keccak256(buf)
}

/// Walks the branch from `leaf` up to the root, given the generalized `index`
/// at the leaf level.
pub fn compute_root(leaf: Hash, branch: &[Hash], index: u64) -> Hash {
    let mut node = leaf;
    let mut idx = index;
    for sibling in branch {
        node = if idx % 2 == 0 { hash_pair(node, *sibling) } else { hash_pair(*sibling, node) };
        idx /= 2;
    }
    node
}

fn next_power_of_two(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        n.next_power_of_two()
    }
}

/// Builds an [`InclusionProof`] for `field_hashes[payload_index]`, padding the
/// field list to the next power of two with zero-hash leaves.
pub fn build_proof(field_hashes: &[Hash], payload_index: usize) -> InclusionProof {
    let padded_len = next_power_of_two(field_hashes.len().max(payload_index + 1));
    let mut level: Vec<Hash> = (0..padded_len)
        .map(|i| field_hashes.get(i).copied().unwrap_or(Hash::ZERO))
        .collect();

    let leaf = level[payload_index];
    let mut branch = Vec::new();
    let mut idx_in_level = payload_index;

    while level.len() > 1 {
        let sibling_idx = if idx_in_level % 2 == 0 { idx_in_level + 1 } else { idx_in_level - 1 };
        let sibling = level.get(sibling_idx).copied().unwrap_or(Hash::ZERO);
        branch.push(sibling);

        let mut next_level = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let l = pair[0];
            let r = pair.get(1).copied().unwrap_or(Hash::ZERO);
            next_level.push(hash_pair(l, r));
        }
        level = next_level;
        idx_in_level /= 2;
    }

    InclusionProof { leaf, branch, index: payload_index as u64 }
}

/// Validates `proof` against `expected_root`.
pub fn validate(proof: Option<&InclusionProof>, expected_root: Hash) -> Result<(), InclusionProofError> {
    let proof = proof.ok_or(InclusionProofError::MissingProof)?;
    if proof.leaf.is_zero() || proof.branch.is_empty() {
        return Err(InclusionProofError::InvalidProof);
    }
    let root = compute_root(proof.leaf, &proof.branch, proof.index);
    if root != expected_root {
        return Err(InclusionProofError::ProofMismatch);
    }
    Ok(())
}

/// Computes the Merkle root of `field_hashes`, padded to the next power of
/// two with zero-hash leaves.
pub fn merkle_root(field_hashes: &[Hash]) -> Hash {
    let padded_len = next_power_of_two(field_hashes.len());
    let mut level: Vec<Hash> = (0..padded_len)
        .map(|i| field_hashes.get(i).copied().unwrap_or(Hash::ZERO))
        .collect();
    while level.len() > 1 {
        let mut next_level = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let l = pair[0];
            let r = pair.get(1).copied().unwrap_or(Hash::ZERO);
            next_level.push(hash_pair(l, r));
        }
        level = next_level;
    }
    level.into_iter().next().unwrap_or(Hash::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tag: &str) -> Hash {
        keccak256(tag.as_bytes())
    }

    #[test]
    fn four_field_proof_matches_manually_computed_root() {
        let f0 = leaf("f0");
        let f1 = leaf("f1");
        let payload = leaf("payload");
        let f3 = leaf("f3");

        let root = hash_pair(hash_pair(f0, f1), hash_pair(payload, f3));
        let fields = [f0, f1, payload, f3];

        let proof = build_proof(&fields, 2);
        assert_eq!(compute_root(proof.leaf, &proof.branch, proof.index), root);
        assert!(validate(Some(&proof), root).is_ok());
    }

    #[test]
    fn flipping_a_leaf_byte_causes_mismatch() {
        let f0 = leaf("f0");
        let f1 = leaf("f1");
        let payload = leaf("payload");
        let f3 = leaf("f3");
        let root = hash_pair(hash_pair(f0, f1), hash_pair(payload, f3));
        let fields = [f0, f1, payload, f3];

        let mut proof = build_proof(&fields, 2);
        let mut bytes = *proof.leaf.as_ref();
        bytes[0] ^= 0xFF;
        proof.leaf = Hash::from(bytes);

        assert_eq!(validate(Some(&proof), root), Err(InclusionProofError::ProofMismatch));
    }

    #[test]
    fn missing_proof_is_rejected() {
        assert_eq!(validate(None, Hash::ZERO), Err(InclusionProofError::MissingProof));
    }

    #[test]
    fn zero_leaf_or_empty_branch_is_structurally_invalid() {
        let bad = InclusionProof { leaf: Hash::ZERO, branch: vec![Hash::ZERO], index: 0 };
        assert_eq!(validate(Some(&bad), Hash::ZERO), Err(InclusionProofError::InvalidProof));

        let bad2 = InclusionProof { leaf: leaf("x"), branch: vec![], index: 0 };
        assert_eq!(validate(Some(&bad2), Hash::ZERO), Err(InclusionProofError::InvalidProof));
    }

    #[test]
    fn non_power_of_two_field_count_pads_with_zero_leaves() {
        let fields: Vec<Hash> = (0..5).map(|i| leaf(&format!("f{i}"))).collect();
        let proof = build_proof(&fields, 4);
        let root = merkle_root(&fields);
        assert!(validate(Some(&proof), root).is_ok());
        assert_eq!(proof.branch.len(), 3); // padded to 8 leaves -> depth 3
    }
}
