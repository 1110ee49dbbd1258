//! Thin wrappers around the cryptographic primitives the engine treats as
//! external, pure-function collaborators (`keccak256`, `sha256`,
//! `rlp_encode`). These are not reimplemented from scratch; they delegate to
//! the same hashing crates the rest of the ecosystem uses.

use crate::Hash;
use alloy_rlp::Encodable;
use sha2::Digest;

/// Keccak-256 of arbitrary bytes.
pub fn keccak256<T: AsRef<[u8]>>(bytes: T) -> Hash {
    alloy_primitives::keccak256(bytes)
}

/// SHA-256 of arbitrary bytes, returned as a 32-byte array (not a [`Hash`] -
/// callers that need versioned-hash semantics reinterpret byte 0 themselves).
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

/// RLP-encodes an arbitrary [`Encodable`] value into a fresh buffer.
pub fn rlp_encode<T: Encodable>(value: &T) -> Vec<u8> {
    let mut buf = Vec::with_capacity(value.length());
    value.encode(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_matches_known_value() {
        let h = keccak256([]);
        assert_eq!(
            h,
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a47"
                .parse()
                .unwrap()
        );
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"hello"), sha256(b"hello"));
        assert_ne!(sha256(b"hello"), sha256(b"hellp"));
    }
}
