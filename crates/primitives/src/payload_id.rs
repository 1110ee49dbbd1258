//! Opaque payload identifiers.

use alloy_primitives::FixedBytes;
use std::fmt;

/// An 8-byte identifier allocated by the engine for an in-flight or completed
/// payload build.
///
/// `PayloadId` is deliberately opaque: callers (including this workspace's own
/// `rpc-engine-api` crate) must not assume anything about its internal
/// structure beyond "8 bytes, equality-comparable, hex-displayable". The
/// derivation lives in `engine-payload-builder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PayloadId(FixedBytes<8>);

impl PayloadId {
    /// Wraps a raw 8-byte array as a `PayloadId`.
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(FixedBytes::from(bytes))
    }

    /// Returns the raw bytes. Exposed for wire encoding only - do not branch on the contents.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Display for PayloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
