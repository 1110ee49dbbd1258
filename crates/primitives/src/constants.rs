//! Protocol constants referenced throughout the engine.

/// Gas charged per blob under EIP-4844.
pub const GAS_PER_BLOB: u64 = 131_072;

/// Maximum blob gas spendable in a single block (6 blobs).
pub const MAX_BLOB_GAS_PER_BLOCK: u64 = 786_432;

/// Target blob gas a block "wants" to use; excess-blob-gas recurrence is centered on this.
pub const TARGET_BLOB_GAS_PER_BLOCK: u64 = 3 * GAS_PER_BLOB;

/// Lower bound on `gas_limit` accepted from any payload.
pub const MIN_GAS_LIMIT: u64 = 5_000;

/// Maximum length, in bytes, of the `extra_data` header field.
pub const MAX_EXTRA_DATA_BYTES: usize = 32;

/// Maximum number of withdrawals carried by a single payload.
pub const MAX_WITHDRAWALS_PER_PAYLOAD: usize = 16;

/// Maximum size, in bytes, of a single transaction's opaque byte string.
pub const MAX_TRANSACTION_SIZE: usize = 16 * 1024 * 1024;

/// Number of slots in one epoch.
pub const EPOCH_SLOTS: u64 = 32;

/// Bound on ancestry walks performed by the forkchoice tracker.
pub const MAX_ANCESTRY_WALK: u64 = 1024;

/// EIP-1559 elasticity multiplier (target = gas_limit / ELASTICITY_MULTIPLIER).
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// EIP-1559 base fee max change denominator.
pub const BASE_FEE_MAX_CHANGE_DENOMINATOR: u64 = 8;

/// Absolute minimum base fee the recurrence is allowed to settle at.
pub const MIN_BASE_FEE: u64 = 7;

/// KZG versioned-hash version byte (EIP-4844).
pub const KZG_VERSIONED_HASH_VERSION: u8 = 0x01;

/// Byte length of a KZG commitment.
pub const KZG_COMMITMENT_SIZE: usize = 48;
