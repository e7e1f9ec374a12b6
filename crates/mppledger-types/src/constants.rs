//! System-wide constants for the mppledger settlement ledger.

/// Length of preimages, payment hashes and payment addresses in bytes.
pub const HASH_LEN: usize = 32;

/// Default bound on waiting for an invoice's transaction lock, in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Snapshot format version written by the in-memory store.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Engine name.
pub const ENGINE_NAME: &str = "mppledger";
