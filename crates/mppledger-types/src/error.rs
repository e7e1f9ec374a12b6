//! Error types for the mppledger settlement ledger.
//!
//! All errors use the `MPL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Invoice errors
//! - 2xx: Part errors
//! - 3xx: Store errors
//! - 9xx: General / internal errors
//!
//! Not-found conditions are expected outcomes (stale or forged settlement
//! reports) and are kept distinct from store failures so callers can decide
//! whether a retry makes sense. See [`LedgerError::is_not_found`] and
//! [`LedgerError::is_transient`].

use thiserror::Error;

use crate::{CircuitKey, PaymentHash};

/// Central error enum for all ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // =================================================================
    // Invoice Errors (1xx)
    // =================================================================
    /// No invoice is registered under this hash.
    #[error("MPL_ERR_100: Invoice not found: {0}")]
    InvoiceNotFound(PaymentHash),

    /// An invoice with this hash is already registered.
    #[error("MPL_ERR_101: Invoice already exists: {0}")]
    DuplicateInvoice(PaymentHash),

    /// The invoice exists but its parts do not cover its value yet.
    #[error("MPL_ERR_102: Invoice not settled: {0}")]
    InvoiceNotSettled(PaymentHash),

    // =================================================================
    // Part Errors (2xx)
    // =================================================================
    /// The circuit key is not in the invoice's registered part set.
    #[error("MPL_ERR_200: Part {circuit_key} not found for invoice {hash}")]
    PartNotFound {
        hash: PaymentHash,
        circuit_key: CircuitKey,
    },

    // =================================================================
    // Store Errors (3xx)
    // =================================================================
    /// The backing store could not complete the operation.
    #[error("MPL_ERR_300: Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// The invoice's transaction lock was not acquired in time.
    #[error("MPL_ERR_301: Lock timeout after {timeout_ms}ms for invoice {hash}")]
    LockTimeout { hash: PaymentHash, timeout_ms: u64 },

    /// Persisted state breaks the settlement invariant.
    #[error("MPL_ERR_302: Invariant violation: {reason}")]
    InvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Serialization / deserialization error.
    #[error("MPL_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config document, bad values, etc.).
    #[error("MPL_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk).
    #[error("MPL_ERR_903: I/O error: {0}")]
    Io(String),
}

impl LedgerError {
    /// Invoice or part lookups that failed. Retrying will not help.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::InvoiceNotFound(_) | Self::PartNotFound { .. })
    }

    /// Failures of the store itself. The operation left no effect and may be
    /// retried at the caller's discretion.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::LockTimeout { .. } | Self::Io(_)
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
