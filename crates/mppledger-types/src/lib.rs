//! # mppledger-types
//!
//! Shared types, errors, and configuration for the **mppledger** settlement
//! ledger.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`PaymentHash`], [`Preimage`], [`PaymentAddr`], [`CircuitKey`]
//! - **Amounts**: [`MilliSat`]
//! - **Invoice model**: [`InvoiceCreationData`], [`Invoice`], [`PartRecord`], [`StoredInvoice`], [`PartAmounts`]
//! - **Configuration**: [`StoreConfig`]
//! - **Errors**: [`LedgerError`] with `MPL_ERR_` prefix codes
//! - **Constants**: defaults and limits

pub mod amount;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod invoice;

// Re-export all primary types at crate root for ergonomic imports:
//   use mppledger_types::{Invoice, CircuitKey, LedgerError, ...};

pub use amount::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use invoice::*;

// Constants are accessed via `mppledger_types::constants::FOO`.
