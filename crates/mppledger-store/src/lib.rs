//! # mppledger-store
//!
//! **Durable Store seam**: the transactional contract the settlement layer
//! is written against, and an in-process reference backend.
//!
//! ## Architecture
//!
//! - [`InvoiceStore`]: create, snapshot-read, and open a per-invoice
//!   transaction
//! - [`InvoiceTx`]: exclusive read-modify-write of one invoice and its
//!   parts; dropped without [`InvoiceTx::commit`] means rolled back
//! - [`MemoryStore`]: `tokio`-locked rows, bounded lock waits, JSON
//!   snapshots
//!
//! Transactions on different invoices never contend. Transactions on the
//! same invoice are serialized by that invoice's lock.

pub mod memory;
pub mod snapshot;
pub mod traits;

pub use memory::{MemoryStore, MemoryTx};
pub use snapshot::{SnapshotEntry, SnapshotPart, StoreSnapshot};
pub use traits::{InvoiceStore, InvoiceTx};
