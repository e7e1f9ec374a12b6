//! # mppledger-settlement
//!
//! **Settlement ledger**: registration of invoices with their expected
//! parts, idempotent per-part settlement, and threshold evaluation.
//!
//! ## Architecture
//!
//! 1. [`InvoiceRepository`]: register / load / set-part-settled over any
//!    [`InvoiceStore`](mppledger_store::InvoiceStore)
//! 2. [`threshold`]: the pure rule that decides whether an invoice is paid
//! 3. [`SettlementCoordinator`]: the caller-facing contract
//!
//! ## Settlement Flow
//!
//! ```text
//! request_settle(invoice, parts) → Repository.register → Store.insert
//! mark_settled(hash, key)        → Repository.set_part_settled
//!                                    → Store.begin (per-invoice lock)
//!                                    → threshold::apply_part_settlement
//!                                    → Tx.commit
//! get(hash)                      → Repository.load → Store.fetch
//! ```
//!
//! No state is cached between calls. The store's per-invoice transaction is
//! the only serialization point, so several coordinator instances may share
//! one store.

pub mod coordinator;
pub mod repository;
pub mod threshold;

pub use coordinator::SettlementCoordinator;
pub use repository::InvoiceRepository;
pub use threshold::SettleOutcome;
