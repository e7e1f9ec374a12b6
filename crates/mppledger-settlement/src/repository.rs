//! Invoice repository: durable create, point lookup, and part-state
//! mutation over an [`InvoiceStore`].
//!
//! Every mutation runs inside exactly one store transaction scoped to the
//! invoice. The read of current part states, the flag update and the sum
//! recomputation happen under the same lock, so concurrent reports for the
//! same invoice can neither double-credit a part nor both miss the
//! threshold crossing.

use chrono::Utc;
use mppledger_store::{InvoiceStore, InvoiceTx};
use mppledger_types::{
    CircuitKey, InvoiceCreationData, PartAmounts, PaymentHash, Result, StoredInvoice,
};

use crate::threshold::{self, SettleOutcome};

/// Typed access to invoices and their parts.
pub struct InvoiceRepository<S> {
    store: S,
}

impl<S: InvoiceStore> InvoiceRepository<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Atomically persist an invoice and every expected part, all unsettled.
    ///
    /// Not idempotent: registering the same hash twice fails.
    ///
    /// # Errors
    /// `DuplicateInvoice` if the hash already exists.
    pub async fn register(&self, data: &InvoiceCreationData, parts: &PartAmounts) -> Result<()> {
        let record = StoredInvoice::register(data, parts, Utc::now());
        self.store.insert(record).await
    }

    /// The invoice and its full part set, including per-part settle state.
    ///
    /// # Errors
    /// `InvoiceNotFound` if the hash is unknown.
    pub async fn load(&self, hash: &PaymentHash) -> Result<StoredInvoice> {
        self.store.fetch(hash).await
    }

    /// Mark one part settled and re-evaluate the invoice, in one transaction.
    ///
    /// Nothing is written when the call changes nothing (a repeated report).
    /// On any error the transaction is dropped and durable state is
    /// unchanged.
    ///
    /// # Errors
    /// `InvoiceNotFound`, `PartNotFound`, or the store's own failure.
    pub async fn set_part_settled(
        &self,
        hash: &PaymentHash,
        key: &CircuitKey,
    ) -> Result<SettleOutcome> {
        let mut tx = self.store.begin(hash).await?;
        let outcome = threshold::apply_part_settlement(tx.record_mut(), key, Utc::now())?;
        if outcome.mutated() {
            tx.commit().await?;
        }
        Ok(outcome)
    }
}
