//! Caller-facing settlement contract.
//!
//! The coordinator is what the payment-decision component talks to. It
//! registers invoices, forwards part settlement reports, and serves reads.
//! It holds no settlement state of its own: every call goes to the store.

use std::sync::Arc;

use mppledger_store::InvoiceStore;
use mppledger_types::{
    CircuitKey, Invoice, InvoiceCreationData, LedgerError, MilliSat, PartAmounts, PaymentHash,
    Preimage, Result,
};

use crate::repository::InvoiceRepository;

/// Orchestrates registration, part settlement and lookup.
///
/// Cheap to clone; clones share the same repository and store.
pub struct SettlementCoordinator<S> {
    repo: Arc<InvoiceRepository<S>>,
}

impl<S> Clone for SettlementCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<S: InvoiceStore> SettlementCoordinator<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            repo: Arc::new(InvoiceRepository::new(store)),
        }
    }

    #[must_use]
    pub fn repository(&self) -> &InvoiceRepository<S> {
        &self.repo
    }

    /// Register an invoice with the full set of parts expected to pay it.
    ///
    /// The part amounts are persisted exactly as given. Whether they add up
    /// to the invoice value is the creator's policy; a shortfall is logged
    /// because such an invoice can never settle.
    ///
    /// # Errors
    /// `DuplicateInvoice` if the hash is already registered.
    pub async fn request_settle(
        &self,
        data: &InvoiceCreationData,
        parts: &PartAmounts,
    ) -> Result<()> {
        let hash = data.hash();
        self.repo.register(data, parts).await?;

        let total: MilliSat = parts.values().copied().sum();
        if total < data.value {
            tracing::warn!(
                hash = %hash.short(),
                value = data.value.as_u64(),
                parts_total = total.as_u64(),
                "Registered parts do not cover invoice value"
            );
        }
        tracing::info!(
            hash = %hash.short(),
            value = data.value.as_u64(),
            parts = parts.len(),
            "Invoice registered"
        );
        Ok(())
    }

    /// Record that one part has settled.
    ///
    /// Returns the invoice's settled state right after this call: `false`
    /// while the settled parts are below the invoice value, `true` from the
    /// call that reaches it onwards. Repeated reports for a part, and any
    /// report on an already settled invoice, return the current state
    /// without changing anything.
    ///
    /// Any error means no state changed.
    ///
    /// # Errors
    /// `InvoiceNotFound`, `PartNotFound`, or a transient store failure.
    pub async fn mark_settled(&self, hash: &PaymentHash, key: &CircuitKey) -> Result<bool> {
        let outcome = match self.repo.set_part_settled(hash, key).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.is_not_found() {
                    tracing::warn!(
                        hash = %hash.short(),
                        circuit = %key,
                        error = %err,
                        "Settlement report for unknown invoice or part"
                    );
                }
                return Err(err);
            }
        };

        if !outcome.part_newly_settled {
            tracing::debug!(
                hash = %hash.short(),
                circuit = %key,
                "Part already settled"
            );
        }
        if outcome.invoice_newly_settled {
            tracing::info!(
                hash = %hash.short(),
                circuit = %key,
                "Invoice settled"
            );
        }
        Ok(outcome.invoice_settled)
    }

    /// The invoice and the amount registered for each of its parts.
    ///
    /// Per-part settle state is not part of this read; see
    /// [`InvoiceRepository::load`].
    ///
    /// # Errors
    /// `InvoiceNotFound` if the hash is unknown.
    pub async fn get(&self, hash: &PaymentHash) -> Result<(Invoice, PartAmounts)> {
        let record = self.repo.load(hash).await?;
        let amounts = record.amounts();
        Ok((record.invoice, amounts))
    }

    /// The preimage of a settled invoice.
    ///
    /// # Errors
    /// `InvoiceNotFound` if the hash is unknown, `InvoiceNotSettled` while
    /// the settled parts are still below the invoice value.
    pub async fn settled_preimage(&self, hash: &PaymentHash) -> Result<Preimage> {
        let record = self.repo.load(hash).await?;
        record
            .invoice
            .revealable_preimage()
            .copied()
            .ok_or(LedgerError::InvoiceNotSettled(*hash))
    }
}
