//! Invoice and part records.
//!
//! An invoice is registered once together with the full set of parts that
//! are expected to pay it. Both the invoice's and each part's `settled` flag
//! only ever move false → true.
//!
//! The invariant tying them together:
//! ```text
//! invoice.settled == Σ(part.amount where part.settled) >= invoice.value
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CircuitKey, LedgerError, MilliSat, PaymentAddr, PaymentHash, Preimage, Result};

/// Amount expected from each registered part, keyed by circuit.
pub type PartAmounts = BTreeMap<CircuitKey, MilliSat>;

/// What the invoice-creation collaborator hands over at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreationData {
    pub preimage: Preimage,
    /// Total amount that must be settled before the invoice is.
    pub value: MilliSat,
    pub payment_addr: PaymentAddr,
}

impl InvoiceCreationData {
    #[must_use]
    pub fn hash(&self) -> PaymentHash {
        self.preimage.hash()
    }
}

/// Invoice metadata and aggregate settlement state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub hash: PaymentHash,
    pub preimage: Preimage,
    pub value: MilliSat,
    pub payment_addr: PaymentAddr,
    /// Monotonic. Never cleared once set.
    pub settled: bool,
    pub created_at: DateTime<Utc>,
    /// Set in the same transaction that flips `settled`.
    pub settled_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// A fresh, unsettled invoice.
    #[must_use]
    pub fn new(data: &InvoiceCreationData, created_at: DateTime<Utc>) -> Self {
        Self {
            hash: data.hash(),
            preimage: data.preimage,
            value: data.value,
            payment_addr: data.payment_addr,
            settled: false,
            created_at,
            settled_at: None,
        }
    }

    /// Flip the invoice to settled. Returns `true` only on the call that
    /// performed the transition.
    pub fn mark_settled(&mut self, at: DateTime<Utc>) -> bool {
        if self.settled {
            return false;
        }
        self.settled = true;
        self.settled_at = Some(at);
        true
    }

    /// The preimage, but only once the invoice is settled. Callers must go
    /// through this before disclosing the secret to a payer.
    #[must_use]
    pub fn revealable_preimage(&self) -> Option<&Preimage> {
        self.settled.then_some(&self.preimage)
    }
}

/// One expected contribution toward an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    /// Fixed at registration.
    pub amount: MilliSat,
    /// Monotonic. Never cleared once set.
    pub settled: bool,
}

impl PartRecord {
    #[must_use]
    pub fn new(amount: MilliSat) -> Self {
        Self {
            amount,
            settled: false,
        }
    }

    /// Returns `true` only on the call that performed the transition.
    pub fn mark_settled(&mut self) -> bool {
        let transitioned = !self.settled;
        self.settled = true;
        transitioned
    }
}

/// An invoice together with its fixed part set, as held by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInvoice {
    pub invoice: Invoice,
    pub parts: BTreeMap<CircuitKey, PartRecord>,
}

impl StoredInvoice {
    /// Build the record persisted at registration: every part unsettled.
    ///
    /// The invoice flag is evaluated against the (empty) settled sum, so only
    /// a zero-value invoice starts out settled.
    #[must_use]
    pub fn register(
        data: &InvoiceCreationData,
        amounts: &PartAmounts,
        now: DateTime<Utc>,
    ) -> Self {
        let parts = amounts
            .iter()
            .map(|(key, amount)| (*key, PartRecord::new(*amount)))
            .collect();
        let mut record = Self {
            invoice: Invoice::new(data, now),
            parts,
        };
        if record.threshold_reached() {
            record.invoice.mark_settled(now);
        }
        record
    }

    #[must_use]
    pub fn hash(&self) -> PaymentHash {
        self.invoice.hash
    }

    /// Sum of the amounts of all settled parts.
    #[must_use]
    pub fn settled_amount(&self) -> MilliSat {
        self.parts
            .values()
            .filter(|p| p.settled)
            .map(|p| p.amount)
            .sum()
    }

    /// Whether the settled parts cover the invoice value. Equality counts.
    #[must_use]
    pub fn threshold_reached(&self) -> bool {
        self.settled_amount() >= self.invoice.value
    }

    /// The registered part set without per-part settle state.
    #[must_use]
    pub fn amounts(&self) -> PartAmounts {
        self.parts.iter().map(|(k, p)| (*k, p.amount)).collect()
    }

    /// Validate a record read back from persistence.
    ///
    /// # Errors
    /// Returns [`LedgerError::InvariantViolation`] if the hash does not
    /// commit to the preimage, the settled flag disagrees with the settled
    /// sum, or `settled_at` disagrees with the settled flag.
    pub fn check_consistency(&self) -> Result<()> {
        let inv = &self.invoice;
        if !inv.hash.matches(&inv.preimage) {
            return Err(LedgerError::InvariantViolation {
                reason: format!("Invoice {}: hash does not match preimage", inv.hash),
            });
        }
        if inv.settled != self.threshold_reached() {
            return Err(LedgerError::InvariantViolation {
                reason: format!(
                    "Invoice {}: settled={} but settled amount {} vs value {}",
                    inv.hash,
                    inv.settled,
                    self.settled_amount(),
                    inv.value,
                ),
            });
        }
        if inv.settled != inv.settled_at.is_some() {
            return Err(LedgerError::InvariantViolation {
                reason: format!(
                    "Invoice {}: settled={} but settled_at={:?}",
                    inv.hash, inv.settled, inv.settled_at
                ),
            });
        }
        Ok(())
    }
}

/// Dummy creation data for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl InvoiceCreationData {
    pub fn dummy(value: u64) -> Self {
        Self {
            preimage: Preimage::random(),
            value: MilliSat(value),
            payment_addr: PaymentAddr::random(),
        }
    }
}
