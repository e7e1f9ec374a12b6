//! Threshold-crossing rule.
//!
//! Applied inside a transaction that already holds the invoice's lock:
//! ```text
//! part.settled := true                       (skipped if already true)
//! sum := Σ(amount over settled parts)
//! if sum >= value and !invoice.settled: invoice.settled := true
//! ```
//! Amounts are exact integers. Equality and overage both settle.

use chrono::{DateTime, Utc};
use mppledger_types::{CircuitKey, LedgerError, Result, StoredInvoice};

/// What a single part settlement did to an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleOutcome {
    /// Invoice state after this call.
    pub invoice_settled: bool,
    /// This call flipped the part. `false` for a repeated report.
    pub part_newly_settled: bool,
    /// This call flipped the invoice.
    pub invoice_newly_settled: bool,
}

impl SettleOutcome {
    /// Whether anything has to be written back.
    #[must_use]
    pub fn mutated(&self) -> bool {
        self.part_newly_settled || self.invoice_newly_settled
    }
}

/// Mark `key` settled on `record` and re-evaluate the invoice.
///
/// # Errors
/// Returns [`LedgerError::PartNotFound`] if `key` is not in the registered
/// part set. `record` is untouched in that case.
pub fn apply_part_settlement(
    record: &mut StoredInvoice,
    key: &CircuitKey,
    now: DateTime<Utc>,
) -> Result<SettleOutcome> {
    let hash = record.hash();
    let part = record
        .parts
        .get_mut(key)
        .ok_or(LedgerError::PartNotFound {
            hash,
            circuit_key: *key,
        })?;
    let part_newly_settled = part.mark_settled();

    let invoice_newly_settled = record.threshold_reached() && record.invoice.mark_settled(now);

    Ok(SettleOutcome {
        invoice_settled: record.invoice.settled,
        part_newly_settled,
        invoice_newly_settled,
    })
}

#[cfg(test)]
mod tests {
    use mppledger_types::{InvoiceCreationData, MilliSat, PartAmounts};

    use super::*;

    const A: CircuitKey = CircuitKey {
        chan_id: 10,
        htlc_id: 11,
    };
    const B: CircuitKey = CircuitKey {
        chan_id: 11,
        htlc_id: 12,
    };

    fn record(value: u64, a: u64, b: u64) -> StoredInvoice {
        let amounts = PartAmounts::from([(A, MilliSat(a)), (B, MilliSat(b))]);
        StoredInvoice::register(&InvoiceCreationData::dummy(value), &amounts, Utc::now())
    }

    #[test]
    fn settles_only_on_last_part() {
        let mut rec = record(100, 70, 30);

        let first = apply_part_settlement(&mut rec, &A, Utc::now()).unwrap();
        assert_eq!(
            first,
            SettleOutcome {
                invoice_settled: false,
                part_newly_settled: true,
                invoice_newly_settled: false,
            }
        );

        let last = apply_part_settlement(&mut rec, &B, Utc::now()).unwrap();
        assert!(last.invoice_settled && last.invoice_newly_settled);
        assert!(rec.invoice.settled_at.is_some());
        rec.check_consistency().unwrap();
    }

    #[test]
    fn repeat_is_a_noop() {
        let mut rec = record(100, 70, 30);
        apply_part_settlement(&mut rec, &A, Utc::now()).unwrap();
        let again = apply_part_settlement(&mut rec, &A, Utc::now()).unwrap();
        assert!(!again.mutated());
        assert!(!again.invoice_settled);
        assert_eq!(rec.settled_amount(), MilliSat(70));
    }

    #[test]
    fn overage_settles_early() {
        let mut rec = record(100, 120, 30);
        let out = apply_part_settlement(&mut rec, &A, Utc::now()).unwrap();
        assert!(out.invoice_newly_settled);

        // Later parts still get recorded but never re-flip the invoice.
        let settled_at = rec.invoice.settled_at;
        let out = apply_part_settlement(&mut rec, &B, Utc::now()).unwrap();
        assert!(out.part_newly_settled && !out.invoice_newly_settled);
        assert!(out.invoice_settled);
        assert_eq!(rec.invoice.settled_at, settled_at);
    }

    #[test]
    fn parts_below_value_never_settle() {
        let mut rec = record(100, 50, 30);
        apply_part_settlement(&mut rec, &A, Utc::now()).unwrap();
        let out = apply_part_settlement(&mut rec, &B, Utc::now()).unwrap();
        assert!(!out.invoice_settled);
        rec.check_consistency().unwrap();
    }

    #[test]
    fn unknown_part_leaves_record_untouched() {
        let mut rec = record(100, 70, 30);
        let before = rec.clone();
        let err =
            apply_part_settlement(&mut rec, &CircuitKey::new(99, 99), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::PartNotFound { circuit_key, .. } if circuit_key == CircuitKey::new(99, 99)
        ));
        assert_eq!(rec, before);
    }
}
