//! JSON snapshot format for [`MemoryStore`](crate::MemoryStore).
//!
//! Parts are written as a list rather than a map because JSON object keys
//! must be strings. Every record is re-validated on load; a snapshot that
//! breaks the settlement invariant is refused rather than repaired.

use std::collections::{BTreeMap, HashSet};

use mppledger_types::{
    CircuitKey, Invoice, LedgerError, MilliSat, PartRecord, Result, StoredInvoice, constants,
};
use serde::{Deserialize, Serialize};

/// Whole-store snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub engine: String,
    pub version: u32,
    pub invoices: Vec<SnapshotEntry>,
}

/// One invoice and its parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub invoice: Invoice,
    pub parts: Vec<SnapshotPart>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotPart {
    pub circuit_key: CircuitKey,
    pub amount: MilliSat,
    pub settled: bool,
}

impl StoreSnapshot {
    /// Snapshot of the given records, ordered by hash so output is stable.
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a StoredInvoice>) -> Self {
        let mut invoices: Vec<SnapshotEntry> =
            records.into_iter().map(SnapshotEntry::from).collect();
        invoices.sort_by_key(|e| e.invoice.hash);
        Self {
            engine: constants::ENGINE_NAME.to_string(),
            version: constants::SNAPSHOT_VERSION,
            invoices,
        }
    }

    /// Validate and convert back into store records.
    ///
    /// # Errors
    /// - `Serialization` on an unknown snapshot version
    /// - `DuplicateInvoice` if a hash appears twice
    /// - `InvariantViolation` if a record is inconsistent
    pub fn into_records(self) -> Result<Vec<StoredInvoice>> {
        if self.version != constants::SNAPSHOT_VERSION {
            return Err(LedgerError::Serialization(format!(
                "unsupported snapshot version {} (expected {})",
                self.version,
                constants::SNAPSHOT_VERSION
            )));
        }
        let mut seen = HashSet::with_capacity(self.invoices.len());
        let mut records = Vec::with_capacity(self.invoices.len());
        for entry in self.invoices {
            let record = entry.into_record()?;
            if !seen.insert(record.hash()) {
                return Err(LedgerError::DuplicateInvoice(record.hash()));
            }
            records.push(record);
        }
        Ok(records)
    }
}

impl From<&StoredInvoice> for SnapshotEntry {
    fn from(record: &StoredInvoice) -> Self {
        Self {
            invoice: record.invoice.clone(),
            parts: record
                .parts
                .iter()
                .map(|(key, part)| SnapshotPart {
                    circuit_key: *key,
                    amount: part.amount,
                    settled: part.settled,
                })
                .collect(),
        }
    }
}

impl SnapshotEntry {
    fn into_record(self) -> Result<StoredInvoice> {
        let hash = self.invoice.hash;
        let mut parts = BTreeMap::new();
        for p in self.parts {
            let prev = parts.insert(
                p.circuit_key,
                PartRecord {
                    amount: p.amount,
                    settled: p.settled,
                },
            );
            if prev.is_some() {
                return Err(LedgerError::InvariantViolation {
                    reason: format!("Invoice {hash}: part {} listed twice", p.circuit_key),
                });
            }
        }
        let record = StoredInvoice {
            invoice: self.invoice,
            parts,
        };
        record.check_consistency()?;
        Ok(record)
    }
}
