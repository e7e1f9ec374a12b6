//! The transactional store contract.

use std::{future::Future, sync::Arc};

use mppledger_types::{PaymentHash, Result, StoredInvoice};

/// Durable home of invoices and their parts.
///
/// Implementations must give [`InvoiceStore::begin`] exclusive semantics per
/// invoice hash: while a transaction is open, no other transaction on the
/// same hash may observe or modify the record. [`InvoiceStore::fetch`] may be
/// served from the last committed state without waiting for open
/// transactions.
pub trait InvoiceStore: Send + Sync {
    type Tx: InvoiceTx;

    /// Atomically create an invoice with its parts.
    ///
    /// # Errors
    /// `DuplicateInvoice` if the hash is already present.
    fn insert(&self, record: StoredInvoice) -> impl Future<Output = Result<()>> + Send;

    /// Read the last committed state of one invoice.
    ///
    /// # Errors
    /// `InvoiceNotFound` if the hash is unknown.
    fn fetch(&self, hash: &PaymentHash) -> impl Future<Output = Result<StoredInvoice>> + Send;

    /// Open a transaction holding the invoice's exclusive lock.
    ///
    /// # Errors
    /// `InvoiceNotFound` if the hash is unknown, `LockTimeout` if the lock
    /// could not be taken in time.
    fn begin(&self, hash: &PaymentHash) -> impl Future<Output = Result<Self::Tx>> + Send;
}

/// An open read-modify-write transaction on a single invoice.
///
/// Changes are staged until [`InvoiceTx::commit`]. Dropping the transaction
/// without committing, including when the owning future is cancelled,
/// discards them.
pub trait InvoiceTx: Send {
    /// The record as seen inside this transaction.
    fn record(&self) -> &StoredInvoice;

    /// Stage changes to the record.
    fn record_mut(&mut self) -> &mut StoredInvoice;

    /// Publish all staged changes at once and release the lock.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}

/// Lets several repositories or coordinators share one store.
impl<S: InvoiceStore> InvoiceStore for Arc<S> {
    type Tx = S::Tx;

    fn insert(&self, record: StoredInvoice) -> impl Future<Output = Result<()>> + Send {
        (**self).insert(record)
    }

    fn fetch(&self, hash: &PaymentHash) -> impl Future<Output = Result<StoredInvoice>> + Send {
        (**self).fetch(hash)
    }

    fn begin(&self, hash: &PaymentHash) -> impl Future<Output = Result<Self::Tx>> + Send {
        (**self).begin(hash)
    }
}
