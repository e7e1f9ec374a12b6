//! In-process [`InvoiceStore`] backend.
//!
//! Each invoice lives in its own row with two locks:
//! - `tx_lock` serializes transactions on that invoice and is held for the
//!   whole read-modify-write sequence
//! - `committed` guards the published record and is only held for the
//!   instant of a read or a commit
//!
//! Readers therefore see the last committed state without queueing behind
//! an open transaction. Rows for different invoices share nothing but the
//! index, which is only write-locked while inserting.
//!
//! When a `snapshot_path` is configured the store writes through: `insert`
//! and `commit` rewrite the snapshot file before publishing, and a failed
//! write leaves the in-memory state untouched. All snapshot writes take
//! `persist_lock`, so the file always matches some published state.
//!
//! Lock order: `tx_lock`, then `persist_lock`, then the row index, then a
//! row's `committed`. A committer releases the index before write-locking
//! its own row.

use std::{
    collections::HashMap,
    path::Path,
    sync::Arc,
};

use mppledger_types::{LedgerError, PaymentHash, Result, StoreConfig, StoredInvoice};
use tokio::{
    io::AsyncWriteExt,
    sync::{Mutex, OwnedMutexGuard, RwLock},
};

use crate::{
    snapshot::StoreSnapshot,
    traits::{InvoiceStore, InvoiceTx},
};

type RowMap = HashMap<PaymentHash, Arc<Row>>;

struct Row {
    tx_lock: Arc<Mutex<()>>,
    committed: RwLock<StoredInvoice>,
}

impl Row {
    fn new(record: StoredInvoice) -> Self {
        Self {
            tx_lock: Arc::new(Mutex::new(())),
            committed: RwLock::new(record),
        }
    }
}

struct Shared {
    rows: RwLock<RowMap>,
    persist_lock: Mutex<()>,
    config: StoreConfig,
}

impl Shared {
    fn snapshot_path(&self) -> Option<&Path> {
        self.config.snapshot_path.as_deref()
    }
}

/// Committed records of every row, with `staged` standing in for the row
/// that has the same hash (or appended if there is none).
///
/// The staged row's `committed` lock is never taken.
async fn collect_records(rows: &RowMap, staged: Option<&StoredInvoice>) -> Vec<StoredInvoice> {
    let staged_hash = staged.map(StoredInvoice::hash);
    let mut records = Vec::with_capacity(rows.len() + 1);
    for (hash, row) in rows {
        if Some(*hash) != staged_hash {
            records.push(row.committed.read().await.clone());
        }
    }
    records.extend(staged.cloned());
    records
}

/// Write `snap` to `path` through a temporary file that is synced before
/// being renamed over the target. Callers must hold `persist_lock`.
async fn write_snapshot(path: &Path, snap: &StoreSnapshot) -> Result<()> {
    let json = serde_json::to_vec_pretty(snap)?;
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// In-memory invoice store with per-invoice transaction locks.
///
/// With `snapshot_path` set, every successful `insert` and `commit` is on
/// disk before it returns, so [`MemoryStore::open`] on the same config
/// restores exactly what callers were told had committed.
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                rows: RwLock::new(HashMap::new()),
                persist_lock: Mutex::new(()),
                config,
            }),
        }
    }

    /// Create a store, restoring the configured snapshot if one exists.
    ///
    /// # Errors
    /// `Configuration` for an invalid config, `Io`/`Serialization` if the
    /// snapshot can't be read, `InvariantViolation`/`DuplicateInvoice` if its
    /// contents are inconsistent.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let store = Self::new(config);
        if let Some(path) = store.shared.snapshot_path() {
            if tokio::fs::try_exists(path).await? {
                let restored = store.load_snapshot(path).await?;
                tracing::info!(
                    path = %path.display(),
                    invoices = restored,
                    "Restored invoice store from snapshot"
                );
            }
        }
        Ok(store)
    }

    /// Number of registered invoices.
    pub async fn len(&self) -> usize {
        self.shared.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.rows.read().await.is_empty()
    }

    async fn row(&self, hash: &PaymentHash) -> Result<Arc<Row>> {
        self.shared
            .rows
            .read()
            .await
            .get(hash)
            .cloned()
            .ok_or(LedgerError::InvoiceNotFound(*hash))
    }

    /// Committed state of every invoice. Each record is internally
    /// consistent; records are not captured at a single common instant.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let rows = self.shared.rows.read().await;
        StoreSnapshot::from_records(&collect_records(&rows, None).await)
    }

    /// Write a JSON snapshot to `path`, replacing any previous file.
    ///
    /// The file is written and synced next to the target, then renamed into
    /// place, so a crash mid-write never leaves a truncated snapshot behind.
    /// Concurrent saves are serialized.
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let _persist = self.shared.persist_lock.lock().await;
        let snap = self.snapshot().await;
        write_snapshot(path, &snap).await?;
        tracing::info!(
            path = %path.display(),
            invoices = snap.invoices.len(),
            "Saved invoice store snapshot"
        );
        Ok(())
    }

    /// Write a snapshot to the configured `snapshot_path`. Commits already
    /// write through; this is for forcing a fresh file, e.g. after a restore.
    ///
    /// # Errors
    /// `Configuration` if no snapshot path is configured.
    pub async fn persist(&self) -> Result<()> {
        let path = self
            .shared
            .snapshot_path()
            .ok_or_else(|| LedgerError::Configuration("no snapshot_path configured".into()))?;
        self.save_snapshot(path).await
    }

    /// Load the snapshot at `path` into this store. All records are
    /// validated before any is inserted. Returns the number restored.
    pub async fn load_snapshot(&self, path: &Path) -> Result<usize> {
        let _persist = self.shared.persist_lock.lock().await;
        let bytes = tokio::fs::read(path).await?;
        let snap: StoreSnapshot = serde_json::from_slice(&bytes)?;
        let records = snap.into_records()?;

        let mut rows = self.shared.rows.write().await;
        if let Some(dup) = records.iter().find(|r| rows.contains_key(&r.hash())) {
            return Err(LedgerError::DuplicateInvoice(dup.hash()));
        }
        let count = records.len();
        for record in records {
            rows.insert(record.hash(), Arc::new(Row::new(record)));
        }
        Ok(count)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl InvoiceStore for MemoryStore {
    type Tx = MemoryTx;

    async fn insert(&self, record: StoredInvoice) -> Result<()> {
        let hash = record.hash();
        let shared = &self.shared;
        let _persist = match shared.snapshot_path() {
            Some(_) => Some(shared.persist_lock.lock().await),
            None => None,
        };
        let mut rows = shared.rows.write().await;
        if rows.contains_key(&hash) {
            return Err(LedgerError::DuplicateInvoice(hash));
        }
        if let Some(path) = shared.snapshot_path() {
            let records = collect_records(&rows, Some(&record)).await;
            write_snapshot(path, &StoreSnapshot::from_records(&records)).await?;
        }
        rows.insert(hash, Arc::new(Row::new(record)));
        Ok(())
    }

    async fn fetch(&self, hash: &PaymentHash) -> Result<StoredInvoice> {
        let row = self.row(hash).await?;
        let record = row.committed.read().await.clone();
        Ok(record)
    }

    async fn begin(&self, hash: &PaymentHash) -> Result<MemoryTx> {
        let row = self.row(hash).await?;
        let config = &self.shared.config;
        let guard = tokio::time::timeout(
            config.lock_timeout(),
            Arc::clone(&row.tx_lock).lock_owned(),
        )
        .await
        .map_err(|_| LedgerError::LockTimeout {
            hash: *hash,
            timeout_ms: config.lock_timeout_ms,
        })?;
        let staged = row.committed.read().await.clone();
        tracing::debug!(hash = %hash.short(), "Transaction opened");
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            row,
            staged,
            _guard: guard,
        })
    }
}

/// Transaction on one [`MemoryStore`] row.
///
/// Holds the row's transaction lock for its whole lifetime; the staged copy
/// is published on commit and discarded on drop.
pub struct MemoryTx {
    shared: Arc<Shared>,
    row: Arc<Row>,
    staged: StoredInvoice,
    _guard: OwnedMutexGuard<()>,
}

impl InvoiceTx for MemoryTx {
    fn record(&self) -> &StoredInvoice {
        &self.staged
    }

    fn record_mut(&mut self) -> &mut StoredInvoice {
        &mut self.staged
    }

    async fn commit(self) -> Result<()> {
        let hash = self.staged.hash();
        let Some(path) = self.shared.snapshot_path() else {
            *self.row.committed.write().await = self.staged;
            tracing::debug!(hash = %hash.short(), "Transaction committed");
            return Ok(());
        };

        let _persist = self.shared.persist_lock.lock().await;
        let records = {
            let rows = self.shared.rows.read().await;
            collect_records(&rows, Some(&self.staged)).await
        };
        let mut committed = self.row.committed.write().await;
        if let Err(e) = write_snapshot(path, &StoreSnapshot::from_records(&records)).await {
            tracing::warn!(
                hash = %hash.short(),
                error = %e,
                "Snapshot write failed, transaction not committed"
            );
            return Err(e);
        }
        *committed = self.staged;
        tracing::debug!(hash = %hash.short(), "Transaction committed and persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use chrono::Utc;
    use mppledger_types::{CircuitKey, InvoiceCreationData, MilliSat, PartAmounts};

    use super::*;

    fn record(value: u64) -> StoredInvoice {
        let amounts: PartAmounts = BTreeMap::from([
            (CircuitKey::new(10, 11), MilliSat(value * 7 / 10)),
            (CircuitKey::new(11, 12), MilliSat(value - value * 7 / 10)),
        ]);
        StoredInvoice::register(&InvoiceCreationData::dummy(value), &amounts, Utc::now())
    }

    fn fast_timeout() -> StoreConfig {
        StoreConfig {
            lock_timeout_ms: 50,
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn insert_then_fetch() {
        let store = MemoryStore::default();
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();
        assert_eq!(store.fetch(&rec.hash()).await.unwrap(), rec);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryStore::default();
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();
        let err = store.insert(rec.clone()).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateInvoice(h) if h == rec.hash()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_hash_not_found() {
        let store = MemoryStore::default();
        let hash = record(1).hash();
        assert!(matches!(
            store.fetch(&hash).await.unwrap_err(),
            LedgerError::InvoiceNotFound(_)
        ));
        assert!(matches!(
            store.begin(&hash).await.err(),
            Some(LedgerError::InvoiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn commit_publishes_staged_changes() {
        let store = MemoryStore::default();
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();

        let mut tx = store.begin(&rec.hash()).await.unwrap();
        tx.record_mut()
            .parts
            .get_mut(&CircuitKey::new(10, 11))
            .unwrap()
            .settled = true;
        // Not visible until commit.
        assert_eq!(store.fetch(&rec.hash()).await.unwrap(), rec);
        tx.commit().await.unwrap();

        let after = store.fetch(&rec.hash()).await.unwrap();
        assert!(after.parts[&CircuitKey::new(10, 11)].settled);
    }

    #[tokio::test]
    async fn drop_rolls_back() {
        let store = MemoryStore::default();
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();

        {
            let mut tx = store.begin(&rec.hash()).await.unwrap();
            tx.record_mut().invoice.settled = true;
        }
        assert_eq!(store.fetch(&rec.hash()).await.unwrap(), rec);
        // Lock was released on drop.
        let tx = store.begin(&rec.hash()).await.unwrap();
        assert!(!tx.record().invoice.settled);
    }

    #[tokio::test]
    async fn second_tx_times_out_while_first_open() {
        let store = MemoryStore::new(fast_timeout());
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();

        let _held = store.begin(&rec.hash()).await.unwrap();
        let err = store.begin(&rec.hash()).await.err().unwrap();
        assert!(matches!(err, LedgerError::LockTimeout { timeout_ms: 50, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn fetch_does_not_wait_for_open_tx() {
        let store = MemoryStore::new(fast_timeout());
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();

        let _held = store.begin(&rec.hash()).await.unwrap();
        let fetched = tokio::time::timeout(Duration::from_millis(20), store.fetch(&rec.hash()))
            .await
            .expect("fetch must not block behind a transaction")
            .unwrap();
        assert_eq!(fetched, rec);
    }

    #[tokio::test]
    async fn different_invoices_do_not_contend() {
        let store = MemoryStore::new(fast_timeout());
        let a = record(100);
        let b = record(200);
        store.insert(a.clone()).await.unwrap();
        store.insert(b.clone()).await.unwrap();

        let _ta = store.begin(&a.hash()).await.unwrap();
        let tb = store.begin(&b.hash()).await.unwrap();
        assert_eq!(tb.record().hash(), b.hash());
    }

    #[tokio::test]
    async fn snapshot_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let config = StoreConfig {
            snapshot_path: Some(path.clone()),
            ..StoreConfig::default()
        };

        let store = MemoryStore::open(config.clone()).await.unwrap();
        assert!(store.is_empty().await);
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();
        store.persist().await.unwrap();

        let reopened = MemoryStore::open(config).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        assert_eq!(reopened.fetch(&rec.hash()).await.unwrap(), rec);
    }

    fn with_snapshot(path: &Path) -> StoreConfig {
        StoreConfig {
            snapshot_path: Some(path.to_path_buf()),
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn commits_survive_reopen_without_persist() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = with_snapshot(&dir.path().join("ledger.json"));

        let store = MemoryStore::open(config.clone()).await.unwrap();
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();
        let mut tx = store.begin(&rec.hash()).await.unwrap();
        tx.record_mut()
            .parts
            .get_mut(&CircuitKey::new(10, 11))
            .unwrap()
            .settled = true;
        tx.commit().await.unwrap();
        let committed = store.fetch(&rec.hash()).await.unwrap();
        drop(store);

        let reopened = MemoryStore::open(config).await.unwrap();
        assert_eq!(reopened.fetch(&rec.hash()).await.unwrap(), committed);
        assert!(committed.parts[&CircuitKey::new(10, 11)].settled);
    }

    #[tokio::test]
    async fn failed_snapshot_write_publishes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let sub = dir.path().join("data");
        std::fs::create_dir(&sub).unwrap();
        let store = MemoryStore::open(with_snapshot(&sub.join("ledger.json")))
            .await
            .unwrap();
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();

        std::fs::remove_dir_all(&sub).unwrap();

        let mut tx = store.begin(&rec.hash()).await.unwrap();
        tx.record_mut()
            .parts
            .get_mut(&CircuitKey::new(10, 11))
            .unwrap()
            .settled = true;
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, LedgerError::Io(_)));
        assert!(err.is_transient());
        assert_eq!(store.fetch(&rec.hash()).await.unwrap(), rec);

        let other = record(200);
        assert!(store.insert(other.clone()).await.is_err());
        assert_eq!(store.len().await, 1);
        assert!(store.fetch(&other.hash()).await.unwrap_err().is_not_found());

        // The row lock was released by the failed commit.
        let tx = store.begin(&rec.hash()).await.unwrap();
        assert_eq!(tx.record(), &rec);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_persists_leave_a_readable_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let config = with_snapshot(&path);

        let store = Arc::new(MemoryStore::open(config.clone()).await.unwrap());
        for value in 1..=20 {
            store.insert(record(value * 100)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.persist().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(!path.with_extension("tmp").exists());
        let reopened = MemoryStore::open(config).await.unwrap();
        assert_eq!(reopened.len().await, 20);
        assert_eq!(
            serde_json::to_value(reopened.snapshot().await).unwrap(),
            serde_json::to_value(store.snapshot().await).unwrap()
        );
    }

    #[tokio::test]
    async fn load_snapshot_refuses_existing_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let store = MemoryStore::default();
        let rec = record(100);
        store.insert(rec.clone()).await.unwrap();
        store.save_snapshot(&path).await.unwrap();

        let err = store.load_snapshot(&path).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateInvoice(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn persist_without_path_is_config_error() {
        let store = MemoryStore::default();
        let err = store.persist().await.unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(_)));
    }

    #[tokio::test]
    async fn open_rejects_invalid_config() {
        let config = StoreConfig {
            lock_timeout_ms: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(
            MemoryStore::open(config).await.err(),
            Some(LedgerError::Configuration(_))
        ));
    }
}
