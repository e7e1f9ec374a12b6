//! Configuration types for invoice stores.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result, constants};

/// Configuration for an invoice store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on waiting for an invoice's transaction lock.
    pub lock_timeout_ms: u64,
    /// Where the in-memory store reads and writes its JSON snapshot.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: constants::DEFAULT_LOCK_TIMEOUT_MS,
            snapshot_path: None,
        }
    }
}

impl StoreConfig {
    /// Parse and validate a JSON config document. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    /// Returns [`LedgerError::Configuration`] if the document is malformed or
    /// the lock timeout is zero.
    pub fn from_json(doc: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(doc).map_err(|e| LedgerError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns [`LedgerError::Configuration`] if the lock timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(LedgerError::Configuration(
                "lock_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
