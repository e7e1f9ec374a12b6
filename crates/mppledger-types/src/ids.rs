//! Identifiers used throughout mppledger.
//!
//! Invoice identity is the SHA-256 hash of a 32-byte preimage. Parts are
//! identified by the channel-level circuit that carried them.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::HASH_LEN;

// ---------------------------------------------------------------------------
// Preimage
// ---------------------------------------------------------------------------

/// The secret that unlocks an invoice. Its SHA-256 is the [`PaymentHash`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Preimage(pub [u8; HASH_LEN]);

impl Preimage {
    /// The payment hash committing to this preimage.
    #[must_use]
    pub fn hash(&self) -> PaymentHash {
        PaymentHash::from(self)
    }
}

// Keep the secret out of logs.
impl fmt::Debug for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Preimage(..)")
    }
}

impl fmt::Display for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// PaymentHash
// ---------------------------------------------------------------------------

/// Primary key of an invoice: `SHA-256(preimage)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PaymentHash(pub [u8; HASH_LEN]);

impl PaymentHash {
    /// First four bytes in hex, for compact log fields.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Whether `preimage` hashes to this value.
    #[must_use]
    pub fn matches(&self, preimage: &Preimage) -> bool {
        *self == preimage.hash()
    }
}

impl From<&Preimage> for PaymentHash {
    fn from(preimage: &Preimage) -> Self {
        let digest = Sha256::digest(preimage.0);
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        Self(out)
    }
}

impl fmt::Debug for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentHash({})", hex::encode(self.0))
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// PaymentAddr
// ---------------------------------------------------------------------------

/// Random per-invoice value payers echo back. Opaque to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentAddr(pub [u8; HASH_LEN]);

impl fmt::Display for PaymentAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// CircuitKey
// ---------------------------------------------------------------------------

/// Identifies one channel-level contribution: the channel it arrived on and
/// its per-channel HTLC sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CircuitKey {
    pub chan_id: u64,
    pub htlc_id: u64,
}

impl CircuitKey {
    #[must_use]
    pub fn new(chan_id: u64, htlc_id: u64) -> Self {
        Self { chan_id, htlc_id }
    }
}

impl fmt::Display for CircuitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chan_id, self.htlc_id)
    }
}

/// Random identifiers for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Preimage {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl PaymentAddr {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
