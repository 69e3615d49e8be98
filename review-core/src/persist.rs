//! On-disk persistence for the reviewer identity.
//!
//! A fresh snapshot lets a frontend render the signed-in reviewer
//! immediately on startup while the real session check runs against the
//! backend. Snapshots are versioned JSON; a version mismatch or an expired
//! stamp should be treated the same as no snapshot at all.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use review_client::Identity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current snapshot format version. Bump on breaking changes to
/// [`IdentitySnapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot version mismatch: file has v{found}, expected v{expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Snapshot is {age_secs}s old, past the {ttl_secs}s limit")]
    Expired { age_secs: u64, ttl_secs: u64 },
}

/// A signed-in identity as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub version: u32,
    /// Unix seconds at write time.
    pub saved_at: u64,
    pub identity: Identity,
}

impl IdentitySnapshot {
    pub fn new(identity: Identity) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: unix_now(),
            identity,
        }
    }

    /// Seconds since the snapshot was written. Clock rollback clamps to
    /// zero rather than wrapping.
    pub fn age_secs(&self) -> u64 {
        unix_now().saturating_sub(self.saved_at)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let json = tokio::fs::read_to_string(path).await?;
        let snapshot: Self = serde_json::from_str(&json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Load, rejecting snapshots older than `ttl`.
    pub async fn load_if_fresh(
        path: impl AsRef<Path>,
        ttl: Duration,
    ) -> Result<Self, SnapshotError> {
        let snapshot = Self::load(path).await?;
        let age_secs = snapshot.age_secs();
        if age_secs > ttl.as_secs() {
            return Err(SnapshotError::Expired {
                age_secs,
                ttl_secs: ttl.as_secs(),
            });
        }
        Ok(snapshot)
    }
}

/// Read only the stamp, without deserializing the identity payload.
pub async fn peek_saved_at(path: impl AsRef<Path>) -> Result<u64, SnapshotError> {
    #[derive(Deserialize)]
    struct Stamp {
        saved_at: u64,
    }

    let json = tokio::fs::read_to_string(path).await?;
    let stamp: Stamp = serde_json::from_str(&json)?;
    Ok(stamp.saved_at)
}

/// Delete the snapshot. A file that is already gone is not an error.
pub async fn discard_snapshot(path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
