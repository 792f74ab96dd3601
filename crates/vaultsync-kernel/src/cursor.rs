//! Persisted sync cursor.
//!
//! Records the last vault version the server confirmed so the next write can
//! name it as `expected_version`. The cursor is advisory: a missing or
//! unreadable file means "assume version 0" and the conflict retry recovers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File name of the cursor inside the data directory.
pub const SYNC_STATE_FILE: &str = "sync_state.json";

/// Last server-confirmed state for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncCursor {
    pub user_id: String,
    pub vault_version: i64,
    pub updated_at: String,
}

/// Reads and writes `sync_state.json`.
#[derive(Debug, Clone)]
pub struct SyncCursorStore {
    path: PathBuf,
}

impl SyncCursorStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SYNC_STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<SyncCursor> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read sync cursor");
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(cursor) => Some(cursor),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt sync cursor");
                None
            }
        }
    }

    /// The version to expect on the server for `user_id`; `0` when unknown.
    pub fn expected_version(&self, user_id: &str) -> i64 {
        self.load()
            .filter(|c| c.user_id == user_id)
            .map_or(0, |c| c.vault_version)
    }

    pub fn save(&self, cursor: &SyncCursor) -> Result<()> {
        let data = serde_json::to_vec_pretty(cursor)
            .map_err(|e| crate::error::KernelError::Internal(e.to_string()))?;
        vaultsync_vault::atomic_write(&self.path, &data)?;
        tracing::debug!(vault_version = cursor.vault_version, "saved sync cursor");
        Ok(())
    }
}
