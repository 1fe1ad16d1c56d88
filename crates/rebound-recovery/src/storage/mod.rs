//! Read/write access to the host's on-disk conversation store.
//!
//! Layout under the storage root:
//!
//! ```text
//! message/[<shard>/]<sessionID>/<messageID>.json
//! part/<messageID>/<partID>.json
//! ```

mod atomic_write;
mod records;
mod tool_output;

pub use atomic_write::atomic_write;
pub use records::{MessageTime, PartRecord, StoredMessage, StoredToolPart, StoredToolState};
pub use tool_output::{ToolOutputRecord, ToolOutputStore, TruncatedTool, TRUNCATION_NOTICE};

use crate::error::{StoreError, StoreResult};
use rebound_config::StorageSettings;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(settings.resolved_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn message_storage(&self) -> PathBuf {
        self.root.join("message")
    }

    pub fn part_storage(&self) -> PathBuf {
        self.root.join("part")
    }

    pub fn part_dir(&self, message_id: &str) -> PathBuf {
        self.part_storage().join(message_id)
    }

    /// A session's message directory, either directly under `message/` or
    /// one shard level down.
    pub fn message_dir(&self, session_id: &str) -> Option<PathBuf> {
        let message_storage = self.message_storage();
        let direct = message_storage.join(session_id);
        if direct.is_dir() {
            return Some(direct);
        }

        fs::read_dir(&message_storage)
            .ok()?
            .flatten()
            .map(|entry| entry.path().join(session_id))
            .find(|candidate| candidate.is_dir())
    }

    pub fn message_ids(&self, session_id: &str) -> Vec<String> {
        let Some(dir) = self.message_dir(session_id) else {
            return Vec::new();
        };
        json_files(&dir)
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect()
    }

    /// Messages ordered by `(time.created, id)`. Unreadable files are skipped.
    pub fn read_messages(&self, session_id: &str) -> Vec<StoredMessage> {
        let Some(dir) = self.message_dir(session_id) else {
            return Vec::new();
        };

        let mut messages: Vec<StoredMessage> = json_files(&dir)
            .iter()
            .filter_map(|path| match read_record(path) {
                Ok(message) => Some(message),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable message");
                    None
                }
            })
            .collect();

        messages.sort_by(|a, b| {
            a.created()
                .cmp(&b.created())
                .then_with(|| a.id.cmp(&b.id))
        });
        messages
    }

    /// Parts of one message in id order.
    pub fn read_parts(&self, message_id: &str) -> Vec<PartRecord> {
        json_files(&self.part_dir(message_id))
            .into_iter()
            .filter_map(|path| {
                let value = read_record(&path).ok()?;
                Some(PartRecord { path, value })
            })
            .collect()
    }
}

/// `*.json` files in `dir`, sorted by name. Temp files from in-flight
/// rewrites start with a dot and are skipped.
fn json_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().and_then(|e| e.to_str()) == Some("json")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
        })
        .collect();
    files.sort();
    files
}

pub fn read_record<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_record<T: Serialize>(path: &Path, record: &T) -> StoreResult<()> {
    let content = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &content).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}
