use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures reading or rewriting the host's persisted conversation records.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed record {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {} is not a tool call", .0.display())]
    NotToolRecord(PathBuf),

    #[error("record {} was already truncated", .0.display())]
    AlreadyTruncated(PathBuf),

    #[error("record {} has no output", .0.display())]
    NoOutput(PathBuf),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures inside one recovery run. These never leave the plugin: the
/// orchestrator logs them and treats the step as unsuccessful.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("host call `{operation}` failed: {source}")]
    Host {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("no provider/model known for session {0}")]
    UnknownModel(String),
}

impl RecoveryError {
    pub fn host(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Host { operation, source }
    }
}
