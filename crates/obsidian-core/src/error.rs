//! Engine error kinds.
//!
//! Every fallible engine operation returns `EngineError` so callers can
//! classify a failure (retry it, abort the operation, map it to a process
//! exit code) without string matching.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("malformed manifest: {context}")]
    BadManifest {
        context: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("network error fetching {url}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("read timed out fetching {url}")]
    Timeout { url: String },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("i/o error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid maven coordinate: {0:?}")]
    BadCoordinate(String),

    #[error("invalid rule: {0}")]
    BadRule(String),

    #[error("invalid argument: {0}")]
    BadArgument(String),

    #[error("version {0} not present in the manifest index")]
    UnknownVersion(String),

    #[error("version {0} is not installed")]
    NotInstalled(String),

    #[error("no usable java runtime found")]
    NoRuntime,

    #[error("failed to spawn game process")]
    SpawnFailed(#[source] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Short machine-readable kind name, carried on error events.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::BadManifest { .. } => "bad_manifest",
            EngineError::Network { .. } => "network",
            EngineError::HttpStatus { .. } => "http_status",
            EngineError::Timeout { .. } => "network",
            EngineError::ChecksumMismatch { .. } => "checksum_mismatch",
            EngineError::Io { .. } => "io",
            EngineError::BadCoordinate(_) => "bad_coordinate",
            EngineError::BadRule(_) => "bad_rule",
            EngineError::BadArgument(_) => "bad_argument",
            EngineError::UnknownVersion(_) => "unknown_version",
            EngineError::NotInstalled(_) => "not_installed",
            EngineError::NoRuntime => "no_runtime",
            EngineError::SpawnFailed(_) => "spawn_failed",
            EngineError::Cancelled => "cancelled",
        }
    }

    /// Whether a fetch attempt that failed with this error may be retried.
    ///
    /// Checksum mismatches are retryable too, but the fetch engine caps them
    /// at a single retry; this method only answers the classification
    /// question.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Network { .. } | EngineError::Timeout { .. } => true,
            EngineError::HttpStatus { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            EngineError::ChecksumMismatch { .. } => true,
            _ => false,
        }
    }

    /// Process exit code when the engine is driven from a CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::BadArgument(_)
            | EngineError::BadCoordinate(_)
            | EngineError::BadRule(_)
            | EngineError::BadManifest { .. }
            | EngineError::UnknownVersion(_)
            | EngineError::NotInstalled(_) => 2,
            EngineError::Network { .. }
            | EngineError::HttpStatus { .. }
            | EngineError::Timeout { .. } => 3,
            EngineError::ChecksumMismatch { .. } | EngineError::Io { .. } => 4,
            EngineError::NoRuntime => 5,
            EngineError::SpawnFailed(_) => 6,
            EngineError::Cancelled => 7,
        }
    }

    /// Disk exhaustion fails the whole operation, not just one task.
    pub fn is_disk_full(&self) -> bool {
        match self {
            EngineError::Io { source, .. } => {
                #[cfg(unix)]
                {
                    // ENOSPC
                    source.raw_os_error() == Some(28)
                }
                #[cfg(windows)]
                {
                    // ERROR_HANDLE_DISK_FULL / ERROR_DISK_FULL
                    matches!(source.raw_os_error(), Some(39) | Some(112))
                }
                #[cfg(not(any(unix, windows)))]
                {
                    let _ = source;
                    false
                }
            }
            _ => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(EngineError::HttpStatus {
            status: 503,
            url: "http://x".into()
        }
        .is_transient());
        assert!(EngineError::HttpStatus {
            status: 429,
            url: "http://x".into()
        }
        .is_transient());
        assert!(!EngineError::HttpStatus {
            status: 404,
            url: "http://x".into()
        }
        .is_transient());
        assert!(!EngineError::BadCoordinate("a:b".into()).is_transient());
        assert!(EngineError::ChecksumMismatch {
            path: PathBuf::from("f"),
            expected: "aa".into(),
            actual: "bb".into()
        }
        .is_transient());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(EngineError::Cancelled.exit_code(), 7);
        assert_eq!(EngineError::NoRuntime.exit_code(), 5);
        assert_eq!(
            EngineError::HttpStatus {
                status: 500,
                url: String::new()
            }
            .exit_code(),
            3
        );
    }
}
