//! Error taxonomy for export jobs

use std::path::PathBuf;

/// Error from exporting a slice, a whole index, or combining slice artifacts.
///
/// [`is_retryable`](ExportError::is_retryable) decides whether a failed page
/// request is worth another attempt.
#[derive(Debug)]
pub enum ExportError {
    /// Transport failure without an HTTP status: refused, reset, timed out
    Connection(String),
    /// HTTP status not covered by a more specific variant
    Http { status: u16, message: String },
    /// Credentials rejected (401/403)
    Authentication(String),
    /// Target index does not exist
    IndexNotFound(String),
    /// Remote service rejected the requested slice count
    SliceLimit(String),
    /// Response body could not be parsed
    Decode(String),
    /// Local I/O error while writing artifacts
    Io(std::io::Error),
    /// A per-slice artifact failed integrity checks during combine
    CombineIntegrity { path: PathBuf, reason: String },
    /// Job-level cancellation observed
    Cancelled,
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "connection error: {msg}"),
            Self::Http { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::Authentication(msg) => write!(f, "authentication rejected: {msg}"),
            Self::IndexNotFound(index) => write!(f, "index not found: {index}"),
            Self::SliceLimit(msg) => write!(f, "slice count rejected: {msg}"),
            Self::Decode(msg) => write!(f, "invalid response: {msg}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::CombineIntegrity { path, reason } => {
                write!(f, "combine integrity ({}): {reason}", path.display())
            }
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl ExportError {
    /// Transient conditions: connection trouble, 408/429, 5xx, most local I/O.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
            Self::Authentication(_)
            | Self::IndexNotFound(_)
            | Self::SliceLimit(_)
            | Self::Decode(_)
            | Self::CombineIntegrity { .. }
            | Self::Cancelled => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
