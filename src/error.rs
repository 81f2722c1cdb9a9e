use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the responder's internal components.
///
/// Per-transaction failures never reach `main` as this type — the dispatcher
/// turns them into a PTP response code instead. This enum exists for the
/// layers below a transaction: enumeration, transport setup, and anything
/// that should abort the process.
#[derive(Debug, Error)]
pub enum PtpError {
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("no USB gadget controller found under {0}")]
    NoController(PathBuf),

    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid root directory {0}")]
    InvalidRoot(PathBuf),

    #[error("thumbnail cache directory {0} is not writable: {1}")]
    ThumbnailCacheUnavailable(PathBuf, io::Error),

    #[error("transport closed unexpectedly")]
    TransportClosed,
}

pub type Result<T> = std::result::Result<T, PtpError>;
