//! Error types for the mail dispatcher.
//!
//! Each pipeline stage has its own error enum; `DispatchError` is what a
//! single queue record (or a whole batch, for initialization) fails with.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Retrieval of attachment bytes from a remote origin failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP origin answered with a non-2xx status
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Connection, timeout or body read failure
    #[error("failed to fetch {target}: {message}")]
    Transport { target: String, message: String },

    /// Object store rejected or failed the read
    #[error("failed to get object {key} from bucket {bucket}: {message}")]
    ObjectStore {
        bucket: String,
        key: String,
        message: String,
    },
}

/// An attachment reference could not be turned into a file on disk.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Reference is structurally unusable (e.g. object-store path without a key)
    #[error("invalid attachment reference '{path}': {reason}")]
    InvalidReference { path: String, reason: String },

    /// Unknown attachment type tag
    #[error("unsupported attachment type: {0}")]
    UnsupportedType(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("attachment io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResolutionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Building the raw MIME message failed.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// Attachment at `index` could not be resolved; nothing is sent
    #[error("failed to load attachment #{index}: {source}")]
    Attachment {
        index: usize,
        #[source]
        source: ResolutionError,
    },

    #[error("invalid {field} address: {address}")]
    InvalidAddress { field: &'static str, address: String },

    #[error("email has no 'to' recipients")]
    MissingRecipients,

    #[error("failed to build MIME message: {0}")]
    Build(#[from] lettre::error::Error),
}

/// Validation or submission of a raw message failed.
#[derive(Debug, Error)]
pub enum SendError {
    /// Rejected locally, the provider was never called
    #[error("raw email validation failed: {0}")]
    Validation(String),

    #[error("{provider} rejected raw email: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },
}

/// Errors surfaced by the batch processor and queue handler.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Record body is not a valid email request
    #[error("failed to decode message body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Send(#[from] SendError),

    /// Invocation deadline passed before the record finished
    #[error("invocation deadline exceeded")]
    DeadlineExceeded,

    /// Clients could not be initialized; the whole batch must be redelivered
    #[error("dispatcher initialization failed: {0}")]
    Initialization(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DispatchError {
    /// Pipeline stage the error belongs to, used as a log field.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Assembly(_) => "assemble",
            Self::Send(_) => "send",
            Self::DeadlineExceeded => "deadline",
            Self::Initialization(_) | Self::Config(_) => "initialize",
        }
    }

    /// Whether the error fails the whole batch rather than a single record.
    pub fn is_batch_level(&self) -> bool {
        matches!(self, Self::Initialization(_) | Self::Config(_))
    }
}
