//! Metadata provider errors.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while fetching, decoding, parsing or serving metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Connect, timeout or body read failure.
    #[error("error retrieving metadata from {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The source answered with something other than 200 or 304.
    #[error("non-ok status code {status} returned from remote metadata source {url}")]
    HttpStatus { url: String, status: u16 },

    /// The body declared a known Content-Encoding but could not be decompressed.
    #[error("unable to decompress {encoding} metadata response: {source}")]
    Decompression {
        encoding: String,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be parsed, or a filter/validator rejected it.
    #[error("invalid metadata: {0}")]
    Invalid(String),

    /// Bad source URI, refresh policy or lifecycle misuse.
    #[error("invalid metadata provider configuration: {0}")]
    Configuration(String),

    /// No live document: never fetched, or expired while valid metadata is required.
    #[error("metadata is not available")]
    Unavailable,

    /// The provider has been torn down.
    #[error("metadata provider has been stopped")]
    Stopped,
}

/// Coarse classification of a [`MetadataError`], recorded in provider status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    HttpStatus,
    Decompression,
    Invalid,
    Configuration,
    Unavailable,
    Stopped,
}

impl MetadataError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetadataError::Transport { .. } => ErrorKind::Transport,
            MetadataError::HttpStatus { .. } => ErrorKind::HttpStatus,
            MetadataError::Decompression { .. } => ErrorKind::Decompression,
            MetadataError::Invalid(_) => ErrorKind::Invalid,
            MetadataError::Configuration(_) => ErrorKind::Configuration,
            MetadataError::Unavailable => ErrorKind::Unavailable,
            MetadataError::Stopped => ErrorKind::Stopped,
        }
    }

    /// Whether a background refresh recovers from this error by backing off.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport
                | ErrorKind::HttpStatus
                | ErrorKind::Decompression
                | ErrorKind::Invalid
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::HttpStatus => write!(f, "http_status"),
            ErrorKind::Decompression => write!(f, "decompression"),
            ErrorKind::Invalid => write!(f, "invalid"),
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Unavailable => write!(f, "unavailable"),
            ErrorKind::Stopped => write!(f, "stopped"),
        }
    }
}
