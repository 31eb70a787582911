//! Error types for reshard.

use thiserror::Error;

/// Result type alias using reshard's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for reshard operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal, reported before any work begins)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unparseable version string
    #[error("Unable to parse version: {0}")]
    VersionParse(String),

    /// Snapshot repository read or decode failed
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Metadata transformation failed
    #[error("Transform error: {0}")]
    Transform(String),

    /// Work coordination store operation failed
    #[error("Coordination error: {0}")]
    Coordination(String),

    /// Target cluster rejected a request
    #[error("Target failure (status {status}): {body}")]
    Target { status: u16, body: String },

    /// Shard exceeds the configured maximum size; checked before unpack I/O
    #[error(
        "The shard size of {shard_size_bytes} bytes exceeds the maximum shard size of {max_size_bytes} bytes"
    )]
    ShardTooLarge {
        shard_size_bytes: u64,
        max_size_bytes: u64,
    },

    /// Shard segment files could not be unpacked from the repository
    #[error("Could not unpack shard: {0}")]
    CouldNotUnpackShard(String),

    /// Segment file failed a structural or checksum validation
    #[error("Corrupt segment: {0}")]
    CorruptSegment(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
