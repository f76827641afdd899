//! Error types for the shared netcode crate

use thiserror::Error;

/// Failures that can surface from the codec and configuration layers.
///
/// Simulation itself has no runtime error path; anything going wrong inside a
/// step is an invariant violation, not something callers recover from.
#[derive(Debug, Error)]
pub enum NetcodeError {
    /// Packet could not be serialized
    #[error("Failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),

    /// Datagram did not contain a valid packet
    #[error("Failed to decode packet: {0}")]
    Decode(#[source] bincode::Error),

    /// Configuration file could not be read
    #[error("Failed to read config {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file was not valid JSON for `GameConfig`
    #[error("Invalid config {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for shared netcode operations
pub type Result<T> = std::result::Result<T, NetcodeError>;
