// ABOUTME: Error types for the session store, streaming incorporator, transport, and persistence.
// ABOUTME: Domain layers return these; the app layer wraps them in anyhow with context.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Undo was requested but no user/assistant pair follows the system turn.
    #[error("no exchange to undo")]
    InsufficientHistory,

    /// A fragment was applied but no assistant turn is marked as the streaming target.
    #[error("no assistant turn is currently streaming")]
    NoActiveTurn,

    /// A loaded history contained a system turn, which is always context-derived.
    #[error("turn {index} has role system; persisted history must not carry the system turn")]
    SystemTurnInHistory { index: usize },
}

/// Errors raised by the streaming incorporator state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("a response is already streaming")]
    AlreadyStreaming,

    #[error("no response is streaming")]
    NotStreaming,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors surfaced by a completion transport before or while streaming.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed with status code {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("transport not configured: {0}")]
    NotConfigured(String),
}

/// Errors raised while reading or writing conversation and page files.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid conversation file {}: {source}", .path.display())]
    InvalidHistory {
        path: PathBuf,
        #[source]
        source: SessionError,
    },

    #[error("failed to encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised while loading, validating, or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("response limit must be a positive integer")]
    InvalidResponseLimit,

    #[error("unknown setting '{0}'")]
    UnknownSetting(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("failed to access config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
