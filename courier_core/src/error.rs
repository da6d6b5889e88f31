/*!
 * Construction-time errors.
 *
 * Only building components (engine, queue, client) and parsing options can
 * fail with a structured error. Once running, transfers report a plain
 * success flag and delivery failures show up in the queue counters.
 */

use thiserror::Error;

/// Result alias used across `courier_core`.
pub type Result<T> = std::result::Result<T, Error>;

/**
 * Everything that can go wrong while setting Courier up.
 */
#[derive(Debug, Error)]
pub enum Error {
    /// The transport worker's async runtime could not be created.
    #[error("failed to build transport runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The HTTP client rejected its configuration.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// A background thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name that failed to start.
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Options were well-formed but semantically unusable.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Options JSON could not be parsed.
    #[error("failed to parse options: {0}")]
    Config(#[from] serde_json::Error),

    /// `init()` was called while a previous `Guard` is still alive.
    #[error("courier is already initialized")]
    AlreadyInitialized,
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOptions(message.into())
    }
}
