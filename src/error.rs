//! Error handling for the mealwatch worker

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
///
/// Transient stream faults (read timeouts, short reads, decoder exits)
/// are deliberately not represented here: the frame source absorbs them
/// internally and reconnects. Only conditions that end the worker or a
/// single downstream call surface as `Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error (missing or unparsable setting)
    #[error("Config error: {0}")]
    Config(String),

    /// Decoder subprocess could not be started repeatedly
    #[error("Decoder unavailable after {attempts} consecutive spawn failures: {last}")]
    DecoderUnavailable { attempts: u32, last: String },

    /// Vision service returned a non-success response
    #[error("Vision error: {0}")]
    Vision(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
