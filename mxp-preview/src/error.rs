//! Error types for mxp-preview
//!
//! Network and decode failures propagate to the caller untouched; nothing in
//! this crate retries. Stopping an already-stopped source is not an error and
//! never reaches this enum (see `graph::source::StopOutcome`).

use thiserror::Error;

/// Main error type for mxp-preview
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure talking to the render backend
    #[error("Network error: {0}")]
    Network(String),

    /// Render backend answered with a non-2xx status
    #[error("Render endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Audio decoder rejected the rendered bytes
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request was superseded by a newer preview or stopped before it finished
    #[error("Preview cancelled: {0}")]
    Cancelled(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] mxp_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures reaching or answered by the render backend
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::HttpStatus { .. })
    }
}

/// Convenience Result type using mxp-preview Error
pub type Result<T> = std::result::Result<T, Error>;
