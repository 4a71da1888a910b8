//! Application-wide error types.
//!
//! This module provides the run-fatal error hierarchy. Per-attempt failures
//! inside the download pipeline use [`crate::model::FailureKind`] instead and
//! never surface here; they are absorbed by the fallback coordinator.
//!
//! # Design
//!
//! - [`Error`]: errors that abort the whole run (metadata stage, configuration)
//! - Module-specific errors (e.g., [`crate::config::ConfigError`]) for detailed handling
//! - CLI/main uses `anyhow` for convenient error propagation
//!
//! # Example
//!
//! ```ignore
//! use spotiflac::error::{Error, Result};
//!
//! fn resolve(input: &str) -> Result<SpotifyRef> {
//!     let reference = parse_reference(input)?; // InvalidReference
//!     Ok(reference)
//! }
//! ```

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The Spotify reference could not be parsed or does not exist
    #[error("Invalid Spotify reference: {0}")]
    InvalidReference(String),

    /// The metadata source could not be reached or answered garbage
    #[error("Metadata unavailable: {0}")]
    ResolutionUnavailable(String),

    /// Invalid flag combination or config value
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an invalid reference error.
    pub fn invalid_reference(message: impl Into<String>) -> Self {
        Self::InvalidReference(message.into())
    }

    /// Create a resolution unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ResolutionUnavailable(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}
