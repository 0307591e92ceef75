//! Error types.
//!
//! Library modules return specific error types built with `thiserror`.
//! The binary uses `anyhow` for convenient propagation.
//!
//! # Design
//!
//! - [`ProbeError`]: terminal failures while opening a container or locating
//!   its audio stream. No partial tag is considered loaded after one of these.
//! - [`Error`]: top-level error aggregating probe, I/O and config failures.
//! - Non-fatal normalization issues are not errors at all; they are collected
//!   as [`NormalizeWarning`](crate::metadata::NormalizeWarning)s.

use std::path::PathBuf;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the container prober and the codec probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The byte source itself could not be opened.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No demuxer recognised the leading bytes.
    #[error("Unrecognized container format: {0}")]
    Unrecognized(String),

    /// A demuxer was selected but rejected the stream, or its state could not
    /// be set up.
    #[error("Failed to open container: {0}")]
    OpenFailed(String),

    /// The container holds no stream of audio type.
    #[error("No audio stream found")]
    NoAudioStream,
}

impl ProbeError {
    /// Create an open failure.
    pub fn open_failed(message: impl Into<String>) -> Self {
        Self::OpenFailed(message.into())
    }
}

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Container or stream probing failed
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// The underlying probe failure, if any, looking through context layers.
    pub fn as_probe(&self) -> Option<&ProbeError> {
        match self {
            Self::Probe(e) => Some(e),
            Self::WithContext { source, .. } => source.as_probe(),
            _ => None,
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

impl<T> ResultExt<T> for std::result::Result<T, ProbeError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Probe(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("/path/to/book.m4b");
        assert!(err.to_string().contains("/path/to/book.m4b"));
    }

    #[test]
    fn test_probe_error_is_transparent() {
        let err = Error::from(ProbeError::NoAudioStream);
        assert_eq!(err.to_string(), "No audio stream found");
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::from(ProbeError::open_failed("truncated header")).context("while reading tags");
        let msg = err.to_string();
        assert!(msg.contains("while reading tags"));
        assert!(msg.contains("truncated header"));
    }

    #[test]
    fn test_as_probe_looks_through_context() {
        let err = Error::from(ProbeError::Unrecognized("notes.txt".into()))
            .context("first")
            .context("second");
        assert!(matches!(err.as_probe(), Some(ProbeError::Unrecognized(_))));
        assert!(Error::not_found("x").as_probe().is_none());
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), ProbeError> = Err(ProbeError::NoAudioStream);
        let with_ctx = result.with_context("additional context");
        assert!(with_ctx.unwrap_err().to_string().contains("additional context"));
    }
}
