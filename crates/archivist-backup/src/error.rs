//! Error types for the backup engine.
//!
//! Every public engine operation returns `Result<T, BackupError>`; callers
//! discriminate with [`BackupError::kind`].

use thiserror::Error;

/// Result type alias using the engine's error type
pub type Result<T> = std::result::Result<T, BackupError>;

/// Coarse failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Named artifact is absent
    NotFound,
    /// Malformed or incomplete envelope, bad filename, unsafe archive entry
    Validation,
    /// Filesystem, compression or decompression failure
    Io,
    /// The snapshot source failed
    Source,
    /// The caller-supplied applier failed
    Apply,
}

/// Backup engine errors
#[derive(Error, Debug)]
pub enum BackupError {
    /// Artifact not present at its location
    #[error("Backup not found: {filename}")]
    NotFound { filename: String },

    /// Envelope or artifact failed admissibility checks
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// IO, compression or decompression failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot production failed
    #[error("Snapshot source failed: {message}")]
    Source { message: String },

    /// Applying restored data failed
    #[error("Restore apply failed: {message}")]
    Apply { message: String },

    /// JSON serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl BackupError {
    /// Create a not found error
    pub fn not_found(filename: impl Into<String>) -> Self {
        Self::NotFound {
            filename: filename.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a source error
    pub fn source_failed(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Create an apply error
    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply {
            message: message.into(),
        }
    }

    /// Returns a mapper that wraps an `io::Error` with context.
    ///
    /// ```ignore
    /// fs::read(&path).map_err(BackupError::io("Failed to read artifact"))?;
    /// ```
    pub fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }

    /// Failure category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Io { .. } | Self::Task(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Io,
            Self::Source { .. } => ErrorKind::Source,
            Self::Apply { .. } => ErrorKind::Apply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(BackupError::not_found("a.json").kind(), ErrorKind::NotFound);
        assert_eq!(BackupError::validation("bad").kind(), ErrorKind::Validation);
        assert_eq!(BackupError::source_failed("down").kind(), ErrorKind::Source);
        assert_eq!(BackupError::apply("rejected").kind(), ErrorKind::Apply);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = BackupError::io("Failed to write artifact")(io);
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "Failed to write artifact: disk full");
    }

    #[test]
    fn test_not_found_message() {
        let err = BackupError::not_found("backup-x.json");
        assert_eq!(err.to_string(), "Backup not found: backup-x.json");
    }
}
