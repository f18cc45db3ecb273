use crate::version::VersionError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Why a candidate (or stored) file is not an acceptable artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidArtifactReason {
    #[error("not an OSGi bundle (missing identity/version)")]
    MissingIdentity,

    #[error("unparseable version {value:?}: {source}")]
    UnparseableVersion { value: String, source: VersionError },

    #[error("invalid symbolic name {name:?}")]
    InvalidSymbolicName { name: String },

    #[error("{name:?} contains characters that cannot appear in an XML document")]
    NotXmlSafe { name: String },

    #[error("unsupported artifact format")]
    UnsupportedFormat,

    #[error("not a regular file")]
    NotAFile,

    #[error("unreadable: {message}")]
    Unreadable { message: String },
}

/// A single file rejected by an artifact reader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("file '{}' is invalid: {reason}", .file.display())]
pub struct InvalidArtifact {
    pub file: PathBuf,
    pub reason: InvalidArtifactReason,
}

impl InvalidArtifact {
    pub fn new(file: impl Into<PathBuf>, reason: InvalidArtifactReason) -> Self {
        Self {
            file: file.into(),
            reason,
        }
    }
}

/// Every invalid file of one `install` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchValidationFailed {
    pub failures: Vec<InvalidArtifact>,
}

impl fmt::Display for BatchValidationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} file(s) failed validation", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchValidationFailed {}

/// Errors produced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("failed to open repository {}: {source}", .directory.display())]
    Open {
        directory: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    BatchValidationFailed(#[from] BatchValidationFailed),

    #[error("failed to {operation} {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stored artifact rejected during index rebuild: {0}")]
    StoredArtifactInvalid(InvalidArtifact),
}

impl RepositoryError {
    /// The per-file failures, if this is a batch validation error.
    pub fn invalid_artifacts(&self) -> &[InvalidArtifact] {
        match self {
            RepositoryError::BatchValidationFailed(batch) => &batch.failures,
            _ => &[],
        }
    }
}

/// `map_err` adapter attaching the failed operation and path to an I/O error.
pub(crate) fn io_error(
    operation: &'static str,
    path: &Path,
) -> impl FnOnce(io::Error) -> RepositoryError {
    let path = path.to_path_buf();
    move |source| RepositoryError::Io {
        operation,
        path,
        source,
    }
}
