use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Repository name written into the index when none is configured.
pub const DEFAULT_REPOSITORY_NAME: &str = "Rivershark";

/// What an index rebuild does with a file in storage that no longer validates
/// as an artifact (truncated, replaced by hand, ...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredArtifactPolicy {
    /// Leave the file out of the index and log a warning.
    #[default]
    Exclude,
    /// Fail the rebuild; the previous index stays in place.
    Reject,
}

/// Configuration for a single repository directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryConfig {
    directory: PathBuf,
    name: String,
    stored_artifacts: StoredArtifactPolicy,
}

impl RepositoryConfig {
    /// Start building a configuration for the repository rooted at `directory`.
    ///
    /// Relative directories are resolved against the current working directory.
    pub fn builder(directory: impl AsRef<Path>) -> RepositoryConfigBuilder {
        RepositoryConfigBuilder {
            directory: absolute(directory.as_ref()),
            name: DEFAULT_REPOSITORY_NAME.to_owned(),
            stored_artifacts: StoredArtifactPolicy::default(),
        }
    }

    /// The base repository directory (always absolute).
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The repository name placed into the index file.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stored_artifacts(&self) -> StoredArtifactPolicy {
        self.stored_artifacts
    }
}

#[derive(Clone, Debug)]
pub struct RepositoryConfigBuilder {
    directory: PathBuf,
    name: String,
    stored_artifacts: StoredArtifactPolicy,
}

impl RepositoryConfigBuilder {
    pub fn directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.directory = absolute(directory.as_ref());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stored_artifacts(mut self, policy: StoredArtifactPolicy) -> Self {
        self.stored_artifacts = policy;
        self
    }

    pub fn build(self) -> RepositoryConfig {
        RepositoryConfig {
            directory: self.directory,
            name: self.name,
            stored_artifacts: self.stored_artifacts,
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    // `std::path::absolute` only fails for empty paths or when the working
    // directory is gone; fall back to the path as given.
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
