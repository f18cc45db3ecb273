//! Configuration for Rivershark repositories and tools.
//!
//! [`RepositoryConfig`] is what the repository engine consumes. Front ends may
//! additionally load a [`RiversharkConfig`] TOML file that supplies defaults
//! for the repository and for logging:
//!
//! ```toml
//! [repository]
//! directory = "obr"
//! name = "Example"
//! stored_artifacts = "reject"
//!
//! [logging]
//! level = "debug"
//! json = false
//! ```

mod logging;
mod repository;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};
pub use repository::{
    RepositoryConfig, RepositoryConfigBuilder, StoredArtifactPolicy, DEFAULT_REPOSITORY_NAME,
};

/// Environment variable naming a default config file for front ends.
pub const CONFIG_PATH_ENV: &str = "RIVERSHARK_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySection {
    /// Repository directory. Relative paths are resolved against the directory
    /// containing the config file.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stored_artifacts: Option<StoredArtifactPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiversharkConfig {
    #[serde(default)]
    pub repository: RepositorySection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("no repository directory configured")]
    MissingRepositoryDirectory,
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` for `toml::de::Error` includes a snippet of the source text;
        // keep only the message.
        ConfigError::Toml(err.message().trim().to_owned())
    }
}

impl RiversharkConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::load_from_str(&text)?;

        if let (Some(directory), Some(parent)) = (&config.repository.directory, path.parent()) {
            if directory.is_relative() {
                config.repository.directory = Some(parent.join(directory));
            }
        }

        tracing::debug!(
            target: "rivershark.config",
            path = %path.display(),
            "loaded config file"
        );
        Ok(config)
    }

    /// Load a config from a TOML string. Relative paths are left as written.
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load the file named by `RIVERSHARK_CONFIG`, or the defaults when unset.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::load_from_path(PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }

    /// Build a [`RepositoryConfig`], letting explicit arguments override the file.
    pub fn repository_config(
        &self,
        directory: Option<&Path>,
        name: Option<&str>,
    ) -> Result<RepositoryConfig, ConfigError> {
        let directory = directory
            .or(self.repository.directory.as_deref())
            .ok_or(ConfigError::MissingRepositoryDirectory)?;

        let mut builder = RepositoryConfig::builder(directory);
        if let Some(name) = name.or(self.repository.name.as_deref()) {
            builder = builder.name(name);
        }
        if let Some(policy) = self.repository.stored_artifacts {
            builder = builder.stored_artifacts(policy);
        }
        Ok(builder.build())
    }
}
