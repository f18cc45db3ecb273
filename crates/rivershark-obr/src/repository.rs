use std::io;
use std::path::{Path, PathBuf};

use rivershark_config::RepositoryConfig;
use url::Url;

use crate::error::{io_error, BatchValidationFailed, RepositoryError, Result};
use crate::index::{build_index, write_index, IndexDocument, IndexSource};
use crate::install::install_one;
use crate::lock::{LockFile, RepositoryLock};
use crate::model::ArtifactIdentity;
use crate::reader::{ArtifactReader, ArtifactReaders};

pub const STORAGE_DIR_NAME: &str = "bundles";
pub const INDEX_FILE_NAME: &str = "obr.xml";
pub const INDEX_TMP_FILE_NAME: &str = "obr.xml.tmp";
pub const LOCK_FILE_NAME: &str = "obr.lock";

/// On-disk layout of a repository rooted at `D`:
/// - `D/bundles/`: stored artifacts, `{name}-{version}.jar`
/// - `D/obr.xml`: the index (only ever replaced by rename)
/// - `D/obr.xml.tmp`: scratch file for index rebuilds
/// - `D/obr.lock`: zero-length lock token
#[derive(Clone, Debug)]
pub struct RepositoryLayout {
    root: PathBuf,
    storage_dir: PathBuf,
    index_path: PathBuf,
    index_tmp_path: PathBuf,
    lock_path: PathBuf,
}

impl RepositoryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            storage_dir: root.join(STORAGE_DIR_NAME),
            index_path: root.join(INDEX_FILE_NAME),
            index_tmp_path: root.join(INDEX_TMP_FILE_NAME),
            lock_path: root.join(LOCK_FILE_NAME),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn index_tmp_path(&self) -> &Path {
        &self.index_tmp_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// An artifact written to storage by [`Repository::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub identity: ArtifactIdentity,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Artifacts copied by this call, in input order.
    pub installed: Vec<StoredArtifact>,
    /// Number of resources in the rebuilt index.
    pub indexed: usize,
}

/// A handle on one repository directory.
///
/// Any number of handles (in any number of processes) may target the same
/// directory; mutations are serialized through the lock file.
pub struct Repository {
    config: RepositoryConfig,
    layout: RepositoryLayout,
    base: Url,
    lock_file: LockFile,
    readers: ArtifactReaders,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.config.name())
            .field("root", &self.layout.root())
            .field("readers", &self.readers)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open (creating if needed) the repository described by `config`, reading
    /// artifacts with the default readers.
    pub fn open(config: RepositoryConfig) -> Result<Self> {
        Self::open_with_readers(config, ArtifactReaders::default())
    }

    pub fn open_with_readers(config: RepositoryConfig, readers: ArtifactReaders) -> Result<Self> {
        let directory = config.directory().to_path_buf();
        let open_error = |source: io::Error| RepositoryError::Open {
            directory: directory.clone(),
            source,
        };

        std::fs::create_dir_all(directory.join(STORAGE_DIR_NAME)).map_err(open_error)?;
        // Lock exclusion is keyed by path; make every handle agree on it.
        let root = std::fs::canonicalize(&directory).map_err(open_error)?;
        let layout = RepositoryLayout::new(root);

        let base = Url::from_directory_path(layout.root()).map_err(|()| {
            open_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "repository directory cannot be expressed as a file URL",
            ))
        })?;
        let lock_file = LockFile::open(layout.lock_path()).map_err(open_error)?;

        tracing::debug!(
            target: "rivershark.obr",
            root = %layout.root().display(),
            name = config.name(),
            "opened repository"
        );

        Ok(Self {
            config,
            layout,
            base,
            lock_file,
            readers,
        })
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn layout(&self) -> &RepositoryLayout {
        &self.layout
    }

    /// The base URI recorded in the index.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Validate every file, then copy them all into storage and rebuild the index.
    ///
    /// If any file is invalid nothing is written and the error lists every
    /// invalid file. Validation runs without the lock; copying and the rebuild
    /// run under it.
    pub fn install<P: AsRef<Path>>(&self, files: &[P]) -> Result<InstallReport> {
        let validated = self.validate(files)?;

        tracing::info!(
            target: "rivershark.obr",
            root = %self.layout.root().display(),
            files = validated.len(),
            "installing artifacts"
        );

        let lock = self.lock()?;
        let storage_dir = self.layout.storage_dir();
        // Someone may have removed the storage directory since `open`.
        std::fs::create_dir_all(storage_dir).map_err(io_error("create", storage_dir))?;

        let mut installed = Vec::with_capacity(validated.len());
        for (file, identity) in validated {
            let path = install_one(storage_dir, file, &identity)?;
            installed.push(StoredArtifact { identity, path });
        }

        let document = self.rebuild_index_locked(&lock)?;
        drop(lock);

        tracing::info!(
            target: "rivershark.obr",
            root = %self.layout.root().display(),
            installed = installed.len(),
            indexed = document.resources.len(),
            "install complete"
        );
        Ok(InstallReport {
            installed,
            indexed: document.resources.len(),
        })
    }

    /// Regenerate the index from the current storage contents.
    pub fn rebuild_index(&self) -> Result<IndexDocument> {
        let lock = self.lock()?;
        self.rebuild_index_locked(&lock)
    }

    /// Release the lock file descriptor. Repository contents are kept.
    pub fn close(self) {
        tracing::debug!(
            target: "rivershark.obr",
            root = %self.layout.root().display(),
            "closed repository"
        );
    }

    fn validate<'a, P: AsRef<Path>>(
        &self,
        files: &'a [P],
    ) -> Result<Vec<(&'a Path, ArtifactIdentity)>> {
        let mut validated = Vec::with_capacity(files.len());
        let mut failures = Vec::new();
        for file in files {
            let file = file.as_ref();
            match self.readers.identify(file) {
                Ok(identity) => validated.push((file, identity)),
                Err(invalid) => {
                    tracing::debug!(
                        target: "rivershark.obr",
                        path = %file.display(),
                        reason = %invalid.reason,
                        "rejected candidate artifact"
                    );
                    failures.push(invalid);
                }
            }
        }

        if failures.is_empty() {
            Ok(validated)
        } else {
            Err(BatchValidationFailed { failures }.into())
        }
    }

    fn lock(&self) -> Result<RepositoryLock<'_>> {
        self.lock_file
            .lock()
            .map_err(io_error("lock", self.lock_file.path()))
    }

    fn index_source(&self) -> IndexSource<'_> {
        IndexSource {
            name: self.config.name(),
            base: &self.base,
            storage_dir: self.layout.storage_dir(),
            readers: &self.readers,
            policy: self.config.stored_artifacts(),
        }
    }

    /// Holding `_lock` proves no other installer is mid-way through a copy.
    fn rebuild_index_locked(&self, _lock: &RepositoryLock<'_>) -> Result<IndexDocument> {
        let document = build_index(&self.index_source())?;
        let index_path = self.layout.index_path();
        write_index(index_path, self.layout.index_tmp_path(), &document)?;

        tracing::info!(
            target: "rivershark.obr",
            index = %index_path.display(),
            resources = document.resources.len(),
            "rebuilt index"
        );
        Ok(document)
    }
}
