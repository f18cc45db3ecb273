//! File-based OSGi bundle repository (OBR) engine.
//!
//! A repository is a directory holding bundles under canonical names plus a
//! single R5 index (`obr.xml`) describing them:
//!
//! ```no_run
//! use rivershark_config::RepositoryConfig;
//! use rivershark_obr::Repository;
//!
//! # fn main() -> Result<(), rivershark_obr::RepositoryError> {
//! let repository = Repository::open(RepositoryConfig::builder("/srv/obr").build())?;
//! repository.install(&["target/com.example.widget-1.2.0.jar"])?;
//! repository.close();
//! # Ok(())
//! # }
//! ```
//!
//! `install` validates every candidate before touching the repository; an
//! invalid file rejects the whole batch. Copies and the index rebuild run
//! under an exclusive lock on `obr.lock` that is honoured across threads and
//! processes. Every file that becomes visible (stored bundles and the index)
//! is written to a scratch file and renamed into place, so a crash leaves
//! either the previous or the new snapshot.

mod error;
mod index;
mod install;
mod lock;
mod manifest;
mod model;
mod reader;
mod repository;
mod util;
mod version;

pub use error::{BatchValidationFailed, InvalidArtifact, InvalidArtifactReason, RepositoryError};
pub use index::{
    read_index, IndexDocument, IndexReadError, IndexedResource, ARTIFACT_SUFFIX,
    REPOSITORY_XML_NAMESPACE,
};
pub use install::TMP_SUFFIX;
pub use manifest::{parse_clauses, HeaderClause, Manifest, MANIFEST_PATH};
pub use model::{
    ArtifactIdentity, ArtifactKind, ArtifactMetadata, Attribute, AttributeValue, Clause,
    BUNDLE_MIME_TYPE, BUNDLE_NAMESPACE, CONTENT_NAMESPACE, HOST_NAMESPACE, IDENTITY_NAMESPACE,
    PACKAGE_NAMESPACE,
};
pub use reader::{ArtifactReader, ArtifactReaders, BundleManifestReader};
pub use repository::{
    InstallReport, Repository, RepositoryLayout, StoredArtifact, INDEX_FILE_NAME,
    INDEX_TMP_FILE_NAME, LOCK_FILE_NAME, STORAGE_DIR_NAME,
};
pub use version::{BundleVersion, VersionError, VersionRange};
