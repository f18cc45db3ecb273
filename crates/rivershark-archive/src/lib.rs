//! Read access to jar archives.
//!
//! Bundles are plain zip files; the repository only ever needs individual
//! entries (the manifest) out of them, so this stays a thin wrapper around
//! [`zip::ZipArchive`].

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use zip::ZipArchive;

/// Local file header signature.
const ZIP_LOCAL_HEADER_MAGIC: [u8; 4] = *b"PK\x03\x04";
/// End of central directory signature; an archive with no entries starts with it.
const ZIP_EMPTY_ARCHIVE_MAGIC: [u8; 4] = *b"PK\x05\x06";

/// Returns `true` if `header` (the leading bytes of a file) starts with a zip signature.
#[must_use]
pub fn has_zip_magic(header: &[u8]) -> bool {
    header.starts_with(&ZIP_LOCAL_HEADER_MAGIC) || header.starts_with(&ZIP_EMPTY_ARCHIVE_MAGIC)
}

#[derive(Clone, Debug)]
pub struct Archive {
    path: PathBuf,
}

impl Archive {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a file from the archive.
    ///
    /// Returns `Ok(None)` when the file isn't present.
    pub fn read(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open archive {}", self.path.display()))?;
        let mut zip = ZipArchive::new(file)
            .with_context(|| format!("failed to read zip {}", self.path.display()))?;
        // Bound to a local so the entry borrow of `zip` ends before `zip` drops.
        let contents = match zip.by_name(name) {
            Ok(mut entry) => {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).with_context(|| {
                    format!("failed to read {} from {}", name, self.path.display())
                })?;
                Ok(Some(buf))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read {} from zip {}", name, self.path.display())
            }),
        };
        contents
    }
}
