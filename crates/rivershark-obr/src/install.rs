use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{io_error, Result};
use crate::model::ArtifactIdentity;
use crate::util::atomic_write_with;

/// Suffix of the scratch file an artifact is copied into before the rename.
pub const TMP_SUFFIX: &str = ".tmp";

/// Copy `source` into `storage_dir` under the canonical name of `identity`.
///
/// The bytes go to `{name}-{version}.jar.tmp` first, which is then renamed
/// over any existing file with the final name. Returns the final path.
pub(crate) fn install_one(
    storage_dir: &Path,
    source: &Path,
    identity: &ArtifactIdentity,
) -> Result<PathBuf> {
    let file_name = identity.canonical_file_name();
    let destination = storage_dir.join(&file_name);
    let tmp_path = storage_dir.join(format!("{file_name}{TMP_SUFFIX}"));

    let mut input = File::open(source).map_err(io_error("open", source))?;
    atomic_write_with(&destination, &tmp_path, |out| {
        io::copy(&mut input, out)?;
        Ok(())
    })
    .map_err(io_error("install", &destination))?;

    tracing::debug!(
        target: "rivershark.obr",
        source = %source.display(),
        destination = %destination.display(),
        identity = %identity,
        "installed artifact"
    );
    Ok(destination)
}
