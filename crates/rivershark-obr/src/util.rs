use std::fs;
use std::io;
use std::path::Path;

/// Write `path` by filling `tmp_path` first and renaming it into place.
///
/// `tmp_path` must live in the same directory as `path`. It is truncated if a
/// previous (crashed) run left it behind, and removed again when writing or
/// renaming fails. Readers of `path` only ever see the old or the new content.
pub(crate) fn atomic_write_with(
    path: &Path,
    tmp_path: &Path,
    write: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(tmp_path)?;

    let write_result = (|| -> io::Result<()> {
        write(&mut file)?;
        file.sync_all()?;
        Ok(())
    })();
    drop(file);
    if let Err(err) = write_result {
        remove_tmp_best_effort(tmp_path, "write");
        return Err(err);
    }

    match rename_over(tmp_path, path) {
        Ok(()) => {
            if let Some(parent) = path.parent() {
                sync_dir_best_effort(parent);
            }
            Ok(())
        }
        Err(err) => {
            remove_tmp_best_effort(tmp_path, "rename");
            Err(err)
        }
    }
}

/// `rename` that replaces an existing destination on every platform.
fn rename_over(from: &Path, to: &Path) -> io::Result<()> {
    const ATTEMPTS: usize = 16;
    let mut last_err = None;
    for _ in 0..ATTEMPTS {
        match fs::rename(from, to) {
            Ok(()) => return Ok(()),
            // Windows refuses to rename over an existing file.
            Err(err) if cfg!(windows) && to.exists() => {
                if let Err(remove_err) = fs::remove_file(to) {
                    if remove_err.kind() != io::ErrorKind::NotFound {
                        return Err(remove_err);
                    }
                }
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::other("rename retries exhausted")))
}

fn remove_tmp_best_effort(path: &Path, stage: &'static str) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::debug!(
            target: "rivershark.obr",
            path = %path.display(),
            stage,
            error = %err,
            "failed to remove scratch file"
        ),
    }
}

/// Persist the rename itself. Failures are logged and otherwise ignored.
fn sync_dir_best_effort(dir: &Path) {
    #[cfg(unix)]
    {
        if let Err(err) = fs::File::open(dir).and_then(|dir| dir.sync_all()) {
            tracing::debug!(
                target: "rivershark.obr",
                dir = %dir.display(),
                error = %err,
                "failed to sync directory"
            );
        }
    }

    #[cfg(not(unix))]
    let _ = dir;
}
