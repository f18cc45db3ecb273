use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// The zero-length token file guarding one repository directory.
///
/// The descriptor stays open for the lifetime of the repository handle;
/// [`LockFile::lock`] takes the exclusive lock on it.
#[derive(Debug)]
pub(crate) struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Open `path`, creating it if needed. Existing content is left alone.
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Block until this process holds the repository exclusively.
    pub(crate) fn lock(&self) -> io::Result<RepositoryLock<'_>> {
        let guard = process_lock_for_path(&self.path)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        tracing::trace!(
            target: "rivershark.obr",
            path = %self.path.display(),
            "waiting for repository lock"
        );
        self.file.lock_exclusive()?;

        Ok(RepositoryLock {
            file: &self.file,
            _guard: guard,
        })
    }
}

/// Exclusive hold on a repository, released on drop.
#[derive(Debug)]
pub(crate) struct RepositoryLock<'a> {
    file: &'a File,
    // `fs2` file locks may be process-scoped (they don't exclude other threads in
    // the same process). The in-process mutex guard provides mutual exclusion
    // between threads, while the file lock coordinates processes.
    _guard: MutexGuard<'static, ()>,
}

impl Drop for RepositoryLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

fn process_lock_for_path(path: &Path) -> &'static Mutex<()> {
    static PROCESS_LOCKS: OnceLock<Mutex<HashMap<PathBuf, &'static Mutex<()>>>> = OnceLock::new();
    let locks = PROCESS_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));

    let mut map = locks
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = map.get(path) {
        return existing;
    }

    let mutex: &'static Mutex<()> = Box::leak(Box::new(Mutex::new(())));
    map.insert(path.to_path_buf(), mutex);
    mutex
}
