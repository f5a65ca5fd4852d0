//! Exclusive ownership of a download destination.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};
use tracing::debug;

use super::error::{DownloadError, DownloadResult};

/// Advisory lock on `<dest>.lock`.
///
/// The OS releases the lock when the holder exits, so a crashed download
/// never leaves the destination blocked. A clean release also removes the
/// lock file.
pub struct DestinationLock {
    destination: PathBuf,
    lock: RwLock<fs::File>,
}

/// Held lock on a destination. Dropping it removes the lock file and then
/// releases the lock.
pub struct DestinationGuard<'a> {
    lock_path: PathBuf,
    _guard: RwLockWriteGuard<'a, fs::File>,
}

impl Drop for DestinationGuard<'_> {
    fn drop(&mut self) {
        // Unlinked while still locked: anyone holding the old file sees it
        // is no longer the lock file when they acquire it.
        if let Err(e) = fs::remove_file(&self.lock_path) {
            debug!(path = %self.lock_path.display(), error = %e, "Could not remove lock file");
        }
    }
}

impl DestinationLock {
    /// Open (creating if needed) the lock file next to `destination`.
    pub fn open(destination: &Path) -> DownloadResult<Self> {
        let lock_path = lock_path(destination);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| DownloadError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| DownloadError::WriteFailed {
                path: lock_path.clone(),
                source: e,
            })?;

        Ok(Self {
            destination: destination.to_path_buf(),
            lock: RwLock::new(file),
        })
    }

    /// Take the lock without blocking.
    ///
    /// Fails with [`DownloadError::DestinationBusy`] if another download
    /// holds it, or if the lock file was released and removed after this
    /// handle opened it.
    pub fn try_acquire(&mut self) -> DownloadResult<DestinationGuard<'_>> {
        let lock_path = lock_path(&self.destination);
        let guard = match self.lock.try_write() {
            Ok(guard) => guard,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return Err(DownloadError::DestinationBusy {
                    path: self.destination.clone(),
                })
            }
            Err(e) => {
                return Err(DownloadError::WriteFailed {
                    path: lock_path,
                    source: e,
                })
            }
        };

        if !is_current_file(&guard, &lock_path) {
            debug!(destination = %self.destination.display(), "Lock file was replaced");
            return Err(DownloadError::DestinationBusy {
                path: self.destination.clone(),
            });
        }

        debug!(destination = %self.destination.display(), "Acquired destination lock");
        Ok(DestinationGuard {
            lock_path,
            _guard: guard,
        })
    }
}

/// Whether `path` still names the open `file`.
#[cfg(unix)]
fn is_current_file(file: &fs::File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_current_file(_file: &fs::File, path: &Path) -> bool {
    path.exists()
}

/// Path of the lock file guarding `destination`.
pub fn lock_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("/data/game.pkg")),
            PathBuf::from("/data/game.pkg.lock")
        );
    }

    #[test]
    fn test_second_lock_is_busy() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("nested/game.pkg");

        let mut first = DestinationLock::open(&dest).unwrap();
        let _guard = first.try_acquire().unwrap();

        let mut second = DestinationLock::open(&dest).unwrap();
        assert!(matches!(
            second.try_acquire(),
            Err(DownloadError::DestinationBusy { .. })
        ));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("game.pkg");

        {
            let mut first = DestinationLock::open(&dest).unwrap();
            let _guard = first.try_acquire().unwrap();
        }

        let mut second = DestinationLock::open(&dest).unwrap();
        assert!(second.try_acquire().is_ok());
    }

    #[test]
    fn test_release_removes_lock_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("game.pkg");

        let mut lock = DestinationLock::open(&dest).unwrap();
        let guard = lock.try_acquire().unwrap();
        assert!(lock_path(&dest).exists());

        drop(guard);
        assert!(!lock_path(&dest).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_handle_to_removed_lock_file_is_busy() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("game.pkg");

        let mut first = DestinationLock::open(&dest).unwrap();
        let mut stale = DestinationLock::open(&dest).unwrap();
        drop(first.try_acquire().unwrap());

        // `stale` still points at the removed file.
        assert!(matches!(
            stale.try_acquire(),
            Err(DownloadError::DestinationBusy { .. })
        ));

        let mut fresh = DestinationLock::open(&dest).unwrap();
        assert!(fresh.try_acquire().is_ok());
    }
}
