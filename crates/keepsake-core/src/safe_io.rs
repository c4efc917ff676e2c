//! Locked file I/O: whole-file reads and writes under fs2 advisory locks.
//!
//! Building blocks used by the record stores:
//! - [`write_locked()`] - rewrite a file while holding an exclusive lock on it
//! - [`read_locked()`] - read a file while holding a shared lock on it
//! - [`FileLock`] - RAII lock guard over an open file
//!
//! Locks are taken on the data file itself, not on a sidecar, and live only
//! for the duration of one call. A reader holding a shared lock can never
//! observe a half-written file because writers need the exclusive lock to
//! truncate and rewrite it.
//!
//! # Example
//!
//! ```no_run
//! use keepsake_core::safe_io::{read_locked, write_locked};
//! use std::path::Path;
//!
//! # fn example() -> std::io::Result<()> {
//! let path = Path::new("/tmp/keepsake/tasks/abc.json");
//! write_locked(path, br#"{"id":"abc"}"#)?;
//! let bytes = read_locked(path)?;
//! # Ok(())
//! # }
//! ```

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// RAII file lock using fs2 advisory locking.
///
/// The lock is acquired when created and released when dropped, on every exit
/// path. Acquisition blocks until the lock is available; there is no timeout at
/// this layer.
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Open `path` for writing (creating it and its parent directories if
    /// needed) and block until an exclusive lock is held.
    pub fn exclusive(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        // Through the trait: std's inherent File locks would shadow fs2's.
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }

    /// Open an existing `path` for reading and block until a shared lock is
    /// held. Fails with `NotFound` if the file does not exist.
    pub fn shared(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        FileExt::lock_shared(&file)?;
        Ok(Self { file })
    }

    /// Replace the whole file content. Requires an exclusive lock.
    fn rewrite(&mut self, contents: &[u8]) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(contents)?;
        self.file.sync_all()
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Release the lock using fs2's FileExt trait; ignore errors during drop
        let _ = FileExt::unlock(&self.file);
    }
}

/// Rewrite `path` with `contents` under an exclusive lock.
///
/// Parent directories are created. The content is fsynced before the lock is
/// released.
pub fn write_locked(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut lock = FileLock::exclusive(path)?;
    lock.rewrite(contents)
}

/// Read the whole of `path` under a shared lock.
pub fn read_locked(path: &Path) -> io::Result<Vec<u8>> {
    let mut lock = FileLock::shared(path)?;
    lock.read_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Non-blocking attempt on a fresh handle; true if the lock was granted.
    fn try_lock(path: &Path, exclusive: bool) -> bool {
        let file = OpenOptions::new().read(true).write(true).open(path).unwrap();
        let result = if exclusive {
            FileExt::try_lock_exclusive(&file)
        } else {
            FileExt::try_lock_shared(&file)
        };
        match result {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => false,
            Err(e) => panic!("unexpected lock error: {}", e),
        }
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");

        write_locked(&path, b"hello world").unwrap();
        assert_eq!(read_locked(&path).unwrap(), b"hello world");
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("r.json");

        write_locked(&path, b"nested").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"nested");
    }

    #[test]
    fn test_shorter_rewrite_truncates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("r.json");

        write_locked(&path, b"a much longer original payload").unwrap();
        write_locked(&path, b"short").unwrap();
        assert_eq!(read_locked(&path).unwrap(), b"short");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_locked(&temp_dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_shared_locks_coexist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("r.json");
        write_locked(&path, b"x").unwrap();

        let _first = FileLock::shared(&path).unwrap();
        assert!(try_lock(&path, false), "readers should not block each other");
    }

    #[test]
    fn test_exclusive_blocks_shared() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("r.json");

        let _writer = FileLock::exclusive(&path).unwrap();
        assert!(!try_lock(&path, false), "reader must wait for the writer");
    }

    #[test]
    fn test_lock_released_after_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("r.json");

        {
            let _lock = FileLock::exclusive(&path).unwrap();
        }
        assert!(try_lock(&path, true), "should acquire after previous lock dropped");
    }

    #[test]
    fn test_exclusive_blocks_across_threads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("r.json");
        let path_clone = path.clone();

        let lock_held = Arc::new(AtomicBool::new(false));
        let lock_held_clone = Arc::clone(&lock_held);

        let handle = thread::spawn(move || {
            let _lock = FileLock::exclusive(&path_clone).unwrap();
            lock_held_clone.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
        });

        while !lock_held.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));
        }

        assert!(!try_lock(&path, true), "should not acquire while other thread holds lock");

        handle.join().unwrap();

        assert!(try_lock(&path, true), "should acquire after other thread releases");
    }
}
