use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Exclusive advisory lock guarding a writable block file.
///
/// The lock lives as long as the value; the OS releases it when the handle
/// is closed. The lock file holds the owner's pid for debugging.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    pub fn lock<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(Error::LockError)?;

        Self::try_lock(&file).map_err(Error::LockError)?;

        writeln!(file, "{}", std::process::id()).map_err(Error::LockError)?;
        file.flush().map_err(Error::LockError)?;

        tracing::debug!(path = %path.display(), "Acquired writer lock");
        Ok(Self { _file: file, path })
    }

    /// Lock file guarding `target`: the same path with `.lock` appended.
    pub fn path_for(target: &Path) -> PathBuf {
        let mut name = target.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn try_lock(file: &File) -> io::Result<()> {
        use libc::{flock, LOCK_EX, LOCK_NB};

        let fd = file.as_raw_fd();
        let result = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_lock_writes_pid() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("journal-laptop-001.idx.lock");

        let lock = FileLock::lock(&lock_path).expect("Failed to acquire lock");
        assert_eq!(lock.path(), lock_path.as_path());

        let content = fs::read_to_string(&lock_path).expect("Failed to read lock file");
        assert!(content.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_double_lock() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("double.lock");

        let _lock1 = FileLock::lock(&lock_path).expect("Failed to acquire first lock");
        let lock2 = FileLock::lock(&lock_path);
        assert!(matches!(lock2, Err(Error::LockError(_))));
    }

    #[test]
    fn test_auto_unlock_on_drop() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("auto.lock");

        {
            let _lock = FileLock::lock(&lock_path).expect("Failed to acquire lock");
            assert!(lock_path.exists());
        }

        let _lock2 = FileLock::lock(&lock_path).expect("Should be able to acquire lock after drop");
    }

    #[test]
    fn test_path_for() {
        let path = FileLock::path_for(Path::new("/data/doc-laptop-001.idx"));
        assert_eq!(path, PathBuf::from("/data/doc-laptop-001.idx.lock"));
    }
}
