//! Positional file I/O.
//!
//! A thin adapter over [`std::fs::File`]: open-or-create, positional read
//! and write by absolute byte offset, length, and removal. Every operation
//! is synchronous and seeks before touching the file, so no cursor state is
//! shared between callers.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{DbError, Result};

/// An open database file.
pub struct DbFile {
    path: PathBuf,
    file: File,
}

impl DbFile {
    /// Open `path` for reading and writing, creating it when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DbFile> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| DbError::Io(format!("Cannot open {}: {}", path.display(), e)))?;
        Ok(DbFile { path: path.to_path_buf(), file })
    }

    /// Path the file was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes.
    pub fn length(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| DbError::Io(format!("Cannot stat {}: {}", self.path.display(), e)))
    }

    /// Fill `buf` from the file starting at `offset`.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::Io(format!("Cannot seek to offset {}: {}", offset, e)))?;
        self.file
            .read_exact(buf)
            .map_err(|e| DbError::Io(format!("Cannot read {} bytes at {}: {}", buf.len(), offset, e)))
    }

    /// Write `buf` to the file starting at `offset`.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::Io(format!("Cannot seek to offset {}: {}", offset, e)))?;
        self.file
            .write_all(buf)
            .map_err(|e| DbError::Io(format!("Cannot write {} bytes at {}: {}", buf.len(), offset, e)))
    }

    /// Delete a file from the filesystem.
    pub fn remove<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        fs::remove_file(path)
            .map_err(|e| DbError::Io(format!("Cannot remove {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.db");
        let file = DbFile::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(file.length().unwrap(), 0);
    }

    #[test]
    fn test_positional_read_write() {
        let dir = tempdir().unwrap();
        let mut file = DbFile::open(dir.path().join("rw.db")).unwrap();

        file.write_at(0, b"head").unwrap();
        file.write_at(100, b"tail").unwrap();
        assert_eq!(file.length().unwrap(), 104);

        let mut buf = [0u8; 4];
        file.read_at(100, &mut buf).unwrap();
        assert_eq!(&buf, b"tail");
        file.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"head");
    }

    #[test]
    fn test_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut file = DbFile::open(dir.path().join("short.db")).unwrap();
        file.write_at(0, b"abc").unwrap();
        let mut buf = [0u8; 8];
        assert!(file.read_at(0, &mut buf).is_err());
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.db");
        let file = DbFile::open(&path).unwrap();
        drop(file);
        DbFile::remove(&path).unwrap();
        assert!(!path.exists());
        assert!(DbFile::remove(&path).is_err());
    }
}
