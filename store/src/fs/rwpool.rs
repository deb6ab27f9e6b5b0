// Copyright 2024 FerroFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Path-keyed pool of OS-locked file handles. Sidecar readers piggyback on
//! one shared-locked handle per path instead of reopening; writers take a
//! non-pooled exclusive handle. The namespace lock serialises logical
//! access, the advisory file lock here guards against other processes on
//! the same backend.

use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::error::{os_err_to_fs_err, Result, StorageError};

/// A read-only handle under a shared advisory lock. Reads are positional so
/// every pool user can read independently.
#[derive(Debug)]
pub struct RLockedFile {
    file: File,
}

impl RLockedFile {
    pub fn read_all(&self) -> Result<Vec<u8>> {
        read_whole_file(&self.file)
    }

    pub fn size(&self) -> Result<u64> {
        Ok(self.file.metadata().map_err(os_err_to_fs_err)?.len())
    }
}

/// A writable handle under an exclusive advisory lock, not pooled. Dropping
/// it closes the descriptor which releases the lock.
#[derive(Debug)]
pub struct WLockedFile {
    file: File,
}

impl WLockedFile {
    pub fn read_all(&self) -> Result<Vec<u8>> {
        read_whole_file(&self.file)
    }

    /// Replaces the file contents.
    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        self.file.set_len(0).map_err(os_err_to_fs_err)?;
        write_at(&self.file, data, 0).map_err(os_err_to_fs_err)?;
        Ok(())
    }
}

fn read_whole_file(file: &File) -> Result<Vec<u8>> {
    let size = file.metadata().map_err(os_err_to_fs_err)?.len() as usize;
    let mut buf = vec![0u8; size];
    let mut off = 0usize;
    while off < size {
        let n = read_at(file, &mut buf[off..], off as u64).map_err(os_err_to_fs_err)?;
        if n == 0 {
            buf.truncate(off);
            break;
        }
        off += n;
    }
    Ok(buf)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    std::os::unix::fs::FileExt::write_all_at(file, buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    let mut off = offset;
    let mut rest = buf;
    while !rest.is_empty() {
        let n = std::os::windows::fs::FileExt::seek_write(file, rest, off)?;
        off += n as u64;
        rest = &rest[n..];
    }
    Ok(())
}

struct PoolEntry {
    file: Arc<RLockedFile>,
    refs: usize,
}

/// The pool itself: one shared-locked reader entry per absolute path.
#[derive(Default)]
pub struct FsIoPool {
    readers: Mutex<HashMap<String, PoolEntry>>,
}

impl FsIoPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pooled reader entries, for tests and introspection.
    pub fn len(&self) -> usize {
        self.readers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a shared-locked read handle for `path`, reusing the pooled
    /// one when present. Every successful `open` must be paired with a
    /// [`close`](Self::close).
    pub async fn open(&self, path: &str) -> Result<Arc<RLockedFile>> {
        if let Some(entry) = self.readers.lock().get_mut(path) {
            entry.refs += 1;
            return Ok(entry.file.clone());
        }

        let path_buf = path.to_string();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = File::open(&path_buf)?;
            file.lock_shared()?;
            Ok(file)
        })
        .await
        .map_err(StorageError::other)?
        .map_err(os_err_to_fs_err)?;

        let rlk = Arc::new(RLockedFile { file });

        let mut readers = self.readers.lock();
        match readers.get_mut(path) {
            // A racing open won; share its handle and let ours close.
            Some(entry) => {
                entry.refs += 1;
                Ok(entry.file.clone())
            }
            None => {
                readers.insert(path.to_string(), PoolEntry { file: rlk.clone(), refs: 1 });
                Ok(rlk)
            }
        }
    }

    /// Drops one reference to the pooled handle; the last closer releases
    /// the OS lock and removes the entry.
    pub fn close(&self, path: &str) {
        let mut readers = self.readers.lock();
        if let Some(entry) = readers.get_mut(path) {
            entry.refs -= 1;
            if entry.refs == 0 {
                readers.remove(path);
            }
        }
    }

    /// An exclusive-locked writable handle for an existing file. Fails with
    /// `FileAccessDenied` when the path is held under any mode, and
    /// `FileNotFound` when it does not exist.
    pub async fn write(&self, path: &str) -> Result<WLockedFile> {
        let path_buf = path.to_string();
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path_buf)
                .map_err(os_err_to_fs_err)?;
            file.try_lock_exclusive().map_err(|_| StorageError::FileAccessDenied)?;
            Ok(file)
        })
        .await
        .map_err(StorageError::other)??;
        Ok(WLockedFile { file })
    }

    /// Like [`write`](Self::write), but creates parent directories and the
    /// file itself. The contents are truncated only after the exclusive
    /// lock is held.
    pub async fn create(&self, path: &str) -> Result<WLockedFile> {
        let path_buf = path.to_string();
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            if let Some(parent) = Path::new(&path_buf).parent() {
                std::fs::create_dir_all(parent).map_err(os_err_to_fs_err)?;
            }
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path_buf)
                .map_err(os_err_to_fs_err)?;
            file.try_lock_exclusive().map_err(|_| StorageError::FileAccessDenied)?;
            file.set_len(0).map_err(os_err_to_fs_err)?;
            Ok(file)
        })
        .await
        .map_err(StorageError::other)??;
        Ok(WLockedFile { file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_shares_pooled_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.json");
        std::fs::write(&path, b"{}").unwrap();
        let path = path.to_string_lossy().to_string();

        let pool = FsIoPool::new();
        let a = pool.open(&path).await.unwrap();
        let b = pool.open(&path).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);

        pool.close(&path);
        assert_eq!(pool.len(), 1, "one reference still out");
        pool.close(&path);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_is_file_not_found() {
        let pool = FsIoPool::new();
        let err = pool.open("/nonexistent/fs.json").await.unwrap_err();
        assert!(matches!(err, StorageError::FileNotFound));
    }

    #[tokio::test]
    async fn test_write_conflicts_with_open_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.json");
        std::fs::write(&path, b"{}").unwrap();
        let path = path.to_string_lossy().to_string();

        let pool = FsIoPool::new();
        let _reader = pool.open(&path).await.unwrap();

        let err = pool.write(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::FileAccessDenied));

        pool.close(&path);
        let writer = pool.write(&path).await.unwrap();
        writer.write_all(b"{\"a\":1}").unwrap();
        assert_eq!(writer.read_all().unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_create_builds_parents_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/fs.json").to_string_lossy().to_string();

        let pool = FsIoPool::new();
        let w = pool.create(&path).await.unwrap();
        w.write_all(b"first").unwrap();
        drop(w);

        let w = pool.create(&path).await.unwrap();
        assert_eq!(w.read_all().unwrap(), b"", "create truncates existing contents");
        w.write_all(b"second").unwrap();
        drop(w);

        let r = pool.open(&path).await.unwrap();
        assert_eq!(r.read_all().unwrap(), b"second");
        pool.close(&path);
    }

    #[tokio::test]
    async fn test_write_missing_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").to_string_lossy().to_string();
        let pool = FsIoPool::new();
        assert!(matches!(pool.write(&path).await.unwrap_err(), StorageError::FileNotFound));
    }
}
