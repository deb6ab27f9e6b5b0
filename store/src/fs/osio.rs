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

//! Posix helpers for the filesystem backend. Every function maps OS errors
//! to the file/volume taxonomy at the syscall boundary.

use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{os_err_to_fs_err, Result, StorageError};
use crate::store_api::PutObjReader;
use crate::READ_BUFFER_SIZE;

/// Longest path accepted on the backend; longest single component.
const MAX_PATH_LENGTH: usize = 1024;
const MAX_COMPONENT_LENGTH: usize = 255;

pub fn check_path_length(path: &str) -> Result<()> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(StorageError::FileNameTooLong);
    }
    for component in path.split('/') {
        if component.len() > MAX_COMPONENT_LENGTH {
            return Err(StorageError::FileNameTooLong);
        }
    }
    Ok(())
}

/// Stat that only accepts a regular file; directories report `FileNotFound`
/// so a key and a prefix of the same name stay distinguishable.
pub async fn fs_stat_file(path: &Path) -> Result<Metadata> {
    let meta = fs::metadata(path).await.map_err(os_err_to_fs_err)?;
    if meta.is_dir() {
        return Err(StorageError::FileNotFound);
    }
    Ok(meta)
}

pub async fn fs_stat_dir(path: &Path) -> Result<Metadata> {
    let meta = fs::metadata(path).await.map_err(os_err_to_fs_err)?;
    if !meta.is_dir() {
        return Err(StorageError::FileNotFound);
    }
    Ok(meta)
}

/// Stat for a bucket directory, reporting volume-level errors.
pub async fn fs_stat_volume(path: &Path) -> Result<Metadata> {
    let meta = match fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) => {
            return Err(match os_err_to_fs_err(e) {
                StorageError::FileNotFound => StorageError::VolumeNotFound,
                StorageError::FileAccessDenied => StorageError::VolumeNotFound,
                err => err,
            })
        }
    };
    if !meta.is_dir() {
        return Err(StorageError::VolumeNotFound);
    }
    Ok(meta)
}

pub async fn fs_is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

pub async fn fs_is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

pub async fn fs_mkdir(path: &Path) -> Result<()> {
    fs::create_dir(path).await.map_err(os_err_to_fs_err)
}

pub async fn fs_mkdir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await.map_err(os_err_to_fs_err)
}

/// Directory entries, sorted ascending, with a `/` suffix on directories.
/// Anything that is neither file nor directory is skipped.
pub async fn read_dir_entries(path: &Path) -> Result<Vec<String>> {
    let mut rd = fs::read_dir(path).await.map_err(os_err_to_fs_err)?;
    let mut entries = Vec::new();
    while let Some(entry) = rd.next_entry().await.map_err(os_err_to_fs_err)? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if file_type.is_dir() {
            entries.push(format!("{name}/"));
        } else if file_type.is_file() {
            entries.push(name);
        }
    }
    entries.sort();
    Ok(entries)
}

/// True when the directory exists and holds no entries.
pub async fn fs_is_empty_dir(path: &Path) -> bool {
    let Ok(mut rd) = fs::read_dir(path).await else {
        return false;
    };
    matches!(rd.next_entry().await, Ok(None))
}

/// Opens a file for reading at `offset`, returning the handle and total
/// size.
pub async fn fs_open_file(path: &Path, offset: i64) -> Result<(fs::File, i64)> {
    let mut file = fs::File::open(path).await.map_err(os_err_to_fs_err)?;
    let meta = file.metadata().await.map_err(os_err_to_fs_err)?;
    if meta.is_dir() {
        return Err(StorageError::IsNotRegular);
    }
    let size = meta.len() as i64;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset as u64)).await.map_err(os_err_to_fs_err)?;
    }
    Ok((file, size))
}

/// Streams the reader into a freshly created file, creating parent
/// directories. Returns the number of bytes written; the caller decides
/// whether a short count is an error.
pub async fn fs_create_file(path: &Path, data: &mut PutObjReader) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs_mkdir_all(parent).await?;
    }
    let mut file = fs::File::create(path).await.map_err(os_err_to_fs_err)?;

    let mut buf = vec![0u8; buffer_size_for(data.size())];
    let mut written: u64 = 0;
    loop {
        let n = data.read_chunk(&mut buf).await.map_err(os_err_to_fs_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await.map_err(os_err_to_fs_err)?;
        written += n as u64;
    }
    file.flush().await.map_err(os_err_to_fs_err)?;
    Ok(written)
}

fn buffer_size_for(declared_size: i64) -> usize {
    if declared_size > 0 && (declared_size as usize) < READ_BUFFER_SIZE {
        declared_size as usize
    } else {
        READ_BUFFER_SIZE
    }
}

/// Atomic publish: rename `src` onto `dst`, creating `dst`'s parents.
pub async fn fs_rename_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs_mkdir_all(parent).await?;
    }
    fs::rename(src, dst).await.map_err(os_err_to_fs_err)
}

pub async fn fs_remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path).await.map_err(os_err_to_fs_err)
}

pub async fn fs_remove_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(os_err_to_fs_err(e)),
    }
}

/// Removes an empty directory; a populated one is `VolumeNotEmpty`.
pub async fn fs_remove_dir(path: &Path) -> Result<()> {
    fs::remove_dir(path).await.map_err(os_err_to_fs_err)
}

/// Deletes `delete_path` (file, or directory only when empty), then prunes
/// now-empty parents up to but excluding `base_path`.
pub async fn fs_delete_file(base_path: &Path, delete_path: &Path) -> Result<()> {
    if !delete_path.starts_with(base_path) || delete_path == base_path {
        return Ok(());
    }

    let meta = match fs::metadata(delete_path).await {
        Ok(meta) => meta,
        Err(e) => return Err(os_err_to_fs_err(e)),
    };

    if meta.is_dir() {
        // A populated directory target is an error; only parent pruning
        // below tolerates non-empty directories.
        fs::remove_dir(delete_path).await.map_err(os_err_to_fs_err)?;
    } else {
        fs::remove_file(delete_path).await.map_err(os_err_to_fs_err)?;
    }

    if let Some(parent) = delete_path.parent() {
        let parent: PathBuf = parent.to_path_buf();
        if parent.starts_with(base_path) && parent != base_path {
            // Parent pruning is best-effort; a concurrent write may have
            // repopulated it.
            match fs::remove_dir(&parent).await {
                Ok(()) => {
                    let _ = prune_empty_parents(base_path, &parent).await;
                }
                Err(_) => return Ok(()),
            }
        }
    }
    Ok(())
}

async fn prune_empty_parents(base_path: &Path, from: &Path) -> Result<()> {
    let mut current = from.parent().map(Path::to_path_buf);
    while let Some(dir) = current {
        if !dir.starts_with(base_path) || dir == base_path {
            break;
        }
        if fs::remove_dir(&dir).await.is_err() {
            break;
        }
        current = dir.parent().map(Path::to_path_buf);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_path_length() {
        assert!(check_path_length("a/b/c").is_ok());
        assert!(check_path_length(&"x".repeat(1025)).is_err());
        let long_component = format!("a/{}/b", "y".repeat(256));
        assert!(check_path_length(&long_component).is_err());
    }

    #[tokio::test]
    async fn test_read_dir_entries_sorted_with_dir_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).await.unwrap();
        fs::write(dir.path().join("b.txt"), b"x").await.unwrap();
        fs::write(dir.path().join("a.txt"), b"x").await.unwrap();

        let entries = read_dir_entries(dir.path()).await.unwrap();
        assert_eq!(entries, vec!["a.txt".to_string(), "b.txt".to_string(), "sub/".to_string()]);
    }

    #[tokio::test]
    async fn test_fs_delete_file_prunes_parents() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("bucket");
        let nested = base.join("a/b/c");
        fs::create_dir_all(&nested).await.unwrap();
        let file = nested.join("obj");
        fs::write(&file, b"data").await.unwrap();

        fs_delete_file(&base, &file).await.unwrap();
        assert!(!file.exists());
        assert!(!base.join("a").exists(), "empty parents should be pruned");
        assert!(base.exists(), "the base itself stays");
    }

    #[tokio::test]
    async fn test_fs_delete_file_stops_at_populated_parent() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("bucket");
        fs::create_dir_all(base.join("a")).await.unwrap();
        fs::write(base.join("a/keep"), b"k").await.unwrap();
        fs::write(base.join("a/gone"), b"g").await.unwrap();

        fs_delete_file(&base, &base.join("a/gone")).await.unwrap();
        assert!(base.join("a/keep").exists());
        assert!(base.join("a").exists());
    }

    #[tokio::test]
    async fn test_fs_stat_file_rejects_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let err = fs_stat_file(dir.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::FileNotFound));
    }
}
