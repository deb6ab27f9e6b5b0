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

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{os_err_to_fs_err, Result, StorageError};
use crate::{FORMAT_CONFIG_FILE, META_BUCKET};

pub const FORMAT_VERSION: &str = "1";
pub const FORMAT_BACKEND_FS: &str = "fs";
pub const FORMAT_FS_VERSION: &str = "2";

#[derive(Debug, Serialize, Deserialize)]
pub struct FormatFsInfo {
    pub version: String,
}

/// `format.json` pins the backend layout. It is created on first start and
/// never rewritten by the server afterwards.
#[derive(Debug, Serialize, Deserialize)]
pub struct FormatFs {
    pub version: String,
    pub format: String,
    pub id: Uuid,
    pub fs: FormatFsInfo,
}

impl FormatFs {
    fn new() -> Self {
        FormatFs {
            version: FORMAT_VERSION.to_string(),
            format: FORMAT_BACKEND_FS.to_string(),
            id: Uuid::new_v4(),
            fs: FormatFsInfo {
                version: FORMAT_FS_VERSION.to_string(),
            },
        }
    }
}

/// Keeps `format.json` under a shared advisory lock for the lifetime of the
/// process, so a concurrent server cannot reformat the backend while this
/// one runs. A reformat flow would need the exclusive lock.
#[derive(Debug)]
pub struct FormatLock {
    _file: std::fs::File,
    pub format: FormatFs,
}

/// Creates `format.json` if absent (atomically, via temp and rename),
/// validates it, and returns the held shared lock.
pub async fn init_format_fs(export: &Path) -> Result<FormatLock> {
    let format_path = export.join(META_BUCKET).join(FORMAT_CONFIG_FILE);

    if tokio::fs::metadata(&format_path).await.is_err() {
        let format = FormatFs::new();
        let data = serde_json::to_vec_pretty(&format).map_err(StorageError::other)?;
        let tmp = format_path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        if let Some(parent) = format_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(os_err_to_fs_err)?;
        }
        tokio::fs::write(&tmp, &data).await.map_err(os_err_to_fs_err)?;
        // A racing first start may publish its own copy; rename is atomic
        // either way.
        tokio::fs::rename(&tmp, &format_path).await.map_err(os_err_to_fs_err)?;
    }

    let path = format_path.clone();
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
        let file = std::fs::File::open(&path)?;
        file.lock_shared()?;
        Ok(file)
    })
    .await
    .map_err(StorageError::other)?
    .map_err(os_err_to_fs_err)?;

    let data = tokio::fs::read(&format_path).await.map_err(os_err_to_fs_err)?;
    let format: FormatFs = serde_json::from_slice(&data).map_err(|_| StorageError::CorruptedFormat)?;
    if format.version != FORMAT_VERSION || format.format != FORMAT_BACKEND_FS || format.fs.version != FORMAT_FS_VERSION {
        return Err(StorageError::CorruptedFormat);
    }

    Ok(FormatLock { _file: file, format })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_creates_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let first = init_format_fs(dir.path()).await.unwrap();
        let id = first.format.id;
        drop(first);

        let second = init_format_fs(dir.path()).await.unwrap();
        assert_eq!(second.format.id, id, "format id is stable across restarts");
    }

    #[tokio::test]
    async fn test_corrupt_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let meta = dir.path().join(META_BUCKET);
        tokio::fs::create_dir_all(&meta).await.unwrap();
        tokio::fs::write(meta.join(FORMAT_CONFIG_FILE), b"not json").await.unwrap();

        let err = init_format_fs(dir.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::CorruptedFormat));
    }

    #[tokio::test]
    async fn test_wrong_backend_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let meta = dir.path().join(META_BUCKET);
        tokio::fs::create_dir_all(&meta).await.unwrap();
        let data = r#"{"version":"1","format":"xl","id":"9f2f3b1e-1f64-4c45-8f7a-0d8f8dc332a1","fs":{"version":"2"}}"#;
        tokio::fs::write(meta.join(FORMAT_CONFIG_FILE), data).await.unwrap();

        let err = init_format_fs(dir.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::CorruptedFormat));
    }
}
