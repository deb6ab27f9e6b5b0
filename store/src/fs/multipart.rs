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

//! Native multipart uploads for the filesystem backend. An upload is a
//! directory under the reserved multipart tree holding `fs.json` (the
//! metadata captured at initiation) plus one `NNNNN.<etag>` file per part.
//! Complete concatenates the parts into a temp file and publishes it like a
//! regular PUT, with the composite etag and the parts manifest recorded in
//! the object's sidecar.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use ferrofs_filemeta::{FsMetaV1, ObjectPartInfo};
use ferrofs_utils::complete_multipart_etag;
use ferrofs_utils::path::trim_etag;

use super::osio;
use super::FsStore;
use crate::error::{os_err_to_fs_err, to_object_err, Result, StorageError};
use crate::store_api::{CompletePart, ListMultipartsInfo, ListPartsInfo, MultipartInfo, ObjectInfo, PartInfo, PutObjReader};
use crate::{FS_META_JSON_FILE, META_BUCKET, MIN_PART_SIZE, OBJECT_OP_TIMEOUT, READ_BUFFER_SIZE};

fn part_file_name(part_number: usize, etag: &str) -> String {
    format!("{part_number:05}.{etag}")
}

fn parse_part_file_name(name: &str) -> Option<(usize, &str)> {
    let (number, etag) = name.split_once('.')?;
    if number.len() != 5 || etag.is_empty() {
        return None;
    }
    let number: usize = number.parse().ok()?;
    Some((number, etag))
}

impl FsStore {
    fn upload_dir(&self, bucket: &str, object: &str, upload_id: &str) -> PathBuf {
        self.multipart_bucket_dir(bucket).join(object).join(upload_id)
    }

    async fn check_upload_id_exists(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()> {
        let upload_dir = self.upload_dir(bucket, object, upload_id);
        if !osio::fs_is_dir(&upload_dir).await {
            return Err(StorageError::InvalidUploadID(upload_id.to_string()));
        }
        Ok(())
    }

    pub(crate) async fn fs_new_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        self.check_object_args(bucket, object)?;
        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;

        let upload_id = uuid::Uuid::new_v4().to_string();
        let upload_dir = self.upload_dir(bucket, object, &upload_id);
        osio::fs_mkdir_all(&upload_dir).await.map_err(|e| to_object_err(e, bucket, object))?;

        let mut fs_meta = FsMetaV1::new();
        fs_meta.meta = metadata;
        tokio::fs::write(upload_dir.join(FS_META_JSON_FILE), fs_meta.to_bytes())
            .await
            .map_err(|e| to_object_err(os_err_to_fs_err(e), bucket, object))?;

        debug!(bucket, object, %upload_id, "created multipart upload");
        Ok(upload_id)
    }

    pub(crate) async fn fs_put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: &mut PutObjReader,
    ) -> Result<PartInfo> {
        self.check_object_args(bucket, object)?;
        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;
        self.check_upload_id_exists(bucket, object, upload_id).await?;

        let tmp_path = self.tmp_path();
        let bytes_written = match osio::fs_create_file(&tmp_path, data).await {
            Ok(n) => n,
            Err(err) => {
                let _ = osio::fs_remove_file(&tmp_path).await;
                return Err(to_object_err(err, bucket, object));
            }
        };

        if data.size() > 0 && (bytes_written as i64) < data.size() {
            let _ = osio::fs_remove_file(&tmp_path).await;
            return Err(StorageError::IncompleteBody);
        }

        let etag = data.md5_current_hex();
        let part_path = self.upload_dir(bucket, object, upload_id).join(part_file_name(part_id, &etag));
        if let Err(err) = osio::fs_rename_file(&tmp_path, &part_path).await {
            let _ = osio::fs_remove_file(&tmp_path).await;
            return Err(to_object_err(err, bucket, object));
        }

        let last_mod = osio::fs_stat_file(&part_path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(OffsetDateTime::from);

        Ok(PartInfo {
            part_num: part_id,
            last_mod,
            etag: Some(etag),
            size: bytes_written as i64,
        })
    }

    pub(crate) async fn fs_list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: usize,
        max_parts: usize,
    ) -> Result<ListPartsInfo> {
        self.check_object_args(bucket, object)?;
        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;
        self.check_upload_id_exists(bucket, object, upload_id).await?;

        let upload_dir = self.upload_dir(bucket, object, upload_id);
        let entries = osio::read_dir_entries(&upload_dir).await?;

        let mut parts: Vec<PartInfo> = Vec::new();
        for entry in entries {
            if entry == FS_META_JSON_FILE || entry.ends_with('/') {
                continue;
            }
            let Some((number, etag)) = parse_part_file_name(&entry) else {
                continue;
            };
            let Ok(meta) = osio::fs_stat_file(&upload_dir.join(&entry)).await else {
                continue;
            };
            parts.push(PartInfo {
                part_num: number,
                last_mod: meta.modified().ok().map(OffsetDateTime::from),
                etag: Some(etag.to_string()),
                size: meta.len() as i64,
            });
        }
        parts.sort_by_key(|p| p.part_num);
        parts.retain(|p| p.part_num > part_number_marker);

        let is_truncated = max_parts > 0 && parts.len() > max_parts;
        if is_truncated {
            parts.truncate(max_parts);
        }

        Ok(ListPartsInfo {
            bucket: bucket.to_string(),
            object: object.to_string(),
            upload_id: upload_id.to_string(),
            next_part_number_marker: parts.last().map(|p| p.part_num).unwrap_or_default(),
            max_parts,
            is_truncated,
            parts,
        })
    }

    pub(crate) async fn fs_abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()> {
        self.check_object_args(bucket, object)?;
        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;
        self.check_upload_id_exists(bucket, object, upload_id).await?;

        let upload_dir = self.upload_dir(bucket, object, upload_id);
        osio::fs_remove_all(&upload_dir).await?;
        self.prune_upload_parents(bucket, &upload_dir).await;
        Ok(())
    }

    pub(crate) async fn fs_complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
    ) -> Result<ObjectInfo> {
        self.check_object_args(bucket, object)?;

        let lk = self.ns_mutex.new_lock(bucket, object);
        let _guard = lk.lock(OBJECT_OP_TIMEOUT).await?;

        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;
        self.check_upload_id_exists(bucket, object, upload_id).await?;

        if uploaded_parts.is_empty() {
            return Err(StorageError::InvalidArgument("no parts supplied".to_string()));
        }

        let upload_dir = self.upload_dir(bucket, object, upload_id);

        // Metadata captured at initiation travels to the final object.
        let mut fs_meta = match tokio::fs::read(upload_dir.join(FS_META_JSON_FILE)).await {
            Ok(data) => FsMetaV1::parse(&data)?,
            Err(_) => FsMetaV1::new(),
        };

        // Verify every declared part and gather the manifest.
        let mut part_infos: Vec<ObjectPartInfo> = Vec::with_capacity(uploaded_parts.len());
        let last = uploaded_parts.len() - 1;
        for (i, part) in uploaded_parts.iter().enumerate() {
            let etag = trim_etag(part.etag.as_deref().unwrap_or_default());
            let name = part_file_name(part.part_num, &etag);
            let meta = osio::fs_stat_file(&upload_dir.join(&name))
                .await
                .map_err(|_| StorageError::InvalidPart(part.part_num))?;

            let size = meta.len() as i64;
            if i != last && size < MIN_PART_SIZE {
                return Err(StorageError::EntityTooSmall {
                    part_number: part.part_num,
                    part_size: size,
                });
            }
            part_infos.push(ObjectPartInfo {
                number: part.part_num,
                name,
                etag,
                size: meta.len(),
            });
        }

        let etags: Vec<String> = part_infos.iter().map(|p| p.etag.clone()).collect();
        fs_meta.set_etag(complete_multipart_etag(&etags));
        fs_meta.parts = part_infos.clone();

        let wlk = if bucket != META_BUCKET {
            let meta_path = self.fs_meta_path(bucket, object);
            Some(
                self.rw_pool.create(&meta_path.to_string_lossy())
                    .await
                    .map_err(|e| to_object_err(e, bucket, object))?,
            )
        } else {
            None
        };

        let tmp_path = self.tmp_path();
        let result = self
            .concat_parts_and_publish(bucket, object, &upload_dir, &part_infos, &tmp_path, wlk.as_ref(), &fs_meta)
            .await;

        let _ = osio::fs_remove_file(&tmp_path).await;
        if result.is_err() {
            if wlk.is_some() {
                let _ = osio::fs_delete_file(&self.bucket_meta_dir(bucket), &self.fs_meta_path(bucket, object)).await;
            }
            return result.map_err(|e| to_object_err(e, bucket, object));
        }

        osio::fs_remove_all(&upload_dir).await?;
        self.prune_upload_parents(bucket, &upload_dir).await;

        result.map_err(|e| to_object_err(e, bucket, object))
    }

    async fn concat_parts_and_publish(
        &self,
        bucket: &str,
        object: &str,
        upload_dir: &Path,
        parts: &[ObjectPartInfo],
        tmp_path: &Path,
        wlk: Option<&super::rwpool::WLockedFile>,
        fs_meta: &FsMetaV1,
    ) -> Result<ObjectInfo> {
        if let Some(parent) = tmp_path.parent() {
            osio::fs_mkdir_all(parent).await?;
        }
        let mut out = tokio::fs::File::create(tmp_path).await.map_err(os_err_to_fs_err)?;
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        for part in parts {
            let (mut file, _size) = osio::fs_open_file(&upload_dir.join(&part.name), 0).await?;
            loop {
                let n = file.read(&mut buf).await.map_err(os_err_to_fs_err)?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n]).await.map_err(os_err_to_fs_err)?;
            }
        }
        out.flush().await.map_err(os_err_to_fs_err)?;
        drop(out);

        let dst_path = self.object_path(bucket, object);
        if self.worm && osio::fs_stat_file(&dst_path).await.is_ok() {
            return Err(StorageError::ObjectAlreadyExists(bucket.to_string(), object.to_string()));
        }

        osio::fs_rename_file(tmp_path, &dst_path).await?;

        if let Some(wlk) = wlk {
            wlk.write_all(&fs_meta.to_bytes())?;
        }

        let meta = osio::fs_stat_file(&dst_path).await?;
        Ok(ObjectInfo::from_fs_meta(bucket, object, fs_meta, &meta))
    }

    pub(crate) async fn fs_list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        delimiter: &str,
        max_uploads: usize,
    ) -> Result<ListMultipartsInfo> {
        self.check_prefix_args(bucket, prefix)?;
        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;

        let mut uploads = self.scan_uploads(bucket).await?;
        uploads.retain(|u| u.object.starts_with(prefix));
        uploads.sort_by(|a, b| (a.object.as_str(), a.upload_id.as_str()).cmp(&(b.object.as_str(), b.upload_id.as_str())));
        if !key_marker.is_empty() {
            uploads.retain(|u| {
                u.object.as_str() > key_marker
                    || (u.object == key_marker && !upload_id_marker.is_empty() && u.upload_id.as_str() > upload_id_marker)
            });
        }

        let is_truncated = max_uploads > 0 && uploads.len() > max_uploads;
        if is_truncated {
            uploads.truncate(max_uploads);
        }

        Ok(ListMultipartsInfo {
            key_marker: if key_marker.is_empty() { None } else { Some(key_marker.to_string()) },
            upload_id_marker: if upload_id_marker.is_empty() {
                None
            } else {
                Some(upload_id_marker.to_string())
            },
            next_key_marker: if is_truncated {
                uploads.last().map(|u| u.object.clone())
            } else {
                None
            },
            next_upload_id_marker: if is_truncated {
                uploads.last().map(|u| u.upload_id.clone())
            } else {
                None
            },
            max_uploads,
            is_truncated,
            uploads,
            prefix: prefix.to_string(),
            delimiter: if delimiter.is_empty() { None } else { Some(delimiter.to_string()) },
            common_prefixes: Vec::new(),
        })
    }

    /// All in-progress uploads in a bucket: directories under the multipart
    /// tree whose name is a server-minted upload id.
    async fn scan_uploads(&self, bucket: &str) -> Result<Vec<MultipartInfo>> {
        let root = self.multipart_bucket_dir(bucket);
        let mut uploads = Vec::new();
        if !osio::fs_is_dir(&root).await {
            return Ok(uploads);
        }

        let mut stack = vec![PathBuf::new()];
        while let Some(rel) = stack.pop() {
            let dir = root.join(&rel);
            let Ok(entries) = osio::read_dir_entries(&dir).await else {
                continue;
            };
            for entry in entries {
                let Some(name) = entry.strip_suffix('/') else {
                    continue;
                };
                if uuid::Uuid::parse_str(name).is_ok() {
                    let object = rel.to_string_lossy().to_string();
                    let initiated = osio::fs_stat_dir(&dir.join(name))
                        .await
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .map(OffsetDateTime::from);
                    uploads.push(MultipartInfo {
                        bucket: bucket.to_string(),
                        object,
                        upload_id: name.to_string(),
                        initiated,
                        user_defined: HashMap::new(),
                    });
                } else {
                    stack.push(rel.join(name));
                }
            }
        }
        Ok(uploads)
    }

    /// Removes uploads whose directory has not been touched for `expiry`.
    /// Returns how many were removed.
    pub async fn cleanup_stale_uploads(&self, expiry: Duration) -> Result<usize> {
        let multipart_root = self.fs_path().join(META_BUCKET).join(crate::MULTIPART_META_PREFIX);
        let buckets = match osio::read_dir_entries(&multipart_root).await {
            Ok(entries) => entries,
            Err(StorageError::FileNotFound) => return Ok(0),
            Err(err) => return Err(err),
        };

        let now = SystemTime::now();
        let mut removed = 0usize;
        for bucket_entry in buckets {
            let Some(bucket) = bucket_entry.strip_suffix('/') else {
                continue;
            };
            for upload in self.scan_uploads(bucket).await? {
                let upload_dir = self.upload_dir(bucket, &upload.object, &upload.upload_id);
                let Ok(meta) = osio::fs_stat_dir(&upload_dir).await else {
                    continue;
                };
                let age = meta.modified().ok().and_then(|m| now.duration_since(m).ok()).unwrap_or_default();
                if age >= expiry {
                    if let Err(err) = osio::fs_remove_all(&upload_dir).await {
                        warn!(bucket, object = %upload.object, upload_id = %upload.upload_id, %err, "failed to expire upload");
                        continue;
                    }
                    self.prune_upload_parents(bucket, &upload_dir).await;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Best-effort removal of the now-empty object key directories left
    /// behind under the multipart tree.
    async fn prune_upload_parents(&self, bucket: &str, upload_dir: &Path) {
        let base = self.multipart_bucket_dir(bucket);
        let mut current = upload_dir.parent().map(Path::to_path_buf);
        while let Some(dir) = current {
            if !dir.starts_with(&base) || dir == base {
                break;
            }
            if tokio::fs::remove_dir(&dir).await.is_err() {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
    }
}
