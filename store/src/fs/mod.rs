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

//! The filesystem object layer: buckets are directories under the export
//! root, objects are plain files, metadata lives in `fs.json` sidecars
//! under the reserved tree. Writes are temp-file-plus-rename; logical
//! access is serialised by the namespace lock map and physical sidecar
//! access by the I/O pool's advisory locks.

pub mod format;
pub mod listpool;
mod multipart;
pub mod osio;
pub mod rwpool;
pub mod treewalk;
pub mod workers;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ferrofs_filemeta::FsMetaV1;
use ferrofs_lock::NsLockMap;
use ferrofs_utils::path::{dir as key_dir, path_join};
use ferrofs_utils::{is_valid_bucket_name, string::is_valid_object_name, DEFAULT_ETAG};

use crate::error::{to_object_err, Result, StorageError};
use crate::store_api::{
    BackendType, BucketInfo, CompletePart, ListMultipartsInfo, ListObjectsInfo, ListObjectsV2Info, ListPartsInfo, ObjectInfo,
    ObjectLayer, PartInfo, PutObjReader, StorageInfo,
};
use crate::{
    BUCKET_META_PREFIX, BUCKET_POLICY_FILE, FS_META_JSON_FILE, LISTING_TIMEOUT, LOOKUP_TIMEOUT, MAX_OBJECT_LIST, META_BUCKET,
    MULTIPART_META_PREFIX, OBJECT_OP_TIMEOUT, OPERATION_TIMEOUT, READ_BUFFER_SIZE, TMP_META_PREFIX,
};

use format::FormatLock;
use listpool::{ListParams, TreeWalkPool};
use rwpool::FsIoPool;
use treewalk::{start_tree_walk, TreeWalkSource};

/// The filesystem backend. One instance per export path; the lock map, I/O
/// pool and walker pool are owned here and threaded through explicitly.
pub struct FsStore {
    fs_path: PathBuf,
    fs_uuid: String,
    ns_mutex: NsLockMap,
    rw_pool: FsIoPool,
    list_pool: TreeWalkPool,
    _format_rlk: FormatLock,
    total_used: AtomicU64,
    usage_running: AtomicBool,
    worm: bool,
}

impl FsStore {
    /// Initialises the export tree (reserved bucket, temp area, multipart
    /// area, `format.json` under its shared lock) and returns the store.
    pub async fn new(fs_path: impl Into<PathBuf>, worm: bool) -> Result<Arc<FsStore>> {
        let fs_path: PathBuf = fs_path.into();
        osio::fs_mkdir_all(&fs_path).await?;
        let fs_path = tokio::fs::canonicalize(&fs_path).await.map_err(crate::error::os_err_to_fs_err)?;

        let fs_uuid = uuid::Uuid::new_v4().to_string();
        osio::fs_mkdir_all(&fs_path.join(META_BUCKET)).await?;
        osio::fs_mkdir_all(&fs_path.join(META_BUCKET).join(TMP_META_PREFIX).join(&fs_uuid)).await?;
        osio::fs_mkdir_all(&fs_path.join(META_BUCKET).join(MULTIPART_META_PREFIX)).await?;

        let format_rlk = format::init_format_fs(&fs_path).await?;
        debug!(path = %fs_path.display(), id = %format_rlk.format.id, "filesystem backend initialised");

        Ok(Arc::new(FsStore {
            fs_path,
            fs_uuid,
            ns_mutex: NsLockMap::new(),
            rw_pool: FsIoPool::new(),
            list_pool: TreeWalkPool::new(LOOKUP_TIMEOUT),
            _format_rlk: format_rlk,
            total_used: AtomicU64::new(0),
            usage_running: AtomicBool::new(false),
            worm,
        }))
    }

    pub fn fs_path(&self) -> &Path {
        &self.fs_path
    }

    // ------------------------------------------------------------------
    // Path helpers
    // ------------------------------------------------------------------

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket == "." || bucket == ".." {
            return Err(StorageError::VolumeNotFound);
        }
        Ok(self.fs_path.join(bucket))
    }

    fn object_path(&self, bucket: &str, object: &str) -> PathBuf {
        self.fs_path.join(bucket).join(object)
    }

    fn bucket_meta_dir(&self, bucket: &str) -> PathBuf {
        self.fs_path.join(META_BUCKET).join(BUCKET_META_PREFIX).join(bucket)
    }

    fn fs_meta_path(&self, bucket: &str, object: &str) -> PathBuf {
        self.bucket_meta_dir(bucket).join(object).join(FS_META_JSON_FILE)
    }

    pub(crate) fn tmp_path(&self) -> PathBuf {
        self.fs_path
            .join(META_BUCKET)
            .join(TMP_META_PREFIX)
            .join(&self.fs_uuid)
            .join(uuid::Uuid::new_v4().to_string())
    }

    pub(crate) fn multipart_bucket_dir(&self, bucket: &str) -> PathBuf {
        self.fs_path.join(META_BUCKET).join(MULTIPART_META_PREFIX).join(bucket)
    }

    async fn stat_bucket_dir(&self, bucket: &str) -> Result<std::fs::Metadata> {
        let bucket_dir = self.bucket_dir(bucket)?;
        osio::fs_stat_volume(&bucket_dir).await
    }

    // ------------------------------------------------------------------
    // Argument checks
    // ------------------------------------------------------------------

    fn check_bucket_name(bucket: &str) -> Result<()> {
        if !is_valid_bucket_name(bucket) {
            return Err(StorageError::BucketNameInvalid(bucket.to_string()));
        }
        Ok(())
    }

    fn check_object_args(&self, bucket: &str, object: &str) -> Result<()> {
        Self::check_bucket_name(bucket)?;
        if !is_valid_object_name(object) {
            return Err(StorageError::ObjectNameInvalid(bucket.to_string(), object.to_string()));
        }
        let full = self.object_path(bucket, object);
        if osio::check_path_length(&full.to_string_lossy()).is_err() {
            return Err(StorageError::ObjectNameInvalid(bucket.to_string(), object.to_string()));
        }
        Ok(())
    }

    fn check_prefix_args(&self, bucket: &str, prefix: &str) -> Result<()> {
        Self::check_bucket_name(bucket)?;
        if prefix.contains('\0') {
            return Err(StorageError::ObjectNameInvalid(bucket.to_string(), prefix.to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Object helpers
    // ------------------------------------------------------------------

    /// For object "a/b/c/d", makes sure none of "a", "a/b", "a/b/c" is a
    /// regular file. Recursion over the parent chain is bounded by the
    /// number of separators in the key.
    async fn parent_dir_is_object(&self, bucket: &str, parent: &str) -> bool {
        let mut p = parent.to_string();
        while p != "." && p != "/" && !p.is_empty() {
            if osio::fs_is_file(&self.object_path(bucket, &p)).await {
                return true;
            }
            p = key_dir(&p);
        }
        false
    }

    /// True when the prefix names an existing, empty directory: an S3
    /// directory object on this backend.
    async fn is_object_dir(&self, bucket: &str, prefix: &str) -> bool {
        osio::fs_is_empty_dir(&self.object_path(bucket, prefix)).await
    }

    /// Rebuilds a corrupt sidecar with a generated etag and an inferred
    /// content type. Caller holds the object write lock.
    async fn create_fs_json(&self, bucket: &str, object: &str) -> Result<()> {
        let fs_meta = FsMetaV1::regenerated_for(object);
        let meta_path = self.fs_meta_path(bucket, object);
        let wlk = self.rw_pool.create(&meta_path.to_string_lossy()).await?;
        wlk.write_all(&fs_meta.to_bytes())
    }

    /// Sidecar etag for the object; empty when there is no usable sidecar.
    async fn get_object_etag(&self, bucket: &str, object: &str) -> Result<String> {
        let meta_path = self.fs_meta_path(bucket, object).to_string_lossy().to_string();
        let rlk = match self.rw_pool.open(&meta_path).await {
            Ok(rlk) => rlk,
            Err(StorageError::FileNotFound) => return Ok(String::new()),
            Err(err) => return Err(err),
        };
        let data = rlk.read_all();
        self.rw_pool.close(&meta_path);
        let data = data?;

        // An empty fs.json is debris of a failed PUT transaction; ignore.
        if data.is_empty() {
            return Ok(String::new());
        }
        let fs_meta = FsMetaV1::parse(&data)?;
        Ok(fs_meta.etag().unwrap_or_default().to_string())
    }

    /// Reads object metadata without taking the namespace lock.
    async fn get_object_info_inner(&self, bucket: &str, object: &str) -> Result<ObjectInfo> {
        if object.ends_with('/') {
            // PUT of a "directory" object is supported, so HEAD is too.
            let path = self.object_path(bucket, object);
            if !osio::fs_is_dir(&path).await {
                return Err(StorageError::FileNotFound);
            }
            let meta = osio::fs_stat_dir(&path).await?;
            return Ok(ObjectInfo::from_fs_meta(bucket, object, &FsMetaV1::new(), &meta));
        }

        let meta_path = self.fs_meta_path(bucket, object).to_string_lossy().to_string();
        let fs_meta = match self.rw_pool.open(&meta_path).await {
            Ok(rlk) => {
                let data = rlk.read_all();
                self.rw_pool.close(&meta_path);
                FsMetaV1::parse(&data?)?
            }
            // Pre-existing data carries no sidecar; defaults apply.
            Err(StorageError::FileNotFound) => FsMetaV1::default_for(object),
            Err(err) => return Err(err),
        };

        let meta = osio::fs_stat_file(&self.object_path(bucket, object)).await?;
        Ok(ObjectInfo::from_fs_meta(bucket, object, &fs_meta, &meta))
    }

    async fn get_object_info_with_lock(&self, bucket: &str, object: &str) -> Result<ObjectInfo> {
        let lk = self.ns_mutex.new_lock(bucket, object);
        let _guard = lk.rlock(OBJECT_OP_TIMEOUT).await?;

        self.check_object_args(bucket, object)?;
        self.stat_bucket_dir(bucket).await?;

        if object.ends_with('/') && !self.is_object_dir(bucket, object).await {
            return Err(StorageError::FileNotFound);
        }

        self.get_object_info_inner(bucket, object).await
    }

    /// Streams object bytes. Assumes the caller holds the namespace lock;
    /// `pool_lock` controls whether the sidecar is pinned under the shared
    /// pool lock for the duration of the read.
    async fn get_object_inner(
        &self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        etag: &str,
        pool_lock: bool,
    ) -> Result<()> {
        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;

        if offset < 0 {
            return Err(to_object_err(StorageError::Unexpected, bucket, object));
        }

        // A directory request replies with an empty body.
        if object.ends_with('/') {
            writer.write_all(b"").await.map_err(StorageError::other)?;
            return Ok(());
        }

        let meta_path = self.fs_meta_path(bucket, object).to_string_lossy().to_string();
        let pinned = if bucket != META_BUCKET && pool_lock {
            match self.rw_pool.open(&meta_path).await {
                Ok(_) => true,
                Err(StorageError::FileNotFound) => false,
                Err(err) => return Err(to_object_err(err, bucket, object)),
            }
        } else {
            false
        };

        let result = self.copy_object_bytes(bucket, object, offset, length, writer, etag).await;
        if pinned {
            self.rw_pool.close(&meta_path);
        }
        result.map_err(|e| to_object_err(e, bucket, object))
    }

    async fn copy_object_bytes(
        &self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        etag: &str,
    ) -> Result<()> {
        if !etag.is_empty() && etag != DEFAULT_ETAG {
            let obj_etag = self.get_object_etag(bucket, object).await?;
            if obj_etag != etag {
                return Err(StorageError::InvalidETag);
            }
        }

        let (mut file, size) = osio::fs_open_file(&self.object_path(bucket, object), offset).await?;

        let mut length = length;
        if length < 0 {
            length = size - offset;
        }
        if offset > size || offset + length > size {
            return Err(StorageError::InvalidRange { offset, length, size });
        }

        let mut remaining = length as u64;
        let mut buf = vec![0u8; READ_BUFFER_SIZE.min(length.max(1) as usize)];
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            let n = file.read(&mut buf[..want]).await.map_err(crate::error::os_err_to_fs_err)?;
            if n == 0 {
                break;
            }
            match writer.write_all(&buf[..n]).await {
                Ok(()) => {}
                // The response writer went away; a client disconnect is not
                // a storage error.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
                Err(e) => return Err(StorageError::other(e)),
            }
            remaining -= n as u64;
        }
        writer.flush().await.ok();
        Ok(())
    }

    /// The write path shared by PutObject and CopyObject. Caller holds the
    /// object write lock.
    async fn put_object_inner(
        &self,
        bucket: &str,
        object: &str,
        data: &mut PutObjReader,
        metadata: HashMap<String, String>,
    ) -> Result<ObjectInfo> {
        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;

        let mut fs_meta = FsMetaV1::new();
        fs_meta.meta = metadata;

        // Zero-byte keys with a trailing slash are directory objects.
        if object.ends_with('/') && data.size() == 0 {
            if self.parent_dir_is_object(bucket, &key_dir(object)).await {
                return Err(to_object_err(StorageError::FileAccessDenied, bucket, object));
            }
            let path = self.object_path(bucket, object);
            osio::fs_mkdir_all(&path).await.map_err(|e| to_object_err(e, bucket, object))?;
            let meta = osio::fs_stat_dir(&path).await.map_err(|e| to_object_err(e, bucket, object))?;
            return Ok(ObjectInfo::from_fs_meta(bucket, object, &fs_meta, &meta));
        }

        if self.parent_dir_is_object(bucket, &key_dir(object)).await {
            return Err(to_object_err(StorageError::FileAccessDenied, bucket, object));
        }

        if data.size() < 0 {
            return Err(StorageError::InvalidArgument("negative content length".to_string()));
        }

        let wlk = if bucket != META_BUCKET {
            let meta_path = self.fs_meta_path(bucket, object);
            Some(
                self.rw_pool
                    .create(&meta_path.to_string_lossy())
                    .await
                    .map_err(|e| to_object_err(e, bucket, object))?,
            )
        } else {
            None
        };

        let tmp_path = self.tmp_path();
        let result = self
            .write_temp_and_publish(bucket, object, &tmp_path, wlk.as_ref(), data, &mut fs_meta)
            .await;

        // The temp file is gone on success (renamed); removing it here only
        // matters on the failure edges.
        let _ = osio::fs_remove_file(&tmp_path).await;
        if result.is_err() {
            if wlk.is_some() {
                let _ = osio::fs_delete_file(&self.bucket_meta_dir(bucket), &self.fs_meta_path(bucket, object)).await;
            }
        }

        result.map_err(|e| to_object_err(e, bucket, object))
    }

    async fn write_temp_and_publish(
        &self,
        bucket: &str,
        object: &str,
        tmp_path: &Path,
        wlk: Option<&rwpool::WLockedFile>,
        data: &mut PutObjReader,
        fs_meta: &mut FsMetaV1,
    ) -> Result<ObjectInfo> {
        let bytes_written = osio::fs_create_file(tmp_path, data).await?;

        fs_meta.set_etag(data.md5_current_hex());

        // A reader that ran dry before the declared length is a truncated
        // upload, unless a compressing writer shrank it on purpose.
        if !fs_meta.is_compressed() && data.size() > 0 && (bytes_written as i64) < data.size() {
            return Err(StorageError::IncompleteBody);
        }

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

    fn compress_size_modified(previous: &ObjectInfo, current: &ObjectInfo) -> bool {
        if previous.parts.is_empty() && current.parts.is_empty() {
            let prev_size = previous.decompressed_size().unwrap_or(0);
            let curr_size = current.decompressed_size().unwrap_or(0);
            (prev_size > 0 || curr_size > 0) && prev_size != curr_size
        } else if !previous.parts.is_empty() && !current.parts.is_empty() {
            previous.parts.len() != current.parts.len()
                || previous
                    .parts
                    .iter()
                    .zip(current.parts.iter())
                    .any(|(a, b)| a.size != b.size)
        } else {
            // Re-uploaded with a different shape entirely.
            true
        }
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    fn walk_source(&self) -> Arc<dyn TreeWalkSource> {
        Arc::new(FsWalkSource {
            fs_path: self.fs_path.clone(),
        })
    }

    /// Stat-and-sidecar conversion for a walked entry, under a short
    /// per-entry read lock so concurrent deletes and renames cannot tear
    /// the view.
    async fn entry_to_object_info(&self, bucket: &str, entry: &str) -> Result<ObjectInfo> {
        let lk = self.ns_mutex.new_lock(bucket, entry);
        let _guard = lk.rlock(LISTING_TIMEOUT).await?;
        self.get_object_info_inner(bucket, entry).await
    }

    // ------------------------------------------------------------------
    // Disk usage
    // ------------------------------------------------------------------

    /// Recomputes total usage over the export. Single-flight: a scan in
    /// progress makes this a no-op.
    pub async fn refresh_disk_usage(&self) {
        if self.usage_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut usage: u64 = 0;
        let mut stack = vec![self.fs_path.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(mut rd) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = rd.next_entry().await {
                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file() {
                    if let Ok(meta) = entry.metadata().await {
                        usage += meta.len();
                    }
                }
            }
        }

        self.total_used.store(usage, Ordering::SeqCst);
        self.usage_running.store(false, Ordering::SeqCst);
    }

    pub fn total_used(&self) -> u64 {
        self.total_used.load(Ordering::SeqCst)
    }
}

struct FsWalkSource {
    fs_path: PathBuf,
}

#[async_trait::async_trait]
impl TreeWalkSource for FsWalkSource {
    async fn list_dir(&self, bucket: &str, prefix_dir: &str, entry_prefix: &str) -> Result<Vec<String>> {
        let path = self.fs_path.join(bucket).join(prefix_dir);
        let entries = osio::read_dir_entries(&path).await?;
        Ok(entries.into_iter().filter(|e| e.starts_with(entry_prefix)).collect())
    }

    async fn is_leaf_dir(&self, bucket: &str, entry: &str) -> bool {
        osio::fs_is_empty_dir(&self.fs_path.join(bucket).join(entry)).await
    }
}

#[async_trait::async_trait]
impl ObjectLayer for FsStore {
    async fn shutdown(&self) -> Result<()> {
        osio::fs_remove_all(&self.fs_path.join(META_BUCKET).join(TMP_META_PREFIX).join(&self.fs_uuid)).await
    }

    async fn storage_info(&self) -> StorageInfo {
        StorageInfo {
            used: self.total_used(),
            backend: BackendType::Fs,
        }
    }

    async fn make_bucket(&self, bucket: &str, _location: &str) -> Result<()> {
        let lk = self.ns_mutex.new_lock(bucket, "");
        let _guard = lk.lock(OBJECT_OP_TIMEOUT).await?;

        Self::check_bucket_name(bucket)?;
        let bucket_dir = self.bucket_dir(bucket).map_err(|e| to_object_err(e, bucket, ""))?;
        osio::fs_mkdir(&bucket_dir).await.map_err(|e| to_object_err(e, bucket, ""))
    }

    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo> {
        let lk = self.ns_mutex.new_lock(bucket, "");
        let _guard = lk.rlock(OBJECT_OP_TIMEOUT).await?;

        let meta = self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;
        Ok(BucketInfo {
            name: bucket.to_string(),
            // Stat carries no birth time; mtime doubles as created-time.
            created: meta.modified().ok().map(time::OffsetDateTime::from),
        })
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        osio::check_path_length(&self.fs_path.to_string_lossy())?;

        let entries = match osio::read_dir_entries(&self.fs_path).await {
            Ok(entries) => entries,
            Err(_) => return Err(StorageError::DiskNotFound),
        };

        let mut buckets = Vec::new();
        for entry in entries {
            let Some(name) = entry.strip_suffix('/') else {
                continue;
            };
            if name == META_BUCKET || !is_valid_bucket_name(name) {
                continue;
            }
            // Buckets that fail to stat are simply not listed.
            let Ok(meta) = osio::fs_stat_volume(&self.fs_path.join(name)).await else {
                continue;
            };
            buckets.push(BucketInfo {
                name: name.to_string(),
                created: meta.modified().ok().map(time::OffsetDateTime::from),
            });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let lk = self.ns_mutex.new_lock(bucket, "");
        let _guard = lk.lock(OBJECT_OP_TIMEOUT).await?;

        let bucket_dir = self.bucket_dir(bucket).map_err(|e| to_object_err(e, bucket, ""))?;
        osio::fs_remove_dir(&bucket_dir).await.map_err(|e| to_object_err(e, bucket, ""))?;

        // Sidecar tree, policy and pending multipart state go with the
        // bucket.
        osio::fs_remove_all(&self.bucket_meta_dir(bucket)).await?;
        osio::fs_remove_all(&self.multipart_bucket_dir(bucket)).await?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: i32,
    ) -> Result<ListObjectsInfo> {
        self.check_prefix_args(bucket, prefix)?;

        // A marker that does not extend the prefix cannot match anything.
        if !marker.is_empty() && !marker.starts_with(prefix) {
            return Ok(ListObjectsInfo::default());
        }

        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;

        if max_keys == 0 {
            return Ok(ListObjectsInfo::default());
        }

        // With both delimiter and prefix '/', there is nothing to list: all
        // keys are of the form name/...
        if delimiter == "/" && prefix == "/" {
            return Ok(ListObjectsInfo::default());
        }

        let max_keys = if max_keys < 0 || max_keys > MAX_OBJECT_LIST {
            MAX_OBJECT_LIST
        } else {
            max_keys
        } as usize;

        let recursive = delimiter != "/";

        let params = ListParams {
            bucket: bucket.to_string(),
            recursive,
            marker: marker.to_string(),
            prefix: prefix.to_string(),
            heal: false,
        };

        let (mut rx, cancel) = match self.list_pool.release(&params) {
            Some(parked) => parked,
            None => {
                let cancel = CancellationToken::new();
                let rx = start_tree_walk(
                    self.walk_source(),
                    bucket.to_string(),
                    prefix.to_string(),
                    marker.to_string(),
                    recursive,
                    cancel.clone(),
                );
                (rx, cancel)
            }
        };

        let mut obj_infos: Vec<ObjectInfo> = Vec::new();
        let mut eof = false;
        let mut next_marker = String::new();

        while obj_infos.len() < max_keys {
            let Some(walk_result) = rx.recv().await else {
                eof = true;
                break;
            };

            if let Some(err) = walk_result.err {
                // A vanished directory mid-walk is an empty page, not an
                // error.
                if matches!(err, StorageError::FileNotFound) {
                    return Ok(ListObjectsInfo::default());
                }
                return Err(to_object_err(err, bucket, prefix));
            }

            let end = walk_result.end;
            match self.entry_to_object_info(bucket, &walk_result.entry).await {
                Ok(obj_info) => {
                    next_marker = obj_info.name.clone();
                    obj_infos.push(obj_info);
                }
                // Entries with unreadable metadata are skipped, not fatal.
                Err(StorageError::CorruptedFormat) | Err(StorageError::FileCorrupt) | Err(StorageError::FileNotFound) => {
                    warn!(bucket, entry = %walk_result.entry, "skipping entry with unusable metadata");
                }
                Err(err) => return Err(to_object_err(err, bucket, "")),
            }

            if end {
                eof = true;
                break;
            }
        }

        if !eof {
            let resume = ListParams {
                marker: next_marker.clone(),
                ..params
            };
            self.list_pool.set(resume, rx, cancel);
        }

        let mut result = ListObjectsInfo {
            is_truncated: !eof,
            ..Default::default()
        };
        for obj_info in obj_infos {
            result.next_marker = Some(obj_info.name.clone());
            if obj_info.is_dir && delimiter == "/" {
                result.prefixes.push(obj_info.name);
                continue;
            }
            result.objects.push(obj_info);
        }
        Ok(result)
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: &str,
        delimiter: &str,
        max_keys: i32,
        _fetch_owner: bool,
        _start_after: &str,
    ) -> Result<ListObjectsV2Info> {
        let loi = self.list_objects(bucket, prefix, continuation_token, delimiter, max_keys).await?;
        Ok(ListObjectsV2Info {
            is_truncated: loi.is_truncated,
            continuation_token: if continuation_token.is_empty() {
                None
            } else {
                Some(continuation_token.to_string())
            },
            next_continuation_token: loi.next_marker,
            objects: loi.objects,
            prefixes: loi.prefixes,
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        etag: &str,
        obj_info: Option<&ObjectInfo>,
    ) -> Result<()> {
        self.check_object_args(bucket, object)?;

        let lk = self.ns_mutex.new_lock(bucket, object);
        let _guard = lk.rlock(OBJECT_OP_TIMEOUT).await?;

        // Compressed objects must not be served from metadata that changed
        // while the caller prepared the read; such reads fail retryably.
        if let Some(previous) = obj_info {
            if previous.is_compressed() {
                let current = self
                    .get_object_info_inner(bucket, object)
                    .await
                    .map_err(|e| to_object_err(e, bucket, object))?;
                if Self::compress_size_modified(previous, &current) {
                    return Err(to_object_err(StorageError::ReadBlock, bucket, object));
                }
            }
        }

        self.get_object_inner(bucket, object, offset, length, writer, etag, true).await
    }

    async fn get_object_info(&self, bucket: &str, object: &str) -> Result<ObjectInfo> {
        let result = self.get_object_info_with_lock(bucket, object).await;
        match result {
            // A corrupt or empty sidecar is rebuilt under the write lock,
            // then the read is retried.
            Err(StorageError::CorruptedFormat) => {
                {
                    let lk = self.ns_mutex.new_lock(bucket, object);
                    let _guard = lk.lock(OBJECT_OP_TIMEOUT).await?;
                    self.create_fs_json(bucket, object)
                        .await
                        .map_err(|e| to_object_err(e, bucket, object))?;
                }
                self.get_object_info_with_lock(bucket, object)
                    .await
                    .map_err(|e| to_object_err(e, bucket, object))
            }
            result => result.map_err(|e| to_object_err(e, bucket, object)),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        data: &mut PutObjReader,
        metadata: HashMap<String, String>,
    ) -> Result<ObjectInfo> {
        self.check_object_args(bucket, object)?;

        let lk = self.ns_mutex.new_lock(bucket, object);
        let _guard = lk.lock(OBJECT_OP_TIMEOUT).await?;

        self.put_object_inner(bucket, object, data, metadata).await
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        src_info: &mut ObjectInfo,
    ) -> Result<ObjectInfo> {
        self.check_object_args(src_bucket, src_object)?;
        self.check_object_args(dst_bucket, dst_object)?;

        let cp_src_dst_same = path_join(&[src_bucket, src_object]) == path_join(&[dst_bucket, dst_object]);

        // The destination write lock comes first; together with the
        // source read lock below this defines the total order that keeps
        // two crossed copies from deadlocking.
        let dst_lk = self.ns_mutex.new_lock(dst_bucket, dst_object);
        let _dst_guard = dst_lk.lock(OBJECT_OP_TIMEOUT).await?;

        let _src_guard = if !cp_src_dst_same {
            let src_lk = self.ns_mutex.new_lock(src_bucket, src_object);
            Some(src_lk.rlock(OBJECT_OP_TIMEOUT).await?)
        } else {
            None
        };

        self.stat_bucket_dir(src_bucket)
            .await
            .map_err(|e| to_object_err(e, src_bucket, ""))?;

        if cp_src_dst_same && src_info.metadata_only {
            let meta_path = self.fs_meta_path(src_bucket, src_object).to_string_lossy().to_string();
            let wlk = self
                .rw_pool
                .write(&meta_path)
                .await
                .map_err(|e| to_object_err(e, src_bucket, src_object))?;

            let data = wlk.read_all().map_err(|e| to_object_err(e, src_bucket, src_object))?;
            let mut fs_meta = FsMetaV1::parse(&data).map_err(|e| to_object_err(e.into(), src_bucket, src_object))?;
            fs_meta.meta = src_info.user_defined.clone();
            fs_meta.set_etag(src_info.etag.clone().unwrap_or_default());
            wlk.write_all(&fs_meta.to_bytes())?;

            let meta = osio::fs_stat_file(&self.object_path(src_bucket, src_object))
                .await
                .map_err(|e| to_object_err(e, src_bucket, src_object))?;
            return Ok(ObjectInfo::from_fs_meta(src_bucket, src_object, &fs_meta, &meta));
        }

        // Pipe the source read straight into a regular PUT on the
        // destination. A source failure shuts the pipe early, which the PUT
        // sees as a short body and unwinds; a destination failure drops the
        // read half, which the source side sees as a gone client.
        let (pipe_r, mut pipe_w) = tokio::io::duplex(READ_BUFFER_SIZE);
        let size = src_info.size;
        let src_etag = src_info.etag.clone().unwrap_or_default();

        let mut reader = PutObjReader::new(Box::new(pipe_r), size);
        let metadata = src_info.user_defined.clone();

        let get_side = async {
            let result = self
                .get_object_inner(src_bucket, src_object, 0, size, &mut pipe_w, &src_etag, !cp_src_dst_same)
                .await;
            let _ = pipe_w.shutdown().await;
            result
        };
        let put_side = self.put_object_inner(dst_bucket, dst_object, &mut reader, metadata);

        let (get_result, put_result) = tokio::join!(get_side, put_side);
        if let Err(err) = get_result {
            warn!(src_bucket, src_object, %err, "copy source read failed");
        }
        put_result.map_err(|e| to_object_err(e, dst_bucket, dst_object))
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()> {
        self.check_object_args(bucket, object)?;

        let lk = self.ns_mutex.new_lock(bucket, object);
        let _guard = lk.lock(OPERATION_TIMEOUT).await?;

        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;

        let meta_path = self.fs_meta_path(bucket, object).to_string_lossy().to_string();
        let _wlk = if bucket != META_BUCKET {
            match self.rw_pool.write(&meta_path).await {
                Ok(wlk) => Some(wlk),
                Err(StorageError::FileNotFound) => None,
                Err(err) => return Err(to_object_err(err, bucket, object)),
            }
        } else {
            None
        };

        let bucket_dir = self.bucket_dir(bucket)?;
        osio::fs_delete_file(&bucket_dir, &self.object_path(bucket, object))
            .await
            .map_err(|e| to_object_err(e, bucket, object))?;

        if bucket != META_BUCKET {
            match osio::fs_delete_file(&self.fs_path.join(META_BUCKET), &self.fs_meta_path(bucket, object)).await {
                Ok(()) | Err(StorageError::FileNotFound) => {}
                Err(err) => return Err(to_object_err(err, bucket, object)),
            }
        }
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        delimiter: &str,
        max_uploads: usize,
    ) -> Result<ListMultipartsInfo> {
        self.fs_list_multipart_uploads(bucket, prefix, key_marker, upload_id_marker, delimiter, max_uploads)
            .await
    }

    async fn new_multipart_upload(&self, bucket: &str, object: &str, metadata: HashMap<String, String>) -> Result<String> {
        self.fs_new_multipart_upload(bucket, object, metadata).await
    }

    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: &mut PutObjReader,
    ) -> Result<PartInfo> {
        self.fs_put_object_part(bucket, object, upload_id, part_id, data).await
    }

    async fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: usize,
        max_parts: usize,
    ) -> Result<ListPartsInfo> {
        self.fs_list_object_parts(bucket, object, upload_id, part_number_marker, max_parts).await
    }

    async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()> {
        self.fs_abort_multipart_upload(bucket, object, upload_id).await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
    ) -> Result<ObjectInfo> {
        self.fs_complete_multipart_upload(bucket, object, upload_id, uploaded_parts).await
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: serde_json::Value) -> Result<()> {
        self.stat_bucket_dir(bucket).await.map_err(|e| to_object_err(e, bucket, ""))?;

        let policy_path = self.bucket_meta_dir(bucket).join(BUCKET_POLICY_FILE);
        if let Some(parent) = policy_path.parent() {
            osio::fs_mkdir_all(parent).await?;
        }
        let data = serde_json::to_vec(&policy).map_err(StorageError::other)?;
        tokio::fs::write(&policy_path, data)
            .await
            .map_err(|e| to_object_err(crate::error::os_err_to_fs_err(e), bucket, ""))
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<serde_json::Value> {
        let policy_path = self.bucket_meta_dir(bucket).join(BUCKET_POLICY_FILE);
        let data = match tokio::fs::read(&policy_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::BucketPolicyNotFound(bucket.to_string()))
            }
            Err(e) => return Err(to_object_err(crate::error::os_err_to_fs_err(e), bucket, "")),
        };
        serde_json::from_slice(&data).map_err(StorageError::other)
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> Result<()> {
        let policy_path = self.bucket_meta_dir(bucket).join(BUCKET_POLICY_FILE);
        match tokio::fs::remove_file(&policy_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::BucketPolicyNotFound(bucket.to_string()))
            }
            Err(e) => Err(to_object_err(crate::error::os_err_to_fs_err(e), bucket, "")),
        }
    }
}
