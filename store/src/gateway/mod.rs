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

//! The gateway object layer: the same contract as the filesystem backend,
//! served by a remote cloud object store. Buckets map to the first path
//! segment of the remote namespace; everything the emulation needs lives
//! under a hidden per-bucket prefix that listings filter out. Multipart is
//! emulated in [`multipart`]; the remote API is the generic
//! [`object_store::ObjectStore`] trait.

mod multipart;

pub use multipart::spawn_gateway_tmp_cleaner;

use futures::StreamExt;
use lazy_static::lazy_static;
use object_store::path::Path as RemotePath;
use object_store::{Attribute, Attributes, GetOptions, GetRange, ObjectMeta, ObjectStore, PutPayload};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use ferrofs_filemeta::headers;
use ferrofs_utils::path::trim_etag;
use ferrofs_utils::{is_valid_bucket_name, DEFAULT_ETAG};

use crate::error::{Result, StorageError};
use crate::store_api::{
    BackendType, BucketInfo, CompletePart, ListMultipartsInfo, ListObjectsInfo, ListObjectsV2Info, ListPartsInfo, ObjectInfo,
    ObjectLayer, PartInfo, PutObjReader, StorageInfo,
};
use crate::{GATEWAY_SYS_TMP, MAX_OBJECT_LIST};

/// Sentinel prefixed to remote-issued continuation markers, so they never
/// collide with user-supplied object-key markers.
pub const GATEWAY_TOKEN_PREFIX: &str = "{ferrofs}";

/// Name of the per-bucket marker object, parked under the hidden prefix.
const BUCKET_MARKER: &str = "bucket.marker";

lazy_static! {
    static ref PROJECT_ID_RE: Regex = Regex::new("^[a-z][a-z0-9-]{5,29}$").expect("project id regex");
}

/// Project ids start with a lowercase letter and run 6 to 30 characters of
/// lowercase letters, digits and hyphens.
pub fn is_valid_project_id(project_id: &str) -> bool {
    PROJECT_ID_RE.is_match(project_id)
}

/// Pulls `project_id` out of an application credentials JSON file.
pub fn parse_project_id(creds_file: &str) -> Result<String> {
    let contents = std::fs::read(creds_file).map_err(StorageError::other)?;
    let creds: serde_json::Value = serde_json::from_slice(&contents).map_err(StorageError::other)?;
    creds
        .get("project_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| StorageError::InvalidArgument("credentials file has no project_id".to_string()))
}

/// Gateway backend over a remote object store root.
pub struct GatewayStore {
    remote: Arc<dyn ObjectStore>,
}

fn gw_err(err: object_store::Error, bucket: &str, object: &str) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => {
            if object.is_empty() {
                StorageError::BucketNotFound(bucket.to_string())
            } else {
                StorageError::ObjectNotFound(bucket.to_string(), object.to_string())
            }
        }
        object_store::Error::AlreadyExists { .. } => {
            StorageError::ObjectAlreadyExists(bucket.to_string(), object.to_string())
        }
        err => StorageError::other(err),
    }
}

fn to_offset_datetime(dt: chrono::DateTime<chrono::Utc>) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(dt.timestamp_nanos_opt()? as i128).ok()
}

/// Lifts request metadata onto remote object attributes, splitting the
/// well-known headers from user metadata.
fn attributes_from_metadata(metadata: &HashMap<String, String>) -> Attributes {
    let mut attrs = Attributes::new();
    for (key, value) in metadata {
        let lower = key.to_ascii_lowercase();
        match lower.as_str() {
            headers::CONTENT_TYPE => {
                attrs.insert(Attribute::ContentType, value.clone().into());
            }
            headers::CONTENT_ENCODING => {
                attrs.insert(Attribute::ContentEncoding, value.clone().into());
            }
            headers::CACHE_CONTROL => {
                attrs.insert(Attribute::CacheControl, value.clone().into());
            }
            headers::CONTENT_DISPOSITION => {
                attrs.insert(Attribute::ContentDisposition, value.clone().into());
            }
            headers::CONTENT_LANGUAGE => {
                attrs.insert(Attribute::ContentLanguage, value.clone().into());
            }
            _ if headers::is_amz_meta(&lower) => {
                attrs.insert(Attribute::Metadata(std::borrow::Cow::Owned(lower)), value.clone().into());
            }
            _ => {}
        }
    }
    attrs
}

fn object_info_from_remote(bucket: &str, object: &str, meta: &ObjectMeta, attrs: &Attributes) -> ObjectInfo {
    let mut user_defined = HashMap::new();
    let mut content_type = None;
    let mut content_encoding = None;
    for (attr, value) in attrs.iter() {
        match attr {
            Attribute::ContentType => {
                content_type = Some(value.to_string());
                user_defined.insert(headers::CONTENT_TYPE.to_string(), value.to_string());
            }
            Attribute::ContentEncoding => {
                content_encoding = Some(value.to_string());
                user_defined.insert(headers::CONTENT_ENCODING.to_string(), value.to_string());
            }
            Attribute::CacheControl => {
                user_defined.insert(headers::CACHE_CONTROL.to_string(), value.to_string());
            }
            Attribute::ContentDisposition => {
                user_defined.insert(headers::CONTENT_DISPOSITION.to_string(), value.to_string());
            }
            Attribute::ContentLanguage => {
                user_defined.insert(headers::CONTENT_LANGUAGE.to_string(), value.to_string());
            }
            Attribute::Metadata(key) => {
                user_defined.insert(key.to_string(), value.to_string());
            }
            _ => {}
        }
    }

    ObjectInfo {
        bucket: bucket.to_string(),
        name: object.to_string(),
        mod_time: to_offset_datetime(meta.last_modified),
        size: meta.size as i64,
        is_dir: false,
        etag: meta.e_tag.as_deref().map(trim_etag),
        content_type,
        content_encoding,
        user_defined,
        parts: Vec::new(),
        metadata_only: false,
    }
}

impl GatewayStore {
    pub fn new(remote: Arc<dyn ObjectStore>) -> Arc<Self> {
        Arc::new(GatewayStore { remote })
    }

    pub(crate) fn remote(&self) -> &Arc<dyn ObjectStore> {
        &self.remote
    }

    pub(crate) fn remote_path(&self, bucket: &str, key: &str) -> RemotePath {
        RemotePath::from(format!("{bucket}/{key}"))
    }

    fn bucket_marker_path(&self, bucket: &str) -> RemotePath {
        RemotePath::from(format!("{bucket}/{GATEWAY_SYS_TMP}{BUCKET_MARKER}"))
    }

    /// The key (bucket-relative) for a remote location, when the location
    /// sits inside the bucket.
    fn key_of(&self, bucket: &str, location: &RemotePath) -> Option<String> {
        location.as_ref().strip_prefix(&format!("{bucket}/")).map(str::to_string)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        if self.remote.head(&self.bucket_marker_path(bucket)).await.is_ok() {
            return Ok(true);
        }
        let prefix = RemotePath::from(bucket);
        let mut stream = self.remote.list(Some(&prefix));
        match stream.next().await {
            Some(Ok(_)) => Ok(true),
            Some(Err(err)) => Err(gw_err(err, bucket, "")),
            None => Ok(false),
        }
    }

    async fn check_bucket_exists(&self, bucket: &str) -> Result<()> {
        if !self.bucket_exists(bucket).await? {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        Ok(())
    }

    /// Head-with-attributes on a remote object.
    pub(crate) async fn remote_attrs(&self, path: &RemotePath) -> core::result::Result<(ObjectMeta, Attributes), object_store::Error> {
        let mut options = GetOptions::default();
        options.head = true;
        let result = self.remote.get_opts(path, options).await?;
        Ok((result.meta.clone(), result.attributes.clone()))
    }

    /// Streams the reader into the remote object with the given attributes.
    /// Returns the byte count.
    pub(crate) async fn stream_to_remote(
        &self,
        path: &RemotePath,
        data: &mut PutObjReader,
        attrs: Attributes,
    ) -> Result<u64> {
        let mut writer = object_store::buffered::BufWriter::new(self.remote.clone(), path.clone()).with_attributes(attrs);
        let mut buf = vec![0u8; 64 * 1024];
        let mut written: u64 = 0;
        loop {
            let n = data.read_chunk(&mut buf).await.map_err(StorageError::other)?;
            if n == 0 {
                break;
            }
            if let Err(err) = writer.write_all(&buf[..n]).await {
                let _ = writer.shutdown().await;
                return Err(StorageError::other(err));
            }
            written += n as u64;
        }
        writer.shutdown().await.map_err(StorageError::other)?;
        Ok(written)
    }

    /// True when a bucket-relative key belongs to the hidden emulation
    /// prefix and must not surface in a listing for `prefix`.
    fn hide_key(key: &str, prefix: &str) -> bool {
        key.starts_with(GATEWAY_SYS_TMP.trim_end_matches('/')) && !prefix.starts_with(GATEWAY_SYS_TMP.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl ObjectLayer for GatewayStore {
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn storage_info(&self) -> StorageInfo {
        StorageInfo {
            used: 0,
            backend: BackendType::Gateway,
        }
    }

    async fn make_bucket(&self, bucket: &str, _location: &str) -> Result<()> {
        if !is_valid_bucket_name(bucket) {
            return Err(StorageError::BucketNameInvalid(bucket.to_string()));
        }
        if self.bucket_exists(bucket).await? {
            return Err(StorageError::BucketAlreadyOwnedByYou(bucket.to_string()));
        }
        self.remote
            .put(&self.bucket_marker_path(bucket), PutPayload::default())
            .await
            .map_err(|e| gw_err(e, bucket, ""))?;
        Ok(())
    }

    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo> {
        match self.remote.head(&self.bucket_marker_path(bucket)).await {
            Ok(meta) => Ok(BucketInfo {
                name: bucket.to_string(),
                created: to_offset_datetime(meta.last_modified),
            }),
            Err(object_store::Error::NotFound { .. }) => {
                self.check_bucket_exists(bucket).await?;
                Ok(BucketInfo {
                    name: bucket.to_string(),
                    created: None,
                })
            }
            Err(err) => Err(gw_err(err, bucket, "")),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let listing = self
            .remote
            .list_with_delimiter(None)
            .await
            .map_err(|e| gw_err(e, "", ""))?;

        let mut buckets = Vec::new();
        for prefix in listing.common_prefixes {
            let name = prefix.as_ref().to_string();
            if !is_valid_bucket_name(&name) {
                continue;
            }
            let created = match self.remote.head(&self.bucket_marker_path(&name)).await {
                Ok(meta) => to_offset_datetime(meta.last_modified),
                Err(_) => None,
            };
            buckets.push(BucketInfo { name, created });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let prefix = RemotePath::from(bucket);
        let listing = self
            .remote
            .list_with_delimiter(Some(&prefix))
            .await
            .map_err(|e| gw_err(e, bucket, ""))?;

        let hidden = format!("{bucket}/{}", GATEWAY_SYS_TMP.trim_end_matches('/'));
        let mut hidden_found = false;
        let mut empty = true;
        for p in &listing.common_prefixes {
            empty = false;
            if p.as_ref() == hidden {
                hidden_found = true;
                continue;
            }
            return Err(StorageError::BucketNotEmpty(bucket.to_string()));
        }
        for o in &listing.objects {
            empty = false;
            if o.location.as_ref().starts_with(&hidden) {
                hidden_found = true;
                continue;
            }
            return Err(StorageError::BucketNotEmpty(bucket.to_string()));
        }

        if empty {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }

        if hidden_found {
            // Clear the emulation state, bucket marker included; the bucket
            // disappears with its last object.
            let hidden_prefix = RemotePath::from(hidden);
            let mut stream = self.remote.list(Some(&hidden_prefix));
            while let Some(entry) = stream.next().await {
                let entry = entry.map_err(|e| gw_err(e, bucket, ""))?;
                self.remote
                    .delete(&entry.location)
                    .await
                    .map_err(|e| gw_err(e, bucket, ""))?;
            }
        }
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
        self.check_bucket_exists(bucket).await?;

        if max_keys == 0 {
            return Ok(ListObjectsInfo::default());
        }
        let max_keys = if max_keys < 0 || max_keys > MAX_OBJECT_LIST {
            MAX_OBJECT_LIST
        } else {
            max_keys
        } as usize;

        // A remote-issued marker is the raw remote key behind the sentinel;
        // a user marker is a bucket-relative key honoured by lexicographic
        // skip. Both resolve to an exclusive remote offset.
        let offset_key = if let Some(token) = marker.strip_prefix(GATEWAY_TOKEN_PREFIX) {
            Some(token.to_string())
        } else if !marker.is_empty() {
            Some(format!("{bucket}/{marker}"))
        } else {
            None
        };

        // The remote API matches prefixes on whole path segments, while S3
        // prefixes are plain string prefixes. List from the enclosing
        // directory and filter on the full prefix string.
        let prefix_dir = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let full_prefix = if prefix_dir.is_empty() {
            RemotePath::from(bucket)
        } else {
            RemotePath::from(format!("{bucket}/{prefix_dir}"))
        };

        match delimiter {
            "" => {
                let mut stream = match &offset_key {
                    Some(offset) => self
                        .remote
                        .list_with_offset(Some(&full_prefix), &RemotePath::from(offset.clone())),
                    None => self.remote.list(Some(&full_prefix)),
                };

                let mut objects = Vec::new();
                let mut is_truncated = false;
                let mut next_marker = None;
                while let Some(entry) = stream.next().await {
                    let entry = entry.map_err(|e| gw_err(e, bucket, prefix))?;
                    let Some(key) = self.key_of(bucket, &entry.location) else {
                        continue;
                    };
                    if !key.starts_with(prefix) || Self::hide_key(&key, prefix) {
                        continue;
                    }
                    if objects.len() == max_keys {
                        is_truncated = true;
                        break;
                    }
                    next_marker = Some(format!("{GATEWAY_TOKEN_PREFIX}{}", entry.location.as_ref()));
                    objects.push(object_info_from_remote(bucket, &key, &entry, &Attributes::new()));
                }

                Ok(ListObjectsInfo {
                    is_truncated,
                    next_marker: if is_truncated { next_marker } else { None },
                    objects,
                    prefixes: Vec::new(),
                })
            }
            "/" => {
                let listing = self
                    .remote
                    .list_with_delimiter(Some(&full_prefix))
                    .await
                    .map_err(|e| gw_err(e, bucket, prefix))?;

                // Merge objects and common prefixes in key order so marker
                // skipping and truncation see one sorted sequence.
                enum Entry {
                    Object(ObjectMeta),
                    Prefix(String),
                }
                let mut entries: Vec<(String, Entry)> = Vec::new();
                for meta in listing.objects {
                    entries.push((meta.location.as_ref().to_string(), Entry::Object(meta)));
                }
                for p in listing.common_prefixes {
                    entries.push((format!("{}/", p.as_ref()), Entry::Prefix(format!("{}/", p.as_ref()))));
                }
                entries.sort_by(|a, b| a.0.cmp(&b.0));

                let mut objects = Vec::new();
                let mut prefixes = Vec::new();
                let mut is_truncated = false;
                let mut next_marker = None;
                for (remote_key, entry) in entries {
                    if let Some(offset) = &offset_key {
                        if remote_key.as_str() <= offset.as_str() {
                            continue;
                        }
                    }
                    let Some(key) = remote_key.strip_prefix(&format!("{bucket}/")).map(str::to_string) else {
                        continue;
                    };
                    if !key.starts_with(prefix) || Self::hide_key(&key, prefix) {
                        continue;
                    }
                    if objects.len() + prefixes.len() == max_keys {
                        is_truncated = true;
                        break;
                    }
                    next_marker = Some(format!("{GATEWAY_TOKEN_PREFIX}{remote_key}"));
                    match entry {
                        Entry::Object(meta) => objects.push(object_info_from_remote(bucket, &key, &meta, &Attributes::new())),
                        Entry::Prefix(_) => prefixes.push(key),
                    }
                }

                Ok(ListObjectsInfo {
                    is_truncated,
                    next_marker: if is_truncated { next_marker } else { None },
                    objects,
                    prefixes,
                })
            }
            _ => Err(StorageError::NotImplemented),
        }
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
        _obj_info: Option<&ObjectInfo>,
    ) -> Result<()> {
        // Mimic S3 exactly: a missing bucket reports as such even though
        // the remote would just say the object is gone.
        self.check_bucket_exists(bucket).await?;

        if offset < 0 {
            return Err(StorageError::Unexpected);
        }

        let path = self.remote_path(bucket, object);
        let meta = self.remote.head(&path).await.map_err(|e| gw_err(e, bucket, object))?;
        let size = meta.size as i64;

        if !etag.is_empty() && etag != DEFAULT_ETAG {
            let remote_etag = meta.e_tag.as_deref().map(trim_etag).unwrap_or_default();
            if remote_etag != etag {
                return Err(StorageError::InvalidETag);
            }
        }

        let length = if length < 0 { size - offset } else { length };
        if offset > size || offset + length > size {
            return Err(StorageError::InvalidRange { offset, length, size });
        }
        if length == 0 {
            return Ok(());
        }

        let mut options = GetOptions::default();
        options.range = Some(GetRange::Bounded(offset as usize..(offset + length) as usize));
        let result = self.remote.get_opts(&path, options).await.map_err(|e| gw_err(e, bucket, object))?;

        let mut stream = result.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| gw_err(e, bucket, object))?;
            match writer.write_all(&chunk).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
                Err(e) => return Err(StorageError::other(e)),
            }
        }
        writer.flush().await.ok();
        Ok(())
    }

    async fn get_object_info(&self, bucket: &str, object: &str) -> Result<ObjectInfo> {
        self.check_bucket_exists(bucket).await?;
        let path = self.remote_path(bucket, object);
        let (meta, attrs) = self.remote_attrs(&path).await.map_err(|e| gw_err(e, bucket, object))?;
        Ok(object_info_from_remote(bucket, object, &meta, &attrs))
    }

    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        data: &mut PutObjReader,
        metadata: HashMap<String, String>,
    ) -> Result<ObjectInfo> {
        self.check_bucket_exists(bucket).await?;

        let path = self.remote_path(bucket, object);
        let written = self.stream_to_remote(&path, data, attributes_from_metadata(&metadata)).await?;

        if data.size() > 0 && (written as i64) < data.size() {
            let _ = self.remote.delete(&path).await;
            return Err(StorageError::IncompleteBody);
        }

        let (meta, attrs) = self.remote_attrs(&path).await.map_err(|e| gw_err(e, bucket, object))?;
        debug!(bucket, object, size = written, "gateway put complete");
        Ok(object_info_from_remote(bucket, object, &meta, &attrs))
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        src_info: &mut ObjectInfo,
    ) -> Result<ObjectInfo> {
        let src = self.remote_path(src_bucket, src_object);
        let dst = self.remote_path(dst_bucket, dst_object);

        // The generic remote API cannot rewrite attributes in place, so a
        // copy always re-uploads with the caller's metadata applied.
        let result = self
            .remote
            .get(&src)
            .await
            .map_err(|e| gw_err(e, src_bucket, src_object))?;

        let attrs = attributes_from_metadata(&src_info.user_defined);
        let mut writer = object_store::buffered::BufWriter::new(self.remote.clone(), dst.clone()).with_attributes(attrs);
        let mut stream = result.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| gw_err(e, src_bucket, src_object))?;
            writer.write_all(&chunk).await.map_err(StorageError::other)?;
        }
        writer.shutdown().await.map_err(StorageError::other)?;

        let (meta, attrs) = self.remote_attrs(&dst).await.map_err(|e| gw_err(e, dst_bucket, dst_object))?;
        Ok(object_info_from_remote(dst_bucket, dst_object, &meta, &attrs))
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()> {
        let path = self.remote_path(bucket, object);
        self.remote.delete(&path).await.map_err(|e| gw_err(e, bucket, object))
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
        // Pending uploads are server-internal state; the listing echoes the
        // request shape.
        Ok(ListMultipartsInfo {
            key_marker: if key_marker.is_empty() { None } else { Some(key_marker.to_string()) },
            upload_id_marker: if upload_id_marker.is_empty() {
                None
            } else {
                Some(upload_id_marker.to_string())
            },
            max_uploads,
            prefix: prefix.to_string(),
            delimiter: if delimiter.is_empty() { None } else { Some(delimiter.to_string()) },
            ..Default::default()
        })
    }

    async fn new_multipart_upload(&self, bucket: &str, object: &str, metadata: HashMap<String, String>) -> Result<String> {
        self.gw_new_multipart_upload(bucket, object, metadata).await
    }

    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: &mut PutObjReader,
    ) -> Result<PartInfo> {
        self.gw_put_object_part(bucket, object, upload_id, part_id, data).await
    }

    async fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        _part_number_marker: usize,
        max_parts: usize,
    ) -> Result<ListPartsInfo> {
        self.gw_check_upload_id(bucket, object, upload_id).await?;
        Ok(ListPartsInfo {
            bucket: bucket.to_string(),
            object: object.to_string(),
            upload_id: upload_id.to_string(),
            max_parts,
            ..Default::default()
        })
    }

    async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()> {
        self.gw_abort_multipart_upload(bucket, object, upload_id).await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
    ) -> Result<ObjectInfo> {
        self.gw_complete_multipart_upload(bucket, object, upload_id, uploaded_parts).await
    }

    fn is_encryption_supported(&self) -> bool {
        false
    }
}
