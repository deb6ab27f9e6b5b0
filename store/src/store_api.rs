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

use md5::{Digest, Md5};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use ferrofs_filemeta::{headers, FsMetaV1, ObjectPartInfo};
use ferrofs_utils::mime::guess_content_type;
use ferrofs_utils::{hex, DEFAULT_ETAG};

use crate::error::{Result, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Fs,
    Gateway,
}

#[derive(Debug, Clone, Copy)]
pub struct StorageInfo {
    pub used: u64,
    pub backend: BackendType,
}

#[derive(Debug, Clone, Default)]
pub struct BucketInfo {
    pub name: String,
    pub created: Option<OffsetDateTime>,
}

/// On-wire description of an object, composed from the metadata sidecar and
/// a stat of the data file (or from remote attributes in gateway mode).
#[derive(Debug, Clone, Default)]
pub struct ObjectInfo {
    pub bucket: String,
    pub name: String,
    pub mod_time: Option<OffsetDateTime>,
    pub size: i64,
    pub is_dir: bool,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub user_defined: HashMap<String, String>,
    pub parts: Vec<ObjectPartInfo>,
    /// Set by the caller of CopyObject when only metadata should change.
    pub metadata_only: bool,
}

impl ObjectInfo {
    /// Composes the on-wire info from a sidecar and a stat result. Missing
    /// etags fall back to the default etag for pre-existing data; missing
    /// content types are inferred from the object's extension.
    pub fn from_fs_meta(bucket: &str, object: &str, fs_meta: &FsMetaV1, meta: &std::fs::Metadata) -> Self {
        let is_dir = meta.is_dir();
        let mod_time = meta.modified().ok().map(OffsetDateTime::from);

        let etag = fs_meta.etag().unwrap_or(DEFAULT_ETAG).to_string();
        let content_type = fs_meta
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(object).to_string());
        let content_encoding = fs_meta.meta.get(headers::CONTENT_ENCODING).cloned();

        let mut user_defined = fs_meta.meta.clone();
        user_defined.remove(headers::ETAG);

        ObjectInfo {
            bucket: bucket.to_string(),
            name: object.to_string(),
            mod_time,
            size: if is_dir { 0 } else { meta.len() as i64 },
            is_dir,
            etag: Some(etag),
            content_type: Some(content_type),
            content_encoding,
            user_defined,
            parts: fs_meta.parts.clone(),
            metadata_only: false,
        }
    }

    /// True when the object carries the internal compression marker.
    pub fn is_compressed(&self) -> bool {
        self.user_defined.contains_key(headers::COMPRESSION)
    }

    /// Declared decompressed size for compressed objects.
    pub fn decompressed_size(&self) -> Option<i64> {
        self.user_defined.get(headers::COMPRESSION_ACTUAL_SIZE).and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Default)]
pub struct ListObjectsInfo {
    pub is_truncated: bool,
    pub next_marker: Option<String>,
    pub objects: Vec<ObjectInfo>,
    pub prefixes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ListObjectsV2Info {
    pub is_truncated: bool,
    pub continuation_token: Option<String>,
    pub next_continuation_token: Option<String>,
    pub objects: Vec<ObjectInfo>,
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MultipartInfo {
    pub bucket: String,
    pub object: String,
    pub upload_id: String,
    pub initiated: Option<OffsetDateTime>,
    pub user_defined: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListMultipartsInfo {
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
    pub max_uploads: usize,
    pub is_truncated: bool,
    pub uploads: Vec<MultipartInfo>,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub common_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PartInfo {
    pub part_num: usize,
    pub last_mod: Option<OffsetDateTime>,
    pub etag: Option<String>,
    pub size: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListPartsInfo {
    pub bucket: String,
    pub object: String,
    pub upload_id: String,
    pub parts: Vec<PartInfo>,
    pub next_part_number_marker: usize,
    pub max_parts: usize,
    pub is_truncated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CompletePart {
    pub part_num: usize,
    pub etag: Option<String>,
}

/// Body reader for PUT paths. Tracks the md5 of everything read so far, so
/// the storage layer can derive the etag without a second pass.
pub struct PutObjReader {
    inner: Box<dyn AsyncRead + Send + Sync + Unpin>,
    size: i64,
    md5: Md5,
    read: u64,
}

impl std::fmt::Debug for PutObjReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutObjReader")
            .field("size", &self.size)
            .field("read", &self.read)
            .finish()
    }
}

impl PutObjReader {
    /// `size` is the declared content length; negative means unknown.
    pub fn new(inner: Box<dyn AsyncRead + Send + Sync + Unpin>, size: i64) -> Self {
        PutObjReader {
            inner,
            size,
            md5: Md5::new(),
            read: 0,
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let size = data.len() as i64;
        PutObjReader::new(Box::new(std::io::Cursor::new(data)), size)
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Reads the next chunk, folding it into the running md5.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf).await?;
        if n > 0 {
            self.md5.update(&buf[..n]);
            self.read += n as u64;
        }
        Ok(n)
    }

    pub async fn read_all(&mut self) -> std::io::Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = self.read_chunk(&mut buf).await?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }
        Ok(data)
    }

    /// Hex md5 of the bytes read so far.
    pub fn md5_current_hex(&self) -> String {
        hex(self.md5.clone().finalize())
    }
}

/// The object-layer contract shared by the filesystem and gateway backends.
///
/// Heal and reload-format only make sense for backends that own their
/// format; everything else inherits the `NotImplemented` bodies below, the
/// single "unsupported" surface both backends lean on.
#[async_trait::async_trait]
pub trait ObjectLayer: Send + Sync + 'static {
    async fn shutdown(&self) -> Result<()>;
    async fn storage_info(&self) -> StorageInfo;

    async fn make_bucket(&self, bucket: &str, location: &str) -> Result<()>;
    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo>;
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: i32,
    ) -> Result<ListObjectsInfo>;

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: &str,
        delimiter: &str,
        max_keys: i32,
        fetch_owner: bool,
        start_after: &str,
    ) -> Result<ListObjectsV2Info>;

    /// Streams `[offset, offset+length)` of the object into `writer`;
    /// negative `length` reads to the end. A non-empty, non-default `etag`
    /// is a precondition checked against the stored etag. `obj_info` is the
    /// caller's previously fetched view, consulted for compressed reads.
    #[allow(clippy::too_many_arguments)]
    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        etag: &str,
        obj_info: Option<&ObjectInfo>,
    ) -> Result<()>;

    async fn get_object_info(&self, bucket: &str, object: &str) -> Result<ObjectInfo>;

    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        data: &mut PutObjReader,
        metadata: HashMap<String, String>,
    ) -> Result<ObjectInfo>;

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        src_info: &mut ObjectInfo,
    ) -> Result<ObjectInfo>;

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()>;

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        delimiter: &str,
        max_uploads: usize,
    ) -> Result<ListMultipartsInfo>;

    async fn new_multipart_upload(&self, bucket: &str, object: &str, metadata: HashMap<String, String>) -> Result<String>;

    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: &mut PutObjReader,
    ) -> Result<PartInfo>;

    async fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: usize,
        max_parts: usize,
    ) -> Result<ListPartsInfo>;

    async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
    ) -> Result<ObjectInfo>;

    async fn set_bucket_policy(&self, _bucket: &str, _policy: serde_json::Value) -> Result<()> {
        Err(StorageError::NotImplemented)
    }

    async fn get_bucket_policy(&self, _bucket: &str) -> Result<serde_json::Value> {
        Err(StorageError::NotImplemented)
    }

    async fn delete_bucket_policy(&self, _bucket: &str) -> Result<()> {
        Err(StorageError::NotImplemented)
    }

    async fn reload_format(&self) -> Result<()> {
        Err(StorageError::NotImplemented)
    }

    async fn heal_format(&self, _dry_run: bool) -> Result<()> {
        Err(StorageError::NotImplemented)
    }

    async fn heal_bucket(&self, _bucket: &str, _dry_run: bool) -> Result<()> {
        Err(StorageError::NotImplemented)
    }

    async fn heal_object(&self, _bucket: &str, _object: &str, _dry_run: bool) -> Result<()> {
        Err(StorageError::NotImplemented)
    }

    async fn list_objects_heal(
        &self,
        _bucket: &str,
        _prefix: &str,
        _marker: &str,
        _delimiter: &str,
        _max_keys: i32,
    ) -> Result<ListObjectsInfo> {
        Err(StorageError::NotImplemented)
    }

    fn is_notification_supported(&self) -> bool {
        true
    }

    fn is_encryption_supported(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_obj_reader_tracks_md5() {
        let mut reader = PutObjReader::from_vec(b"hello world".to_vec());
        let data = reader.read_all().await.unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(reader.bytes_read(), 11);
        assert_eq!(reader.md5_current_hex(), ferrofs_utils::md5_hex(b"hello world"));
    }

    #[tokio::test]
    async fn test_put_obj_reader_chunked() {
        let mut reader = PutObjReader::from_vec(vec![7u8; 10_000]);
        let mut buf = [0u8; 1024];
        let mut total = 0;
        loop {
            let n = reader.read_chunk(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 10_000);
        assert_eq!(reader.md5_current_hex(), ferrofs_utils::md5_hex(vec![7u8; 10_000]));
    }
}
