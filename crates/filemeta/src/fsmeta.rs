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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use ferrofs_utils::mime::guess_content_type;
use ferrofs_utils::{gen_etag, DEFAULT_ETAG};

use crate::headers;

/// Current sidecar schema version. The parser tolerates unknown fields but
/// rejects unknown versions.
pub const FS_META_VERSION: &str = "1";
pub const FS_META_FORMAT: &str = "fs";

#[derive(Debug, thiserror::Error)]
pub enum FsMetaError {
    /// The sidecar bytes are not a sidecar of any version this server knows.
    #[error("Corrupted format")]
    CorruptedFormat,

    /// Zero-length sidecar, left behind by an interrupted write.
    #[error("unexpected end of file")]
    UnexpectedEof,
}

/// One part of a multipart object, as recorded in the sidecar manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectPartInfo {
    pub number: usize,
    pub name: String,
    pub etag: String,
    pub size: u64,
}

/// The `fs.json` metadata sidecar. `meta` maps canonical-case header names
/// to values and always carries `etag` for objects written by this server;
/// `parts` is empty for single-PUT objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsMetaV1 {
    pub version: String,
    pub format: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub parts: Vec<ObjectPartInfo>,
}

impl Default for FsMetaV1 {
    fn default() -> Self {
        Self::new()
    }
}

impl FsMetaV1 {
    pub fn new() -> Self {
        Self {
            version: FS_META_VERSION.to_string(),
            format: FS_META_FORMAT.to_string(),
            meta: HashMap::new(),
            parts: Vec::new(),
        }
    }

    /// The sidecar for a pre-existing file: default etag plus a content type
    /// inferred from the object's extension.
    pub fn default_for(object: &str) -> Self {
        let mut fs_meta = Self::new();
        fs_meta.meta.insert(headers::ETAG.to_string(), DEFAULT_ETAG.to_string());
        fs_meta
            .meta
            .insert(headers::CONTENT_TYPE.to_string(), guess_content_type(object).to_string());
        fs_meta
    }

    /// A replacement sidecar for an object whose sidecar went corrupt: fresh
    /// etag, inferred content type.
    pub fn regenerated_for(object: &str) -> Self {
        let mut fs_meta = Self::default_for(object);
        fs_meta.meta.insert(headers::ETAG.to_string(), gen_etag());
        fs_meta
    }

    /// Parses sidecar bytes. Unknown fields are ignored; an unknown schema
    /// version is `CorruptedFormat`; empty input is `UnexpectedEof` so
    /// callers can regenerate.
    pub fn parse(data: &[u8]) -> Result<Self, FsMetaError> {
        if data.is_empty() {
            return Err(FsMetaError::UnexpectedEof);
        }
        let fs_meta: FsMetaV1 = serde_json::from_slice(data).map_err(|_| FsMetaError::CorruptedFormat)?;
        if fs_meta.version != FS_META_VERSION {
            return Err(FsMetaError::CorruptedFormat);
        }
        Ok(fs_meta)
    }

    /// Serialises at the current schema version.
    pub fn to_bytes(&self) -> Vec<u8> {
        // A HashMap of strings cannot fail JSON serialisation.
        serde_json::to_vec(self).expect("fs.json serialisation")
    }

    pub fn etag(&self) -> Option<&str> {
        self.meta.get(headers::ETAG).map(String::as_str)
    }

    pub fn set_etag(&mut self, etag: impl Into<String>) {
        self.meta.insert(headers::ETAG.to_string(), etag.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.meta.get(headers::CONTENT_TYPE).map(String::as_str)
    }

    pub fn is_compressed(&self) -> bool {
        self.meta.contains_key(headers::COMPRESSION)
    }

    /// Declared decompressed size, when the object is compressed and the
    /// writer recorded one.
    pub fn actual_size(&self) -> Option<i64> {
        self.meta.get(headers::COMPRESSION_ACTUAL_SIZE).and_then(|v| v.parse().ok())
    }
}
