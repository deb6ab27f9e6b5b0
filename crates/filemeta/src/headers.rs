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

//! Canonical metadata key names as they appear inside `meta` of the sidecar.

pub const ETAG: &str = "etag";
pub const CONTENT_TYPE: &str = "content-type";
pub const CONTENT_ENCODING: &str = "content-encoding";
pub const CACHE_CONTROL: &str = "cache-control";
pub const CONTENT_DISPOSITION: &str = "content-disposition";
pub const CONTENT_LANGUAGE: &str = "content-language";

pub const AMZ_META_PREFIX: &str = "X-Amz-Meta-";
pub const AMZ_META_PREFIX_LOWER: &str = "x-amz-meta-";

pub const RESERVED_METADATA_PREFIX: &str = "X-FerroFS-Internal-";
pub const RESERVED_METADATA_PREFIX_LOWER: &str = "x-ferrofs-internal-";

/// Marks an object whose payload was stored compressed. Present only when
/// written by a compression-enabled writer; this backend never sets it but
/// must honour it on read.
pub const COMPRESSION: &str = "x-ferrofs-internal-compression";
pub const COMPRESSION_ACTUAL_SIZE: &str = "x-ferrofs-internal-actual-size";

/// True when the key names a user metadata entry (`x-amz-meta-*`).
pub fn is_amz_meta(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.starts_with(AMZ_META_PREFIX_LOWER)
}

/// True when the key belongs to the reserved internal namespace and must not
/// surface to clients.
pub fn is_reserved_meta(key: &str) -> bool {
    key.to_ascii_lowercase().starts_with(RESERVED_METADATA_PREFIX_LOWER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_amz_meta("X-Amz-Meta-Foo"));
        assert!(is_amz_meta("x-amz-meta-foo"));
        assert!(!is_amz_meta("content-type"));
        assert!(is_reserved_meta("X-FerroFS-Internal-compression"));
        assert!(!is_reserved_meta("x-amz-meta-x"));
    }
}
