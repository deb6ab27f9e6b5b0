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

/// Etag reported for objects that pre-exist on the backend and therefore
/// have no metadata sidecar.
pub const DEFAULT_ETAG: &str = "00000000000000000000000000000000-1";

/// encode to hex string (lowercase)
pub fn hex(data: impl AsRef<[u8]>) -> String {
    hex_simd::encode_to_string(data, hex_simd::AsciiCase::Lower)
}

/// md5 of `data` as a lowercase hex string, the single-PUT etag form.
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Md5::new();
    hasher.update(data.as_ref());
    hex(hasher.finalize())
}

/// A freshly generated etag, used when recreating a sidecar for an object
/// whose original etag is unknown.
pub fn gen_etag() -> String {
    let random: [u8; 16] = rand::random();
    md5_hex(random)
}

/// The S3 composite etag for a completed multipart upload:
/// `hex(md5(md5_1 || md5_2 || ...)) + "-" + N`.
///
/// Part etags that carry quotes or a `-N` suffix of their own are
/// normalised first; etags that do not decode as hex contribute their raw
/// bytes, matching how unparseable part etags are treated upstream.
pub fn complete_multipart_etag(etags: &[String]) -> String {
    let mut hasher = Md5::new();
    for etag in etags {
        let trimmed = etag.trim_matches('"');
        let base = trimmed.split('-').next().unwrap_or(trimmed);
        match hex_simd::decode_to_vec(base.as_bytes()) {
            Ok(raw) => hasher.update(&raw),
            Err(_) => hasher.update(base.as_bytes()),
        }
    }
    format!("{}-{}", hex(hasher.finalize()), etags.len())
}
