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

/// S3 bucket name rules: 3-63 characters, lowercase letters, digits,
/// hyphens and dots; must start and end with a letter or digit; no adjacent
/// dots and no dot-hyphen sequences.
pub fn is_valid_bucket_name(bucket: &str) -> bool {
    if bucket.len() < 3 || bucket.len() > 63 {
        return false;
    }

    let bytes = bucket.as_bytes();
    if !bytes[0].is_ascii_lowercase() && !bytes[0].is_ascii_digit() {
        return false;
    }
    let last = bytes[bytes.len() - 1];
    if !last.is_ascii_lowercase() && !last.is_ascii_digit() {
        return false;
    }

    let mut prev = 0u8;
    for &b in bytes {
        match b {
            b'a'..=b'z' | b'0'..=b'9' => {}
            b'.' | b'-' => {
                if prev == b'.' || (prev == b'-' && b == b'.') || (prev == b'.' && b == b'-') {
                    return false;
                }
            }
            _ => return false,
        }
        prev = b;
    }

    // Names shaped like IP addresses are rejected.
    if bucket.split('.').count() == 4 && bucket.split('.').all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit())) {
        return false;
    }

    true
}

/// Strict object key check: non-empty, no NUL, and within path length limits
/// handled separately by the storage layer.
pub fn is_valid_object_name(object: &str) -> bool {
    if object.is_empty() {
        return false;
    }
    if object.starts_with('/') {
        return false;
    }
    !object.contains('\0')
}
