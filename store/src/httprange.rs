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

//! `Range: bytes=...` handling. The grammar is the S3 subset: a single
//! range of the forms `a-b`, `a-` or `-n`. Syntax errors are invalid
//! arguments (400); a well-formed range that cannot be satisfied against
//! the resource size is `InvalidRange` (416).

use crate::error::{Result, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HTTPRangeSpec {
    /// `-n`: read the last `start` bytes; `end` is unused.
    pub is_suffix_length: bool,
    pub start: i64,
    /// Inclusive end offset; -1 for open-ended `a-`.
    pub end: i64,
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_err(spec: &str) -> StorageError {
    StorageError::InvalidArgument(format!("'{spec}' does not have valid range value"))
}

/// Parses a `Range` header value.
pub fn parse_request_range_spec(spec: &str) -> Result<HTTPRangeSpec> {
    let rest = spec.strip_prefix("bytes=").ok_or_else(|| parse_err(spec))?;
    if rest.contains(',') {
        // Multiple ranges are not supported.
        return Err(parse_err(spec));
    }

    if let Some(suffix) = rest.strip_prefix('-') {
        if !is_digits(suffix) {
            return Err(parse_err(spec));
        }
        let n: i64 = suffix.parse().map_err(|_| parse_err(spec))?;
        if n == 0 {
            return Err(StorageError::InvalidRange {
                offset: 0,
                length: 0,
                size: 0,
            });
        }
        return Ok(HTTPRangeSpec {
            is_suffix_length: true,
            start: n,
            end: -1,
        });
    }

    let (first, last) = rest.split_once('-').ok_or_else(|| parse_err(spec))?;
    if !is_digits(first) {
        return Err(parse_err(spec));
    }
    let start: i64 = first.parse().map_err(|_| parse_err(spec))?;

    if last.is_empty() {
        return Ok(HTTPRangeSpec {
            is_suffix_length: false,
            start,
            end: -1,
        });
    }

    if !is_digits(last) {
        return Err(parse_err(spec));
    }
    let end: i64 = last.parse().map_err(|_| parse_err(spec))?;
    if start > end {
        return Err(StorageError::InvalidRange {
            offset: start,
            length: end,
            size: 0,
        });
    }

    Ok(HTTPRangeSpec {
        is_suffix_length: false,
        start,
        end,
    })
}

impl HTTPRangeSpec {
    /// Resolves the spec against a resource of `size` bytes, returning
    /// `(offset, length)` or `InvalidRange` when unsatisfiable.
    pub fn get_offset_length(&self, size: i64) -> Result<(i64, i64)> {
        if size < 0 {
            return Err(StorageError::InvalidRange {
                offset: self.start,
                length: self.end,
                size,
            });
        }

        if self.is_suffix_length {
            let length = self.start.min(size);
            return Ok((size - length, length));
        }

        if self.start >= size {
            return Err(StorageError::InvalidRange {
                offset: self.start,
                length: self.end,
                size,
            });
        }

        if self.end < 0 {
            return Ok((self.start, size - self.start));
        }

        let end = self.end.min(size - 1);
        Ok((self.start, end - self.start + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range_specs() {
        let resource_size = 10;
        let cases: &[(&str, i64, i64)] = &[
            ("bytes=0-", 0, 10),
            ("bytes=1-", 1, 9),
            ("bytes=0-9", 0, 10),
            ("bytes=1-10", 1, 9),
            ("bytes=1-1", 1, 1),
            ("bytes=2-5", 2, 4),
            ("bytes=-5", 5, 5),
            ("bytes=-1", 9, 1),
            ("bytes=-1000", 0, 10),
            ("bytes=0000-0006", 0, 7),
        ];
        for (i, (spec, exp_offset, exp_length)) in cases.iter().enumerate() {
            let rs = parse_request_range_spec(spec).unwrap_or_else(|e| panic!("case {i} '{spec}': {e}"));
            let (offset, length) = rs
                .get_offset_length(resource_size)
                .unwrap_or_else(|e| panic!("case {i} '{spec}': {e}"));
            assert_eq!((offset, length), (*exp_offset, *exp_length), "case {i} '{spec}'");
        }
    }

    #[test]
    fn test_unparsable_range_specs() {
        let specs = [
            "bytes=-",
            "bytes==",
            "bytes==1-10",
            "bytes=",
            "bytes=aa",
            "aa",
            "",
            "bytes=1-10-",
            "bytes=1--10",
            "bytes=-1-10",
            "bytes=0-+3",
            "bytes=+3-+5",
            "bytes=8",
            "bytes = 2-5",
            "bytes=2 - 5",
            "bytes=2-5 ",
            "bytes=10-11,12-10",
        ];
        for spec in specs {
            let err = parse_request_range_spec(spec).unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidArgument(_)),
                "'{spec}' should be a parse error, got {err:?}"
            );
        }
    }

    #[test]
    fn test_unsatisfiable_range_specs() {
        let resource_size = 10;
        let specs = ["bytes=5-3", "bytes=10-10", "bytes=10-", "bytes=100-", "bytes=-0"];
        for spec in specs {
            let invalid = match parse_request_range_spec(spec) {
                Err(e) => matches!(e, StorageError::InvalidRange { .. }),
                Ok(rs) => matches!(rs.get_offset_length(resource_size), Err(StorageError::InvalidRange { .. })),
            };
            assert!(invalid, "'{spec}' should be InvalidRange");
        }
    }
}
