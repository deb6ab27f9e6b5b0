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

//! Object keys are slash-separated strings, not platform paths. The helpers
//! here mirror Go's `path` package semantics, which the on-disk layout and
//! the listing engine both rely on.

pub const SLASH_SEPARATOR: &str = "/";

pub fn has_suffix(s: &str, suffix: &str) -> bool {
    if cfg!(target_os = "windows") {
        s.to_lowercase().ends_with(&suffix.to_lowercase())
    } else {
        s.ends_with(suffix)
    }
}

pub fn has_prefix(s: &str, prefix: &str) -> bool {
    if cfg!(target_os = "windows") {
        return s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix);
    }
    s.starts_with(prefix)
}

/// Appends a trailing slash when one is missing. Empty stays empty.
pub fn retain_slash(s: &str) -> String {
    if s.is_empty() || s.ends_with(SLASH_SEPARATOR) {
        s.to_string()
    } else {
        format!("{s}{SLASH_SEPARATOR}")
    }
}

/// Joins key elements with `/`, cleaning the result. A trailing slash on the
/// last element is preserved, so directory keys stay directory keys.
pub fn path_join(elements: &[&str]) -> String {
    let trailing_slash = elements.last().is_some_and(|e| e.ends_with(SLASH_SEPARATOR));

    let mut dst = String::new();
    for e in elements {
        if e.is_empty() {
            continue;
        }
        if !dst.is_empty() {
            dst.push_str(SLASH_SEPARATOR);
        }
        dst.push_str(e);
    }

    if dst.is_empty() {
        return dst;
    }

    let cleaned = clean(&dst);
    if trailing_slash {
        return format!("{cleaned}{SLASH_SEPARATOR}");
    }
    cleaned
}

struct LazyBuf {
    s: String,
    buf: Option<Vec<u8>>,
    w: usize,
}

impl LazyBuf {
    fn new(s: String) -> Self {
        LazyBuf { s, buf: None, w: 0 }
    }

    fn index(&self, i: usize) -> u8 {
        if let Some(ref buf) = self.buf {
            buf[i]
        } else {
            self.s.as_bytes()[i]
        }
    }

    fn append(&mut self, c: u8) {
        if self.buf.is_none() {
            if self.w < self.s.len() && self.s.as_bytes()[self.w] == c {
                self.w += 1;
                return;
            }
            let mut new_buf = vec![0; self.s.len()];
            new_buf[..self.w].copy_from_slice(&self.s.as_bytes()[..self.w]);
            self.buf = Some(new_buf);
        }

        if let Some(ref mut buf) = self.buf {
            buf[self.w] = c;
            self.w += 1;
        }
    }

    fn string(&self) -> String {
        if let Some(ref buf) = self.buf {
            String::from_utf8_lossy(&buf[..self.w]).into_owned()
        } else {
            self.s[..self.w].to_string()
        }
    }
}

/// Lexical cleaning of a slash path, Go `path.Clean` semantics: collapse
/// duplicate slashes, resolve `.` and `..`, empty becomes `.`.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let n = path.len();
    let mut out = LazyBuf::new(path.to_string());
    let mut r = 0;
    let mut dotdot = 0;

    if rooted {
        out.append(b'/');
        r = 1;
        dotdot = 1;
    }

    while r < n {
        match path.as_bytes()[r] {
            b'/' => {
                r += 1;
            }
            b'.' if r + 1 == n || path.as_bytes()[r + 1] == b'/' => {
                r += 1;
            }
            b'.' if path.as_bytes()[r + 1] == b'.' && (r + 2 == n || path.as_bytes()[r + 2] == b'/') => {
                r += 2;

                if out.w > dotdot {
                    out.w -= 1;
                    while out.w > dotdot && out.index(out.w) != b'/' {
                        out.w -= 1;
                    }
                } else if !rooted {
                    if out.w > 0 {
                        out.append(b'/');
                    }
                    out.append(b'.');
                    out.append(b'.');
                    dotdot = out.w;
                }
            }
            _ => {
                if (rooted && out.w != 1) || (!rooted && out.w != 0) {
                    out.append(b'/');
                }

                while r < n && path.as_bytes()[r] != b'/' {
                    out.append(path.as_bytes()[r]);
                    r += 1;
                }
            }
        }
    }

    if out.w == 0 {
        return ".".to_string();
    }

    out.string()
}

/// Splits at the final slash, keeping it on the directory half.
pub fn split(path: &str) -> (&str, &str) {
    if let Some(i) = path.rfind('/') {
        return (&path[..i + 1], &path[i + 1..]);
    }
    ("", path)
}

/// Go `path.Dir`: everything up to the final slash, cleaned.
pub fn dir(path: &str) -> String {
    let (d, _) = split(path);
    clean(d)
}

/// The directory a listing walk starts from for a given prefix. A prefix
/// without a slash starts at the bucket root.
pub fn base_dir_from_prefix(prefix: &str) -> String {
    let mut base_dir = dir(prefix);
    if base_dir == "." || base_dir == "./" || base_dir == "/" {
        base_dir = String::new();
    }
    if !prefix.contains('/') {
        base_dir = String::new();
    }
    if !base_dir.is_empty() && !base_dir.ends_with(SLASH_SEPARATOR) {
        base_dir.push_str(SLASH_SEPARATOR);
    }
    base_dir
}

pub fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean(""), ".");
        assert_eq!(clean("abc"), "abc");
        assert_eq!(clean("abc/def"), "abc/def");
        assert_eq!(clean("a/b/c"), "a/b/c");
        assert_eq!(clean("."), ".");
        assert_eq!(clean(".."), "..");
        assert_eq!(clean("../.."), "../..");
        assert_eq!(clean("/abc"), "/abc");
        assert_eq!(clean("/"), "/");
        assert_eq!(clean("abc/"), "abc");
        assert_eq!(clean("abc//def//ghi"), "abc/def/ghi");
        assert_eq!(clean("abc/./def"), "abc/def");
        assert_eq!(clean("abc/def/../ghi/../jkl"), "abc/jkl");
        assert_eq!(clean("abc/def/../.."), ".");
        assert_eq!(clean("/abc/def/../../.."), "/");
    }

    #[test]
    fn test_path_join() {
        assert_eq!(path_join(&["a", "b", "c"]), "a/b/c");
        assert_eq!(path_join(&["a", "b/c/"]), "a/b/c/");
        assert_eq!(path_join(&["", "a", "", "b"]), "a/b");
        assert_eq!(path_join(&["a//b", "c"]), "a/b/c");
        assert_eq!(path_join(&[]), "");
    }

    #[test]
    fn test_dir_and_split() {
        assert_eq!(dir("a/b/c"), "a/b");
        assert_eq!(dir("a"), ".");
        assert_eq!(dir("a/b/"), "a/b");
        assert_eq!(split("a/b/c"), ("a/b/", "c"));
        assert_eq!(split("abc"), ("", "abc"));
    }

    #[test]
    fn test_base_dir_from_prefix() {
        assert_eq!(base_dir_from_prefix("da/"), "da/");
        assert_eq!(base_dir_from_prefix("da/db"), "da/");
        assert_eq!(base_dir_from_prefix("da"), "");
        assert_eq!(base_dir_from_prefix(""), "");
        assert_eq!(base_dir_from_prefix("a/b/c"), "a/b/");
    }

    #[test]
    fn test_retain_slash() {
        assert_eq!(retain_slash("a"), "a/");
        assert_eq!(retain_slash("a/"), "a/");
        assert_eq!(retain_slash(""), "");
    }

    #[test]
    fn test_trim_etag() {
        assert_eq!(trim_etag("\"abc\""), "abc");
        assert_eq!(trim_etag("abc"), "abc");
    }
}
