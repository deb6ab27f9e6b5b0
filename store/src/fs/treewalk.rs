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

//! Depth-first ordered tree walk producing object keys in byte order from a
//! starting marker. The walker runs as an independent producer task writing
//! into a bounded channel; cancellation comes from a token owned by the
//! consumer (or the walker pool's idle timer).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ferrofs_utils::path::{base_dir_from_prefix, path_join};

use crate::error::{Result, StorageError};

/// One emission of the walk. `end` is true on the final result of a
/// successful walk; a failed walk carries `err` on its last emission.
#[derive(Debug)]
pub struct TreeWalkResult {
    pub entry: String,
    pub err: Option<StorageError>,
    pub end: bool,
}

/// Directory access the walker needs, implemented by the backend.
///
/// `list_dir` returns sorted entry names relative to `prefix_dir`, with a
/// trailing `/` on directories, filtered to those starting with
/// `entry_prefix`. `is_leaf_dir` decides whether a directory entry is an
/// empty directory object rather than a prefix to descend into.
#[async_trait::async_trait]
pub trait TreeWalkSource: Send + Sync + 'static {
    async fn list_dir(&self, bucket: &str, prefix_dir: &str, entry_prefix: &str) -> Result<Vec<String>>;
    async fn is_leaf_dir(&self, bucket: &str, entry: &str) -> bool;
}

const WALK_CHANNEL_CAPACITY: usize = 100;

enum WalkStop {
    Cancelled,
    Err(StorageError),
}

/// Spawns a walker over `bucket` starting after `marker`, honouring
/// `prefix`. Non-recursive walks emit directory entries instead of
/// descending, which the consumer folds into common prefixes.
pub fn start_tree_walk(
    source: Arc<dyn TreeWalkSource>,
    bucket: String,
    prefix: String,
    marker: String,
    recursive: bool,
    cancel: CancellationToken,
) -> mpsc::Receiver<TreeWalkResult> {
    let (tx, rx) = mpsc::channel(WALK_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let base_dir = base_dir_from_prefix(&prefix);
        let entry_prefix = prefix[base_dir.len()..].to_string();
        let marker_rel = marker.strip_prefix(base_dir.as_str()).unwrap_or(&marker).to_string();

        let walk = do_tree_walk(
            source,
            bucket.clone(),
            base_dir,
            entry_prefix,
            marker_rel,
            recursive,
            tx.clone(),
            cancel,
            true,
        )
        .await;

        match walk {
            Ok(_) => {}
            Err(WalkStop::Cancelled) => debug!(%bucket, %prefix, "tree walk cancelled"),
            Err(WalkStop::Err(err)) => {
                let _ = tx
                    .send(TreeWalkResult {
                        entry: String::new(),
                        err: Some(err),
                        end: true,
                    })
                    .await;
            }
        }
    });

    rx
}

async fn send_result(tx: &mpsc::Sender<TreeWalkResult>, cancel: &CancellationToken, result: TreeWalkResult) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(result) => sent.is_ok(),
    }
}

/// Walks `prefix_dir` (bucket-relative, `/`-terminated or empty), emitting
/// entries strictly greater than `marker` (relative to `prefix_dir`).
/// `is_end` marks whether this call holds the walk's final entries.
#[allow(clippy::too_many_arguments)]
fn do_tree_walk(
    source: Arc<dyn TreeWalkSource>,
    bucket: String,
    prefix_dir: String,
    entry_prefix: String,
    marker: String,
    recursive: bool,
    tx: mpsc::Sender<TreeWalkResult>,
    cancel: CancellationToken,
    is_end: bool,
) -> Pin<Box<dyn Future<Output = core::result::Result<(), WalkStop>> + Send>> {
    Box::pin(async move {
        // Split the marker around the first separator: the head picks where
        // to resume in this directory, the tail resumes inside it.
        let (marker_base, marker_rest) = match marker.split_once('/') {
            Some((base, rest)) => (base.to_string(), rest.to_string()),
            None => (marker.clone(), String::new()),
        };
        let marker_dir_entry = if marker_rest.is_empty() {
            marker_base.clone()
        } else {
            format!("{marker_base}/")
        };

        let mut entries = source
            .list_dir(&bucket, &prefix_dir, &entry_prefix)
            .await
            .map_err(WalkStop::Err)?;

        // Entries lexically before the marker's head cannot produce keys
        // after the marker.
        let skip = entries.partition_point(|e| e.trim_end_matches('/') < marker_base.as_str());
        entries.drain(..skip);

        let last_index = entries.len().saturating_sub(1);
        for (i, entry) in entries.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(WalkStop::Cancelled);
            }

            let is_last = is_end && i == last_index;
            let is_dir = entry.ends_with('/');
            let pentry = path_join(&[&prefix_dir, entry]);

            if is_dir {
                if source.is_leaf_dir(&bucket, &pentry).await {
                    // An empty directory is a directory object, a leaf.
                    if marker.is_empty() || entry.as_str() > marker.as_str() {
                        let ok = send_result(
                            &tx,
                            &cancel,
                            TreeWalkResult {
                                entry: pentry,
                                err: None,
                                end: is_last,
                            },
                        )
                        .await;
                        if !ok {
                            return Err(WalkStop::Cancelled);
                        }
                    }
                    continue;
                }

                if recursive {
                    let sub_marker = if *entry == marker_dir_entry {
                        marker_rest.clone()
                    } else {
                        String::new()
                    };
                    do_tree_walk(
                        source.clone(),
                        bucket.clone(),
                        pentry,
                        String::new(),
                        sub_marker,
                        recursive,
                        tx.clone(),
                        cancel.clone(),
                        is_last,
                    )
                    .await?;
                    continue;
                }
            }

            // Leaf file, or a directory entry in a non-recursive walk.
            if marker.is_empty() || entry.as_str() > marker.as_str() {
                let ok = send_result(
                    &tx,
                    &cancel,
                    TreeWalkResult {
                        entry: pentry,
                        err: None,
                        end: is_last,
                    },
                )
                .await;
                if !ok {
                    return Err(WalkStop::Cancelled);
                }
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    /// In-memory walk source: bucket-relative keys, directories inferred.
    struct MemSource {
        keys: Mutex<Vec<String>>,
    }

    impl MemSource {
        fn new(keys: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                keys: Mutex::new(keys.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait::async_trait]
    impl TreeWalkSource for MemSource {
        async fn list_dir(&self, _bucket: &str, prefix_dir: &str, entry_prefix: &str) -> Result<Vec<String>> {
            let mut out = BTreeMap::new();
            for key in self.keys.lock().iter() {
                let Some(rest) = key.strip_prefix(prefix_dir) else {
                    continue;
                };
                if rest.is_empty() {
                    continue;
                }
                let entry = match rest.split_once('/') {
                    Some((head, _)) => format!("{head}/"),
                    None => rest.to_string(),
                };
                if entry.starts_with(entry_prefix) {
                    out.insert(entry, ());
                }
            }
            Ok(out.into_keys().collect())
        }

        async fn is_leaf_dir(&self, _bucket: &str, entry: &str) -> bool {
            // A directory key with no children is an empty directory object.
            let keys = self.keys.lock();
            keys.iter().any(|k| k == entry) && !keys.iter().any(|k| k.starts_with(entry) && k != entry)
        }
    }

    async fn collect(mut rx: mpsc::Receiver<TreeWalkResult>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(result) = rx.recv().await {
            assert!(result.err.is_none(), "unexpected error: {:?}", result.err);
            out.push(result.entry);
            if result.end {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn test_recursive_walk_sorted() {
        let source = MemSource::new(&["a", "b/c", "b/d", "e"]);
        let rx = start_tree_walk(
            source,
            "bucket".into(),
            String::new(),
            String::new(),
            true,
            CancellationToken::new(),
        );
        assert_eq!(collect(rx).await, vec!["a", "b/c", "b/d", "e"]);
    }

    #[tokio::test]
    async fn test_non_recursive_emits_dirs() {
        let source = MemSource::new(&["a", "b/c", "b/d"]);
        let rx = start_tree_walk(
            source,
            "bucket".into(),
            String::new(),
            String::new(),
            false,
            CancellationToken::new(),
        );
        assert_eq!(collect(rx).await, vec!["a", "b/"]);
    }

    #[tokio::test]
    async fn test_marker_resume() {
        let source = MemSource::new(&["a", "b/c", "b/d", "e"]);
        let rx = start_tree_walk(
            source,
            "bucket".into(),
            String::new(),
            "b/c".into(),
            true,
            CancellationToken::new(),
        );
        assert_eq!(collect(rx).await, vec!["b/d", "e"]);
    }

    #[tokio::test]
    async fn test_marker_skips_itself() {
        let source = MemSource::new(&["a", "b", "c"]);
        let rx = start_tree_walk(
            source,
            "bucket".into(),
            String::new(),
            "b".into(),
            true,
            CancellationToken::new(),
        );
        assert_eq!(collect(rx).await, vec!["c"]);
    }

    #[tokio::test]
    async fn test_prefix_walk() {
        let source = MemSource::new(&["a/x", "b/c/d", "b/cc", "b/e", "z"]);
        let rx = start_tree_walk(
            source,
            "bucket".into(),
            "b/c".into(),
            String::new(),
            true,
            CancellationToken::new(),
        );
        assert_eq!(collect(rx).await, vec!["b/c/d", "b/cc"]);
    }

    #[tokio::test]
    async fn test_empty_dir_is_leaf() {
        let source = MemSource::new(&["a/", "b"]);
        let rx = start_tree_walk(
            source,
            "bucket".into(),
            String::new(),
            String::new(),
            true,
            CancellationToken::new(),
        );
        assert_eq!(collect(rx).await, vec!["a/", "b"]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_walker() {
        let keys: Vec<String> = (0..500).map(|i| format!("k{i:04}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let source = MemSource::new(&refs);
        let cancel = CancellationToken::new();
        let mut rx = start_tree_walk(
            source,
            "bucket".into(),
            String::new(),
            String::new(),
            true,
            cancel.clone(),
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(first.entry, "k0000");
        cancel.cancel();
        drop(rx);
        // Nothing to assert beyond the walker not hanging; give it a tick.
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn test_end_flag_on_last_entry() {
        let source = MemSource::new(&["a", "b"]);
        let mut rx = start_tree_walk(
            source,
            "bucket".into(),
            String::new(),
            String::new(),
            true,
            CancellationToken::new(),
        );
        let first = rx.recv().await.unwrap();
        assert!(!first.end);
        let second = rx.recv().await.unwrap();
        assert!(second.end);
    }
}
