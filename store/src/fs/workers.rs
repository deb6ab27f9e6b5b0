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

//! Long-lived background tasks of the filesystem backend. All of them
//! observe a shared cancellation token and exit promptly on shutdown;
//! failures are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::FsStore;

/// Periodically recomputes disk usage over the export. The scan itself is
/// single-flight, so an overlapping tick becomes a no-op.
pub fn spawn_usage_scanner(store: Arc<FsStore>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        store.refresh_disk_usage().await;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    store.refresh_disk_usage().await;
                    debug!(used = store.total_used(), "disk usage refreshed");
                }
            }
        }
    })
}

/// Periodically expires multipart uploads older than `expiry`.
pub fn spawn_multipart_cleaner(
    store: Arc<FsStore>,
    interval: Duration,
    expiry: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match store.cleanup_stale_uploads(expiry).await {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "expired stale multipart uploads"),
                        Err(err) => warn!(%err, "multipart cleanup failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_api::{ObjectLayer, PutObjReader};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_usage_scanner_counts_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), false).await.unwrap();
        store.make_bucket("bucket", "").await.unwrap();

        let mut data = PutObjReader::from_vec(vec![1u8; 2048]);
        store.put_object("bucket", "obj", &mut data, HashMap::new()).await.unwrap();

        store.refresh_disk_usage().await;
        assert!(store.total_used() >= 2048, "usage {} should cover the object", store.total_used());
    }

    #[tokio::test]
    async fn test_workers_stop_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), false).await.unwrap();

        let cancel = CancellationToken::new();
        let usage = spawn_usage_scanner(store.clone(), Duration::from_secs(3600), cancel.clone());
        let cleaner = spawn_multipart_cleaner(
            store,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            cancel.clone(),
        );

        cancel.cancel();
        usage.await.unwrap();
        cleaner.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_upload_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), false).await.unwrap();
        store.make_bucket("bucket", "").await.unwrap();

        let upload_id = store
            .new_multipart_upload("bucket", "big/object", HashMap::new())
            .await
            .unwrap();

        // With a zero expiry everything currently pending is stale.
        let removed = store.cleanup_stale_uploads(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 1);

        let err = store
            .abort_multipart_upload("bucket", "big/object", &upload_id)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::StorageError::InvalidUploadID(_)));
    }
}
