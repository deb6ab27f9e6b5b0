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

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio::time::timeout;
use tracing::trace;

use crate::error::{LockError, Result};

/// Separator between bucket and object in a lock key. Bucket-only keys
/// protect bucket operations; compound keys protect individual objects.
const KEY_SEPARATOR: &str = "/";

struct NsEntry {
    rw: Arc<RwLock<()>>,
    refs: usize,
}

/// Process-wide namespace lock map: one readers-writer lock per live key,
/// reference counted so idle keys do not accumulate.
///
/// `tokio::sync::RwLock` queues acquisitions in FIFO order, so a waiting
/// writer blocks later readers and cannot be starved by a read stream.
#[derive(Clone, Default)]
pub struct NsLockMap {
    locks: Arc<Mutex<HashMap<String, NsEntry>>>,
}

impl NsLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an unacquired handle for `(bucket, object)`. An empty object
    /// yields the bucket-level key.
    pub fn new_lock(&self, bucket: &str, object: &str) -> NsLock {
        let key = if object.is_empty() {
            bucket.to_string()
        } else {
            format!("{bucket}{KEY_SEPARATOR}{object}")
        };
        NsLock { map: self.clone(), key }
    }

    /// Number of live lock entries. Zero once every guard has dropped.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ref_entry(&self, key: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        let entry = locks.entry(key.to_string()).or_insert_with(|| NsEntry {
            rw: Arc::new(RwLock::new(())),
            refs: 0,
        });
        entry.refs += 1;
        entry.rw.clone()
    }

    fn unref_entry(&self, key: &str) {
        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                locks.remove(key);
                trace!(key, "removed idle namespace lock entry");
            }
        }
    }
}

impl std::fmt::Debug for NsLockMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NsLockMap").field("entries", &self.len()).finish()
    }
}

/// Handle for a single lock key. Creating the handle does not acquire
/// anything; `lock` / `rlock` do, bounded by a timeout.
///
/// Not reentrant: a holder must not reacquire the same key on the same flow.
pub struct NsLock {
    map: NsLockMap,
    key: String,
}

impl NsLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Acquire the exclusive lock, failing with [`LockError::Timeout`] once
    /// `acquire_timeout` elapses.
    pub async fn lock(&self, acquire_timeout: Duration) -> Result<NsLockGuard> {
        let rw = self.map.ref_entry(&self.key);
        match timeout(acquire_timeout, rw.write_owned()).await {
            Ok(guard) => Ok(NsLockGuard {
                map: self.map.clone(),
                key: self.key.clone(),
                guard: Some(GuardKind::Write(guard)),
            }),
            Err(_) => {
                self.map.unref_entry(&self.key);
                Err(LockError::timeout(&self.key, acquire_timeout))
            }
        }
    }

    /// Acquire the shared lock, failing with [`LockError::Timeout`] once
    /// `acquire_timeout` elapses.
    pub async fn rlock(&self, acquire_timeout: Duration) -> Result<NsLockGuard> {
        let rw = self.map.ref_entry(&self.key);
        match timeout(acquire_timeout, rw.read_owned()).await {
            Ok(guard) => Ok(NsLockGuard {
                map: self.map.clone(),
                key: self.key.clone(),
                guard: Some(GuardKind::Read(guard)),
            }),
            Err(_) => {
                self.map.unref_entry(&self.key);
                Err(LockError::timeout(&self.key, acquire_timeout))
            }
        }
    }
}

enum GuardKind {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// RAII guard for a namespace lock. Dropping releases the lock and
/// dereferences the map entry, in that order, so a racing acquirer always
/// contends on the same entry the holder used.
pub struct NsLockGuard {
    map: NsLockMap,
    key: String,
    guard: Option<GuardKind>,
}

impl NsLockGuard {
    pub fn is_write(&self) -> bool {
        matches!(self.guard, Some(GuardKind::Write(_)))
    }
}

impl Drop for NsLockGuard {
    fn drop(&mut self) {
        // Release the RW lock first, then drop the map reference.
        self.guard.take();
        self.map.unref_entry(&self.key);
    }
}

impl std::fmt::Debug for NsLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NsLockGuard")
            .field("key", &self.key)
            .field("write", &self.is_write())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(50);
    const LONG: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_write_excludes_write() {
        let ns = NsLockMap::new();
        let lk = ns.new_lock("bucket", "object");
        let _held = lk.lock(LONG).await.unwrap();

        let other = ns.new_lock("bucket", "object");
        let err = other.lock(SHORT).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_read_shares_read() {
        let ns = NsLockMap::new();
        let a = ns.new_lock("bucket", "object");
        let b = ns.new_lock("bucket", "object");
        let _ga = a.rlock(LONG).await.unwrap();
        let _gb = b.rlock(LONG).await.unwrap();
        assert_eq!(ns.len(), 1);
    }

    #[tokio::test]
    async fn test_write_excludes_read() {
        let ns = NsLockMap::new();
        let w = ns.new_lock("bucket", "object");
        let _gw = w.lock(LONG).await.unwrap();

        let r = ns.new_lock("bucket", "object");
        let err = r.rlock(SHORT).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let ns = NsLockMap::new();
        let a = ns.new_lock("bucket", "a");
        let b = ns.new_lock("bucket", "b");
        let bucket_only = ns.new_lock("bucket", "");
        let _ga = a.lock(LONG).await.unwrap();
        let _gb = b.lock(LONG).await.unwrap();
        let _gc = bucket_only.lock(LONG).await.unwrap();
        assert_eq!(ns.len(), 3);
    }

    #[tokio::test]
    async fn test_entry_removed_when_idle() {
        let ns = NsLockMap::new();
        let lk = ns.new_lock("bucket", "object");
        {
            let _g = lk.lock(LONG).await.unwrap();
            assert_eq!(ns.len(), 1);
        }
        assert!(ns.is_empty());

        // A timed-out waiter must not leak an entry either.
        let held = lk.lock(LONG).await.unwrap();
        let other = ns.new_lock("bucket", "object");
        let _ = other.lock(SHORT).await.unwrap_err();
        drop(held);
        assert!(ns.is_empty());
    }

    #[tokio::test]
    async fn test_waiting_writer_blocks_new_readers() {
        let ns = NsLockMap::new();
        let reader = ns.new_lock("bucket", "object");
        let held = reader.rlock(LONG).await.unwrap();

        let writer = ns.new_lock("bucket", "object");
        let map = ns.clone();
        let writer_task = tokio::spawn(async move { writer.lock(LONG).await });

        // Give the writer time to enqueue, then a fresh reader must queue
        // behind it instead of overtaking.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let late_reader = map.new_lock("bucket", "object");
        let err = late_reader.rlock(SHORT).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));

        drop(held);
        writer_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_writers_serialize() {
        let ns = NsLockMap::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let ns = ns.clone();
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                let lk = ns.new_lock("bucket", "object");
                let _g = lk.lock(LONG).await.unwrap();
                let v = counter.load(std::sync::atomic::Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(v + 1, std::sync::atomic::Ordering::SeqCst);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 16);
        assert!(ns.is_empty());
    }
}
