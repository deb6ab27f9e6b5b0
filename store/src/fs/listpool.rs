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

//! Pool of parked listing walkers, keyed by the listing parameters. A
//! truncated listing parks its walker here under the next marker; the
//! follow-up request claims it instead of starting a fresh walk. Parked
//! walkers are dropped after an idle timeout.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::treewalk::TreeWalkResult;

/// Identity of a resumable walk. Two listings share a walker only when all
/// of these match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListParams {
    pub bucket: String,
    pub recursive: bool,
    pub marker: String,
    pub prefix: String,
    pub heal: bool,
}

struct ParkedWalk {
    id: u64,
    rx: mpsc::Receiver<TreeWalkResult>,
    cancel: CancellationToken,
    timer: tokio::task::JoinHandle<()>,
}

#[derive(Default)]
struct PoolInner {
    walks: HashMap<ListParams, Vec<ParkedWalk>>,
}

/// The pool itself. Cloning shares the underlying state.
#[derive(Clone)]
pub struct TreeWalkPool {
    inner: Arc<Mutex<PoolInner>>,
    timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl TreeWalkPool {
    pub fn new(timeout: Duration) -> Self {
        TreeWalkPool {
            inner: Arc::new(Mutex::new(PoolInner::default())),
            timeout,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Claims the most recently parked walker for `params`, cancelling its
    /// idle timer. `None` means the caller starts a fresh walk.
    pub fn release(&self, params: &ListParams) -> Option<(mpsc::Receiver<TreeWalkResult>, CancellationToken)> {
        let mut inner = self.inner.lock();
        let walks = inner.walks.get_mut(params)?;
        let parked = walks.pop()?;
        if walks.is_empty() {
            inner.walks.remove(params);
        }
        parked.timer.abort();
        trace!(?params, "resumed parked tree walk");
        Some((parked.rx, parked.cancel))
    }

    /// Parks a walker under `params` with a fresh idle timer. When the
    /// timer fires the walker is cancelled and dropped.
    pub fn set(&self, params: ListParams, rx: mpsc::Receiver<TreeWalkResult>, cancel: CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let timer = {
            let pool = Arc::downgrade(&self.inner);
            let params = params.clone();
            let cancel = cancel.clone();
            let timeout = self.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(pool) = pool.upgrade() {
                    let mut inner = pool.lock();
                    if let Some(walks) = inner.walks.get_mut(&params) {
                        walks.retain(|w| w.id != id);
                        if walks.is_empty() {
                            inner.walks.remove(&params);
                        }
                    }
                }
                cancel.cancel();
                trace!(?params, "dropped idle tree walk");
            })
        };

        self.inner.lock().walks.entry(params).or_default().push(ParkedWalk {
            id,
            rx,
            cancel,
            timer,
        });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().walks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(marker: &str) -> ListParams {
        ListParams {
            bucket: "bucket".into(),
            recursive: true,
            marker: marker.into(),
            prefix: String::new(),
            heal: false,
        }
    }

    fn walker() -> (mpsc::Receiver<TreeWalkResult>, CancellationToken) {
        let (_tx, rx) = mpsc::channel(1);
        (rx, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_release_empty_pool() {
        let pool = TreeWalkPool::new(Duration::from_secs(60));
        assert!(pool.release(&params("m")).is_none());
    }

    #[tokio::test]
    async fn test_set_then_release() {
        let pool = TreeWalkPool::new(Duration::from_secs(60));
        let (rx, cancel) = walker();
        pool.set(params("m"), rx, cancel);
        assert_eq!(pool.len(), 1);

        assert!(pool.release(&params("m")).is_some());
        assert!(pool.is_empty());
        assert!(pool.release(&params("m")).is_none());
    }

    #[tokio::test]
    async fn test_release_is_lifo() {
        let pool = TreeWalkPool::new(Duration::from_secs(60));
        let (rx1, c1) = walker();
        let (rx2, c2) = walker();
        pool.set(params("m"), rx1, c1);
        pool.set(params("m"), rx2, c2.clone());

        let (_rx, cancel) = pool.release(&params("m")).unwrap();
        // Newest parked walker comes back first.
        cancel.cancel();
        assert!(c2.is_cancelled());
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_params_distinguish_markers() {
        let pool = TreeWalkPool::new(Duration::from_secs(60));
        let (rx, cancel) = walker();
        pool.set(params("a"), rx, cancel);
        assert!(pool.release(&params("b")).is_none());
        assert!(pool.release(&params("a")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_drops_walker() {
        let pool = TreeWalkPool::new(Duration::from_millis(100));
        let (rx, cancel) = walker();
        pool.set(params("m"), rx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        // Let the timer task run.
        tokio::task::yield_now().await;
        assert!(pool.is_empty());
        assert!(cancel.is_cancelled());
    }
}
