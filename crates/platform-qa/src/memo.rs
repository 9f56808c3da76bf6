//! Compute-once memoization of resolved descriptors
//!
//! Each key owns an async once-cell. Concurrent first callers for a key all
//! await the same resolution; later callers get the cached value. A failed
//! resolution leaves the cell empty so the next call tries again.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

/// Per-key compute-once cache
#[derive(Debug)]
pub struct Memo<V> {
    cells: DashMap<String, Arc<OnceCell<V>>>,
}

impl<V> Default for Memo<V> {
    fn default() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }
}

impl<V: Clone> Memo<V> {
    /// Cached value of `key`, resolving it with `init` on first use
    pub async fn get_or_try_init<E, F, Fut>(&self, key: &str, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // clone the cell out so no map shard stays locked across the await
        let cell = self
            .cells
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        cell.get_or_try_init(init).await.cloned()
    }

    /// Cached value of `key`, if it has been resolved
    pub fn get(&self, key: &str) -> Option<V> {
        self.cells.get(key).and_then(|cell| cell.get().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_callers_share_one_resolution() {
        let memo = Arc::new(Memo::<String>::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let memo = memo.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                memo.get_or_try_init("kibana", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok::<_, ()>("https://kibana/".to_string())
                })
                .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "https://kibana/");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.get("kibana").as_deref(), Some("https://kibana/"));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let memo = Memo::<u16>::default();
        let err = memo
            .get_or_try_init("redis", || async { Err::<u16, _>("boom") })
            .await;
        assert_eq!(err, Err("boom"));
        assert_eq!(memo.get("redis"), None);

        let ok = memo
            .get_or_try_init("redis", || async { Ok::<_, &str>(6379) })
            .await;
        assert_eq!(ok, Ok(6379));
    }
}
