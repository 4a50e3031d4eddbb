//! Per-request single-shot timers.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use tokio::task::JoinHandle;

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Registry of cancellable timers keyed by request id.
///
/// A firing timer removes its own entry before running the callback, so a
/// failing callback leaves nothing behind and is never retried.
#[derive(Default)]
pub struct TimeoutManager {
    timers: Arc<DashMap<String, Timer>>,
    generation: AtomicU64,
}

impl TimeoutManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `id`, replacing any existing one. `seconds <= 0`
    /// means the timer never fires and nothing is registered.
    pub fn set<F, Fut>(&self, id: &str, seconds: i64, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.clear(id);
        if seconds <= 0 {
            tracing::debug!(request_id = id, seconds, "timeout disabled for request");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let key = id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds as u64)).await;

            // Lost the race against clear()/set(): someone else owns the slot.
            if timers
                .remove_if(&key, |_, t| t.generation == generation)
                .is_none()
            {
                return;
            }

            match AssertUnwindSafe(callback()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(request_id = %key, error = %e, "timeout callback failed");
                }
                Err(_) => {
                    tracing::error!(request_id = %key, "timeout callback panicked");
                }
            }
        });

        self.timers
            .insert(id.to_string(), Timer { generation, handle });
    }

    /// Cancel the timer for `id`. Returns whether one was armed.
    pub fn clear(&self, id: &str) -> bool {
        match self.timers.remove(id) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.timers.contains_key(id)
    }

    pub fn size(&self) -> usize {
        self.timers.len()
    }

    /// Cancel everything; used on shutdown.
    pub fn clear_all(&self) {
        let ids: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.clear(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(c: &Arc<AtomicUsize>) -> impl FnOnce() -> futures::future::Ready<anyhow::Result<()>> {
        let c = Arc::clone(c);
        move || {
            c.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_and_unregisters() {
        let timers = TimeoutManager::new();
        let fired = counter();
        timers.set("a", 1, bump(&fired));
        assert!(timers.has("a"));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.has("a"));
        assert_eq!(timers.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_positive_never_fires() {
        let timers = TimeoutManager::new();
        let fired = counter();
        timers.set("zero", 0, bump(&fired));
        timers.set("neg", -10, bump(&fired));
        assert_eq!(timers.size(), 0);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_and_is_idempotent() {
        let timers = TimeoutManager::new();
        let fired = counter();
        timers.set("a", 1, bump(&fired));

        assert!(timers.clear("a"));
        assert!(!timers.clear("a"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_previous_timer() {
        let timers = TimeoutManager::new();
        let first = counter();
        let second = counter();
        timers.set("a", 1, bump(&first));
        timers.set("a", 3, bump(&second));
        assert_eq!(timers.size(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_callback_is_contained() {
        let timers = TimeoutManager::new();
        timers.set("bad", 1, || async { Err(anyhow::anyhow!("sink unavailable")) });
        timers.set("worse", 1, || async {
            if true {
                panic!("callback bug");
            }
            Ok(())
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(timers.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all() {
        let timers = TimeoutManager::new();
        let fired = counter();
        for id in ["a", "b", "c"] {
            timers.set(id, 5, bump(&fired));
        }
        assert_eq!(timers.size(), 3);

        timers.clear_all();
        assert_eq!(timers.size(), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
