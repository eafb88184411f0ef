//! Keyed single-flight cache: concurrent identical requests collapse into
//! one upstream call, and completed results stick around for a short TTL.
//! This is the only shared mutable state between concurrent jobs; it is
//! keyed by input identity, never by caller.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tracing::debug;

/// Error handed to waiters whose shared in-flight call failed or was
/// dropped. The leader keeps the original error; waiters only get its
/// rendering.
#[derive(Debug, Clone, thiserror::Error)]
#[error("shared in-flight call failed: {0}")]
pub struct SharedCallError(pub String);

enum Entry<V> {
    InFlight(broadcast::Sender<Result<V, SharedCallError>>),
    Ready { value: V, stored_at: Instant },
}

/// Single-flight cache with TTL'd result retention.
pub struct SingleFlight<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone + Send + 'static> SingleFlight<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key` if fresh, joins an in-flight
    /// computation if one exists, or runs `compute` as the leader and
    /// shares its result with every waiter.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<SharedCallError> + Display,
    {
        enum Role<V> {
            Hit(V),
            Waiter(broadcast::Receiver<Result<V, SharedCallError>>),
            Leader,
        }

        let role = {
            let mut entries = self.entries.lock().await;
            let role = match entries.get(key) {
                Some(Entry::Ready { value, stored_at }) if stored_at.elapsed() < self.ttl => {
                    Role::Hit(value.clone())
                }
                Some(Entry::InFlight(sender)) => Role::Waiter(sender.subscribe()),
                _ => Role::Leader,
            };
            if matches!(role, Role::Leader) {
                // Stale or absent: this caller becomes the leader. Drop
                // expired values on the way in so the map stays bounded by
                // the active key set.
                let ttl = self.ttl;
                entries.retain(|_, entry| match entry {
                    Entry::Ready { stored_at, .. } => stored_at.elapsed() < ttl,
                    Entry::InFlight(_) => true,
                });
                let (sender, _) = broadcast::channel(1);
                entries.insert(key.to_string(), Entry::InFlight(sender));
            }
            role
        };

        match role {
            Role::Hit(value) => return Ok(value),
            Role::Waiter(mut receiver) => {
                return match receiver.recv().await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(shared)) => Err(E::from(shared)),
                    Err(_) => Err(E::from(SharedCallError(
                        "in-flight call dropped".to_string(),
                    ))),
                };
            }
            Role::Leader => {}
        }

        let result = compute().await;

        let mut entries = self.entries.lock().await;
        let sender = match entries.remove(key) {
            Some(Entry::InFlight(sender)) => Some(sender),
            _ => None,
        };
        match &result {
            Ok(value) => {
                entries.insert(
                    key.to_string(),
                    Entry::Ready {
                        value: value.clone(),
                        stored_at: Instant::now(),
                    },
                );
                if let Some(sender) = sender {
                    let _ = sender.send(Ok(value.clone()));
                }
            }
            Err(err) => {
                debug!(key, error = %err, "shared call failed");
                if let Some(sender) = sender {
                    let _ = sender.send(Err(SharedCallError(err.to_string())));
                }
            }
        }
        result
    }
}

/// Canonical cache key for a set of ids: sorted, deduplicated, joined.
pub fn key_for_ids<S: AsRef<str>>(ids: &[S]) -> String {
    let mut ids: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("boom")]
        Boom,
        #[error(transparent)]
        Shared(#[from] SharedCallError),
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_upstream_call() {
        let cache = Arc::new(SingleFlight::<u64>::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_compute("a,b", || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, TestError>(7)
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_result_is_cached_within_ttl() {
        let cache = SingleFlight::<u64>::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute("key", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(1)
                })
                .await
                .unwrap();
            assert_eq!(value, 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_results_recompute() {
        let cache = SingleFlight::<u64>::new(Duration::from_secs(1));
        let calls = AtomicUsize::new(0);

        let mut fetch = || {
            cache.get_or_compute("key", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(1)
            })
        };
        fetch().await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        fetch().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = SingleFlight::<u64>::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let failed = cache
            .get_or_compute("key", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u64, _>(TestError::Boom)
            })
            .await;
        assert!(failed.is_err());

        let value = cache
            .get_or_compute("key", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(9)
            })
            .await
            .unwrap();
        assert_eq!(value, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_key_for_ids_sorts_and_dedups() {
        assert_eq!(key_for_ids(&["b", "a", "b"]), "a,b");
        assert_eq!(key_for_ids::<&str>(&[]), "");
    }
}
