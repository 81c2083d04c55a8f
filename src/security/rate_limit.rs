//! Per-client connection rate limiting.
//!
//! Each client gets an independent token bucket: admission takes a token,
//! and a background filler restores one per interval up to the capacity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Tokens restored per elapsed fill interval.
const TOKEN_FILL_RATE: i64 = 1;

/// Error type for rate limiter lifecycle violations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("token bucket is already closed")]
    AlreadyClosed,
}

/// A token bucket governing connection admission for a single client.
///
/// The bucket starts full. [`TokenBucket::try_acquire`] takes one token per
/// admitted connection; a dedicated filler task restores them over time.
pub struct TokenBucket {
    capacity: i64,
    tokens: AtomicI64,
    closed: AtomicBool,
    filler: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl TokenBucket {
    /// Create a bucket holding `capacity` tokens and spawn its filler task.
    /// Call [`TokenBucket::close`] to reclaim the task.
    pub fn new(capacity: i64, fill_interval: Duration) -> Arc<Self> {
        let bucket = Arc::new(Self {
            capacity,
            tokens: AtomicI64::new(capacity),
            closed: AtomicBool::new(false),
            filler: Mutex::new(None),
        });

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn({
            let bucket = Arc::clone(&bucket);
            async move {
                let mut ticker = tokio::time::interval(fill_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => return,
                        _ = ticker.tick() => bucket.fill(),
                    }
                }
            }
        });

        *bucket.filler.lock().expect("filler mutex poisoned") = Some((shutdown_tx, handle));

        bucket
    }

    /// Take one token if any are available. Safe under concurrent callers:
    /// at most `capacity` acquisitions succeed between refills.
    pub fn try_acquire(&self) -> bool {
        let mut tokens = self.tokens.load(Ordering::Acquire);
        loop {
            if tokens <= 0 {
                return false;
            }
            match self.tokens.compare_exchange_weak(
                tokens,
                tokens - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => tokens = observed,
            }
        }
    }

    /// Stop the filler task and wait for it to exit. The second call fails
    /// with [`RateLimitError::AlreadyClosed`].
    pub async fn close(&self) -> Result<(), RateLimitError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(RateLimitError::AlreadyClosed);
        }

        let filler = self.filler.lock().expect("filler mutex poisoned").take();
        if let Some((shutdown_tx, handle)) = filler {
            let _ = shutdown_tx.send(());
            if let Err(error) = handle.await {
                tracing::error!(error = %error, "token bucket filler task failed");
            }
        }

        Ok(())
    }

    /// Restore one token. A bucket drained all the way to zero stays empty:
    /// only buckets still holding at least one token accrue more.
    fn fill(&self) {
        let tokens = self.tokens.load(Ordering::Acquire);
        if tokens != 0 && tokens < self.capacity {
            self.tokens.fetch_add(TOKEN_FILL_RATE, Ordering::AcqRel);
        }
    }

    #[cfg(test)]
    fn tokens(&self) -> i64 {
        self.tokens.load(Ordering::Acquire)
    }
}

/// Registry of per-client token buckets, lazily created from a template.
pub struct RateLimitRegistry {
    default_capacity: i64,
    default_fill_interval: Duration,
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl RateLimitRegistry {
    /// Build an empty registry. Buckets are created on first use with
    /// `capacity` and `fill_interval`.
    pub fn new(capacity: i64, fill_interval: Duration) -> Self {
        Self {
            default_capacity: capacity,
            default_fill_interval: fill_interval,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The bucket for `client`, created on first reference. Concurrent calls
    /// for the same client observe the same bucket: the lookup-or-insert runs
    /// under the registry lock, so no losing bucket (and no stray filler
    /// task) is ever created.
    pub fn for_client(&self, client: &str) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().expect("rate limit registry mutex poisoned");
        Arc::clone(buckets.entry(client.to_string()).or_insert_with(|| {
            TokenBucket::new(self.default_capacity, self.default_fill_interval)
        }))
    }

    /// Close every registered bucket, reclaiming their filler tasks.
    /// Per-bucket close errors are logged, not propagated.
    pub async fn close(&self) {
        let buckets: Vec<(String, Arc<TokenBucket>)> = {
            let buckets = self.buckets.lock().expect("rate limit registry mutex poisoned");
            buckets
                .iter()
                .map(|(client, bucket)| (client.clone(), Arc::clone(bucket)))
                .collect()
        };

        for (client, bucket) in buckets {
            if let Err(error) = bucket.close().await {
                tracing::warn!(client = %client, error = %error, "error closing rate limiter");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_one_admits_exactly_once() {
        // A fill interval far beyond the test runtime keeps the filler out
        // of the picture.
        let bucket = TokenBucket::new(1, Duration::from_secs(60));

        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        assert!(bucket.close().await.is_ok());
        assert!(bucket.close().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_refill_up_to_capacity() {
        let bucket = TokenBucket::new(2, Duration::from_millis(10));

        assert!(bucket.try_acquire());
        assert_eq!(bucket.tokens(), 1);

        // Plenty of ticks elapse; the bucket must cap at its capacity.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(bucket.tokens(), 2);

        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        bucket.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drained_bucket_stays_empty() {
        let bucket = TokenBucket::new(1, Duration::from_millis(10));

        assert!(bucket.try_acquire());
        assert_eq!(bucket.tokens(), 0);

        // The filler skips empty buckets, so no amount of elapsed time
        // brings a fully drained bucket back.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(bucket.tokens(), 0);
        assert!(!bucket.try_acquire());

        bucket.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_refill_after_close() {
        let bucket = TokenBucket::new(2, Duration::from_millis(1));
        assert!(bucket.try_acquire());
        bucket.close().await.unwrap();

        let tokens = bucket.tokens();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bucket.tokens(), tokens);
    }

    #[tokio::test]
    async fn test_registry_returns_one_bucket_per_client() {
        let registry = RateLimitRegistry::new(10, Duration::from_millis(1));

        let first = registry.for_client("user1");
        let second = registry.for_client("user1");
        assert!(Arc::ptr_eq(&first, &second));

        let other = registry.for_client("user2");
        assert!(!Arc::ptr_eq(&first, &other));

        registry.close().await;
    }

    #[tokio::test]
    async fn test_registry_close_survives_already_closed_bucket() {
        let registry = RateLimitRegistry::new(1, Duration::from_secs(60));

        let bucket = registry.for_client("user1");
        bucket.close().await.unwrap();

        // Close must not propagate the double-close error.
        registry.close().await;
    }
}
