//! 🔄 Retry — try, fail, sleep a little longer, try again.
//!
//! 🎬 "In a world where the network drops one packet in ten thousand... one executor
//! dared to ask: have you tried turning it off and on again?"
//!
//! The backoff starts at `initial_backoff` and after every failure grows by a random
//! half of a random slice of itself. Never shrinks. Never fixed. A hundred flushes
//! failing at the same instant will wake up at a hundred different instants, which
//! is the whole point: no thundering herd at the blob store's front door. 🐘🐘🐘
//!
//! Every error is retryable here. If an operation knows it is doomed, it can say so
//! by succeeding less. We don't judge.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// 🔄 Runs fallible async operations until they succeed or the attempt budget is gone.
///
/// The randomness source lives inside, seeded from entropy by [`RetryExecutor::new`]
/// or pinned by [`RetryExecutor::with_seed`] when tests want the same dice every time.
/// Shared by every flush task, so the RNG sits behind a (very briefly held) mutex.
#[derive(Debug)]
pub struct RetryExecutor {
    initial_backoff: Duration,
    rng: Mutex<StdRng>,
}

impl RetryExecutor {
    pub fn new(initial_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// 🎲 Same as `new`, but the dice are loaded. Deterministic jitter for tests.
    pub fn with_seed(initial_backoff: Duration, seed: u64) -> Self {
        Self {
            initial_backoff,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// 🚀 Run `operation` until it returns `Ok`, or until the retry counter would pass
    /// `attempt_limit`. `None` means "forever", `Some(0)` means "exactly one shot".
    ///
    /// The closure receives the zero-based attempt number, mostly so logs can say which
    /// try this is. On exhaustion the last error comes back unchanged.
    pub async fn run<F, Fut, T>(&self, attempt_limit: Option<u64>, mut operation: F) -> Result<T>
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries: u64 = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let err = match operation(retries).await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(attempt = retries + 1, "✅ operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let budget_left = match attempt_limit {
                None => true,
                Some(limit) => retries < limit,
            };
            if !budget_left {
                return Err(err);
            }

            retries += 1;
            backoff = self.next_backoff(backoff);
            warn!(
                attempt = retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "🔄 attempt failed, backing off"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// 📈 Grow by half a random slice of the current backoff. Tops out at `Duration::MAX`.
    fn next_backoff(&self, backoff: Duration) -> Duration {
        backoff.saturating_add(self.jitter(backoff) / 2)
    }

    /// 🎲 A random duration in `[0, upper)`. Zero stays zero.
    fn jitter(&self, upper: Duration) -> Duration {
        let upper_nanos = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);
        if upper_nanos == 0 {
            return Duration::ZERO;
        }
        // -- a poisoned rng is still a perfectly good rng
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_nanos(rng.gen_range(0..upper_nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn the_one_where_zero_retries_means_one_shot() {
        let the_executor = RetryExecutor::with_seed(Duration::from_secs(1), 7);
        let calls = Arc::new(AtomicU64::new(0));

        let result: Result<()> = the_executor
            .run(Some(0), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("💀 nope")
                }
            })
            .await;

        let err = result.expect_err("💀 an always-failing op should not succeed");
        assert_eq!(err.to_string(), "💀 nope");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_forever_means_until_the_third_time_is_the_charm() {
        let the_executor = RetryExecutor::with_seed(Duration::from_secs(1), 7);
        let calls = Arc::new(AtomicU64::new(0));

        let result = the_executor
            .run(None, |_| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        anyhow::bail!("💀 attempt {n} tripped over the cable");
                    }
                    Ok(n)
                }
            })
            .await
            .expect("💀 third attempt should have worked");

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_budget_runs_out_and_the_last_error_wins() {
        let the_executor = RetryExecutor::with_seed(Duration::from_millis(10), 42);
        let calls = Arc::new(AtomicU64::new(0));

        let result: Result<()> = the_executor
            .run(Some(3), |attempt| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("failure #{attempt}")
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4, "one try plus three retries");
        assert_eq!(result.expect_err("💀 should be exhausted").to_string(), "failure #3");
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_backoff_never_shrinks() {
        let initial = Duration::from_secs(1);
        let the_executor = RetryExecutor::with_seed(initial, 1234);
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let _: Result<()> = the_executor
            .run(Some(6), |_| {
                let stamps = stamps.clone();
                async move {
                    stamps.lock().unwrap().push(Instant::now());
                    anyhow::bail!("still down")
                }
            })
            .await;

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 7);
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= initial, "💀 first wait {:?} is shorter than the floor", gaps[0]);
        assert!(gaps[0] <= initial * 3 / 2, "💀 first wait {:?} overshot", gaps[0]);
        for pair in gaps.windows(2) {
            assert!(pair[1] >= pair[0], "💀 backoff shrank: {:?}", gaps);
        }
    }

    #[test]
    fn the_one_where_the_backoff_hits_the_ceiling_instead_of_the_floor() {
        let the_executor = RetryExecutor::with_seed(Duration::from_secs(1), 3);
        for _ in 0..100 {
            assert_eq!(the_executor.next_backoff(Duration::MAX), Duration::MAX);
        }
        let nearly_full = Duration::MAX - Duration::from_nanos(1);
        assert!(the_executor.next_backoff(nearly_full) >= nearly_full);
    }

    #[test]
    fn the_one_where_zero_jitter_stays_zero() {
        let the_executor = RetryExecutor::with_seed(Duration::ZERO, 0);
        assert_eq!(the_executor.jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(the_executor.jitter(Duration::from_millis(5)) < Duration::from_millis(5));
        }
    }
}
