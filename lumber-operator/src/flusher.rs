//! The flusher: a semaphore-bounded pool of retrying flush workers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::warn;

use crate::error::FlushError;

/// First retry delay; doubles per attempt up to `max_wait`.
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Declarative flusher configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlusherConfig {
    /// How many flush thunks may run concurrently. Outputs that need
    /// chunk ordering across retries set this to 1.
    pub max_concurrent: usize,
    /// Ceiling on the retry backoff delay.
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            max_wait: Duration::from_secs(60),
        }
    }
}

impl FlusherConfig {
    /// Build a flusher whose lifetime is bounded by `parent`.
    #[must_use]
    pub fn build(&self, parent: &CancellationToken) -> Flusher {
        Flusher {
            semaphore: Arc::new(Semaphore::new(self.max_concurrent.max(1))),
            cancellation: parent.child_token(),
            tracker: TaskTracker::new(),
            max_wait: self.max_wait,
        }
    }
}

/// Runs flush thunks concurrently, retrying each with exponential
/// backoff until it succeeds or the flusher stops.
///
/// A thunk is the whole delivery attempt for one chunk; it classifies
/// its own failures. Permanent failures (a rejected payload, a
/// non-retriable response) are handled inside the thunk — dead-letter
/// the chunk and return `Ok` — so that only retriable failures propagate
/// into the retry loop. Chunk ordering is not preserved across retries.
///
/// Clones share the same permit pool, task set, and cancellation, so a
/// feed task can hold its own handle.
#[derive(Debug, Clone)]
pub struct Flusher {
    semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
    tracker: TaskTracker,
    max_wait: Duration,
}

impl Flusher {
    /// Submit a flush thunk.
    ///
    /// Returns immediately; the thunk runs on its own task once a
    /// concurrency permit is available, and is re-invoked with backoff
    /// after every error until it returns `Ok` or the flusher stops.
    /// The token passed to the thunk is cancelled on [`stop`].
    ///
    /// [`stop`]: Flusher::stop
    pub fn flush<F, Fut>(&self, thunk: F)
    where
        F: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), FlushError>> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let token = self.cancellation.clone();
        let max_wait = self.max_wait;
        self.tracker.spawn(async move {
            let _permit = tokio::select! {
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = token.cancelled() => return,
            };

            let mut attempt: u32 = 0;
            loop {
                if token.is_cancelled() {
                    return;
                }
                match thunk(token.clone()).await {
                    Ok(()) => return,
                    Err(err) => {
                        let delay = backoff_delay(attempt, max_wait);
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "flush failed, retrying",
                        );
                        attempt = attempt.saturating_add(1);
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = token.cancelled() => return,
                        }
                    }
                }
            }
        });
    }

    /// Cancel in-flight thunks and wait for every worker to finish.
    pub async fn stop(&self) {
        self.cancellation.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// `min(base · 2^attempt, max_wait)`, jittered upward by as much as half
/// of itself, never past `max_wait`.
fn backoff_delay(attempt: u32, max_wait: Duration) -> Duration {
    let exponential = INITIAL_BACKOFF
        .checked_mul(2u32.saturating_pow(attempt.min(30)))
        .unwrap_or(max_wait)
        .min(max_wait);
    let jitter = 1.0 + rand::random::<f64>() * 0.5;
    Duration::from_secs_f64(exponential.as_secs_f64() * jitter).min(max_wait)
}
