use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// Bounded Retry with Linear Backoff and Jitter
// ============================================================================
//
// Retries transient failures a fixed number of times. The delay after
// attempt `n` is `base_delay * n + random(0..=max_jitter)`, so competing
// retriers drift apart instead of colliding again on the same schedule.
//
// Every sleep is a cancellation point: a fired CancelSignal ends the loop
// with RetryError::Interrupted instead of starting another attempt.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay unit multiplied by the attempt number
    pub base_delay: Duration,
    /// Upper bound of the random component added to every delay
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    /// Same attempt budget, millisecond-scale delays
    pub fn fast(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::from_millis(1),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::random_range(0..=jitter_ms)
        };

        self.base_delay * attempt + Duration::from_millis(jitter)
    }
}

/// Check if an error is transient (should retry) or permanent (should not retry)
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed transiently; carries the last error
    Exhausted { attempts: u32, last: E },
    /// The operation failed with an error that must not be retried
    Permanent(E),
    /// The cancel signal fired while waiting between attempts
    Interrupted { attempts: u32 },
}

// ============================================================================
// Cancellation
// ============================================================================

/// Fires the paired [`CancelSignal`]s
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by retry loops at every sleep
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that can never fire
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. A dropped handle means no
    /// one can cancel any more, so the future then stays pending.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

// ============================================================================
// Retry Loop
// ============================================================================

/// Run `operation` until it succeeds, fails permanently, runs out of
/// attempts, or `cancel` fires during a backoff sleep.
pub async fn retry_on_transient<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancelSignal,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut signal = cancel.clone();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_transient() {
                    tracing::debug!(
                        attempt = attempt,
                        error = %error,
                        "Permanent failure detected, not retrying"
                    );
                    return Err(RetryError::Permanent(error));
                }

                if attempt >= config.max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }

                let delay = config.delay_for(attempt);
                tracing::debug!(
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after delay"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = signal.cancelled() => {
                        tracing::warn!(attempt = attempt, "Retry loop interrupted while backing off");
                        return Err(RetryError::Interrupted { attempts: attempt });
                    }
                }
            }
        }
    }
}
