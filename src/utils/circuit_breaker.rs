use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker for Best-Effort Delivery
// ============================================================================
//
// Guards calls to an unreliable downstream (the push-notification channel).
// After `failure_threshold` consecutive failures the breaker opens and calls
// are short-circuited until `cooldown` has elapsed; then one probe at a time
// is let through (half-open) until `success_threshold` successes close it
// again. A probe that has not reported back within `cooldown` is treated as
// abandoned and no longer blocks the next one.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used by the metrics gauge
    pub fn as_gauge(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("operation failed: {0}")]
    OperationFailed(E),
}

struct Tally {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
    probe_started: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    tally: Arc<Mutex<Tally>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            tally: Arc::new(Mutex::new(Tally {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                opened_at: None,
                probe_started: None,
            })),
            config,
        }
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        match operation.await {
            Ok(result) => {
                self.on_success().await;
                Ok(result)
            }
            Err(err) => {
                self.on_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    async fn admit(&self) -> bool {
        let mut tally = self.tally.lock().await;

        match tally.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                let busy = tally
                    .probe_started
                    .is_some_and(|at| at.elapsed() < self.config.cooldown);
                if !busy {
                    tally.probe_started = Some(Instant::now());
                }
                !busy
            }
            CircuitState::Open => {
                let cooled = tally
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);

                if cooled {
                    tracing::info!("Notification breaker half-open, probing downstream");
                    tally.state = CircuitState::HalfOpen;
                    tally.probe_successes = 0;
                    tally.probe_started = Some(Instant::now());
                }
                cooled
            }
        }
    }

    async fn on_success(&self) {
        let mut tally = self.tally.lock().await;

        match tally.state {
            CircuitState::HalfOpen => {
                tally.probe_started = None;
                tally.probe_successes += 1;
                if tally.probe_successes >= self.config.success_threshold {
                    tracing::info!(
                        successes = tally.probe_successes,
                        "Notification breaker closed"
                    );
                    tally.state = CircuitState::Closed;
                    tally.consecutive_failures = 0;
                    tally.probe_successes = 0;
                    tally.opened_at = None;
                }
            }
            CircuitState::Closed => tally.consecutive_failures = 0,
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut tally = self.tally.lock().await;
        tally.consecutive_failures += 1;

        match tally.state {
            CircuitState::Closed if tally.consecutive_failures >= self.config.failure_threshold => {
                tracing::warn!(
                    failures = tally.consecutive_failures,
                    "Notification breaker opened"
                );
                tally.state = CircuitState::Open;
                tally.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                tracing::warn!("Probe failed, notification breaker reopened");
                tally.state = CircuitState::Open;
                tally.opened_at = Some(Instant::now());
                tally.probe_successes = 0;
                tally.probe_started = None;
            }
            _ => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.tally.lock().await.state
    }
}
