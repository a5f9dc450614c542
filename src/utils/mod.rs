pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use retry::{cancel_pair, retry_on_transient, CancelHandle, CancelSignal, IsTransient, RetryConfig, RetryError};
