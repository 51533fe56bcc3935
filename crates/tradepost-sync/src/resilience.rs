//! # Resilience Policy
//!
//! Timeout, retry and circuit breaking for every marketplace call.
//!
//! ## Composition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    breaker( retry( timeout( attempt ) ) )               │
//! │                                                                         │
//! │  execute("blueprints", || client.fetch(...))                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌───────────────┐  open  ──► Err(CircuitOpen), attempt never runs     │
//! │  │ CircuitBreaker│                                                      │
//! │  └──────┬────────┘                                                      │
//! │         ▼ permit                                                        │
//! │  ┌───────────────┐  attempt 1 ─ fail ─ 2s ─ attempt 2 ─ fail ─ 4s ─    │
//! │  │ Retry loop    │  attempt 3 ─ fail ─ 8s ─ attempt 4 ─ fail           │
//! │  └──────┬────────┘       → Err(RetriesExhausted)                        │
//! │         ▼                                                               │
//! │  ┌───────────────┐                                                      │
//! │  │ Timeout (30s) │  per attempt, elapsed → ApiError::Timeout           │
//! │  └───────────────┘                                                      │
//! │                                                                         │
//! │  The breaker sees ONE outcome per execute() call.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Circuit States
//! ```text
//!            5 consecutive failed calls
//!   Closed ─────────────────────────────► Open ──── 30s elapsed ───┐
//!     ▲                                    ▲                        ▼
//!     │          trial succeeded           │ trial failed       HalfOpen
//!     └────────────────────────────────────┴────────────────── (1 trial)
//! ```
//!
//! Circuits are tracked per logical endpoint ("games", "blueprints", ...)
//! so one failing endpoint does not block the others.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ResilienceSettings;
use crate::error::ApiError;

/// Upper bound for a single retry delay.
const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(300);

// =============================================================================
// Circuit Breaker
// =============================================================================

/// Observable state of one endpoint's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Phase {
    Closed,
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug)]
struct EndpointCircuit {
    consecutive_failures: u32,
    phase: Phase,
}

impl Default for EndpointCircuit {
    fn default() -> Self {
        EndpointCircuit {
            consecutive_failures: 0,
            phase: Phase::Closed,
        }
    }
}

/// Per-endpoint circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_for: Duration,
    circuits: Mutex<HashMap<String, EndpointCircuit>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_for: Duration) -> Self {
        CircuitBreaker {
            failure_threshold: failure_threshold.max(1),
            open_for,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Asks permission to call `endpoint`.
    ///
    /// ## Returns
    /// * `Ok(Permit)` - Call may proceed; report the outcome on the permit
    /// * `Err(ApiError::CircuitOpen)` - Circuit open, or a half-open trial is
    ///   already in flight
    pub fn acquire(&self, endpoint: &str) -> Result<Permit<'_>, ApiError> {
        let mut circuits = self.circuits.lock().unwrap_or_else(PoisonError::into_inner);
        let circuit = circuits.entry(endpoint.to_string()).or_default();

        let trial = match circuit.phase {
            Phase::Closed => false,
            Phase::Open { until } if Instant::now() >= until => {
                info!(endpoint, "Circuit half-open, admitting trial call");
                circuit.phase = Phase::HalfOpen {
                    trial_in_flight: true,
                };
                true
            }
            Phase::HalfOpen {
                trial_in_flight: false,
            } => {
                circuit.phase = Phase::HalfOpen {
                    trial_in_flight: true,
                };
                true
            }
            Phase::Open { .. } | Phase::HalfOpen { .. } => {
                debug!(endpoint, "Circuit open, rejecting call");
                return Err(ApiError::CircuitOpen {
                    endpoint: endpoint.to_string(),
                });
            }
        };

        Ok(Permit {
            breaker: self,
            endpoint: endpoint.to_string(),
            trial,
            resolved: false,
        })
    }

    /// Current state of `endpoint`'s circuit.
    pub fn state(&self, endpoint: &str) -> CircuitState {
        let circuits = self.circuits.lock().unwrap_or_else(PoisonError::into_inner);
        match circuits.get(endpoint).map(|c| &c.phase) {
            None | Some(Phase::Closed) => CircuitState::Closed,
            Some(Phase::Open { .. }) => CircuitState::Open,
            Some(Phase::HalfOpen { .. }) => CircuitState::HalfOpen,
        }
    }

    fn on_success(&self, endpoint: &str, trial: bool) {
        let mut circuits = self.circuits.lock().unwrap_or_else(PoisonError::into_inner);
        let circuit = circuits.entry(endpoint.to_string()).or_default();
        if trial {
            info!(endpoint, "Trial call succeeded, circuit closed");
        }
        circuit.consecutive_failures = 0;
        circuit.phase = Phase::Closed;
    }

    fn on_failure(&self, endpoint: &str, trial: bool) {
        let mut circuits = self.circuits.lock().unwrap_or_else(PoisonError::into_inner);
        let circuit = circuits.entry(endpoint.to_string()).or_default();
        circuit.consecutive_failures += 1;

        if trial || circuit.consecutive_failures >= self.failure_threshold {
            warn!(
                endpoint,
                failures = circuit.consecutive_failures,
                open_secs = self.open_for.as_secs(),
                "Circuit opened"
            );
            circuit.phase = Phase::Open {
                until: Instant::now() + self.open_for,
            };
        }
    }

    fn release_trial(&self, endpoint: &str) {
        let mut circuits = self.circuits.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(circuit) = circuits.get_mut(endpoint) {
            if matches!(circuit.phase, Phase::HalfOpen { .. }) {
                circuit.phase = Phase::HalfOpen {
                    trial_in_flight: false,
                };
            }
        }
    }
}

/// Permission for one call. Exactly one outcome is recorded per permit.
///
/// A permit dropped without an outcome (the call future was cancelled)
/// records nothing; if it was a half-open trial the trial slot is freed.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    endpoint: String,
    trial: bool,
    resolved: bool,
}

impl Permit<'_> {
    pub fn succeed(mut self) {
        self.resolved = true;
        self.breaker.on_success(&self.endpoint, self.trial);
    }

    pub fn fail(mut self) {
        self.resolved = true;
        self.breaker.on_failure(&self.endpoint, self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.trial {
            self.breaker.release_trial(&self.endpoint);
        }
    }
}

// =============================================================================
// Resilience Policy
// =============================================================================

/// Timeout + retry + circuit breaker, shared by every client call.
#[derive(Debug)]
pub struct ResiliencePolicy {
    timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
    multiplier: f64,
    breaker: CircuitBreaker,
}

impl ResiliencePolicy {
    pub fn new(settings: &ResilienceSettings) -> Self {
        ResiliencePolicy {
            timeout: settings.timeout(),
            max_retries: settings.max_retries,
            initial_backoff: settings.initial_backoff(),
            multiplier: settings.backoff_multiplier,
            breaker: CircuitBreaker::new(
                settings.breaker_failure_threshold,
                settings.breaker_open(),
            ),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs `attempt` under the policy.
    ///
    /// `attempt` is invoked once per try; it must build a fresh request each
    /// time.
    pub async fn execute<T, F, Fut>(&self, endpoint: &str, mut attempt: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let permit = self.breaker.acquire(endpoint)?;
        let result = self.retry(endpoint, &mut attempt).await;

        match &result {
            Err(e) if e.is_transient() || e.is_systemic() => permit.fail(),
            // A definitive answer (including 4xx) means the endpoint is up.
            _ => permit.succeed(),
        }

        result
    }

    async fn retry<T, F, Fut>(&self, endpoint: &str, attempt: &mut F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut backoff = self.backoff();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let err = match tokio::time::timeout(self.timeout, attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ApiError::Timeout {
                    endpoint: endpoint.to_string(),
                    seconds: self.timeout.as_secs(),
                },
            };

            if !err.is_transient() {
                return Err(err);
            }

            if attempts > self.max_retries {
                warn!(endpoint, attempts, error = %err, "Retries exhausted");
                return Err(ApiError::RetriesExhausted {
                    endpoint: endpoint.to_string(),
                    attempts,
                    last_error: Box::new(err),
                });
            }

            let delay = backoff.next_backoff().unwrap_or(MAX_RETRY_INTERVAL);
            warn!(endpoint, attempt = attempts, ?delay, error = %err, "Transient failure, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: MAX_RETRY_INTERVAL,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_retries: u32) -> ResiliencePolicy {
        ResiliencePolicy::new(&ResilienceSettings {
            max_retries,
            ..Default::default()
        })
    }

    fn unavailable() -> ApiError {
        ApiError::Http {
            endpoint: "games".into(),
            status: 503,
            message: "unavailable".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delays_follow_backoff() {
        let policy = policy(3);
        let start = Instant::now();
        let offsets = Arc::new(Mutex::new(Vec::new()));

        let recorded = offsets.clone();
        let result: Result<(), ApiError> = policy
            .execute("games", || {
                recorded.lock().unwrap().push(start.elapsed().as_secs());
                async { Err(unavailable()) }
            })
            .await;

        assert_eq!(*offsets.lock().unwrap(), vec![0, 2, 6, 14]);
        match result.unwrap_err() {
            ApiError::RetriesExhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error.status(), Some(503));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let policy = policy(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = policy
            .execute("games", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ApiError::Http {
                        endpoint: "games".into(),
                        status: 404,
                        message: "not found".into(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().status(), Some(404));
        assert_eq!(policy.breaker().state("games"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let policy = policy(3);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute("games", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(unavailable())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let policy = policy(0);

        let result: Result<(), ApiError> = policy
            .execute("orders", || async {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(())
            })
            .await;

        match result.unwrap_err() {
            ApiError::RetriesExhausted { last_error, .. } => {
                assert!(matches!(*last_error, ApiError::Timeout { seconds: 30, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_after_consecutive_failures() {
        let policy = policy(0);
        let calls = AtomicU32::new(0);

        for _ in 0..5 {
            let _: Result<(), ApiError> = policy
                .execute("blueprints", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(unavailable()) }
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(policy.breaker().state("blueprints"), CircuitState::Open);

        let rejected: Result<(), ApiError> = policy
            .execute("blueprints", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(rejected, Err(ApiError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        // Other endpoints are unaffected.
        assert_eq!(policy.breaker().state("games"), CircuitState::Closed);
        assert!(policy.execute("games", || async { Ok(()) }).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
        for _ in 0..5 {
            breaker.acquire("games").unwrap().fail();
        }
        assert!(breaker.acquire("games").is_err());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(breaker.acquire("games").is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = breaker.acquire("games").unwrap();
        assert_eq!(breaker.state("games"), CircuitState::HalfOpen);
        assert!(breaker.acquire("games").is_err());

        trial.succeed();
        assert_eq!(breaker.state("games"), CircuitState::Closed);
        assert!(breaker.acquire("games").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        breaker.acquire("games").unwrap().fail();
        assert_eq!(breaker.state("games"), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        breaker.acquire("games").unwrap().fail();
        assert_eq!(breaker.state("games"), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.acquire("games").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_frees_slot() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        breaker.acquire("games").unwrap().fail();
        tokio::time::advance(Duration::from_secs(30)).await;

        drop(breaker.acquire("games").unwrap());
        assert_eq!(breaker.state("games"), CircuitState::HalfOpen);
        assert!(breaker.acquire("games").is_ok());
    }
}
