//! Inference service monitoring.
//!
//! [`ServiceMonitor`] is an explicit periodic task: each [`tick`] performs at
//! most one health check, and only once the configured interval has elapsed
//! on the injected [`Clock`]. [`validate_models`] reports which configured
//! models the service cannot serve.
//!
//! [`tick`]: ServiceMonitor::tick

use crate::client::{canonical_model_name, ModelClient};
use crate::config::ModelAssignments;
use crate::errors::TransportError;
use crate::pipeline::CancellationToken;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    last_check: Option<Instant>,
    ready: bool,
    last_error: Option<TransportError>,
    checks: u64,
}

/// Tracks whether the inference service is reachable.
pub struct ServiceMonitor {
    client: Arc<dyn ModelClient>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<MonitorState>,
}

impl ServiceMonitor {
    /// Creates a monitor on the system clock.
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>, interval: Duration) -> Self {
        Self {
            client,
            interval,
            clock: Arc::new(SystemClock),
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Interval between checks.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Result of the last check; false before the first one.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Error from the last failed check, cleared by a successful one.
    #[must_use]
    pub fn last_error(&self) -> Option<TransportError> {
        self.state.lock().last_error.clone()
    }

    /// Number of checks performed.
    #[must_use]
    pub fn check_count(&self) -> u64 {
        self.state.lock().checks
    }

    /// Runs a check if the interval has elapsed since the last one.
    ///
    /// Returns the new readiness, or `None` if no check was due.
    pub async fn tick(&self) -> Option<bool> {
        {
            let mut state = self.state.lock();
            let now = self.clock.now();
            let due = state
                .last_check
                .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
            if !due {
                return None;
            }
            state.last_check = Some(now);
        }
        Some(self.check_now().await)
    }

    /// Runs a check immediately.
    pub async fn check_now(&self) -> bool {
        let outcome = self.client.health().await;

        let mut state = self.state.lock();
        state.checks += 1;
        let was_ready = state.ready;
        match outcome {
            Ok(()) => {
                state.ready = true;
                state.last_error = None;
                if !was_ready {
                    info!("Inference service ready");
                }
            }
            Err(e) => {
                state.ready = false;
                if was_ready {
                    warn!(error = %e, "Inference service lost");
                } else {
                    debug!(error = %e, "Inference service not ready");
                }
                state.last_error = Some(e);
            }
        }
        state.ready
    }

    /// Drives [`tick`](Self::tick) on a timer until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: Arc<CancellationToken>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Service monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for ServiceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMonitor")
            .field("interval", &self.interval)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// Returns the `(purpose, model)` pairs the service cannot serve.
///
/// Model tags are compared after normalising a missing tag to `:latest`.
pub async fn validate_models(
    client: &dyn ModelClient,
    models: &ModelAssignments,
) -> Result<Vec<(String, String)>, TransportError> {
    let available: HashSet<String> = client
        .list_models()
        .await?
        .iter()
        .map(|m| canonical_model_name(m))
        .collect();

    let missing: Vec<(String, String)> = models
        .purposes()
        .into_iter()
        .filter(|(_, model)| !available.contains(&canonical_model_name(model)))
        .map(|(purpose, model)| (purpose.to_string(), model.to_string()))
        .collect();

    if !missing.is_empty() {
        warn!(missing = ?missing, "Configured models not available");
    }
    Ok(missing)
}
