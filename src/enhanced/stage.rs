use super::context::EnhancedContext;
use crate::error::PeleeResult;
use crate::event::Event;
use crate::pipeline::{DetachedContext, StageRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Coarse, advisory health signal derived from a stage's error rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl fmt::Display for StageHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageHealth::Healthy => "HEALTHY",
            StageHealth::Degraded => "DEGRADED",
            StageHealth::Unhealthy => "UNHEALTHY",
            StageHealth::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Stage with the full lifecycle
///
/// `initialize` runs once per pipeline before any execution. Each run then
/// calls `validate` and `process_enhanced` per event, `flush` after the last
/// element of a batch, and `cleanup` once the run is over, whatever its
/// outcome.
///
/// Stages are shared by every run and, under the parallel strategy, by
/// several threads at once. Keep mutable state behind interior mutability
/// or in the [`EnhancedContext`].
pub trait EnhancedStage: Send + Sync {
    fn name(&self) -> &str;

    /// One-time setup with the pipeline's `configuration` block
    fn initialize(&self, _config: &Value, _context: &EnhancedContext) -> PeleeResult<()> {
        Ok(())
    }

    /// Reject an event before processing; aborts that event only
    fn validate(&self, _event: &Event, _context: &EnhancedContext) -> PeleeResult<()> {
        Ok(())
    }

    fn process_enhanced(&self, event: &mut Event, context: &EnhancedContext) -> PeleeResult<()>;

    /// No more input is coming in this run
    fn flush(&self, _context: &EnhancedContext) -> PeleeResult<()> {
        Ok(())
    }

    /// Release per-run resources; failures are recorded, never raised
    fn cleanup(&self, _context: &EnhancedContext) -> PeleeResult<()> {
        Ok(())
    }

    fn health(&self) -> StageHealth {
        StageHealth::Unknown
    }

    fn statistics(&self) -> Option<StatsSnapshot> {
        None
    }
}

/// Point-in-time copy of [`StageStats`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub invocations: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub total_time_ms: f64,
}

/// Lock-free invocation and error counters for a stage
#[derive(Debug, Default)]
pub struct StageStats {
    invocations: AtomicU64,
    errors: AtomicU64,
    total_micros: AtomicU64,
}

impl StageStats {
    /// Error rate below this is healthy
    pub const DEGRADED_THRESHOLD: f64 = 0.05;
    /// Error rate at or above this is unhealthy
    pub const UNHEALTHY_THRESHOLD: f64 = 0.25;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration, failed: bool) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn error_rate(&self) -> f64 {
        let invocations = self.invocations();
        if invocations == 0 {
            return 0.0;
        }
        self.errors() as f64 / invocations as f64
    }

    pub fn health(&self) -> StageHealth {
        if self.invocations() == 0 {
            return StageHealth::Unknown;
        }
        let rate = self.error_rate();
        if rate < Self::DEGRADED_THRESHOLD {
            StageHealth::Healthy
        } else if rate < Self::UNHEALTHY_THRESHOLD {
            StageHealth::Degraded
        } else {
            StageHealth::Unhealthy
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            invocations: self.invocations(),
            errors: self.errors(),
            error_rate: self.error_rate(),
            total_time_ms: self.total_micros.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Runs a chained [`Stage`](crate::pipeline::Stage) as an [`EnhancedStage`]
///
/// The wrapped stage sees a [`DetachedContext`]: its `next` call is a no-op
/// and its stop requests reach the run's stop signal.
pub struct StageAdapter {
    stage: StageRef,
    stats: StageStats,
}

impl StageAdapter {
    pub fn new(stage: StageRef) -> Self {
        Self {
            stage,
            stats: StageStats::new(),
        }
    }

    pub fn inner(&self) -> &StageRef {
        &self.stage
    }
}

impl EnhancedStage for StageAdapter {
    fn name(&self) -> &str {
        self.stage.name()
    }

    fn process_enhanced(&self, event: &mut Event, context: &EnhancedContext) -> PeleeResult<()> {
        let mut detached = DetachedContext::new(context.stop_signal());
        let started = Instant::now();
        let result = self.stage.process(event, &mut detached);
        self.stats.record(started.elapsed(), result.is_err());
        result
    }

    fn health(&self) -> StageHealth {
        self.stats.health()
    }

    fn statistics(&self) -> Option<StatsSnapshot> {
        Some(self.stats.snapshot())
    }
}
