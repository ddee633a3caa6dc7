use crate::error::PeleeResult;
use crate::event::Event;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use super::branching::BranchingContext;
use super::core::{invoke_stage, StageList};

/// Cooperative stop flag shared by everything taking part in one run
///
/// The first call to [`StopSignal::request`] wins: it sets the flag and
/// records the reason. Later requests are no-ops, so the reason always
/// describes the first cause. Readers on any thread may poll it freely.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    reason: OnceLock<String>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; returns `true` if this call set the flag
    pub fn request(&self, reason: &str) -> bool {
        let first = self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            let _ = self.reason.set(reason.to_string());
        }
        first
    }

    pub fn is_set(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Re-arm the signal for a new run
    pub fn clear(&mut self) {
        *self.stopped.get_mut() = false;
        self.reason.take();
    }
}

/// State machine that sequences stage invocation for one run
///
/// `next` invokes the stage at the cursor, advancing the cursor *before* the
/// call so that a stage calling `next` from inside its own body resumes at
/// the following stage. Once the stop flag is set `next` does nothing.
pub trait StageContext: Send {
    /// Registry code of this context variant
    fn code(&self) -> &str;

    /// Invoke the stage at the cursor, if any
    fn next(&mut self, event: &mut Event) -> PeleeResult<()>;

    /// Prepare for a fresh run: cursor to zero, stop flag cleared
    fn reset(&mut self);

    /// Index of the next stage to run in the active stage list
    fn cursor(&self) -> usize;

    fn stop_signal(&self) -> &StopSignal;

    fn should_stop(&self) -> bool {
        self.stop_signal().is_set()
    }

    /// Request a stop; only the first reason of a run is kept
    fn request_stop(&self, reason: &str) -> bool {
        self.stop_signal().request(reason)
    }

    fn stop_reason(&self) -> Option<&str> {
        self.stop_signal().reason()
    }

    /// Capability query: contexts whose stage list can be injected
    fn stage_assignment(&mut self) -> Option<&mut dyn SupportsStageAssignment> {
        None
    }

    /// Capability query: contexts with named branches and output slots
    fn branching(&mut self) -> Option<&mut BranchingContext> {
        None
    }

    fn as_branching(&self) -> Option<&BranchingContext> {
        None
    }
}

/// Capability of contexts that accept the pipeline's stage list
pub trait SupportsStageAssignment {
    fn set_stages(&mut self, stages: StageList);
}

/// Plain sequential cursor over a single stage list
pub struct SequenceContext {
    stages: StageList,
    cursor: usize,
    stop: StopSignal,
}

impl SequenceContext {
    pub const CODE: &'static str = "sequence";

    pub fn new() -> Self {
        Self {
            stages: Vec::new().into(),
            cursor: 0,
            stop: StopSignal::new(),
        }
    }

    pub fn with_stages(stages: StageList) -> Self {
        Self {
            stages,
            ..Self::new()
        }
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.stages.len()
    }
}

impl Default for SequenceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StageContext for SequenceContext {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn next(&mut self, event: &mut Event) -> PeleeResult<()> {
        if self.should_stop() {
            return Ok(());
        }
        let Some(stage) = self.stages.get(self.cursor).cloned() else {
            return Ok(());
        };
        self.cursor += 1;
        invoke_stage(stage.as_ref(), event, self)
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.stop.clear();
    }

    fn cursor(&self) -> usize {
        self.cursor
    }

    fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    fn stage_assignment(&mut self) -> Option<&mut dyn SupportsStageAssignment> {
        Some(self)
    }
}

impl SupportsStageAssignment for SequenceContext {
    fn set_stages(&mut self, stages: StageList) {
        self.stages = stages;
        self.cursor = 0;
    }
}

/// Context for running a chained stage in isolation
///
/// `next` is a no-op, so a stage written for chaining does its own work and
/// returns. The stop signal is borrowed from the surrounding run; a stage
/// that requests a stop here stops that run.
pub struct DetachedContext<'a> {
    stop: &'a StopSignal,
}

impl<'a> DetachedContext<'a> {
    pub const CODE: &'static str = "detached";

    pub fn new(stop: &'a StopSignal) -> Self {
        Self { stop }
    }
}

impl StageContext for DetachedContext<'_> {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn next(&mut self, _event: &mut Event) -> PeleeResult<()> {
        Ok(())
    }

    fn reset(&mut self) {}

    fn cursor(&self) -> usize {
        0
    }

    fn stop_signal(&self) -> &StopSignal {
        self.stop
    }
}
