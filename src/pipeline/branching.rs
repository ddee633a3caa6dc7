use crate::error::{PeleeError, PeleeResult};
use crate::event::Event;
use std::collections::HashMap;
use tracing::debug;

use super::context::{StageContext, StopSignal, SupportsStageAssignment};
use super::core::{invoke_stage, StageList};

/// Context with named alternate stage lists and named output slots
///
/// The pipeline's own stage list is the `default` branch. Stages may switch
/// to another registered branch mid-run (the cursor restarts at zero on the
/// new branch) and may copy intermediate events into output slots, which the
/// caller reads after `execute` returns.
///
/// Branches survive [`StageContext::reset`]; the active branch, the cursor,
/// the switch count, the outputs and the stop flag do not.
///
/// Every switch nests one more stage call on the stack, so a run may switch
/// at most [`BranchingContext::MAX_SWITCHES`] times.
pub struct BranchingContext {
    branches: HashMap<String, StageList>,
    current: String,
    cursor: usize,
    switches: usize,
    outputs: HashMap<String, Event>,
    stop: StopSignal,
}

impl BranchingContext {
    pub const CODE: &'static str = "branching";
    pub const DEFAULT_BRANCH: &'static str = "default";
    pub const MAX_SWITCHES: usize = 64;

    pub fn new() -> Self {
        let mut branches = HashMap::new();
        branches.insert(Self::DEFAULT_BRANCH.to_string(), Vec::new().into());
        Self {
            branches,
            current: Self::DEFAULT_BRANCH.to_string(),
            cursor: 0,
            switches: 0,
            outputs: HashMap::new(),
            stop: StopSignal::new(),
        }
    }

    /// Register (or replace) a named branch
    pub fn add_branch(&mut self, name: impl Into<String>, stages: StageList) {
        self.branches.insert(name.into(), stages);
    }

    /// Make `name` the active branch and restart its cursor
    ///
    /// # Errors
    ///
    /// Returns [`PeleeError::UnknownBranch`] if no branch was registered under
    /// `name`, and [`PeleeError::BranchLimitExceeded`] once the run has used up
    /// its switches. Either way the active branch and cursor are left as they were.
    pub fn switch_branch(&mut self, name: &str) -> PeleeResult<()> {
        if !self.branches.contains_key(name) {
            return Err(PeleeError::UnknownBranch(name.to_string()));
        }
        if self.switches >= Self::MAX_SWITCHES {
            return Err(PeleeError::BranchLimitExceeded {
                branch: name.to_string(),
                limit: Self::MAX_SWITCHES,
            });
        }
        debug!(from = %self.current, to = name, "Switching branch");
        self.switches += 1;
        self.current = name.to_string();
        self.cursor = 0;
        Ok(())
    }

    pub fn current_branch(&self) -> &str {
        &self.current
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    pub fn branch_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.branches.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Store a copy of `event` in the named output slot, replacing any previous one
    pub fn send_to_output(&mut self, name: impl Into<String>, event: &Event) {
        self.outputs.insert(name.into(), event.clone());
    }

    pub fn output(&self, name: &str) -> Option<&Event> {
        self.outputs.get(name)
    }

    pub fn outputs(&self) -> &HashMap<String, Event> {
        &self.outputs
    }

    pub fn take_outputs(&mut self) -> HashMap<String, Event> {
        std::mem::take(&mut self.outputs)
    }

    fn active_stages(&self) -> Option<&StageList> {
        self.branches.get(&self.current)
    }
}

impl Default for BranchingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StageContext for BranchingContext {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn next(&mut self, event: &mut Event) -> PeleeResult<()> {
        if self.should_stop() {
            return Ok(());
        }
        let Some(stage) = self
            .active_stages()
            .and_then(|stages| stages.get(self.cursor))
            .cloned()
        else {
            return Ok(());
        };
        self.cursor += 1;
        invoke_stage(stage.as_ref(), event, self)
    }

    fn reset(&mut self) {
        self.current = Self::DEFAULT_BRANCH.to_string();
        self.cursor = 0;
        self.switches = 0;
        self.outputs.clear();
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

    fn branching(&mut self) -> Option<&mut BranchingContext> {
        Some(self)
    }

    fn as_branching(&self) -> Option<&BranchingContext> {
        Some(self)
    }
}

impl SupportsStageAssignment for BranchingContext {
    /// Installs the pipeline's stages as the `default` branch
    fn set_stages(&mut self, stages: StageList) {
        self.branches
            .insert(Self::DEFAULT_BRANCH.to_string(), stages);
        if self.current == Self::DEFAULT_BRANCH {
            self.cursor = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::core::{stage_list, Stage, StageRef};
    use serde_json::json;
    use std::sync::Arc;

    /// Appends a tag to the payload array, then continues
    struct Tag(&'static str);

    impl Stage for Tag {
        fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
            if let Some(items) = event.payload_mut().as_array_mut() {
                items.push(json!(self.0));
            }
            context.next(event)
        }
    }

    /// Jumps to a branch, then continues on it
    struct Jump(&'static str);

    impl Stage for Jump {
        fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
            if let Some(branching) = context.branching() {
                branching.switch_branch(self.0)?;
            }
            context.next(event)
        }
    }

    struct Capture(&'static str);

    impl Stage for Capture {
        fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
            if let Some(branching) = context.branching() {
                branching.send_to_output(self.0, event);
            }
            context.next(event)
        }
    }

    fn stages(list: Vec<StageRef>) -> StageList {
        stage_list(list)
    }

    #[test]
    fn test_switch_to_unknown_branch_leaves_state() {
        let mut context = BranchingContext::new();
        context.set_stages(stages(vec![Arc::new(Tag("a")), Arc::new(Tag("b"))]));
        context.next(&mut Event::new(json!("not an array"))).unwrap();
        let cursor = context.cursor();

        let err = context.switch_branch("missing").unwrap_err();

        assert!(matches!(err, PeleeError::UnknownBranch(ref name) if name == "missing"));
        assert_eq!(context.current_branch(), BranchingContext::DEFAULT_BRANCH);
        assert_eq!(context.cursor(), cursor);
    }

    #[test]
    fn test_switch_branch_resets_cursor() {
        let mut context = BranchingContext::new();
        context.add_branch("alt", stages(vec![Arc::new(Tag("x"))]));
        context.set_stages(stages(vec![Arc::new(Tag("a")), Arc::new(Tag("b"))]));
        context.next(&mut Event::new(json!([]))).unwrap();
        assert_eq!(context.cursor(), 2);

        context.switch_branch("alt").unwrap();
        assert_eq!(context.current_branch(), "alt");
        assert_eq!(context.cursor(), 0);
    }

    #[test]
    fn test_mid_run_branch_switch() {
        let mut context = BranchingContext::new();
        context.add_branch("errors", stages(vec![Arc::new(Tag("e1")), Arc::new(Tag("e2"))]));
        context.set_stages(stages(vec![
            Arc::new(Tag("a")),
            Arc::new(Jump("errors")),
            Arc::new(Tag("never")),
        ]));
        let mut event = Event::new(json!([]));

        context.next(&mut event).unwrap();

        assert_eq!(event.payload(), &json!(["a", "e1", "e2"]));
        assert_eq!(context.current_branch(), "errors");
    }

    #[test]
    fn test_outputs_capture_intermediate_events() {
        let mut context = BranchingContext::new();
        context.set_stages(stages(vec![
            Arc::new(Tag("a")),
            Arc::new(Capture("after-a")),
            Arc::new(Tag("b")),
            Arc::new(Capture("after-b")),
        ]));
        let mut event = Event::new(json!([]));

        context.next(&mut event).unwrap();

        assert_eq!(context.output("after-a").unwrap().payload(), &json!(["a"]));
        assert_eq!(
            context.output("after-b").unwrap().payload(),
            &json!(["a", "b"])
        );
        assert!(context.output("missing").is_none());
    }

    #[test]
    fn test_branch_cycle_hits_switch_limit() {
        let mut context = BranchingContext::new();
        context.add_branch("ping", stages(vec![Arc::new(Jump("pong"))]));
        context.add_branch("pong", stages(vec![Arc::new(Jump("ping"))]));
        context.set_stages(stages(vec![Arc::new(Jump("ping"))]));

        let err = context.next(&mut Event::new(json!([]))).unwrap_err();

        assert!(matches!(
            err.root_cause(),
            PeleeError::BranchLimitExceeded { limit, .. } if *limit == BranchingContext::MAX_SWITCHES
        ));

        context.reset();
        assert!(context.switch_branch("ping").is_ok());
    }

    #[test]
    fn test_reset_keeps_branches() {
        let mut context = BranchingContext::new();
        context.add_branch("alt", stages(vec![]));
        context.switch_branch("alt").unwrap();
        context.send_to_output("x", &Event::new(json!(1)));
        context.request_stop("done");

        context.reset();

        assert_eq!(context.current_branch(), BranchingContext::DEFAULT_BRANCH);
        assert!(context.outputs().is_empty());
        assert!(!context.should_stop());
        assert_eq!(context.branch_names(), vec!["alt", "default"]);
    }
}
