use crate::error::{PeleeError, PeleeResult};
use crate::event::Event;
use std::sync::Arc;
use tracing::{debug, warn};

use super::context::StageContext;

/// A single processing step in a pipeline
///
/// A stage consumes the in-flight event and the context that sequences it.
/// It may rewrite the event, then hands control onward by calling
/// `context.next(event)`. A stage that returns without calling `next`
/// ends the run early; filters use this to drop events.
///
/// # Example
/// ```
/// use pelee_lib::error::PeleeResult;
/// use pelee_lib::event::Event;
/// use pelee_lib::pipeline::{Stage, StageContext};
///
/// struct Upper;
///
/// impl Stage for Upper {
///     fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
///         if let Some(text) = event.payload().as_str() {
///             let upper = text.to_uppercase();
///             event.set_payload(upper.into());
///         }
///         context.next(event)
///     }
///
///     fn name(&self) -> &str {
///         "upper"
///     }
/// }
/// ```
pub trait Stage: Send + Sync {
    /// Process the event and (normally) continue the chain
    ///
    /// Returning an error stops the run. The context records the failure as
    /// its stop reason and the caller of `execute` sees
    /// [`PeleeError::ExecutionStopped`].
    fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()>;

    /// Get stage name for logging and metrics
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Shared handle to a stage instance
pub type StageRef = Arc<dyn Stage>;

/// Ordered, fixed stage list shared between a pipeline and its context
pub type StageList = Arc<[StageRef]>;

/// Invoke one stage on behalf of a context
///
/// Failures that are not already a stopped run set the context's stop flag
/// with `Stage processing failed: <error>` and come back wrapped in
/// [`PeleeError::ExecutionStopped`]. Outer frames of a re-entrant chain pass
/// the wrapped error through untouched.
pub fn invoke_stage(
    stage: &dyn Stage,
    event: &mut Event,
    context: &mut dyn StageContext,
) -> PeleeResult<()> {
    debug!(stage = stage.name(), context = context.code(), "Invoking stage");

    match stage.process(event, context) {
        Ok(()) => Ok(()),
        Err(err) if err.is_stopped() => Err(err),
        Err(err) => {
            let reason = format!("Stage processing failed: {}", err);
            warn!(stage = stage.name(), error = %err, "Stage failed, stopping pipeline");
            context.request_stop(&reason);
            Err(PeleeError::ExecutionStopped {
                reason,
                source: Box::new(err),
            })
        }
    }
}

/// Collect concrete stages into a shared stage list
pub fn stage_list<I>(stages: I) -> StageList
where
    I: IntoIterator<Item = StageRef>,
{
    stages.into_iter().collect::<Vec<_>>().into()
}
