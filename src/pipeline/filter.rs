//! Sequential filter chain
//!
//! A lighter composition model than stage contexts: each filter sees the
//! current event and a [`FilterContext`], and either hands back an event to
//! continue with or halts the chain. There is no branching, lifecycle or
//! re-entrancy; filters are never mutated by the chain.

use crate::error::PeleeResult;
use crate::event::Event;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// What a filter wants to happen next
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// Continue with this (possibly new) event
    Continue(Event),
    /// Stop the chain without error
    Halt,
}

/// A pure step in a [`FilterChain`]
pub trait Filter: Send + Sync {
    fn filter(&self, event: &Event, context: &mut FilterContext<'_>) -> PeleeResult<FilterOutcome>;

    fn name(&self) -> &str {
        "filter"
    }
}

/// Shared reference to a filter
pub type FilterRef = Arc<dyn Filter>;

impl<F> Filter for F
where
    F: Fn(&Event, &mut FilterContext<'_>) -> PeleeResult<FilterOutcome> + Send + Sync,
{
    fn filter(&self, event: &Event, context: &mut FilterContext<'_>) -> PeleeResult<FilterOutcome> {
        self(event, context)
    }
}

/// Per-filter view of the chain: shared config plus mutable run state
pub struct FilterContext<'a> {
    filter_id: String,
    index: usize,
    config: &'a HashMap<String, Value>,
    state: &'a mut HashMap<String, Value>,
}

impl<'a> FilterContext<'a> {
    pub fn new(
        index: usize,
        config: &'a HashMap<String, Value>,
        state: &'a mut HashMap<String, Value>,
    ) -> Self {
        Self {
            filter_id: format!("filter-{}", index),
            index,
            config,
            state,
        }
    }

    pub fn filter_id(&self) -> &str {
        &self.filter_id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn config(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn global_config(&self) -> &HashMap<String, Value> {
        self.config
    }

    pub fn state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    pub fn remove_state(&mut self, key: &str) -> Option<Value> {
        self.state.remove(key)
    }

    /// Nested context for a sub-filter, sharing config and run state
    pub fn child(&mut self, name: &str) -> FilterContext<'_> {
        FilterContext {
            filter_id: format!("{}.{}", self.filter_id, name),
            index: self.index,
            config: self.config,
            state: &mut *self.state,
        }
    }
}

/// Result of running a chain once
#[derive(Debug, Clone)]
pub struct ChainOutput {
    /// Final event, or the last continued event if the chain halted
    pub event: Event,
    /// Index of the filter that halted the chain
    pub halted_at: Option<usize>,
    /// Run state as the filters left it
    pub state: HashMap<String, Value>,
}

impl ChainOutput {
    pub fn completed(&self) -> bool {
        self.halted_at.is_none()
    }
}

/// Immutable, ordered list of filters
///
/// Every modifier returns a new chain; filters are shared between copies.
///
/// # Example
/// ```
/// use pelee_lib::error::PeleeResult;
/// use pelee_lib::event::Event;
/// use pelee_lib::pipeline::filter::{FilterChain, FilterContext, FilterOutcome};
/// use serde_json::json;
///
/// let chain = FilterChain::new()
///     .with_filter(|event: &Event, _: &mut FilterContext<'_>| -> PeleeResult<FilterOutcome> {
///         Ok(FilterOutcome::Continue(event.with_payload(json!("seen"))))
///     });
///
/// let output = chain.process(Event::new(json!(null)))?;
/// assert_eq!(output.event.payload(), &json!("seen"));
/// # Ok::<(), pelee_lib::error::PeleeError>(())
/// ```
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<FilterRef>,
    global_config: HashMap<String, Value>,
    initial_state: HashMap<String, Value>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn with_filter<F: Filter + 'static>(&self, filter: F) -> Self {
        let mut chain = self.clone();
        chain.filters.push(Arc::new(filter));
        chain
    }

    /// Append an already shared filter, e.g. one built by a registry
    pub fn with_filter_ref(&self, filter: FilterRef) -> Self {
        let mut chain = self.clone();
        chain.filters.push(filter);
        chain
    }

    /// Insert a filter at `index` (clamped to the chain length)
    pub fn insert_filter<F: Filter + 'static>(&self, index: usize, filter: F) -> Self {
        let mut chain = self.clone();
        let index = index.min(chain.filters.len());
        chain.filters.insert(index, Arc::new(filter));
        chain
    }

    /// Copy without the filter at `index`; out of range leaves the chain as is
    pub fn without_filter(&self, index: usize) -> Self {
        let mut chain = self.clone();
        if index < chain.filters.len() {
            chain.filters.remove(index);
        }
        chain
    }

    pub fn with_global_config(&self, key: impl Into<String>, value: Value) -> Self {
        let mut chain = self.clone();
        chain.global_config.insert(key.into(), value);
        chain
    }

    pub fn with_initial_state(&self, key: impl Into<String>, value: Value) -> Self {
        let mut chain = self.clone();
        chain.initial_state.insert(key.into(), value);
        chain
    }

    pub fn global_config(&self) -> &HashMap<String, Value> {
        &self.global_config
    }

    /// Run the event through every filter until one halts
    ///
    /// # Errors
    ///
    /// Propagates the first filter error; later filters do not run.
    pub fn process(&self, event: Event) -> PeleeResult<ChainOutput> {
        let mut state = self.initial_state.clone();
        let mut current = event;

        for (index, filter) in self.filters.iter().enumerate() {
            let mut context = FilterContext::new(index, &self.global_config, &mut state);
            match filter.filter(&current, &mut context)? {
                FilterOutcome::Continue(next) => current = next,
                FilterOutcome::Halt => {
                    debug!(filter = filter.name(), index, "Filter chain halted");
                    return Ok(ChainOutput {
                        event: current,
                        halted_at: Some(index),
                        state,
                    });
                }
            }
        }

        Ok(ChainOutput {
            event: current,
            halted_at: None,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeleeError;
    use serde_json::json;

    fn add(n: i64) -> impl Filter {
        move |event: &Event, context: &mut FilterContext<'_>| -> PeleeResult<FilterOutcome> {
            let value = event.payload().as_i64().unwrap_or(0) + n;
            let id = context.filter_id().to_string();
            context.set_state(id, json!(value));
            Ok(FilterOutcome::Continue(event.with_payload(json!(value))))
        }
    }

    fn halt_above(limit: i64) -> impl Filter {
        move |event: &Event, _: &mut FilterContext<'_>| -> PeleeResult<FilterOutcome> {
            if event.payload().as_i64().unwrap_or(0) > limit {
                Ok(FilterOutcome::Halt)
            } else {
                Ok(FilterOutcome::Continue(event.clone()))
            }
        }
    }

    #[test]
    fn test_chain_runs_all_filters() {
        let chain = FilterChain::new().with_filter(add(1)).with_filter(add(10));
        let output = chain.process(Event::new(json!(0))).unwrap();

        assert!(output.completed());
        assert_eq!(output.event.payload(), &json!(11));
        assert_eq!(output.state.get("filter-0"), Some(&json!(1)));
        assert_eq!(output.state.get("filter-1"), Some(&json!(11)));
    }

    #[test]
    fn test_halt_returns_current_event() {
        let chain = FilterChain::new()
            .with_filter(add(5))
            .with_filter(halt_above(3))
            .with_filter(add(100));
        let output = chain.process(Event::new(json!(0))).unwrap();

        assert_eq!(output.halted_at, Some(1));
        assert_eq!(output.event.payload(), &json!(5));
    }

    #[test]
    fn test_modifiers_do_not_touch_original() {
        let base = FilterChain::new().with_filter(add(1));
        let longer = base.insert_filter(0, add(2));
        let shorter = longer.without_filter(1);

        assert_eq!(base.len(), 1);
        assert_eq!(longer.len(), 2);
        assert_eq!(shorter.len(), 1);
        assert_eq!(
            shorter.process(Event::new(json!(0))).unwrap().event.payload(),
            &json!(2)
        );
        assert_eq!(longer.without_filter(9).len(), 2);
    }

    #[test]
    fn test_state_is_fresh_per_run() {
        let counter = |event: &Event, context: &mut FilterContext<'_>| -> PeleeResult<FilterOutcome> {
            let seen = context.state("count").and_then(Value::as_i64).unwrap_or(0);
            context.set_state("count", json!(seen + 1));
            Ok(FilterOutcome::Continue(event.clone()))
        };
        let chain = FilterChain::new()
            .with_initial_state("count", json!(10))
            .with_filter(counter);

        let first = chain.process(Event::new(json!(null))).unwrap();
        let second = chain.process(Event::new(json!(null))).unwrap();

        assert_eq!(first.state.get("count"), Some(&json!(11)));
        assert_eq!(second.state.get("count"), Some(&json!(11)));
    }

    #[test]
    fn test_global_config_and_child_context() {
        let reads_config = |event: &Event, context: &mut FilterContext<'_>| -> PeleeResult<FilterOutcome> {
            let factor = context.config("factor").and_then(Value::as_i64).unwrap_or(1);
            let mut child = context.child("inner");
            assert_eq!(child.filter_id(), "filter-0.inner");
            child.set_state("from_child", json!(true));
            let value = event.payload().as_i64().unwrap_or(0) * factor;
            Ok(FilterOutcome::Continue(event.with_payload(json!(value))))
        };
        let chain = FilterChain::new()
            .with_global_config("factor", json!(3))
            .with_filter(reads_config);

        let output = chain.process(Event::new(json!(7))).unwrap();

        assert_eq!(output.event.payload(), &json!(21));
        assert_eq!(output.state.get("from_child"), Some(&json!(true)));
    }

    #[test]
    fn test_filter_error_propagates() {
        let failing = |_: &Event, _: &mut FilterContext<'_>| -> PeleeResult<FilterOutcome> {
            Err(PeleeError::GenericError("nope".to_string()))
        };
        let chain = FilterChain::new().with_filter(failing).with_filter(add(1));
        assert!(chain.process(Event::new(json!(0))).is_err());
    }
}
