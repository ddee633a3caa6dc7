//! Built-in filters for [`FilterChain`](super::FilterChain)
//!
//! Filter counterparts of the rename and remove stages. They share the
//! stage configuration shapes, work on a copy of the event and never halt.
//! When the run state holds an array under [`RENAME_LOG`] or [`REMOVE_LOG`],
//! each change is appended to it.

use super::filter::{Filter, FilterContext, FilterOutcome};
use super::stages::{object_at, RemoveConfig, RenameConfig};
use crate::error::PeleeResult;
use crate::event::Event;
use serde_json::{json, Value};

pub const RENAME_LOG: &str = "rename_log";
pub const REMOVE_LOG: &str = "remove_log";

fn append_log(context: &mut FilterContext<'_>, key: &str, entry: String) {
    if let Some(Value::Array(mut log)) = context.remove_state(key) {
        log.push(json!(entry));
        context.set_state(key, Value::Array(log));
    }
}

/// Filter that renames keys inside an object
pub struct RenameFilter {
    path: Option<String>,
    mappings: Vec<(String, String)>,
}

impl RenameFilter {
    pub const TYPE_CODE: &'static str = "rename";

    pub fn new(config: RenameConfig) -> Self {
        let mut mappings: Vec<(String, String)> = config.mappings.into_iter().collect();
        if let (Some(source), Some(dest)) = (config.source, config.dest) {
            mappings.push((source, dest));
        }
        Self {
            path: config.path,
            mappings,
        }
    }
}

impl Filter for RenameFilter {
    fn filter(&self, event: &Event, context: &mut FilterContext<'_>) -> PeleeResult<FilterOutcome> {
        let mut next = event.clone();
        if let Some(object) = object_at(next.payload_mut(), self.path.as_deref()) {
            for (from, to) in &self.mappings {
                if from == to {
                    continue;
                }
                if let Some(value) = object.remove(from) {
                    object.insert(to.clone(), value);
                    append_log(context, RENAME_LOG, format!("Renamed '{}' to '{}'", from, to));
                }
            }
        }
        Ok(FilterOutcome::Continue(next))
    }

    fn name(&self) -> &str {
        Self::TYPE_CODE
    }
}

/// Filter that drops keys from an object
pub struct RemoveFilter {
    config: RemoveConfig,
}

impl RemoveFilter {
    pub const TYPE_CODE: &'static str = "remove";

    pub fn new(config: RemoveConfig) -> Self {
        Self { config }
    }
}

impl Filter for RemoveFilter {
    fn filter(&self, event: &Event, context: &mut FilterContext<'_>) -> PeleeResult<FilterOutcome> {
        let mut next = event.clone();
        if let Some(object) = object_at(next.payload_mut(), self.config.path.as_deref()) {
            for field in &self.config.fields {
                if object.remove(field).is_some() {
                    append_log(context, REMOVE_LOG, format!("Removed field: {}", field));
                }
            }
        }
        Ok(FilterOutcome::Continue(next))
    }

    fn name(&self) -> &str {
        Self::TYPE_CODE
    }
}
