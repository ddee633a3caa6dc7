//! Built-in leaf stages
//!
//! Field transforms and routing helpers that ship with the engine:
//! 1. RenameStage - Rename keys inside an object
//! 2. MoveStage - Move (or copy) a value between objects
//! 3. RemoveStage - Drop keys from an object
//! 4. PrintStage - Log the event
//! 5. RouteStage - Switch branch on a field value
//! 6. OutputStage - Copy the event into a named output slot
//!
//! Every stage does its work and then continues the chain.

pub mod move_field;
pub mod output;
pub mod print;
pub mod remove;
pub mod rename;
pub mod route;

use crate::registry::{Descriptor, StageDescriptor};
use serde_json::{Map, Value};
use std::sync::Arc;

// Re-export stages
pub use move_field::{MoveConfig, MoveStage};
pub use output::{OutputConfig, OutputStage};
pub use print::{PrintConfig, PrintStage};
pub use remove::{RemoveConfig, RemoveStage};
pub use rename::{RenameConfig, RenameStage};
pub use route::{RouteConfig, RouteStage};

/// Descriptors for every built-in stage type
pub fn builtin_descriptors() -> Vec<Box<dyn StageDescriptor>> {
    vec![
        Box::new(
            Descriptor::new(rename::TYPE_CODE, |config: RenameConfig| {
                Ok(Arc::new(RenameStage::new(config)) as _)
            })
            .with_description("Rename object keys"),
        ),
        Box::new(
            Descriptor::new(move_field::TYPE_CODE, |config: MoveConfig| {
                Ok(Arc::new(MoveStage::new(config)) as _)
            })
            .with_description("Move a value between objects"),
        ),
        Box::new(
            Descriptor::new(remove::TYPE_CODE, |config: RemoveConfig| {
                Ok(Arc::new(RemoveStage::new(config)) as _)
            })
            .with_description("Remove object keys"),
        ),
        Box::new(
            Descriptor::new(print::TYPE_CODE, |config: PrintConfig| {
                Ok(Arc::new(PrintStage::new(config)) as _)
            })
            .with_description("Log the event payload"),
        ),
        Box::new(
            Descriptor::new(route::TYPE_CODE, |config: RouteConfig| {
                Ok(Arc::new(RouteStage::new(config)) as _)
            })
            .with_description("Switch branch based on a field value"),
        ),
        Box::new(
            Descriptor::new(output::TYPE_CODE, |config: OutputConfig| {
                Ok(Arc::new(OutputStage::new(config)) as _)
            })
            .with_description("Copy the event into a named output"),
        ),
    ]
}

/// Resolve a JSON pointer; empty and `/` mean the root
pub(crate) fn value_at<'a>(payload: &'a Value, path: Option<&str>) -> Option<&'a Value> {
    match path {
        None | Some("") | Some("/") => Some(payload),
        Some(pointer) => payload.pointer(pointer),
    }
}

/// Mutable object at a JSON pointer, if the target is an object
pub(crate) fn object_at<'a>(
    payload: &'a mut Value,
    path: Option<&str>,
) -> Option<&'a mut Map<String, Value>> {
    let target = match path {
        None | Some("") | Some("/") => Some(payload),
        Some(pointer) => payload.pointer_mut(pointer),
    };
    target.and_then(Value::as_object_mut)
}
