//! Plugin registry and pipeline assembly
//!
//! Stage types are registered explicitly through [`StageDescriptor`]s,
//! filter types through [`FilterDescriptor`]s, and contexts through
//! [`ContextRegistry`]. [`PipelineFactory`] turns a JSON
//! [`PipelineDefinition`] into a runnable pipeline.

pub mod contexts;
pub mod descriptor;
pub mod factory;
pub mod filters;
pub mod stages;

pub use contexts::ContextRegistry;
pub use descriptor::{parse_config, stage_type_of, Descriptor, StageDescriptor, DISCRIMINATOR_KEYS};
pub use factory::{AssemblySummary, PipelineDefinition, PipelineFactory};
pub use filters::{builtin_filter_descriptors, FilterDescriptor, FilterRegistry, TypedFilter};
pub use stages::StageRegistry;
