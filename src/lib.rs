//! Configuration-driven record-processing pipelines
//!
//! Stages are plugged in through a [`registry::StageRegistry`] and assembled
//! from JSON definitions by a [`registry::PipelineFactory`]. Two engines run
//! them: the chained [`pipeline::Pipeline`] and the multi-strategy
//! [`enhanced::EnhancedPipeline`]. [`pipeline::FilterChain`] offers a lighter
//! closure-based chain, which [`pipeline::DataPipeline`] wires between input
//! sources and output sinks.

pub mod catalog;
pub mod config;
pub mod enhanced;
pub mod error;
pub mod event;
pub mod logger;
pub mod pipeline;
pub mod registry;

pub use error::{PeleeError, PeleeResult};
pub use event::Event;
