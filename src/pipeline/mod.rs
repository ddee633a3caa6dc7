//! Stage/context execution model
//!
//! A pipeline is an ordered list of [`Stage`]s driven by a [`StageContext`].
//! The context owns a cursor; each stage does its work on the in-flight
//! [`Event`](crate::event::Event) and calls `context.next(event)` to hand
//! control to the following stage. Contexts come in two variants:
//! [`SequenceContext`] (one stage list) and [`BranchingContext`] (named
//! alternate stage lists plus output slots).
//!
//! # Example
//! ```
//! use pelee_lib::error::PeleeResult;
//! use pelee_lib::event::Event;
//! use pelee_lib::pipeline::{Pipeline, Stage, StageContext};
//! use serde_json::json;
//!
//! // Define a custom stage
//! struct Count;
//!
//! impl Stage for Count {
//!     fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
//!         let seen = event.payload()["seen"].as_i64().unwrap_or(0);
//!         event.payload_mut()["seen"] = json!(seen + 1);
//!         context.next(event)
//!     }
//!
//!     fn name(&self) -> &str {
//!         "count"
//!     }
//! }
//!
//! // Build and execute pipeline
//! let pipeline = Pipeline::builder("my-pipeline")
//!     .add_stage(Count)
//!     .add_stage(Count)
//!     .build();
//!
//! let mut event = Event::new(json!({}));
//! pipeline.execute(&mut event)?;
//! assert_eq!(event.payload()["seen"], 2);
//! # Ok::<(), pelee_lib::error::PeleeError>(())
//! ```

pub mod branching;
pub mod context;
pub mod core;
pub mod executor;
pub mod data;
pub mod filter;
pub mod filters;
pub mod metadata;
pub mod stages;

// Re-export main types
pub use branching::BranchingContext;
pub use context::{DetachedContext, SequenceContext, StageContext, StopSignal, SupportsStageAssignment};
pub use self::core::{invoke_stage, stage_list, Stage, StageList, StageRef};
pub use executor::{Pipeline, PipelineBuilder};
pub use data::{DataPipeline, DataPipelineBuilder, DataRunReport, InputSource, MemorySink, OutputSink, VecSource};
pub use filter::{ChainOutput, Filter, FilterChain, FilterContext, FilterOutcome, FilterRef};
pub use metadata::PipelineMetadata;
