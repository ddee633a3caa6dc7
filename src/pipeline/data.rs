//! Source, filter chain and sink orchestration
//!
//! A [`DataPipeline`] reads one event from every [`InputSource`], runs each
//! through a [`FilterChain`] and hands the survivors to every [`OutputSink`].
//! Events whose chain halts are dropped.

use super::filter::FilterChain;
use super::metadata::PipelineMetadata;
use crate::error::{PeleeError, PeleeResult};
use crate::event::Event;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where events come from
pub trait InputSource: Send + Sync {
    /// Next event, or `None` when the source has nothing this round
    fn read(&self) -> PeleeResult<Option<Event>>;

    fn name(&self) -> &str {
        "input"
    }
}

/// Where processed events go
pub trait OutputSink: Send + Sync {
    fn send(&self, event: &Event) -> PeleeResult<()>;

    fn name(&self) -> &str {
        "output"
    }
}

/// In-memory source handing out queued events one per read
#[derive(Default)]
pub struct VecSource {
    events: Mutex<VecDeque<Event>>,
}

impl VecSource {
    pub fn new<I>(events: I) -> Self
    where
        I: IntoIterator<Item = Event>,
    {
        Self {
            events: Mutex::new(events.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }
}

impl InputSource for VecSource {
    fn read(&self) -> PeleeResult<Option<Event>> {
        Ok(self.events.lock()?.pop_front())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// In-memory sink; clones share the collected events
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutputSink for MemorySink {
    fn send(&self, event: &Event) -> PeleeResult<()> {
        self.events.lock()?.push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Counts from one or more rounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataRunReport {
    /// Events read from sources
    pub read: usize,
    /// Events that made it through the chain and were offered to the sinks
    pub delivered: usize,
    /// Events halted by the chain
    pub dropped: usize,
}

impl DataRunReport {
    fn absorb(&mut self, other: DataRunReport) {
        self.read += other.read;
        self.delivered += other.delivered;
        self.dropped += other.dropped;
    }
}

/// Input sources, a filter chain and output sinks run as one unit
///
/// # Example
/// ```
/// use pelee_lib::event::Event;
/// use pelee_lib::pipeline::{DataPipeline, MemorySink, VecSource};
/// use pelee_lib::registry::FilterRegistry;
/// use serde_json::json;
///
/// let chain = FilterRegistry::with_builtin_filters()?
///     .create_chain(&[json!({"type": "rename", "mappings": {"a": "b"}})])?;
/// let sink = MemorySink::new();
/// let pipeline = DataPipeline::builder("copy")
///     .source(VecSource::new([Event::new(json!({"a": 1}))]))
///     .filter_chain(chain)
///     .sink(sink.clone())
///     .build();
///
/// let report = pipeline.execute()?;
/// assert_eq!(report.delivered, 1);
/// assert_eq!(sink.events()[0].payload(), &json!({"b": 1}));
/// # Ok::<(), pelee_lib::error::PeleeError>(())
/// ```
pub struct DataPipeline {
    metadata: PipelineMetadata,
    sources: Vec<Arc<dyn InputSource>>,
    chain: FilterChain,
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl DataPipeline {
    pub fn builder(id: impl Into<String>) -> DataPipelineBuilder {
        DataPipelineBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        self.metadata.name()
    }

    pub fn metadata(&self) -> &PipelineMetadata {
        &self.metadata
    }

    pub fn filter_chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// A pipeline without sources or without sinks moves nothing
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() || self.sinks.is_empty()
    }

    /// Run one round: one read per source
    ///
    /// Every source is read before any event is filtered. Each surviving
    /// event is offered to every sink even if an earlier sink fails.
    ///
    /// # Errors
    ///
    /// A source or filter error ends the round at once. Sink errors are
    /// collected and the first one is returned once the round is over.
    pub fn execute(&self) -> PeleeResult<DataRunReport> {
        let start = Instant::now();
        let mut report = DataRunReport::default();

        let mut inputs = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            if let Some(event) = source.read()? {
                debug!(source = source.name(), "Read event");
                inputs.push(event);
            }
        }
        report.read = inputs.len();

        let mut first_error: Option<PeleeError> = None;
        for event in inputs {
            let output = self.chain.process(event)?;
            if !output.completed() {
                report.dropped += 1;
                continue;
            }
            report.delivered += 1;
            for sink in &self.sinks {
                if let Err(err) = sink.send(&output.event) {
                    warn!(sink = sink.name(), error = %err, "Sink failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        info!(
            "Data pipeline '{}' round: {} read, {} delivered, {} dropped in {:.2}s",
            self.id(),
            report.read,
            report.delivered,
            report.dropped,
            start.elapsed().as_secs_f64()
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Run rounds until no source yields an event
    pub fn drain(&self) -> PeleeResult<DataRunReport> {
        let mut total = DataRunReport::default();
        loop {
            let round = self.execute()?;
            if round.read == 0 {
                return Ok(total);
            }
            total.absorb(round);
        }
    }

    /// Run [`execute`](Self::execute) on the caller's tokio blocking pool
    pub async fn execute_async(self: Arc<Self>) -> PeleeResult<DataRunReport> {
        tokio::task::spawn_blocking(move || self.execute())
            .await
            .map_err(|e| PeleeError::WorkerPool(format!("Execution task failed: {}", e)))?
    }
}

pub struct DataPipelineBuilder {
    metadata: PipelineMetadata,
    sources: Vec<Arc<dyn InputSource>>,
    chain: FilterChain,
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl DataPipelineBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            metadata: PipelineMetadata::new(id),
            sources: Vec::new(),
            chain: FilterChain::new(),
            sinks: Vec::new(),
        }
    }

    pub fn metadata(mut self, metadata: PipelineMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn source<S: InputSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn source_ref(mut self, source: Arc<dyn InputSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn filter_chain(mut self, chain: FilterChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn sink<S: OutputSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn build(self) -> DataPipeline {
        DataPipeline {
            metadata: self.metadata,
            sources: self.sources,
            chain: self.chain,
            sinks: self.sinks,
        }
    }
}
