use crate::pipeline::StopSignal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// The stage an enhanced run is currently executing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageInfo {
    pub name: String,
    pub index: usize,
    pub started_at: DateTime<Utc>,
}

impl StageInfo {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            started_at: Utc::now(),
        }
    }
}

/// Thread-safe state of one enhanced pipeline run
///
/// Created fresh for every run and shared by reference (or `Arc`) with every
/// stage of that run, including stages running concurrently under the
/// parallel strategy. All maps are individually locked.
#[derive(Debug)]
pub struct EnhancedContext {
    execution_id: Uuid,
    pipeline_id: String,
    start_time: DateTime<Utc>,
    metrics: Mutex<HashMap<String, Value>>,
    properties: Mutex<HashMap<String, Value>>,
    pipeline_state: Mutex<HashMap<String, Value>>,
    stage_state: Mutex<HashMap<String, HashMap<String, Value>>>,
    current_stage: Mutex<Option<StageInfo>>,
    stop: StopSignal,
}

// Run state stays usable even if a stage panicked while holding a lock.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EnhancedContext {
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            pipeline_id: pipeline_id.into(),
            start_time: Utc::now(),
            metrics: Mutex::new(HashMap::new()),
            properties: Mutex::new(HashMap::new()),
            pipeline_state: Mutex::new(HashMap::new()),
            stage_state: Mutex::new(HashMap::new()),
            current_stage: Mutex::new(None),
            stop: StopSignal::new(),
        }
    }

    /// Context pre-seeded with run properties
    pub fn with_properties(
        pipeline_id: impl Into<String>,
        properties: HashMap<String, Value>,
    ) -> Self {
        let context = Self::new(pipeline_id);
        *lock(&context.properties) = properties;
        context
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    // Metrics

    pub fn record_metric(&self, key: impl Into<String>, value: Value) {
        lock(&self.metrics).insert(key.into(), value);
    }

    /// Add `delta` to a numeric metric, starting from zero
    pub fn increment_metric(&self, key: &str, delta: i64) {
        let mut metrics = lock(&self.metrics);
        let current = metrics.get(key).and_then(Value::as_i64).unwrap_or(0);
        metrics.insert(key.to_string(), Value::from(current + delta));
    }

    pub fn metric(&self, key: &str) -> Option<Value> {
        lock(&self.metrics).get(key).cloned()
    }

    pub fn metrics_snapshot(&self) -> HashMap<String, Value> {
        lock(&self.metrics).clone()
    }

    // Properties

    pub fn set_property(&self, key: impl Into<String>, value: Value) {
        lock(&self.properties).insert(key.into(), value);
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        lock(&self.properties).get(key).cloned()
    }

    // Pipeline-level state

    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        lock(&self.pipeline_state).insert(key.into(), value);
    }

    pub fn state(&self, key: &str) -> Option<Value> {
        lock(&self.pipeline_state).get(key).cloned()
    }

    /// Atomically read-modify-write one pipeline state entry
    pub fn update_state<F>(&self, key: &str, update: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut state = lock(&self.pipeline_state);
        let next = update(state.get(key));
        state.insert(key.to_string(), next.clone());
        next
    }

    // Per-stage state

    pub fn set_stage_state(&self, stage: &str, key: impl Into<String>, value: Value) {
        lock(&self.stage_state)
            .entry(stage.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    pub fn stage_state(&self, stage: &str, key: &str) -> Option<Value> {
        lock(&self.stage_state)
            .get(stage)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    // Current stage

    pub fn set_current_stage(&self, info: StageInfo) {
        *lock(&self.current_stage) = Some(info);
    }

    pub fn current_stage(&self) -> Option<StageInfo> {
        lock(&self.current_stage).clone()
    }

    // Cooperative stop

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_set()
    }

    /// Request a stop; only the first reason is kept
    pub fn request_stop(&self, reason: &str) -> bool {
        self.stop.request(reason)
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop.reason()
    }
}
