use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Data carrier flowing through a pipeline
///
/// An event wraps exactly one JSON payload plus a metadata map and a creation
/// timestamp. Basic pipelines mutate it in place through [`Event::payload_mut`];
/// the `with_*` methods return modified copies for callers that prefer
/// copy-on-write.
///
/// # Example
/// ```
/// use pelee_lib::event::Event;
/// use serde_json::json;
///
/// let event = Event::new(json!({"a": 1})).with_metadata("source", json!("api"));
/// assert_eq!(event.payload()["a"], 1);
/// assert_eq!(event.metadata("source"), Some(&json!("api")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    payload: Value,

    #[serde(default)]
    metadata: HashMap<String, Value>,

    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event stamped with the current time
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create an event with an initial metadata map
    pub fn with_metadata_map(payload: Value, metadata: HashMap<String, Value>) -> Self {
        Self {
            payload,
            metadata,
            timestamp: Utc::now(),
        }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Value {
        &mut self.payload
    }

    pub fn set_payload(&mut self, payload: Value) {
        self.payload = payload;
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Whether the payload carries any data (`null` counts as empty)
    pub fn has_payload(&self) -> bool {
        !self.payload.is_null()
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn metadata_map(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn has_metadata(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn remove_metadata(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Copy of this event with a different payload
    pub fn with_payload(&self, payload: Value) -> Self {
        Self {
            payload,
            metadata: self.metadata.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Copy of this event with one metadata entry added or replaced
    pub fn with_metadata(&self, key: impl Into<String>, value: Value) -> Self {
        let mut copy = self.clone();
        copy.metadata.insert(key.into(), value);
        copy
    }

    /// Copy of this event with a different timestamp
    pub fn with_timestamp(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            timestamp,
        }
    }
}

impl From<Value> for Event {
    fn from(payload: Value) -> Self {
        Event::new(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_payload_keeps_metadata() {
        let event = Event::new(json!({"a": 1})).with_metadata("k", json!("v"));
        let copy = event.with_payload(json!({"b": 2}));

        assert_eq!(copy.payload(), &json!({"b": 2}));
        assert_eq!(copy.metadata("k"), Some(&json!("v")));
        assert_eq!(copy.timestamp(), event.timestamp());
        // Original is untouched
        assert_eq!(event.payload(), &json!({"a": 1}));
    }

    #[test]
    fn test_with_metadata_does_not_touch_original() {
        let event = Event::new(json!(null));
        let copy = event.with_metadata("trace", json!(7));

        assert!(!event.has_metadata("trace"));
        assert!(copy.has_metadata("trace"));
        assert!(!copy.has_payload());
    }

    #[test]
    fn test_in_place_mutation() {
        let mut event = Event::new(json!({"a": 1}));
        event.payload_mut()["b"] = json!(2);
        event.set_metadata("seen", json!(true));
        assert_eq!(event.remove_metadata("seen"), Some(json!(true)));
        assert_eq!(event.into_payload(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_deserialize_payload_only() {
        let event: Event = serde_json::from_value(json!({"payload": [1, 2]})).unwrap();
        assert_eq!(event.payload(), &json!([1, 2]));
        assert!(event.metadata_map().is_empty());
    }
}
