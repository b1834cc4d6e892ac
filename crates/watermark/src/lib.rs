//! Watermark state persistence for mongo-extract
//!
//! An incremental export remembers the last value it saw in its incremental
//! column and uses it as the lower bound of the next run's filter. This crate
//! owns the persisted shape of that memory: a single JSON file of the form
//!
//! ```json
//! { "lastFetchedRow": "ISODate(\"2024-01-02T00:00:00Z\")" }
//! ```
//!
//! In row-config mode `lastFetchedRow` is one scalar. In legacy multi-export
//! mode it is a map from export id to scalar:
//!
//! ```json
//! { "lastFetchedRow": { "123": 42, "124": "abc" } }
//! ```
//!
//! The state file is read from the run's input directory and written to the
//! output directory only after every export has completed, so a crashed run
//! never advances the watermark.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted watermark state for one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatermarkState {
    /// Last-seen incremental value: a scalar, or a map keyed by export id
    /// in legacy multi-export mode. `Null` means no watermark yet.
    #[serde(rename = "lastFetchedRow", default)]
    pub last_fetched_row: Value,
}

impl WatermarkState {
    /// Create an empty state (no watermark recorded).
    pub fn new() -> Self {
        Self::default()
    }

    /// Load state from a file, returning the empty state when the file does
    /// not exist. A present-but-unreadable file is an error, not a silent
    /// restart from scratch.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No state file at {}, starting fresh", path.display());
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid state file {}: {e}", path.display()))?;
        tracing::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Write the state file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string(self)?)?;
        tracing::info!("Saved state to {}", path.display());
        Ok(())
    }

    /// The single-export watermark, if one is recorded.
    pub fn scalar(&self) -> Option<&Value> {
        match &self.last_fetched_row {
            Value::Null => None,
            value => Some(value),
        }
    }

    /// The watermark recorded for one export id in legacy multi-export mode.
    pub fn for_export(&self, id: &str) -> Option<&Value> {
        match self.last_fetched_row.get(id) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    /// Record the single-export watermark.
    pub fn set_scalar(&mut self, value: Value) {
        self.last_fetched_row = value;
    }

    /// Record the watermark for one export id in legacy multi-export mode.
    pub fn set_for_export(&mut self, id: &str, value: Value) {
        if !self.last_fetched_row.is_object() {
            self.last_fetched_row = Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.last_fetched_row.as_object_mut() {
            map.insert(id.to_string(), value);
        }
    }

    /// True when nothing has been recorded; an empty state is never saved.
    pub fn is_empty(&self) -> bool {
        match &self.last_fetched_row {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

/// True for values a watermark may hold: strings, numbers, booleans and null.
/// Objects and arrays cannot bound a `$gte` filter.
pub fn is_scalar(value: &Value) -> bool {
    !(value.is_object() || value.is_array())
}
