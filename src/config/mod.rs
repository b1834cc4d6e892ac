//! Declarative configuration for an extraction run.
//!
//! A run is driven by a single `config.json` in the data directory. Two
//! shapes are accepted: the row shape, where the export definition sits
//! directly in `parameters`, and the legacy multi-export shape, where
//! `parameters.exports` carries a list of definitions. Validation reports
//! problems as user errors before any process is spawned.

pub mod db;
pub mod export;

use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::user_error;

pub use db::{DbConfig, Protocol, SshConfig, TlsConfig};
pub use export::{ExportMode, ExportOptions};

/// Root of `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub parameters: Parameters,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parameters {
    pub db: DbConfig,

    /// Suppress mongoexport's own progress output.
    #[serde(default)]
    pub quiet: bool,

    /// Legacy multi-export shape. When absent, the export definition is read
    /// from the remaining `parameters` keys.
    #[serde(default)]
    pub exports: Option<Vec<Value>>,

    /// Row-shape export definition keys (collection, mapping, query, ...).
    #[serde(flatten)]
    pub row: serde_json::Map<String, Value>,
}

impl Config {
    /// Load and validate `config.json`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(user_error("Missing config"));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| user_error(format!("Invalid config: {e}")))?;
        config.parameters.db.validate()?;
        Ok(config)
    }

    /// True when the legacy multi-export shape is in use; watermark state is
    /// then a map keyed by export id instead of a single scalar.
    pub fn is_multi_export(&self) -> bool {
        self.parameters.exports.is_some()
    }

    /// Parse and validate every export definition, in config order.
    pub fn export_options(&self) -> anyhow::Result<Vec<ExportOptions>> {
        let options = match &self.parameters.exports {
            Some(exports) => exports
                .iter()
                .map(ExportOptions::from_value)
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => vec![ExportOptions::from_value(&Value::Object(
                self.parameters.row.clone(),
            ))?],
        };

        let mut names: Vec<&str> = options.iter().map(|o| o.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != options.len() {
            return Err(user_error("Please remove duplicate export names"));
        }

        Ok(options)
    }
}

/// Accept a string or number node as an optional string; null and absent
/// both read as `None`.
pub(crate) fn de_opt_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a scalar value, found {other}"
        ))),
    }
}

/// Accept a string or number node as an optional integer; blank strings,
/// null and absent all read as `None` (a blank limit disables it).
pub(crate) fn de_opt_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed.parse().map(Some).map_err(|_| {
                    serde::de::Error::custom(format!("invalid integer value \"{s}\""))
                })
            }
        }
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid integer value {n}"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected an integer value, found {other}"
        ))),
    }
}
