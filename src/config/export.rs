//! Per-export options: target collection, filter, mapping tree, incremental
//! fetching column and the mutual-exclusion rules between them.

use serde::Deserialize;
use serde_json::Value;

use crate::config::{de_opt_int, de_opt_scalar_string};
use crate::error::user_error;

/// Table-production strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Declarative flattening through a mapping tree.
    #[default]
    Mapping,
    /// Verbatim id + JSON passthrough.
    Raw,
}

/// One export definition, immutable after validation except that `query`
/// and `sort` are rewritten in place when incremental fetching injects its
/// lower-bound filter.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportOptions {
    #[serde(alias = "tableName")]
    pub name: String,

    /// External id, used as the watermark key in legacy multi-export mode.
    #[serde(default, deserialize_with = "de_opt_scalar_string")]
    pub id: Option<String>,

    pub collection: String,

    /// Filter, as opaque JSON text. May use unquoted keys and bare
    /// `ObjectId(...)` literals; both are normalized at command time.
    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub sort: Option<String>,

    #[serde(default, deserialize_with = "de_opt_int")]
    pub limit: Option<i64>,

    #[serde(default, deserialize_with = "de_opt_int")]
    pub skip: Option<i64>,

    #[serde(default)]
    pub mode: ExportMode,

    #[serde(default)]
    pub mapping: Option<Value>,

    #[serde(default, rename = "includeParentInPK")]
    pub include_parent_in_pk: bool,

    /// Incremental-load flag carried into the table manifests.
    #[serde(default)]
    pub incremental: bool,

    #[serde(default, rename = "incrementalFetchingColumn")]
    pub incremental_fetching_column: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ExportOptions {
    /// Deserialize and validate one export definition.
    pub fn from_value(value: &Value) -> anyhow::Result<Self> {
        let mut options: Self = serde_json::from_value(value.clone())
            .map_err(|e| user_error(format!("Invalid export configuration: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    fn validate(&mut self) -> anyhow::Result<()> {
        if blank(&self.query) {
            self.query = None;
        }
        if blank(&self.sort) {
            self.sort = None;
        }

        // Mapped dates surface as "PARENT.FIELD.$date", but incremental
        // fetching wants the plain "PARENT.FIELD" path; accept both.
        if let Some(column) = self.incremental_fetching_column.take() {
            let column = column.strip_suffix(".$date").unwrap_or(&column).to_string();
            if !column.trim().is_empty() {
                self.incremental_fetching_column = Some(column);
            }
        }

        if self.incremental_fetching_column.is_some() {
            if self.query.is_some() {
                return Err(user_error(
                    "Both incremental fetching and query cannot be set together.",
                ));
            }
            if self.sort.is_some() {
                return Err(user_error(
                    "Both incremental fetching and sort cannot be set together.",
                ));
            }
        }

        if self.mode == ExportMode::Mapping {
            let empty = match &self.mapping {
                None | Some(Value::Null) => true,
                Some(Value::Object(map)) => map.is_empty(),
                Some(_) => false,
            };
            if empty {
                return Err(user_error(
                    "Mapping cannot be empty in \"mapping\" export mode.",
                ));
            }
        }

        Ok(())
    }

    /// Watermark key for this export: the external id when present, the
    /// export name otherwise.
    pub fn state_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> anyhow::Result<ExportOptions> {
        ExportOptions::from_value(&value)
    }

    #[test]
    fn test_minimal_raw_export() {
        let options = parse(json!({
            "name": "orders", "collection": "orders", "mode": "raw",
        }))
        .unwrap();
        assert_eq!(options.mode, ExportMode::Raw);
        assert!(options.enabled);
        assert_eq!(options.state_key(), "orders");
    }

    #[test]
    fn test_table_name_alias() {
        let options = parse(json!({
            "tableName": "orders", "collection": "orders",
            "mapping": {"_id": null},
        }))
        .unwrap();
        assert_eq!(options.name, "orders");
    }

    #[test]
    fn test_mapping_required_in_mapping_mode() {
        let err = parse(json!({"name": "orders", "collection": "orders"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Mapping cannot be empty in \"mapping\" export mode."
        );
    }

    #[test]
    fn test_query_and_incremental_exclusive() {
        let err = parse(json!({
            "name": "orders", "collection": "orders", "mode": "raw",
            "query": "{a: 1}", "incrementalFetchingColumn": "updatedAt",
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Both incremental fetching and query cannot be set together."
        );
    }

    #[test]
    fn test_sort_and_incremental_exclusive() {
        let err = parse(json!({
            "name": "orders", "collection": "orders", "mode": "raw",
            "sort": "{a: 1}", "incrementalFetchingColumn": "updatedAt",
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Both incremental fetching and sort cannot be set together."
        );
    }

    #[test]
    fn test_blank_query_beside_incremental_is_allowed() {
        let options = parse(json!({
            "name": "orders", "collection": "orders", "mode": "raw",
            "query": "  ", "incrementalFetchingColumn": "updatedAt",
        }))
        .unwrap();
        assert_eq!(options.query, None);
        assert_eq!(
            options.incremental_fetching_column.as_deref(),
            Some("updatedAt")
        );
    }

    #[test]
    fn test_incremental_column_date_suffix_normalized() {
        let options = parse(json!({
            "name": "orders", "collection": "orders", "mode": "raw",
            "incrementalFetchingColumn": "updatedAt.$date",
        }))
        .unwrap();
        assert_eq!(
            options.incremental_fetching_column.as_deref(),
            Some("updatedAt")
        );
    }

    #[test]
    fn test_blank_limit_disables_it() {
        let options = parse(json!({
            "name": "orders", "collection": "orders", "mode": "raw",
            "limit": "", "skip": "10",
        }))
        .unwrap();
        assert_eq!(options.limit, None);
        assert_eq!(options.skip, Some(10));
    }

    #[test]
    fn test_numeric_id_becomes_state_key() {
        let options = parse(json!({
            "name": "orders", "id": 123, "collection": "orders", "mode": "raw",
        }))
        .unwrap();
        assert_eq!(options.state_key(), "123");
    }
}
