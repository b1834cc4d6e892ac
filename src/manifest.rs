//! Table manifest sidecars.
//!
//! Each output table gets a `<table>.csv.manifest` JSON file describing its
//! primary key, the incremental-load flag, and (in mapping mode) the full
//! ordered column list. The consuming platform reads these to create or
//! update its destination tables.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;

/// Manifest metadata for one completed output table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableManifest {
    /// Webalized table name; also the CSV file stem.
    pub table: String,
    pub primary_key: Vec<String>,
    /// Ordered column list; `None` in raw mode, where the columns are fixed.
    pub columns: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ManifestDocument<'a> {
    incremental: bool,
    primary_key: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    columns: Option<&'a [String]>,
}

/// Write one manifest file per table into `out_dir`.
pub fn write_manifests(
    out_dir: &Path,
    manifests: &[TableManifest],
    incremental: bool,
) -> anyhow::Result<()> {
    for manifest in manifests {
        let path = out_dir.join(format!("{}.csv.manifest", manifest.table));
        let document = ManifestDocument {
            incremental,
            primary_key: &manifest.primary_key,
            columns: manifest.columns.as_deref(),
        };
        std::fs::write(&path, serde_json::to_string(&document)?)
            .with_context(|| format!("Failed write to file \"{}\"", path.display()))?;
        tracing::debug!("Wrote manifest {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_mapping_manifest_contents() {
        let dir = TempDir::new().unwrap();
        write_manifests(
            dir.path(),
            &[TableManifest {
                table: "orders".to_string(),
                primary_key: vec!["id".to_string()],
                columns: Some(vec!["id".to_string(), "name".to_string()]),
            }],
            true,
        )
        .unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("orders.csv.manifest")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            parsed,
            json!({
                "incremental": true,
                "primary_key": ["id"],
                "columns": ["id", "name"],
            })
        );
    }

    #[test]
    fn test_raw_manifest_omits_columns() {
        let dir = TempDir::new().unwrap();
        write_manifests(
            dir.path(),
            &[TableManifest {
                table: "orders".to_string(),
                primary_key: Vec::new(),
                columns: None,
            }],
            false,
        )
        .unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("orders.csv.manifest")).unwrap();
        assert_eq!(content, r#"{"incremental":false,"primary_key":[]}"#);
    }
}
