//! Document-to-table parsing.
//!
//! [`Parse`] owns the per-export parser (mapping or raw), counts records,
//! and reports the manifest metadata once the stream is exhausted. Tables
//! are declared before the first document, so an export that yields nothing
//! still ends with header-only files.

pub mod mapping;
pub mod raw;

use std::path::Path;

use serde_json::Value;

use crate::config::{ExportMode, ExportOptions};
use crate::manifest::TableManifest;
use crate::table::webalize;

pub use mapping::Mapping;
pub use raw::Raw;

const PROGRESS_INTERVAL: u64 = 5_000;

enum Parser {
    Mapping(Mapping),
    Raw(Raw),
}

pub struct Parse {
    name: String,
    parser: Parser,
    parsed: u64,
}

impl Parse {
    pub fn new(options: &ExportOptions, out_dir: &Path) -> anyhow::Result<Self> {
        let name = webalize(&options.name);
        let parser = match options.mode {
            ExportMode::Raw => Parser::Raw(Raw::new(&name, out_dir)?),
            ExportMode::Mapping => Parser::Mapping(Mapping::new(
                &name,
                options.mapping.as_ref().unwrap_or(&Value::Null),
                options.include_parent_in_pk,
                out_dir,
            )?),
        };

        Ok(Self {
            name,
            parser,
            parsed: 0,
        })
    }

    /// Feed one decoded document to the parser.
    pub fn process(&mut self, document: &Value) -> anyhow::Result<()> {
        match &mut self.parser {
            Parser::Mapping(mapping) => mapping.parse(document)?,
            Parser::Raw(raw) => raw.parse(document)?,
        }

        self.parsed += 1;
        if self.parsed % PROGRESS_INTERVAL == 0 {
            tracing::info!("Parsed {} records.", self.parsed);
        }
        Ok(())
    }

    /// Flush the output files and return the manifest metadata.
    pub fn finish(self) -> anyhow::Result<Vec<TableManifest>> {
        let manifests = match self.parser {
            Parser::Mapping(mapping) => mapping.finish()?,
            Parser::Raw(raw) => raw.finish()?,
        };

        tracing::info!(
            "Done \"{}\", parsed {} {} in total",
            self.name,
            self.parsed,
            if self.parsed == 1 { "record" } else { "records" }
        );

        Ok(manifests)
    }

    pub fn parsed(&self) -> u64 {
        self.parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_empty_mapping_export_creates_header_only_tables() {
        let dir = TempDir::new().unwrap();
        let options = ExportOptions::from_value(&json!({
            "name": "Bronx Bakeries",
            "collection": "restaurants",
            "mapping": {"_id": null, "name": "name"},
        }))
        .unwrap();

        let parse = Parse::new(&options, dir.path()).unwrap();
        assert_eq!(parse.parsed(), 0);
        let manifests = parse.finish().unwrap();

        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].table, "bronx-bakeries");
        let content = std::fs::read_to_string(dir.path().join("bronx-bakeries.csv")).unwrap();
        assert_eq!(content, "\"_id\",\"name\"\n");
    }

    #[test]
    fn test_raw_export_counts_records() {
        let dir = TempDir::new().unwrap();
        let options = ExportOptions::from_value(&json!({
            "name": "orders", "collection": "orders", "mode": "raw",
        }))
        .unwrap();

        let mut parse = Parse::new(&options, dir.path()).unwrap();
        parse.process(&json!({"_id": 1})).unwrap();
        parse.process(&json!({"_id": 2})).unwrap();
        assert_eq!(parse.parsed(), 2);
        parse.finish().unwrap();
    }
}
