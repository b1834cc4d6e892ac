//! Verbatim id + JSON passthrough.
//!
//! Raw mode produces a single two-column table: `id` holds the document's
//! identifier when it is usable, `data` holds the re-serialized document.
//! The table starts out with `id` as its primary key; the first document
//! that cannot supply a usable id permanently drops the key, even if every
//! later document has one.

use std::path::Path;

use serde_json::Value;

use crate::manifest::TableManifest;
use crate::table::OutputTable;

pub struct Raw {
    table: OutputTable,
    id_is_primary_key: bool,
}

impl Raw {
    pub fn new(name: &str, out_dir: &Path) -> anyhow::Result<Self> {
        let table = OutputTable::create(
            out_dir,
            name,
            vec!["id".to_string(), "data".to_string()],
            vec!["id".to_string()],
        )?;
        Ok(Self {
            table,
            id_is_primary_key: true,
        })
    }

    pub fn parse(&mut self, document: &Value) -> anyhow::Result<()> {
        let id = match document.get("_id") {
            Some(Value::Object(wrapper)) => wrapper
                .get("$oid")
                .and_then(Value::as_str)
                .map(str::to_string),
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let id = match id {
            Some(id) => id,
            None => {
                self.id_is_primary_key = false;
                String::new()
            }
        };

        self.table
            .write_row(&[id, serde_json::to_string(document)?])
    }

    pub fn finish(mut self) -> anyhow::Result<Vec<TableManifest>> {
        let primary_key = if self.id_is_primary_key {
            vec!["id".to_string()]
        } else {
            Vec::new()
        };
        self.table.set_primary_key(primary_key.clone());
        self.table.finish()?;

        Ok(vec![TableManifest {
            table: crate::table::webalize(self.table.name()),
            primary_key,
            columns: None,
        }])
    }

    pub fn rows_written(&self) -> u64 {
        self.table.rows_written()
    }
}
