//! Append-only CSV table output.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::Context;

/// One output table backed by a CSV file.
///
/// The file is opened once and appended to for the lifetime of the export;
/// the header row goes out exactly once, when the file is still empty. The
/// column list is fixed up front by the mapping, so an export that yields
/// zero documents still leaves a header-only file behind.
pub struct OutputTable {
    name: String,
    path: PathBuf,
    columns: Vec<String>,
    primary_key: Vec<String>,
    writer: csv::Writer<File>,
    rows_written: u64,
}

impl std::fmt::Debug for OutputTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputTable")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("columns", &self.columns)
            .field("primary_key", &self.primary_key)
            .field("rows_written", &self.rows_written)
            .finish_non_exhaustive()
    }
}

impl OutputTable {
    pub fn create(
        dir: &Path,
        name: &str,
        columns: Vec<String>,
        primary_key: Vec<String>,
    ) -> anyhow::Result<Self> {
        let file_name = format!("{}.csv", webalize(name));
        let path = dir.join(file_name);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed write to file \"{}\"", path.display()))?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(file);

        if is_new && !columns.is_empty() {
            writer
                .write_record(&columns)
                .with_context(|| format!("Failed write to file \"{}\"", path.display()))?;
        }

        Ok(Self {
            name: name.to_string(),
            path,
            columns,
            primary_key,
            writer,
            rows_written: 0,
        })
    }

    pub fn write_row(&mut self, cells: &[String]) -> anyhow::Result<()> {
        self.writer
            .write_record(cells)
            .with_context(|| format!("Failed write to file \"{}\"", self.path.display()))?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn finish(&mut self) -> anyhow::Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed write to file \"{}\"", self.path.display()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn set_primary_key(&mut self, primary_key: Vec<String>) {
        self.primary_key = primary_key;
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

/// Normalize a name for use as a file/table identifier: lowercase ASCII
/// alphanumerics with single dashes, no leading or trailing dash.
pub fn webalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}
