//! One export run: command construction, streaming decode, failure
//! classification, and the incremental-fetching protocol.

use anyhow::Context;
use serde_json::Value;

use crate::classify::classify_export_failure;
use crate::command::{ExportCommandFactory, ExportParams};
use crate::config::{DbConfig, ExportOptions};
use crate::decode::LineDecoder;
use crate::error::user_error;
use crate::extjson;
use crate::process::ExportProcess;
use crate::retry::RetryConfig;
use crate::table::webalize;
use crate::uri::ConnectionUri;

const READ_BUFFER_SIZE: usize = 8192;

pub struct Export {
    command_factory: ExportCommandFactory,
    db: DbConfig,
    options: ExportOptions,
    retry: RetryConfig,
    name: String,
}

impl Export {
    pub fn new(
        command_factory: ExportCommandFactory,
        db: DbConfig,
        options: ExportOptions,
        retry: RetryConfig,
    ) -> Self {
        let name = webalize(&options.name);
        Self {
            command_factory,
            db,
            options,
            retry,
            name,
        }
    }

    /// Run mongoexport and feed every decoded document to `handle`.
    ///
    /// Lines that fail to decode are logged and skipped. A process failure
    /// surfaces after the stream ends, classified into the most specific
    /// error available.
    pub async fn run<F>(&self, mut handle: F) -> anyhow::Result<()>
    where
        F: FnMut(&Value) -> anyhow::Result<()>,
    {
        let params = ExportParams::from(&self.options);
        let command = self.command_factory.create(&self.db, &params)?;

        let mut process = ExportProcess::start(&command, &self.retry).await?;
        tracing::info!("Connected to {}", ConnectionUri::create(&self.db)?.masked());
        tracing::info!("Exporting \"{}\"", self.name);

        let mut decoder = LineDecoder::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = process.read_chunk(&mut buffer).await?;
            if n == 0 {
                break;
            }
            for document in decoder.push(&buffer[..n]) {
                handle(&document)?;
            }
        }
        for document in decoder.finish() {
            handle(&document)?;
        }

        let outcome = process.finish().await?;
        if !outcome.success {
            return Err(classify_export_failure(
                &self.name,
                self.options.query.as_deref(),
                &command,
                &outcome.stderr,
            ));
        }

        Ok(())
    }

    /// Rewrite an incremental export's query and sort in place.
    ///
    /// With no prior watermark the filter is the empty query; with one, a
    /// `$gte` lower bound on the incremental column, routed through the
    /// codec so display-form date/oid watermarks become their object form.
    /// The sort is forced ascending on the column either way.
    pub fn build_incremental_params(
        options: &mut ExportOptions,
        state: Option<&Value>,
    ) -> anyhow::Result<()> {
        let column = options
            .incremental_fetching_column
            .clone()
            .ok_or_else(|| anyhow::anyhow!("export has no incremental fetching column"))?;

        let query = match state {
            None => "{}".to_string(),
            Some(value) => {
                let mut bound = serde_json::Map::new();
                bound.insert("$gte".to_string(), value.clone());
                let mut query = serde_json::Map::new();
                query.insert(column.clone(), Value::Object(bound));
                extjson::to_query(&serde_json::to_string(&Value::Object(query))?)
            }
        };

        options.query = Some(query);
        options.sort = Some(sort_on(&column, 1)?);
        Ok(())
    }

    /// Probe for the value the watermark should advance to.
    ///
    /// Runs the same export narrowed to the single record the main export
    /// ends at: descending with limit 1, or, when a record limit N is set,
    /// ascending with skip N-1 and limit 1 to land on the exact Nth record.
    /// Returns `None` when the probe matches nothing.
    pub async fn last_fetched_value(&self) -> anyhow::Result<Option<Value>> {
        let column = self
            .options
            .incremental_fetching_column
            .clone()
            .ok_or_else(|| anyhow::anyhow!("export has no incremental fetching column"))?;

        let mut params = ExportParams::from(&self.options);
        match self.options.limit {
            Some(limit) => {
                params.sort = Some(sort_on(&column, 1)?);
                params.skip = Some(limit - 1);
                params.limit = Some(1);
            }
            None => {
                params.sort = Some(sort_on(&column, -1)?);
                params.limit = Some(1);
                params.skip = None;
            }
        }

        let command = self.command_factory.create(&self.db, &params)?;
        let result = ExportProcess::run_to_completion(&command, &self.retry).await?;
        if !result.success {
            return Err(classify_export_failure(
                &self.name,
                self.options.query.as_deref(),
                &command,
                &result.stderr,
            ));
        }

        let output = result.stdout.trim();
        if output.is_empty() {
            return Ok(None);
        }

        // Date and oid wrappers become display strings, so the column path
        // resolves to a scalar the state file can hold.
        let display = extjson::to_display(output);
        let document: Value = serde_json::from_str(&display)
            .context("failed to decode incremental fetching output")?;

        let segments: Vec<&str> = column.split('.').collect();
        let mut current = &document;
        for segment in &segments {
            current = current.get(segment).ok_or_else(|| {
                let full_path = if segments.len() > 1 {
                    format!(" (\"{column}\")")
                } else {
                    String::new()
                };
                user_error(format!("Column \"{segment}\"{full_path} does not exist."))
            })?;
        }

        if !watermark::is_scalar(current) {
            return Err(user_error(format!(
                "Unexpected value \"{current}\" in output of incremental fetching."
            )));
        }

        // A null column value cannot advance the watermark.
        if current.is_null() {
            return Ok(None);
        }

        Ok(Some(current.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn sort_on(column: &str, direction: i64) -> anyhow::Result<String> {
    let mut sort = serde_json::Map::new();
    sort.insert(column.to_string(), Value::Number(direction.into()));
    Ok(serde_json::to_string(&Value::Object(sort))?)
}
