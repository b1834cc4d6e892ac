//! Run orchestration: connection test, the sequential export loop, TLS
//! material staging and watermark-state persistence.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mongodb::{options::ClientOptions, Client as MongoClient};
use serde_json::Value;
use tempfile::NamedTempFile;
use watermark::WatermarkState;

use crate::command::ExportCommandFactory;
use crate::config::{Config, DbConfig};
use crate::error::user_error;
use crate::export::Export;
use crate::manifest;
use crate::parse::Parse;
use crate::retry::{retry_async, RetryConfig};
use crate::uri::ConnectionUri;

pub struct Extractor {
    config: Config,
    db: DbConfig,
    data_dir: PathBuf,
    input_state: WatermarkState,
    retry: RetryConfig,
    /// Staged TLS material; the files disappear with the extractor.
    tls_files: Vec<NamedTempFile>,
}

impl Extractor {
    pub fn new(config: Config, data_dir: &Path) -> anyhow::Result<Self> {
        let input_state = WatermarkState::load(data_dir.join("in").join("state.json"))?;

        let mut extractor = Self {
            db: config.parameters.db.clone(),
            config,
            data_dir: data_dir.to_path_buf(),
            input_state,
            retry: RetryConfig::default(),
            tls_files: Vec::new(),
        };
        extractor.stage_tls_material()?;
        Ok(extractor)
    }

    /// Validate connectivity and credentials by listing collections through
    /// the driver, with the same bounded retry as process start.
    pub async fn test_connection(&self) -> anyhow::Result<()> {
        let uri = ConnectionUri::create(&self.db)?;
        let database = uri.database().to_string();
        let connection_string = uri.connection_string().to_string();

        retry_async(&self.retry, "connection test", || async {
            let mut options = ClientOptions::parse(&connection_string)
                .await
                .map_err(|e| user_error(e.to_string()))?;
            options.connect_timeout = Some(Duration::from_secs(10));
            options.server_selection_timeout = Some(Duration::from_secs(10));

            let client = MongoClient::with_options(options)?;
            client
                .database(&database)
                .list_collection_names()
                .await
                .with_context(|| format!("Failed to connect to {}", uri.masked()))?;
            Ok(())
        })
        .await
    }

    /// Run every enabled export in config order, then persist watermarks.
    pub async fn extract(&mut self) -> anyhow::Result<()> {
        self.test_connection().await?;

        let out_tables = self.data_dir.join("out").join("tables");
        std::fs::create_dir_all(&out_tables)
            .with_context(|| format!("Failed to create {}", out_tables.display()))?;

        let command_factory = ExportCommandFactory::new(self.config.parameters.quiet);
        let multi_export = self.config.is_multi_export();
        let mut output_state = WatermarkState::new();
        let mut exported = 0usize;

        for mut options in self.config.export_options()? {
            if !options.enabled {
                tracing::debug!("Skipping disabled export \"{}\"", options.name);
                continue;
            }
            exported += 1;

            let incremental = options.incremental_fetching_column.is_some();
            let prior = if incremental {
                let prior = if multi_export {
                    self.input_state.for_export(options.state_key())
                } else {
                    self.input_state.scalar()
                };
                let prior = prior.cloned();
                Export::build_incremental_params(&mut options, prior.as_ref())?;
                prior
            } else {
                None
            };

            let incremental_manifest_flag = options.incremental;
            let state_key = options.state_key().to_string();
            let export = Export::new(
                command_factory.clone(),
                self.db.clone(),
                options.clone(),
                self.retry.clone(),
            );

            let mut parse = Parse::new(&options, &out_tables)?;
            export.run(|document| parse.process(document)).await?;
            let manifests = parse.finish()?;
            manifest::write_manifests(&out_tables, &manifests, incremental_manifest_flag)?;

            if incremental {
                // The probe only runs once the parse phase has completed,
                // so persisted state never points past a failed export.
                let next = export.last_fetched_value().await?.or(prior);
                if multi_export {
                    output_state.set_for_export(&state_key, next.unwrap_or(Value::Null));
                } else if let Some(value) = next {
                    output_state.set_scalar(value);
                }
            }
        }

        if exported == 0 {
            return Err(user_error("Please enable at least one export"));
        }

        if !output_state.is_empty() {
            output_state.save(self.data_dir.join("out").join("state.json"))?;
        }

        Ok(())
    }

    /// Write inline TLS material to temp files and point the command flags
    /// at them. Cleanup is best-effort, on drop.
    fn stage_tls_material(&mut self) -> anyhow::Result<()> {
        let Some(ssl) = self.db.ssl.as_mut() else {
            return Ok(());
        };
        if !ssl.enabled {
            return Ok(());
        }

        if let Some(ca) = &ssl.ca {
            let file = write_tls_file(ca)?;
            ssl.ca_file = Some(file.path().to_path_buf());
            self.tls_files.push(file);
        }

        if let (Some(cert), Some(key)) = (&ssl.cert, &ssl.key) {
            let file = write_tls_file(&format!("{cert}\n{key}"))?;
            ssl.cert_key_file = Some(file.path().to_path_buf());
            self.tls_files.push(file);
        }

        Ok(())
    }

    pub fn db(&self) -> &DbConfig {
        &self.db
    }
}

fn write_tls_file(content: &str) -> anyhow::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("mongodb-ssl-")
        .suffix(".pem")
        .tempfile()
        .context("failed to create TLS material file")?;
    file.write_all(content.as_bytes())
        .context("failed to write TLS material file")?;
    file.flush()?;
    Ok(file)
}
