//! mongo-extract library
//!
//! Exports MongoDB collections into flat CSV tables by driving the external
//! `mongoexport` utility, with sidecar manifests and an incremental
//! watermark persisted between runs.
//!
//! # Pipeline
//!
//! For each configured export:
//!
//! 1. [`command`] builds a mongoexport invocation from the connection and
//!    export parameters ([`extjson`] normalizes hand-written filters).
//! 2. [`process`] starts it, retrying only the start, and streams stdout.
//! 3. [`decode`] turns the chunk stream into documents, one per line.
//! 4. [`parse`] flattens documents into CSV tables, either declaratively
//!    through a mapping tree or verbatim as id + JSON in raw mode.
//! 5. [`manifest`] writes per-table metadata for the consuming platform.
//! 6. For incremental exports, a second narrow probe resolves the next
//!    watermark, persisted through the `watermark` crate.
//!
//! Failures of the export utility are classified by [`classify`] into
//! actionable messages; [`error::UserError`] marks the ones that should
//! never be retried.

pub mod classify;
pub mod command;
pub mod config;
pub mod decode;
pub mod error;
pub mod export;
pub mod extjson;
pub mod extract;
pub mod manifest;
pub mod parse;
pub mod process;
pub mod retry;
pub mod table;
pub mod uri;

pub use config::Config;
pub use error::UserError;
pub use export::Export;
pub use extract::Extractor;
