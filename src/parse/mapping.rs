//! Declarative document flattening.
//!
//! A mapping tree describes how one document becomes rows in one or more
//! tables. Leaves pick a field by path and land it in a destination column;
//! internal nodes feed array fields into child tables linked back to the
//! parent row. The whole table set is derived from the tree before the
//! first document arrives, so an empty export still produces every declared
//! table with its header.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::error::user_error;
use crate::extjson;
use crate::manifest::TableManifest;
use crate::table::OutputTable;

/// Synthetic column carrying the parent-document hash when
/// `includeParentInPK` is set.
const PARENT_ID_COLUMN: &str = "parentId";

/// One node of the mapping tree.
#[derive(Debug, Clone)]
pub enum MappingNode {
    /// Field path → destination column.
    Column {
        destination: String,
        primary_key: bool,
    },
    /// Array field → child table.
    Table(ChildTable),
}

#[derive(Debug, Clone)]
pub struct ChildTable {
    destination: String,
    parent_key_column: String,
    parent_key_primary: bool,
    nodes: Vec<(String, MappingNode)>,
}

/// The declared output tables, addressable by name.
#[derive(Debug)]
struct TableSet {
    tables: Vec<OutputTable>,
    index: HashMap<String, usize>,
}

impl TableSet {
    fn get_mut(&mut self, table: &str) -> &mut OutputTable {
        let index = self.index[table];
        &mut self.tables[index]
    }
}

#[derive(Debug)]
pub struct Mapping {
    nodes: Vec<(String, MappingNode)>,
    root_table: String,
    include_parent_in_pk: bool,
    tables: TableSet,
}

impl Mapping {
    pub fn new(
        name: &str,
        mapping: &Value,
        include_parent_in_pk: bool,
        out_dir: &Path,
    ) -> anyhow::Result<Self> {
        let Some(mapping) = mapping.as_object() else {
            return Err(user_error(
                "Invalid mapping configuration: mapping must be an object.",
            ));
        };

        let nodes = parse_nodes(mapping, name)?;
        let mut tables = TableSet {
            tables: Vec::new(),
            index: HashMap::new(),
        };
        register_table(
            &mut tables,
            out_dir,
            &nodes,
            name,
            None,
            include_parent_in_pk,
        )?;

        Ok(Self {
            nodes,
            root_table: name.to_string(),
            include_parent_in_pk,
            tables,
        })
    }

    /// Flatten one document into rows across the declared tables.
    pub fn parse(&mut self, document: &Value) -> anyhow::Result<()> {
        let parent_hash = if self.include_parent_in_pk {
            Some(format!("{:x}", md5::compute(document.to_string())))
        } else {
            None
        };

        parse_row(
            &mut self.tables,
            document,
            &self.nodes,
            &self.root_table,
            None,
            parent_hash.as_deref(),
        )
    }

    /// Flush every table and report its manifest metadata, in declaration
    /// order.
    pub fn finish(mut self) -> anyhow::Result<Vec<TableManifest>> {
        let mut manifests = Vec::new();
        for table in &mut self.tables.tables {
            table.finish()?;
            manifests.push(TableManifest {
                table: crate::table::webalize(table.name()),
                primary_key: table.primary_key().to_vec(),
                columns: Some(table.columns().to_vec()),
            });
        }
        Ok(manifests)
    }

    pub fn rows_written(&self) -> u64 {
        self.tables.tables.iter().map(OutputTable::rows_written).sum()
    }
}

/// Declare a table (and, depth-first, its children) from the tree.
fn register_table(
    tables: &mut TableSet,
    out_dir: &Path,
    nodes: &[(String, MappingNode)],
    table: &str,
    foreign_key: Option<(&str, bool)>,
    include_parent_in_pk: bool,
) -> anyhow::Result<()> {
    if tables.index.contains_key(table) {
        return Err(user_error(format!(
            "Invalid mapping configuration: duplicate table \"{table}\"."
        )));
    }

    let mut columns = Vec::new();
    let mut primary_key = Vec::new();
    for (_, node) in nodes {
        if let MappingNode::Column {
            destination,
            primary_key: is_key,
        } = node
        {
            columns.push(destination.clone());
            if *is_key {
                primary_key.push(destination.clone());
            }
        }
    }

    if let Some((column, is_key)) = foreign_key {
        columns.push(column.to_string());
        if is_key {
            primary_key.push(column.to_string());
        }
    }

    if include_parent_in_pk {
        columns.push(PARENT_ID_COLUMN.to_string());
        primary_key.push(PARENT_ID_COLUMN.to_string());
    }

    let output = OutputTable::create(out_dir, table, columns, primary_key)?;
    tables.index.insert(table.to_string(), tables.tables.len());
    tables.tables.push(output);

    for (_, node) in nodes {
        if let MappingNode::Table(child) = node {
            register_table(
                tables,
                out_dir,
                &child.nodes,
                &child.destination,
                Some((&child.parent_key_column, child.parent_key_primary)),
                include_parent_in_pk,
            )?;
        }
    }

    Ok(())
}

fn parse_row(
    tables: &mut TableSet,
    value: &Value,
    nodes: &[(String, MappingNode)],
    table: &str,
    foreign_key_value: Option<&str>,
    parent_hash: Option<&str>,
) -> anyhow::Result<()> {
    let mut cells = Vec::new();
    let mut key_cells = Vec::new();
    let mut children: Vec<(&ChildTable, Option<&Value>)> = Vec::new();

    for (source, node) in nodes {
        match node {
            MappingNode::Column {
                destination,
                primary_key,
            } => {
                let cell = render_cell(get_path(value, source), destination)?;
                if *primary_key {
                    key_cells.push(cell.clone());
                }
                cells.push(cell);
            }
            MappingNode::Table(child) => children.push((child, get_path(value, source))),
        }
    }

    if let Some(link) = foreign_key_value {
        cells.push(link.to_string());
    }
    if let Some(hash) = parent_hash {
        cells.push(hash.to_string());
    }

    if !cells.is_empty() {
        tables.get_mut(table).write_row(&cells)?;
    }

    if children.is_empty() {
        return Ok(());
    }

    // Children reference this row by its primary key; a row without one
    // falls back to a hash of its source value.
    if let Some(hash) = parent_hash {
        key_cells.push(hash.to_string());
    }
    let link = if key_cells.is_empty() {
        format!("{:x}", md5::compute(value.to_string()))
    } else {
        key_cells.join(",")
    };

    for (child, child_value) in children {
        let items: Vec<&Value> = match child_value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(object @ Value::Object(_)) => vec![object],
            Some(other) => {
                return Err(user_error(format!(
                    "Invalid mapping configuration: value \"{other}\" cannot be mapped \
                     to table \"{}\".",
                    child.destination
                )));
            }
        };

        for item in items {
            parse_row(
                tables,
                item,
                &child.nodes,
                &child.destination,
                Some(link.as_str()),
                parent_hash,
            )?;
        }
    }

    Ok(())
}

fn parse_nodes(
    mapping: &serde_json::Map<String, Value>,
    table: &str,
) -> anyhow::Result<Vec<(String, MappingNode)>> {
    let mut nodes = Vec::new();

    for (source, definition) in mapping {
        match definition {
            // Shorthand: the source path names its own column. The document
            // id keeps its role as the table key.
            Value::Null => nodes.push((
                source.clone(),
                MappingNode::Column {
                    destination: extjson::strip_type_suffixes(source),
                    primary_key: is_document_id(source),
                },
            )),
            Value::String(destination) => nodes.push((
                source.clone(),
                MappingNode::Column {
                    destination: destination.clone(),
                    primary_key: false,
                },
            )),
            Value::Object(settings) => {
                let node_type = settings
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("column");
                match node_type {
                    "column" => {
                        let column = settings.get("mapping").and_then(Value::as_object);
                        let destination = column
                            .and_then(|m| m.get("destination"))
                            .and_then(Value::as_str)
                            .filter(|d| !d.is_empty());
                        // A column without a destination is dropped.
                        if let Some(destination) = destination {
                            let primary_key = column
                                .and_then(|m| m.get("primaryKey"))
                                .and_then(Value::as_bool)
                                .unwrap_or(false);
                            nodes.push((
                                source.clone(),
                                MappingNode::Column {
                                    destination: destination.to_string(),
                                    primary_key,
                                },
                            ));
                        }
                    }
                    "table" => {
                        let destination = settings
                            .get("destination")
                            .and_then(Value::as_str)
                            .filter(|d| !d.is_empty())
                            .ok_or_else(|| {
                                user_error(format!(
                                    "Invalid mapping configuration: key \"destination\" \
                                     is not set for table \"{source}\"."
                                ))
                            })?;

                        let parent_key = settings.get("parentKey").and_then(Value::as_object);
                        let parent_key_column = parent_key
                            .and_then(|p| p.get("destination"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("{table}_pk"));
                        let parent_key_primary = parent_key
                            .and_then(|p| p.get("primaryKey"))
                            .and_then(Value::as_bool)
                            .unwrap_or(false);

                        let table_mapping = settings
                            .get("tableMapping")
                            .and_then(Value::as_object)
                            .filter(|m| !m.is_empty())
                            .ok_or_else(|| {
                                user_error(format!(
                                    "Invalid mapping configuration: key \"tableMapping\" \
                                     is not set for table \"{source}\"."
                                ))
                            })?;

                        nodes.push((
                            source.clone(),
                            MappingNode::Table(ChildTable {
                                destination: destination.to_string(),
                                parent_key_column,
                                parent_key_primary,
                                nodes: parse_nodes(table_mapping, destination)?,
                            }),
                        ));
                    }
                    other => {
                        return Err(user_error(format!(
                            "Invalid mapping configuration: unknown type \"{other}\" \
                             for \"{source}\"."
                        )));
                    }
                }
            }
            other => {
                return Err(user_error(format!(
                    "Invalid mapping configuration: invalid definition \"{other}\" \
                     for \"{source}\"."
                )));
            }
        }
    }

    Ok(nodes)
}

/// Walk a dot-separated field path through nested objects.
fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

fn render_cell(value: Option<&Value>, destination: &str) -> anyhow::Result<String> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(true)) => Ok("1".to_string()),
        Some(Value::Bool(false)) => Ok(String::new()),
        Some(Value::Object(_)) | Some(Value::Array(_)) => Err(user_error(format!(
            "CSV writing error. Header and mapped documents must be scalar values. \
             Non-scalar value found for column \"{destination}\"."
        ))),
    }
}

fn is_document_id(source: &str) -> bool {
    source == "_id" || source.starts_with("_id.$")
}
