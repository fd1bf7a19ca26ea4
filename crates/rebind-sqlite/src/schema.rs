//! Schema introspection.

use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};

use rebind_core::{FieldDescriptor, ModelDescriptor, RebindResult};

use crate::{db_error, quote};

/// How records of a table are addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KeyShape {
    /// No declared primary key.
    RowId,
    /// Single-column primary key.
    Single(String),
    /// Multi-column primary key, in declaration order.
    Composite(Vec<String>),
}

/// One table or view.
#[derive(Debug, Clone)]
pub(crate) struct TableInfo {
    pub descriptor: ModelDescriptor,
    pub columns: Vec<String>,
    pub key: KeyShape,
}

struct RawTable {
    name: String,
    is_view: bool,
    columns: Vec<(String, i64)>,
    foreign_keys: HashMap<String, String>,
}

/// Read every user table and view in `sqlite_master` order.
pub(crate) fn load_schema(conn: &Connection, transient_prefix: &str) -> RebindResult<Vec<TableInfo>> {
    let mut stmt = conn
        .prepare(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY rowid",
        )
        .map_err(db_error)?;
    let objects = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;

    let mut raw = Vec::with_capacity(objects.len());
    for (name, kind) in objects {
        let is_view = kind == "view";
        let columns = table_columns(conn, &name)?;
        let foreign_keys = if is_view {
            HashMap::new()
        } else {
            foreign_keys(conn, &name)?
        };
        raw.push(RawTable {
            name,
            is_view,
            columns,
            foreign_keys,
        });
    }

    let shapes: HashMap<String, KeyShape> = raw
        .iter()
        .map(|t| (t.name.clone(), key_shape(&t.columns)))
        .collect();

    let tables = raw
        .into_iter()
        .map(|table| {
            let key = shapes.get(&table.name).cloned().unwrap_or(KeyShape::RowId);
            let descriptor = describe(&table, &key, &shapes, transient_prefix);
            TableInfo {
                descriptor,
                columns: table.columns.into_iter().map(|(name, _)| name).collect(),
                key,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(tables = tables.len(), "SQLite schema loaded");
    Ok(tables)
}

fn table_columns(conn: &Connection, table: &str) -> RebindResult<Vec<(String, i64)>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote(table)))
        .map_err(db_error)?;
    let columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?)))
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    Ok(columns)
}

/// Single-column foreign keys of a table, as column -> referenced table.
fn foreign_keys(conn: &Connection, table: &str) -> RebindResult<HashMap<String, String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA foreign_key_list({})", quote(table)))
        .map_err(db_error)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;

    let mut grouped: BTreeMap<i64, Vec<(String, String)>> = BTreeMap::new();
    for (id, target, column) in rows {
        grouped.entry(id).or_default().push((column, target));
    }

    let mut keys = HashMap::new();
    for (_, mut parts) in grouped {
        if parts.len() != 1 {
            tracing::debug!(table, columns = parts.len(), "Ignoring multi-column foreign key");
            continue;
        }
        if let Some((column, target)) = parts.pop() {
            keys.insert(column, target);
        }
    }
    Ok(keys)
}

fn key_shape(columns: &[(String, i64)]) -> KeyShape {
    let mut pk: Vec<&(String, i64)> = columns.iter().filter(|(_, pk)| *pk > 0).collect();
    pk.sort_by_key(|(_, position)| *position);
    match pk.as_slice() {
        [] => KeyShape::RowId,
        [(name, _)] => KeyShape::Single(name.clone()),
        many => KeyShape::Composite(many.iter().map(|(name, _)| name.clone()).collect()),
    }
}

fn describe(
    table: &RawTable,
    key: &KeyShape,
    shapes: &HashMap<String, KeyShape>,
    transient_prefix: &str,
) -> ModelDescriptor {
    let mut descriptor = ModelDescriptor::new(table.name.as_str());
    if table.is_view {
        descriptor = descriptor.abstract_kind();
    }
    if !transient_prefix.is_empty() && table.name.starts_with(transient_prefix) {
        descriptor = descriptor.transient();
    }

    let key_columns: &[String] = match key {
        KeyShape::RowId => &[],
        KeyShape::Single(name) => std::slice::from_ref(name),
        KeyShape::Composite(names) => names,
    };

    for (column, _) in &table.columns {
        if let Some(target) = table.foreign_keys.get(column) {
            match shapes.get(target) {
                Some(KeyShape::Composite(_)) | None => {
                    tracing::debug!(
                        table = %table.name,
                        column = %column,
                        target = %target,
                        "Foreign key target not addressable by one column, exporting as scalar"
                    );
                }
                Some(_) => {
                    descriptor = descriptor.with_field(FieldDescriptor::relation(column.as_str(), target.as_str()));
                    continue;
                }
            }
        }

        // Source keys are replaced by minted identifiers.
        if key_columns.contains(column) {
            continue;
        }
        descriptor = descriptor.with_field(FieldDescriptor::scalar(column.as_str()));
    }

    descriptor
}
