//! SQLite data source.

use once_cell::sync::OnceCell;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rebind_core::types::KeyScalar;
use rebind_core::{
    CanonicalKey, DataSource, KeyValue, ModelDescriptor, RebindError, RebindResult, RecordValues,
};

use crate::schema::{load_schema, KeyShape, TableInfo};
use crate::{db_error, quote};

/// Table name prefix marking transient tables unless configured otherwise.
pub const DEFAULT_TRANSIENT_PREFIX: &str = "tmp_";

/// Read-only view of a SQLite database as a record store.
///
/// The schema is introspected on first use and cached; call
/// [`SqliteSource::open`] again to pick up schema changes.
pub struct SqliteSource {
    conn: Mutex<Connection>,
    transient_prefix: String,
    schema: OnceCell<Vec<TableInfo>>,
}

impl SqliteSource {
    /// Open a database file.
    pub fn open(path: impl AsRef<Path>) -> RebindResult<Self> {
        let path = path.as_ref();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| RebindError::Database {
            message: format!("cannot open {}: {}", path.display(), e),
            code: rebind_core::ErrorCode::DbConnectionFailed,
            source: Some(Box::new(e)),
        })?;

        tracing::debug!(path = %path.display(), "Opened SQLite source");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            transient_prefix: DEFAULT_TRANSIENT_PREFIX.to_string(),
            schema: OnceCell::new(),
        }
    }

    /// Change the prefix that marks tables as transient. An empty prefix
    /// marks none.
    pub fn with_transient_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.transient_prefix = prefix.into();
        self.schema = OnceCell::new();
        self
    }

    fn conn(&self) -> RebindResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RebindError::Internal("SQLite connection lock poisoned".to_string()))
    }

    fn schema(&self) -> RebindResult<&[TableInfo]> {
        let tables = self.schema.get_or_try_init(|| {
            let conn = self.conn()?;
            load_schema(&conn, &self.transient_prefix)
        })?;
        Ok(tables.as_slice())
    }

    fn table(&self, model: &str) -> RebindResult<&TableInfo> {
        self.schema()?
            .iter()
            .find(|t| t.descriptor.name == model)
            .ok_or_else(|| RebindError::unknown_model(model))
    }

    /// WHERE clause and parameters selecting one record.
    fn key_filter(table: &TableInfo, key: &KeyValue) -> RebindResult<(String, Vec<SqlValue>)> {
        let canonical = CanonicalKey::from_value(key)?;
        let components = canonical.components();

        let columns: Vec<&str> = match &table.key {
            KeyShape::RowId => vec!["rowid"],
            KeyShape::Single(column) => vec![column.as_str()],
            KeyShape::Composite(columns) => columns.iter().map(String::as_str).collect(),
        };

        if components.len() != columns.len() {
            return Err(RebindError::invalid_key(format!(
                "{} expects a key with {} part(s), got {}",
                table.descriptor.name,
                columns.len(),
                canonical
            )));
        }

        let named = components.iter().all(|c| c.name.is_some());
        let mut clauses = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());

        for (position, column) in columns.iter().enumerate() {
            let component = if named && table.key != KeyShape::RowId {
                components
                    .iter()
                    .find(|c| c.name.as_deref() == Some(*column))
                    .ok_or_else(|| {
                        RebindError::invalid_key(format!(
                            "{} key is missing column '{}': {}",
                            table.descriptor.name, column, canonical
                        ))
                    })?
            } else {
                &components[position]
            };

            let quoted = if *column == "rowid" {
                column.to_string()
            } else {
                quote(column)
            };
            clauses.push(format!("{} = ?{}", quoted, position + 1));
            // SQLite integers are i64 and it has no boolean type: `true`
            // would read the row of `1`, and larger keys cannot exist.
            values.push(match &component.value {
                KeyScalar::Int(i) => SqlValue::Integer(*i),
                KeyScalar::Text(s) => SqlValue::Text(s.clone()),
                KeyScalar::Bool(_) | KeyScalar::UInt(_) => {
                    return Err(RebindError::invalid_key(format!(
                        "{} key {} is not an SQLite integer or text",
                        table.descriptor.name, canonical
                    )))
                }
            });
        }

        Ok((clauses.join(" AND "), values))
    }

    /// Raw key of the current row. Key columns come first in the select list.
    fn row_key(table: &TableInfo, row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyValue> {
        match &table.key {
            KeyShape::RowId | KeyShape::Single(_) => Ok(to_json(row.get_ref(0)?)),
            KeyShape::Composite(columns) => {
                let mut map = serde_json::Map::new();
                for (i, column) in columns.iter().enumerate() {
                    map.insert(column.clone(), to_json(row.get_ref(i)?));
                }
                Ok(Value::Object(map))
            }
        }
    }
}

/// Convert an SQLite value to JSON. Blobs become lowercase hex strings.
fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

impl DataSource for SqliteSource {
    fn models(&self) -> RebindResult<Vec<ModelDescriptor>> {
        Ok(self.schema()?.iter().map(|t| t.descriptor.clone()).collect())
    }

    fn keys(&self, model: &str) -> RebindResult<Vec<KeyValue>> {
        let table = self.table(model)?;
        let columns = match &table.key {
            KeyShape::RowId => "rowid".to_string(),
            KeyShape::Single(column) => quote(column),
            KeyShape::Composite(columns) => columns
                .iter()
                .map(|c| quote(c))
                .collect::<Vec<_>>()
                .join(", "),
        };
        let sql = format!(
            "SELECT {cols} FROM {table} ORDER BY {cols}",
            cols = columns,
            table = quote(model)
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(db_error)?;
        let keys = stmt
            .query_map([], |row| Self::row_key(table, row))
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(keys)
    }

    fn read(&self, model: &str, key: &KeyValue) -> RebindResult<Option<RecordValues>> {
        let table = self.table(model)?;
        let (filter, params) = Self::key_filter(table, key)?;
        let select = table
            .columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            select,
            quote(model),
            filter
        );

        let conn = self.conn()?;
        let values = conn
            .query_row(&sql, params_from_iter(params), |row| {
                let mut values = RecordValues::with_capacity(table.columns.len());
                for (i, column) in table.columns.iter().enumerate() {
                    values.insert(column.clone(), to_json(row.get_ref(i)?));
                }
                Ok(values)
            })
            .optional()
            .map_err(db_error)?;
        Ok(values)
    }

    fn contains(&self, model: &str, key: &KeyValue) -> RebindResult<bool> {
        let table = self.table(model)?;
        let (filter, params) = Self::key_filter(table, key)?;
        let sql = format!("SELECT 1 FROM {} WHERE {} LIMIT 1", quote(model), filter);

        let conn = self.conn()?;
        let found = conn
            .query_row(&sql, params_from_iter(params), |_| Ok(()))
            .optional()
            .map_err(db_error)?;
        Ok(found.is_some())
    }
}

impl std::fmt::Debug for SqliteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSource")
            .field("transient_prefix", &self.transient_prefix)
            .field("tables", &self.schema.get().map(Vec::len))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> SqliteSource {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE company (id INTEGER PRIMARY KEY, name TEXT, logo BLOB, rating REAL);
            CREATE TABLE partner (
                id INTEGER PRIMARY KEY,
                name TEXT,
                company_id INTEGER REFERENCES company(id)
            );
            CREATE TABLE note (body TEXT);
            CREATE TABLE "order line" (
                order_ref TEXT,
                seq INTEGER,
                qty INTEGER,
                PRIMARY KEY (order_ref, seq)
            );
            INSERT INTO company VALUES (1, 'Acme', X'CAFE', 4.5);
            INSERT INTO partner VALUES (2, 'Bob', 1), (1, 'Alice', NULL);
            INSERT INTO note (body) VALUES ('first'), ('second');
            INSERT INTO "order line" VALUES ('SO1', 2, 5), ('SO1', 1, 3);
            "#,
        )
        .unwrap();
        SqliteSource::from_connection(conn)
    }

    #[test]
    fn test_keys_by_shape() {
        let source = source();
        assert_eq!(source.keys("partner").unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(source.keys("note").unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(
            source.keys("order line").unwrap(),
            vec![
                json!({"order_ref": "SO1", "seq": 1}),
                json!({"order_ref": "SO1", "seq": 2})
            ]
        );
    }

    #[test]
    fn test_read_values() {
        let source = source();
        let company = source.read("company", &json!(1)).unwrap().unwrap();
        assert_eq!(company["name"], json!("Acme"));
        assert_eq!(company["logo"], json!("cafe"));
        assert_eq!(company["rating"], json!(4.5));

        let partner = source.read("partner", &json!(1)).unwrap().unwrap();
        assert_eq!(partner["company_id"], json!(null));
        assert!(source.read("partner", &json!(9)).unwrap().is_none());
    }

    #[test]
    fn test_composite_keys_by_name_or_position() {
        let source = source();
        let by_name = source
            .read("order line", &json!({"seq": 2, "order_ref": "SO1"}))
            .unwrap()
            .unwrap();
        assert_eq!(by_name["qty"], json!(5));

        let by_position = source.read("order line", &json!(["SO1", 1])).unwrap().unwrap();
        assert_eq!(by_position["qty"], json!(3));

        assert!(source.read("order line", &json!(1)).is_err());
        assert!(source.read("order line", &json!({"order_ref": "SO1", "line": 1})).is_err());
    }

    #[test]
    fn test_boolean_and_unsigned_keys_rejected() {
        let source = source();
        assert!(source.read("partner", &json!(true)).is_err());
        assert!(source.contains("partner", &json!(true)).is_err());
        assert!(source.read("partner", &json!(u64::MAX)).is_err());
        assert!(source
            .read("order line", &json!({"order_ref": "SO1", "seq": false}))
            .is_err());
        assert!(source.read("partner", &json!(1)).unwrap().is_some());
    }

    #[test]
    fn test_contains_and_unknown_model() {
        let source = source();
        assert!(source.contains("partner", &json!(2)).unwrap());
        assert!(source.contains("partner", &json!(2.0)).unwrap());
        assert!(!source.contains("partner", &json!(3)).unwrap());
        assert!(source.keys("missing").is_err());
    }

    #[test]
    fn test_transient_prefix_override() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE wizard_step (id INTEGER PRIMARY KEY);")
            .unwrap();
        let source = SqliteSource::from_connection(conn).with_transient_prefix("wizard_");

        let models = source.models().unwrap();
        assert!(models[0].transient);
    }
}
