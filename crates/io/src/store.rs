//! SQLite store gateway.
//!
//! Identifiers are double-quoted with embedded quotes doubled. Values are
//! always bound parameters. Every key lookup goes through `key_expr`, so
//! `fetch_all_keys`, `fetch_by_keys` and `apply_changesets` agree on the text
//! form of a key. Matching on an expression means SQLite cannot use an index on
//! the key column: each fetch chunk and each update scans the table.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use tagsync_recon::{
    CellValue, Changeset, Record, RecordStore, StoreConnector, SyncError, TableColumns,
};

/// Declared types treated as numeric, after lower-casing and dropping any `(p,s)` suffix.
const NUMERIC_TYPES: &[&str] = &[
    "decimal", "numeric", "float", "real", "int", "bigint", "smallint", "tinyint", "integer",
    "double",
];

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn is_numeric_type(declared: &str) -> bool {
    let base = declared.split('(').next().unwrap_or("").trim().to_ascii_lowercase();
    NUMERIC_TYPES.contains(&base.as_str())
}

/// Text form of a quoted key column: trimmed, with integral reals printed
/// without a fraction (`100.0` reads as `100`, like a workbook key).
fn key_expr(key: &str) -> String {
    format!(
        "CASE WHEN typeof({key}) = 'real' AND {key} = CAST({key} AS INTEGER) \
         THEN CAST(CAST({key} AS INTEGER) AS TEXT) ELSE TRIM({key}) END"
    )
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    timeout: Duration,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn open(&self) -> Result<SqliteStore, SyncError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SyncError::Connection(format!("{}: {e}", self.path.display())))?;
        conn.busy_timeout(self.timeout)
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        // opening is lazy; touch the schema so a non-database file fails here
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| SyncError::Connection(format!("{}: {e}", self.path.display())))?;
        log::info!("connected to {}", self.path.display());
        Ok(SqliteStore { conn })
    }

    /// Open and close a connection, returning the failure if any.
    pub fn test_connection(&self) -> Result<(), SyncError> {
        self.open().map(drop)
    }
}

impl StoreConnector for SqliteConnector {
    fn describe(&self) -> String {
        format!("SQLite database {}", self.path.display())
    }

    fn connect(&self) -> Result<Box<dyn RecordStore>, SyncError> {
        Ok(Box::new(self.open()?))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

impl RecordStore for SqliteStore {
    fn introspect_columns(&mut self, table: &str) -> Result<TableColumns, SyncError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1)")
            .map_err(query_error)?;
        let rows = stmt
            .query_map([table], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(query_error)?;

        let mut columns = TableColumns::default();
        for row in rows {
            let (name, declared) = row.map_err(query_error)?;
            if is_numeric_type(&declared) {
                columns.numeric.insert(name.clone());
            }
            columns.all.push(name);
        }
        if columns.all.is_empty() {
            return Err(SyncError::Query(format!("table '{table}' not found or has no columns")));
        }
        log::debug!(
            "table '{table}': {} columns, {} numeric",
            columns.all.len(),
            columns.numeric.len()
        );
        Ok(columns)
    }

    fn fetch_all_keys(&mut self, table: &str, key_column: &str) -> Result<HashSet<String>, SyncError> {
        let sql = format!(
            "SELECT {} FROM {}",
            key_expr(&quote_identifier(key_column)),
            quote_identifier(table)
        );
        let mut stmt = self.conn.prepare(&sql).map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| Ok(from_sql(row.get_ref(0)?)))
            .map_err(query_error)?;

        let mut keys = HashSet::new();
        for value in rows {
            if let Some(key) = value.map_err(query_error)?.to_key() {
                keys.insert(key);
            }
        }
        log::debug!("table '{table}': {} keys", keys.len());
        Ok(keys)
    }

    fn fetch_by_keys(
        &mut self,
        table: &str,
        key_column: &str,
        keys: &[String],
        chunk_size: usize,
    ) -> Result<Vec<Record>, SyncError> {
        let mut records = Vec::new();
        if keys.is_empty() {
            return Ok(records);
        }

        let key = key_expr(&quote_identifier(key_column));
        let table = quote_identifier(table);
        for chunk in keys.chunks(chunk_size.max(1)) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT * FROM {table} WHERE {key} IN ({placeholders})");
            let mut stmt = self.conn.prepare(&sql).map_err(query_error)?;
            let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    let mut record = Record::with_capacity(names.len());
                    for (idx, name) in names.iter().enumerate() {
                        record.insert(name.clone(), from_sql(row.get_ref(idx)?));
                    }
                    Ok(record)
                })
                .map_err(query_error)?;
            for record in rows {
                records.push(record.map_err(query_error)?);
            }
            log::debug!("fetched chunk of {} keys", chunk.len());
        }
        Ok(records)
    }

    fn apply_changesets(
        &mut self,
        table: &str,
        key_column: &str,
        changesets: &[Changeset],
    ) -> Result<usize, SyncError> {
        let key = key_expr(&quote_identifier(key_column));
        let table = quote_identifier(table);

        // dropping the transaction on an early return rolls it back
        let tx = self.conn.transaction().map_err(query_error)?;
        let mut affected = 0;
        for change in changesets.iter().filter(|c| !c.fields.is_empty()) {
            let assignments: Vec<String> = change
                .fields
                .keys()
                .map(|column| format!("{} = ?", quote_identifier(column)))
                .collect();
            let sql = format!(
                "UPDATE {table} SET {} WHERE {key} = ?",
                assignments.join(", ")
            );
            let mut params: Vec<Value> = change.fields.values().map(to_sql).collect();
            params.push(Value::Text(change.record_key.clone()));
            affected += tx
                .execute(&sql, params_from_iter(params))
                .map_err(|e| {
                    SyncError::Query(format!("update of '{}' failed: {e}", change.record_key))
                })?;
        }
        tx.commit().map_err(query_error)?;
        log::info!("committed {} changesets, {affected} rows affected", changesets.len());
        Ok(affected)
    }
}

fn query_error(e: rusqlite::Error) -> SyncError {
    SyncError::Query(e.to_string())
}

fn from_sql(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Number(i as f64),
        ValueRef::Real(f) => CellValue::Number(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            CellValue::Text(String::from_utf8_lossy(t).into_owned())
        }
    }
}

fn to_sql(value: &CellValue) -> Value {
    match value {
        CellValue::Null => Value::Null,
        CellValue::Number(n) => Value::Real(*n),
        CellValue::Text(s) => Value::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    const SCHEMA: &str = r#"
        CREATE TABLE "AllTagslist" (
            "Tag Number" TEXT PRIMARY KEY,
            "Temperature" DECIMAL(10,2),
            "Pressure" REAL,
            "Count" INTEGER,
            "Description" NVARCHAR(100),
            "Odd""Name" TEXT
        );
        INSERT INTO "AllTagslist" VALUES ('T-100', 20.5, 9.0, 3, 'Old', NULL);
        INSERT INTO "AllTagslist" VALUES (' T-200 ', 20.0, 10.0, NULL, 'Same', NULL);
        INSERT INTO "AllTagslist" VALUES ('', NULL, NULL, NULL, NULL, NULL);
    "#;

    fn store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        SqliteStore::from_connection(conn)
    }

    fn change(key: &str, fields: &[(&str, CellValue)]) -> Changeset {
        Changeset {
            record_key: key.to_string(),
            fields: fields
                .iter()
                .map(|(c, v)| (c.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn identifier_quoting() {
        assert_eq!(quote_identifier("Tag Number"), "\"Tag Number\"");
        assert_eq!(quote_identifier("Odd\"Name"), "\"Odd\"\"Name\"");
    }

    #[test]
    fn numeric_type_classification() {
        for t in ["DECIMAL(10,2)", "numeric", "Float", "REAL", "int", "BIGINT", "integer", "DOUBLE"] {
            assert!(is_numeric_type(t), "{t}");
        }
        for t in ["TEXT", "NVARCHAR(100)", "", "DATETIME", "BLOB"] {
            assert!(!is_numeric_type(t), "{t}");
        }
    }

    #[test]
    fn introspection() {
        let columns = store().introspect_columns("AllTagslist").unwrap();
        assert_eq!(columns.all.len(), 6);
        assert!(columns.contains("Odd\"Name"));
        let mut numeric: Vec<_> = columns.numeric.into_iter().collect();
        numeric.sort();
        assert_eq!(numeric, vec!["Count", "Pressure", "Temperature"]);
    }

    #[test]
    fn unknown_table_is_query_error() {
        let err = store().introspect_columns("Nope").unwrap_err();
        assert!(matches!(err, SyncError::Query(_)));
    }

    #[test]
    fn keys_are_trimmed_and_blanks_dropped() {
        let keys = store().fetch_all_keys("AllTagslist", "Tag Number").unwrap();
        assert_eq!(keys, HashSet::from(["T-100".to_string(), "T-200".to_string()]));
    }

    #[test]
    fn chunked_fetch_returns_every_match() {
        let mut store = store();
        let keys = vec!["T-100".to_string(), "missing".to_string(), "T-200".to_string()];
        for chunk in [0, 1, 2, 2000] {
            let records = store
                .fetch_by_keys("AllTagslist", "Tag Number", &keys, chunk)
                .unwrap();
            assert_eq!(records.len(), 2, "chunk size {chunk}");
        }
        let records = store
            .fetch_by_keys("AllTagslist", "Tag Number", &keys[..1], 10)
            .unwrap();
        assert_eq!(records[0]["Temperature"], CellValue::Number(20.5));
        assert_eq!(records[0]["Count"], CellValue::Number(3.0));
        assert_eq!(records[0]["Odd\"Name"], CellValue::Null);
    }

    #[test]
    fn empty_key_list_issues_no_query() {
        let mut store = store();
        let records = store.fetch_by_keys("missing_table", "x", &[], 10).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn apply_updates_only_named_columns() {
        let mut store = store();
        let affected = store
            .apply_changesets(
                "AllTagslist",
                "Tag Number",
                &[
                    change("T-100", &[("Pressure", CellValue::Number(10.0))]),
                    change("gone", &[("Pressure", CellValue::Number(1.0))]),
                    change("T-100", &[]),
                ],
            )
            .unwrap();
        assert_eq!(affected, 1);

        let records = store
            .fetch_by_keys("AllTagslist", "Tag Number", &["T-100".to_string()], 10)
            .unwrap();
        assert_eq!(records[0]["Pressure"], CellValue::Number(10.0));
        assert_eq!(records[0]["Description"], CellValue::from("Old"));
    }

    #[test]
    fn failed_update_rolls_back_everything() {
        let mut store = store();
        let err = store
            .apply_changesets(
                "AllTagslist",
                "Tag Number",
                &[
                    change("T-100", &[("Description", CellValue::from("New"))]),
                    change("T-100", &[("NoSuchColumn", CellValue::from("x"))]),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Query(_)));

        let records = store
            .fetch_by_keys("AllTagslist", "Tag Number", &["T-100".to_string()], 10)
            .unwrap();
        assert_eq!(records[0]["Description"], CellValue::from("Old"));
    }

    #[test]
    fn real_keys_match_in_integral_form() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE "Loops" ("Loop" REAL, "Service" TEXT);
            INSERT INTO "Loops" VALUES (100.0, 'Feed');
            INSERT INTO "Loops" VALUES (100.5, 'Bypass');
            "#,
        )
        .unwrap();
        let mut store = SqliteStore::from_connection(conn);

        let keys = store.fetch_all_keys("Loops", "Loop").unwrap();
        assert_eq!(keys, HashSet::from(["100".to_string(), "100.5".to_string()]));

        let records = store
            .fetch_by_keys("Loops", "Loop", &["100".to_string()], 10)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Service"], CellValue::from("Feed"));

        let affected = store
            .apply_changesets(
                "Loops",
                "Loop",
                &[
                    change("100", &[("Service", CellValue::from("Main feed"))]),
                    change("100.5", &[("Service", CellValue::from("Spare"))]),
                ],
            )
            .unwrap();
        assert_eq!(affected, 2);
        let records = store
            .fetch_by_keys("Loops", "Loop", &["100".to_string(), "100.5".to_string()], 10)
            .unwrap();
        let mut services: Vec<String> = records.iter().map(|r| r["Service"].to_text()).collect();
        services.sort();
        assert_eq!(services, vec!["Main feed", "Spare"]);
    }

    #[test]
    fn missing_database_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::new(dir.path().join("absent.db"), Duration::from_secs(1));
        let err = connector.test_connection().unwrap_err();
        assert!(matches!(err, SyncError::Connection(_)));
        assert!(!dir.path().join("absent.db").exists());
    }

    #[test]
    fn connector_opens_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plant.db");
        Connection::open(&path).unwrap().execute_batch(SCHEMA).unwrap();

        let connector = SqliteConnector::new(&path, Duration::from_secs(1));
        connector.test_connection().unwrap();
        let mut store = connector.connect().unwrap();
        assert_eq!(store.fetch_all_keys("AllTagslist", "Tag Number").unwrap().len(), 2);
    }
}
