use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::fmt;
use std::path::Path;

/// One SQLite cell, materialized.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => Ok(()),
            SqlValue::Integer(v) => write!(f, "{}", v),
            SqlValue::Real(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Blob(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(v) => SqlValue::Integer(v),
            ValueRef::Real(v) => SqlValue::Real(v),
            ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
        }
    }
}

/// Fully materialized result set of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResults {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResults {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// RFC-4180-ish rendering: header row, then one line per row; fields
    /// containing a comma, quote, or newline are quoted with doubled quotes.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(
            &self
                .columns
                .iter()
                .map(|c| csv_field(c))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
        for row in &self.rows {
            out.push_str(
                &row.iter()
                    .map(|v| csv_field(&v.to_string()))
                    .collect::<Vec<_>>()
                    .join(","),
            );
            out.push('\n');
        }
        out
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Result of running a query: rows, or the engine's error message.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Rows(QueryResults),
    Error(String),
}

/// Plan-only probe: prepare `EXPLAIN QUERY PLAN <query>` on a fresh
/// connection. Syntax and catalog errors surface as the message; nothing
/// is executed and nothing is mutated.
pub fn validate_query(db_path: &Path, query: &str) -> (bool, Option<String>) {
    let conn = match Connection::open(db_path) {
        Ok(conn) => conn,
        Err(e) => return (false, Some(e.to_string())),
    };

    match conn.prepare(&format!("EXPLAIN QUERY PLAN {}", query)) {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    }
}

/// Run a query on a fresh connection and materialize every row. Failures
/// of any kind come back as `ExecutionOutcome::Error`, never as a panic
/// or an `Err` to the caller.
#[tracing::instrument(skip(db_path, query), fields(db = %db_path.display(), query_len = query.len()))]
pub fn execute_query(db_path: &Path, query: &str) -> ExecutionOutcome {
    match try_execute(db_path, query) {
        Ok(results) => {
            tracing::debug!("query returned {} rows", results.rows.len());
            ExecutionOutcome::Rows(results)
        }
        Err(e) => ExecutionOutcome::Error(e.to_string()),
    }
}

fn try_execute(db_path: &Path, query: &str) -> rusqlite::Result<QueryResults> {
    let conn = Connection::open(db_path)?;
    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();

    let mut rows = stmt.query([])?;
    let mut materialized = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(column_count);
        for i in 0..column_count {
            record.push(SqlValue::from(row.get_ref(i)?));
        }
        materialized.push(record);
    }

    Ok(QueryResults {
        columns,
        rows: materialized,
    })
}
