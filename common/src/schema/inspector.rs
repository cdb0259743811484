use crate::error::{Result, SqlGenError};
use crate::schema::types::{ColumnDescriptor, SchemaMap, TableSchema};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

const LIST_TABLES_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'";

fn open_read_only(db_path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| SqlGenError::DatabaseAccess(format!("{}: {}", db_path.display(), e)))
}

/// Read the full schema of a SQLite database: every non-system table in
/// catalog order, every column in the order `PRAGMA table_info` reports.
/// Always a fresh read; the result is never cached or updated in place.
#[tracing::instrument(skip(db_path), fields(db = %db_path.display()))]
pub fn inspect(db_path: &Path) -> Result<SchemaMap> {
    let conn = open_read_only(db_path)?;

    let mut stmt = conn
        .prepare(LIST_TABLES_SQL)
        .map_err(|e| SqlGenError::DatabaseAccess(format!("{}: {}", db_path.display(), e)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let mut columns = Vec::new();
        conn.pragma(None, "table_info", &name, |row| {
            columns.push(ColumnDescriptor {
                name: row.get(1)?,
                declared_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                is_primary_key: row.get::<_, i64>(5)? != 0,
            });
            Ok(())
        })?;
        tables.push(TableSchema { name, columns });
    }

    tracing::debug!("inspected {} tables", tables.len());

    Ok(SchemaMap { tables })
}

/// Whether the path points at something openable as a SQLite database.
/// Returns false for a missing path or a failed catalog probe; never errors.
pub fn is_valid_database(db_path: &Path) -> bool {
    if !db_path.exists() {
        return false;
    }

    let Ok(conn) = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    ) else {
        return false;
    };

    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .is_ok()
}
