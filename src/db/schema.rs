//! Schema introspection for the report database.
//!
//! Used by the web UI as a reference while writing parameter SQL, and folded
//! into AI prompts so suggestions name real tables and columns.

use super::Database;
use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Information about a table column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Information about a foreign key relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// Information about a table or view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub table_type: String, // "table" or "view"
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Complete database schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub tables: Vec<TableInfo>,
    pub sqlite_version: String,
}

impl DatabaseSchema {
    /// Compact one-line-per-table rendering, e.g.
    /// `sales(id INTEGER PK, customer_id INTEGER -> customers.id, ...)`.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|col| {
                    let mut s = format!("{} {}", col.name, col.data_type);
                    if col.primary_key {
                        s.push_str(" PK");
                    }
                    if let Some(fk) = table
                        .foreign_keys
                        .iter()
                        .find(|fk| fk.from_column == col.name)
                    {
                        let _ = write!(s, " -> {}.{}", fk.to_table, fk.to_column);
                    }
                    s
                })
                .collect();
            let _ = writeln!(out, "{}({})", table.name, columns.join(", "));
        }
        out
    }
}

impl Database {
    /// Get schema information for all user tables and views.
    pub fn get_schema(&self) -> Result<DatabaseSchema> {
        self.with_conn(|conn| {
            let sqlite_version: String =
                conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;

            // Skip SQLite internals and the migration bookkeeping table
            let mut stmt = conn.prepare(
                "SELECT name, type FROM sqlite_master
                 WHERE type IN ('table', 'view')
                 AND name NOT LIKE 'sqlite_%'
                 AND name NOT LIKE 'refinery_%'
                 ORDER BY type DESC, name",
            )?;

            let table_names: Vec<(String, String)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut tables = Vec::with_capacity(table_names.len());
            for (name, table_type) in table_names {
                let columns = table_columns(conn, &name)?;
                let foreign_keys = table_foreign_keys(conn, &name)?;
                tables.push(TableInfo {
                    name,
                    table_type,
                    columns,
                    foreign_keys,
                });
            }

            Ok(DatabaseSchema {
                tables,
                sqlite_version,
            })
        })
    }

    /// Get a list of table names only (lightweight).
    pub fn get_table_names(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table'
                 AND name NOT LIKE 'sqlite_%'
                 AND name NOT LIKE 'refinery_%'
                 ORDER BY name",
            )?;

            let names: Vec<String> = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(names)
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn table_columns(conn: &Connection, table_name: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table_name)))?;

    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                data_type: row.get::<_, String>(2)?.to_uppercase(),
                nullable: row.get::<_, i32>(3)? == 0,
                primary_key: row.get::<_, i32>(5)? > 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(columns)
}

fn table_foreign_keys(conn: &Connection, table_name: &str) -> Result<Vec<ForeignKeyInfo>> {
    let mut stmt = conn.prepare(&format!(
        "PRAGMA foreign_key_list({})",
        quote_ident(table_name)
    ))?;

    let foreign_keys = stmt
        .query_map([], |row| {
            Ok(ForeignKeyInfo {
                from_column: row.get(3)?,
                to_table: row.get(2)?,
                to_column: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(foreign_keys)
}
