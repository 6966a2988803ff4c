//! Single-value query execution for report parameters.

use super::Database;
use crate::types::ReportDate;
use anyhow::Result;
use rusqlite::types::ValueRef;
use std::time::Instant;
use tracing::{debug, warn};

/// Default token replaced with the report month inside parameter SQL.
pub const DEFAULT_DATE_TOKEN: &str = "[REPORT_DATE]";

/// What a parameter query produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// First column of the first row, rendered for display.
    Value(String),
    /// The query returned no rows, or a NULL first value.
    NoData,
    /// The statement could not be prepared or executed.
    Failed(String),
}

/// Replace every occurrence of `token` in `sql` with the report month.
pub fn substitute_date(sql: &str, token: &str, date: &ReportDate) -> String {
    if token.is_empty() {
        return sql.to_string();
    }
    sql.replace(token, &date.to_string())
}

/// Render a SQLite value the way it should appear in a document.
pub fn display_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(s) => Some(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Some(format!("[BLOB {} bytes]", b.len())),
    }
}

impl Database {
    /// Run `sql` and return the first value of the first row.
    ///
    /// Statement-level failures are returned as [`QueryOutcome::Failed`]; only
    /// failures to reach the connection itself are errors.
    pub fn query_first_value(&self, sql: &str) -> Result<QueryOutcome> {
        let start = Instant::now();
        let outcome = self.with_conn(|conn| Ok(first_value(conn, sql)))?;
        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            outcome = ?outcome,
            "Parameter query finished"
        );
        Ok(outcome)
    }

    /// Substitute the date token into `sql`, then run it.
    pub fn query_for_date(
        &self,
        sql: &str,
        token: &str,
        date: &ReportDate,
    ) -> Result<QueryOutcome> {
        let sql = substitute_date(sql, token, date);
        self.query_first_value(&sql)
    }
}

fn first_value(conn: &rusqlite::Connection, sql: &str) -> QueryOutcome {
    match try_first_value(conn, sql) {
        Ok(Some(value)) => QueryOutcome::Value(value),
        Ok(None) => QueryOutcome::NoData,
        Err(e) => {
            warn!(error = %e, sql = %sql, "Parameter query failed");
            QueryOutcome::Failed(e.to_string())
        }
    }
}

fn try_first_value(conn: &rusqlite::Connection, sql: &str) -> Result<Option<String>> {
    let sql = sql.trim();
    if sql.is_empty() {
        anyhow::bail!("empty SQL statement");
    }

    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        anyhow::bail!("only read-only statements are allowed");
    }
    if stmt.column_count() == 0 {
        anyhow::bail!("statement returns no columns");
    }

    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => Ok(display_value(row.get_ref(0)?)),
        None => Ok(None),
    }
}
