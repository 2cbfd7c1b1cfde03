use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

use super::connection::DbConnection;
use crate::error::PadResult;

/// A single cell value returned by the database
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Scalar {
    /// JSON form used for map feature properties.
    /// Blobs are summarized rather than dumped.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Int(i) => serde_json::Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Scalar::Text(s) => serde_json::Value::String(s.clone()),
            Scalar::Blob(b) => serde_json::Value::String(format!("<BLOB: {} bytes>", b.len())),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => write!(f, "{}", s),
            Scalar::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Represents a query result
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data, in the order the database returned them
    pub rows: Vec<Vec<Scalar>>,
    /// Number of rows returned
    pub row_count: usize,
    /// Whether the database had more rows than were fetched
    pub truncated: bool,
}

impl QueryResult {
    /// Position of a column by exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Execute a query, fetching at most `max_rows` rows
pub fn execute_query(conn: &DbConnection, sql: &str, max_rows: usize) -> PadResult<QueryResult> {
    debug!("Executing SQL query (max {} rows): {}", max_rows, sql);

    let fetched = conn.query(sql, max_rows)?;
    let row_count = fetched.rows.len();

    Ok(QueryResult {
        columns: fetched.columns,
        rows: fetched.rows,
        row_count,
        truncated: fetched.truncated,
    })
}

/// Format query results as a table string
pub fn format_results_as_table(result: &QueryResult) -> String {
    if result.rows.is_empty() {
        return "No results found.".to_string();
    }

    let rendered: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();

    // Calculate column widths
    let mut col_widths = result
        .columns
        .iter()
        .map(|col| col.chars().count())
        .collect::<Vec<_>>();

    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if i < col_widths.len() {
                col_widths[i] = col_widths[i].max(cell.chars().count());
            }
        }
    }

    let mut output = String::new();

    // Header row
    for (i, col) in result.columns.iter().enumerate() {
        if i > 0 {
            output.push_str(" | ");
        }
        output.push_str(&format!("{:width$}", col, width = col_widths[i]));
    }
    output.push('\n');

    // Separator row
    for (i, width) in col_widths.iter().enumerate() {
        if i > 0 {
            output.push_str("-+-");
        }
        output.push_str(&"-".repeat(*width));
    }
    output.push('\n');

    // Data rows
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str(" | ");
            }
            if i < col_widths.len() {
                output.push_str(&format!("{:width$}", cell, width = col_widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }

    output.push_str(&format!("\n{} row(s) returned", result.row_count));
    if result.truncated {
        output.push_str(" (display limit reached)");
    }

    output
}
