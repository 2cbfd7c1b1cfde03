//! Schema description handed to the text-to-SQL chain.
//!
//! The description lists each table or view of the `main` schema as a
//! `CREATE TABLE` block followed by a few example rows, which is the
//! layout SQL-generating models are usually tuned on.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::connection::DbConnection;
use super::query::Scalar;
use crate::error::PadResult;

const COLUMNS_SQL: &str = "SELECT table_name, column_name, data_type \
     FROM information_schema.columns \
     WHERE table_schema = 'main' \
     ORDER BY table_name, ordinal_position";

/// Longest cell text shown in sample rows
const MAX_SAMPLE_CELL: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// List tables and views with their columns
pub fn list_tables(conn: &DbConnection) -> PadResult<Vec<TableInfo>> {
    let fetched = conn.query(COLUMNS_SQL, usize::MAX)?;
    let mut tables: Vec<TableInfo> = Vec::new();

    for row in fetched.rows {
        let mut cells = row.into_iter().map(|cell| match cell {
            Scalar::Text(s) => s,
            other => other.to_string(),
        });
        let (Some(table), Some(column), Some(data_type)) = (cells.next(), cells.next(), cells.next())
        else {
            continue;
        };

        let info = ColumnInfo {
            name: column,
            data_type,
        };
        match tables.last_mut() {
            Some(last) if last.name == table => last.columns.push(info),
            _ => tables.push(TableInfo {
                name: table,
                columns: vec![info],
            }),
        }
    }

    debug!("Found {} tables", tables.len());
    Ok(tables)
}

/// Render the schema description, with up to `sample_rows` example rows per table
pub fn describe(conn: &DbConnection, sample_rows: usize) -> PadResult<String> {
    let tables = list_tables(conn)?;
    let mut blocks = Vec::with_capacity(tables.len());

    for table in &tables {
        let mut block = create_table_statement(table);
        if sample_rows > 0 {
            let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(&table.name), sample_rows);
            let fetched = conn.query(&sql, sample_rows)?;
            block.push_str(&format!(
                "\n\n/*\n{} rows from {} table:\n{}\n",
                sample_rows,
                table.name,
                fetched.columns.join("\t")
            ));
            for row in &fetched.rows {
                let cells: Vec<String> = row.iter().map(sample_cell).collect();
                block.push_str(&cells.join("\t"));
                block.push('\n');
            }
            block.push_str("*/");
        }
        blocks.push(block);
    }

    Ok(blocks.join("\n\n"))
}

fn create_table_statement(table: &TableInfo) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("\t{} {}", quote_ident(&c.name), c.data_type))
        .collect();
    format!("CREATE TABLE {} (\n{}\n)", quote_ident(&table.name), columns.join(",\n"))
}

fn sample_cell(cell: &Scalar) -> String {
    match cell {
        Scalar::Blob(_) => "<BLOB>".to_string(),
        other => {
            let text = other.to_string();
            if text.chars().count() > MAX_SAMPLE_CELL {
                text.chars().take(MAX_SAMPLE_CELL).collect()
            } else {
                text
            }
        }
    }
}

/// Quote an identifier only when it needs it
fn quote_ident(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::testing::{fixture_config, write_fixture};
    use tempfile::tempdir;

    #[test]
    fn test_list_tables() {
        let dir = tempdir().unwrap();
        let path = write_fixture(dir.path(), 2);
        let conn = DbConnection::open(&fixture_config(&path)).unwrap();

        let tables = list_tables(&conn).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "pad");
        let names: Vec<_> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "manager_name", "gap_code", "geometry"]);
        assert_eq!(tables[0].columns[3].data_type, "BLOB");
    }

    #[test]
    fn test_describe_includes_samples() {
        let dir = tempdir().unwrap();
        let path = write_fixture(dir.path(), 5);
        let conn = DbConnection::open(&fixture_config(&path)).unwrap();

        let text = describe(&conn, 2).unwrap();
        assert!(text.starts_with("CREATE TABLE pad (\n\tid INTEGER,"));
        assert!(text.contains("2 rows from pad table:"));
        assert!(text.contains("<BLOB>"));
        assert!(!text.contains("Manager 2"));

        let bare = describe(&conn, 0).unwrap();
        assert!(!bare.contains("rows from"));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("pad"), "pad");
        assert_eq!(quote_ident("Mang_Name"), "\"Mang_Name\"");
        assert_eq!(quote_ident("2020"), "\"2020\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_long_sample_cells_truncated() {
        let cell = Scalar::Text("x".repeat(300));
        assert_eq!(sample_cell(&cell).len(), MAX_SAMPLE_CELL);
    }
}
