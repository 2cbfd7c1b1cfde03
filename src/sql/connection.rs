use duckdb::types::Value;
use duckdb::{AccessMode, Config, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use super::query::Scalar;
use crate::core::config::DatabaseConfig;
use crate::error::{map_io_err, ErrorExt, PadError, PadResult};

/// Rows fetched from a statement, before any post-processing
#[derive(Debug, Clone, Default)]
pub struct FetchedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
    /// At least one more row was available past the fetch limit
    pub truncated: bool,
}

/// Identity of a database file on disk, used to notice when it is replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbFingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl DbFingerprint {
    /// Read the fingerprint of the file at `path`
    pub fn of(path: impl AsRef<Path>) -> PadResult<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(map_io_err(path))?;
        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// A connection to the analytical database
pub struct DbConnection {
    /// Path to the database file
    path: PathBuf,
    /// Whether the connection was opened read-only
    read_only: bool,
    /// Whether the spatial extension is loaded
    spatial: bool,
    /// Connection to the database
    connection: Connection,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("spatial", &self.spatial)
            .finish()
    }
}

impl DbConnection {
    /// Open the database described by `config`
    pub fn open(config: &DatabaseConfig) -> PadResult<Self> {
        let path = config.path.clone();
        debug!(
            "Opening database {} (read_only: {})",
            path.display(),
            config.read_only
        );

        if config.read_only && !path.exists() {
            return Err(PadError::connection_error("file does not exist", path));
        }

        let access_mode = if config.read_only {
            AccessMode::ReadOnly
        } else {
            AccessMode::ReadWrite
        };
        let flags = Config::default()
            .access_mode(access_mode)
            .with_path(&path)?;
        let connection = Connection::open_with_flags(&path, flags).with_path(&path)?;

        let mut db = Self {
            path,
            read_only: config.read_only,
            spatial: false,
            connection,
        };

        if config.load_spatial {
            db.load_spatial(config.install_spatial)?;
        }

        info!("Connected to {}", db.path.display());
        Ok(db)
    }

    /// Load the spatial extension, installing it first if asked to
    pub fn load_spatial(&mut self, install: bool) -> PadResult<()> {
        if install {
            debug!("Installing spatial extension");
            self.connection
                .execute_batch("INSTALL spatial;")
                .with_path(&self.path)?;
        }
        self.connection
            .execute_batch("LOAD spatial;")
            .with_path(&self.path)?;
        self.spatial = true;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn has_spatial(&self) -> bool {
        self.spatial
    }

    /// Current fingerprint of the underlying file
    pub fn fingerprint(&self) -> PadResult<DbFingerprint> {
        DbFingerprint::of(&self.path)
    }

    /// Execute a query and return at most `max_rows` rows.
    ///
    /// Database errors come back as [`PadError::Execution`] carrying the
    /// database's message unchanged.
    pub fn query(&self, sql: &str, max_rows: usize) -> PadResult<FetchedRows> {
        debug!("Executing query: {}", sql);

        let mut stmt = self.connection.prepare(sql).for_sql(sql)?;
        let mut rows = stmt.query([]).for_sql(sql)?;

        let columns = rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default();
        let column_count = columns.len();

        let mut fetched = FetchedRows {
            columns,
            ..Default::default()
        };

        while let Some(row) = rows.next().for_sql(sql)? {
            if fetched.rows.len() == max_rows {
                fetched.truncated = true;
                break;
            }

            let mut row_data = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value: Value = row.get(i).for_sql(sql)?;
                row_data.push(scalar_from_value(value));
            }
            fetched.rows.push(row_data);
        }

        Ok(fetched)
    }
}

/// Flatten DuckDB's value types into the handful the pipeline renders
fn scalar_from_value(value: Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::Boolean(b) => Scalar::Bool(b),
        Value::TinyInt(i) => Scalar::Int(i.into()),
        Value::SmallInt(i) => Scalar::Int(i.into()),
        Value::Int(i) => Scalar::Int(i.into()),
        Value::BigInt(i) => Scalar::Int(i),
        Value::UTinyInt(u) => Scalar::Int(u.into()),
        Value::USmallInt(u) => Scalar::Int(u.into()),
        Value::UInt(u) => Scalar::Int(u.into()),
        Value::UBigInt(u) => i64::try_from(u)
            .map(Scalar::Int)
            .unwrap_or_else(|_| Scalar::Text(u.to_string())),
        Value::HugeInt(h) => i64::try_from(h)
            .map(Scalar::Int)
            .unwrap_or_else(|_| Scalar::Text(h.to_string())),
        Value::Float(f) => Scalar::Float(f.into()),
        Value::Double(f) => Scalar::Float(f),
        Value::Decimal(d) => Scalar::Text(d.to_string()),
        Value::Text(s) => Scalar::Text(s),
        Value::Enum(s) => Scalar::Text(s),
        Value::Blob(b) => Scalar::Blob(b),
        other => Scalar::Text(format!("{:?}", other)),
    }
}
