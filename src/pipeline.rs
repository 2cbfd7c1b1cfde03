//! The query-and-render pipeline: SQL text in, capped rows and optional
//! decoded shapes out.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheStats, QueryCache, QueryKey};
use crate::core::config::DatabaseConfig;
use crate::error::PadResult;
use crate::geo::{GeoTable, GEOMETRY_COLUMN};
use crate::sql::{execute_query, schema, DbConnection, QueryResult};

/// What one query produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// No `geometry` column; rows only
    Table(QueryResult),
    /// Rows plus one decoded shape per row
    Geo(GeoTable),
}

impl QueryOutcome {
    pub fn result(&self) -> &QueryResult {
        match self {
            QueryOutcome::Table(result) => result,
            QueryOutcome::Geo(table) => table.result(),
        }
    }

    pub fn geo(&self) -> Option<&GeoTable> {
        match self {
            QueryOutcome::Table(_) => None,
            QueryOutcome::Geo(table) => Some(table),
        }
    }

    pub fn row_count(&self) -> usize {
        self.result().row_count
    }
}

/// Executes SQL against the read-only database and memoizes the outcome
pub struct QueryPipeline {
    db_config: DatabaseConfig,
    db: DbConnection,
    cache: QueryCache<QueryKey, Arc<QueryOutcome>>,
}

impl QueryPipeline {
    /// Open the database and create a cache of `cache_capacity` entries
    pub fn open(db_config: &DatabaseConfig, cache_capacity: usize) -> PadResult<Self> {
        let db = DbConnection::open(db_config)?;
        let mut cache = QueryCache::new(cache_capacity);
        cache.validate(db.fingerprint()?);
        if !cache.is_enabled() {
            debug!("Query cache disabled");
        }

        Ok(Self {
            db_config: db_config.clone(),
            db,
            cache,
        })
    }

    /// Run `sql`, returning at most `row_limit` rows.
    ///
    /// Identical SQL with the same limit is served from the cache until the
    /// database file changes on disk. Failures are never cached.
    pub fn run_query(&mut self, sql: &str, row_limit: usize) -> PadResult<Arc<QueryOutcome>> {
        self.refresh_if_changed()?;

        let key = QueryKey::new(sql, row_limit);
        if let Some(outcome) = self.cache.get(&key) {
            debug!("Query cache hit");
            return Ok(outcome);
        }

        let result = execute_query(&self.db, sql, row_limit)?;
        let outcome = match result.column_index(GEOMETRY_COLUMN) {
            Some(index) => QueryOutcome::Geo(GeoTable::decode(result, index)?),
            None => QueryOutcome::Table(result),
        };
        info!(
            "Query returned {} row(s){}",
            outcome.row_count(),
            if outcome.geo().is_some() { " with geometry" } else { "" }
        );

        let outcome = Arc::new(outcome);
        self.cache.insert(key, Arc::clone(&outcome));
        Ok(outcome)
    }

    /// Schema description for the text-to-SQL chain
    pub fn describe_schema(&self, sample_rows: usize) -> PadResult<String> {
        schema::describe(&self.db, sample_rows)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Reopen the connection and drop cached results if the file was replaced.
    ///
    /// The new fingerprint is only recorded once the reopen succeeds, so a
    /// failed reopen is retried on the next call.
    fn refresh_if_changed(&mut self) -> PadResult<()> {
        let current = self.db.fingerprint()?;
        if self.cache.is_stale(current) {
            info!("Reopening {}", self.db.path().display());
            self.db = DbConnection::open(&self.db_config)?;
        }
        self.cache.validate(current);
        Ok(())
    }
}
