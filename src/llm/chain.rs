use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

use super::CompletionBackend;
use crate::error::{PadError, PadResult};

const DIALECT: &str = "DuckDB";

/// Marker after which the model writes its query
pub(crate) const QUERY_MARKER: &str = "SQLQuery:";
/// Marker where a model would start hallucinating results
pub(crate) const RESULT_MARKER: &str = "SQLResult:";

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid regex"));

/// Turns natural-language questions into SQL for one database.
///
/// The schema description is captured at construction; the model never
/// touches the database itself.
pub struct TextToSqlChain {
    backend: Arc<dyn CompletionBackend>,
    table_info: String,
    top_k: usize,
}

impl TextToSqlChain {
    pub fn new(backend: Arc<dyn CompletionBackend>, table_info: impl Into<String>, top_k: usize) -> Self {
        Self {
            backend,
            table_info: table_info.into(),
            top_k,
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn backend(&self) -> Arc<dyn CompletionBackend> {
        Arc::clone(&self.backend)
    }

    /// Prompt sent to the model for `question`
    pub fn prompt(&self, question: &str) -> String {
        format!(
            "You are a {dialect} expert. Given an input question, write one syntactically correct {dialect} query that answers it.\n\
             Unless the question asks for a specific number of results, limit the query to at most {top_k} rows using LIMIT. \
             Order the results by a relevant column when that makes the answer more useful.\n\
             Select only the columns needed to answer the question, never every column of a table. \
             Use only the tables and columns listed below.\n\
             When the question asks where something is, or asks for shapes or a map, include the geometry column in the SELECT list.\n\
             Reply with the query after \"{marker}\" and nothing else.\n\
             \n\
             Only use the following tables:\n\
             {table_info}\n\
             \n\
             Question: {question}\n\
             {marker} ",
            dialect = DIALECT,
            top_k = self.top_k,
            marker = QUERY_MARKER,
            table_info = self.table_info,
            question = question.trim(),
        )
    }

    /// Ask the model for SQL answering `question`.
    ///
    /// The returned text is untrusted; it has only been cleaned up, never validated.
    pub async fn invoke(&self, question: &str) -> PadResult<String> {
        info!("Generating SQL with {}", self.backend.model_name());
        let reply = self
            .backend
            .complete(&self.prompt(question), &["\nSQLResult:"])
            .await?;
        debug!("Model reply: {}", reply);

        extract_sql(&reply).ok_or_else(|| {
            PadError::generation_error(format!(
                "model reply did not contain a query: {:?}",
                reply.trim()
            ))
        })
    }
}

/// Pull the SQL statement out of a model reply
pub fn extract_sql(reply: &str) -> Option<String> {
    let body = match FENCED_BLOCK.captures(reply) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => {
            let after_marker = reply
                .find(QUERY_MARKER)
                .map_or(reply, |idx| &reply[idx + QUERY_MARKER.len()..]);
            after_marker
                .find(RESULT_MARKER)
                .map_or(after_marker, |idx| &after_marker[..idx])
        }
    };

    let sql = body.trim().trim_end_matches(';').trim_end();
    if sql.is_empty() {
        None
    } else {
        Some(sql.to_string())
    }
}
