//! Multi-step SQL agent.
//!
//! Unlike [`TextToSqlChain`](super::TextToSqlChain), the agent sees the result
//! of each query it writes. It may run several queries, correct failed ones,
//! and finishes with a plain-language answer.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::chain::{extract_sql, QUERY_MARKER, RESULT_MARKER};
use super::CompletionBackend;
use crate::error::{PadError, PadResult};
use crate::pipeline::QueryOutcome;
use crate::sql::format_results_as_table;

pub const DEFAULT_AGENT_STEPS: usize = 5;

const ANSWER_MARKER: &str = "Final Answer:";

/// Earlier messages beyond this many are left out of the prompt
const MAX_HISTORY_MESSAGES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

/// One message of the conversation the agent is continuing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A query the agent ran and what it saw back
#[derive(Debug)]
pub struct AgentStep {
    pub sql: String,
    pub outcome: PadResult<Arc<QueryOutcome>>,
}

impl AgentStep {
    /// Text shown to the model after `SQLResult:`
    fn observation(&self) -> String {
        match &self.outcome {
            Ok(outcome) => format_results_as_table(outcome.result()),
            Err(e) => format!("Error: {}", e),
        }
    }
}

#[derive(Debug)]
pub struct AgentAnswer {
    pub answer: String,
    pub steps: Vec<AgentStep>,
}

impl AgentAnswer {
    /// Result of the last query that succeeded
    pub fn last_outcome(&self) -> Option<&Arc<QueryOutcome>> {
        self.steps.iter().rev().find_map(|step| step.outcome.as_ref().ok())
    }
}

enum Reply {
    Query(String),
    Answer(String),
}

pub struct SqlAgent {
    backend: Arc<dyn CompletionBackend>,
    table_info: String,
    top_k: usize,
    max_steps: usize,
}

impl SqlAgent {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        table_info: impl Into<String>,
        top_k: usize,
        max_steps: usize,
    ) -> Self {
        Self {
            backend,
            table_info: table_info.into(),
            top_k,
            max_steps,
        }
    }

    /// Prompt for the next model call: instructions, schema, the recent
    /// conversation, the question and every query run so far with its result.
    pub fn prompt(&self, question: &str, history: &[ChatMessage], steps: &[AgentStep]) -> String {
        let mut prompt = format!(
            "You are an agent answering questions about a DuckDB database.\n\
             To look something up, reply with one DuckDB query after \"{query}\" and stop. \
             Its result will be shown to you after \"{result}\".\n\
             If a query fails, the error is shown as its result; fix the query and try again.\n\
             Unless the question asks for a specific number of results, limit each query to at most {top_k} rows.\n\
             When the question asks where something is, or asks for shapes or a map, include the geometry column.\n\
             Once you can answer, reply with \"{answer}\" followed by the answer in plain language.\n\
             \n\
             Only use the following tables:\n\
             {table_info}\n",
            query = QUERY_MARKER,
            result = RESULT_MARKER,
            answer = ANSWER_MARKER,
            top_k = self.top_k,
            table_info = self.table_info,
        );

        let recent = &history[history.len().saturating_sub(MAX_HISTORY_MESSAGES)..];
        if !recent.is_empty() {
            prompt.push_str("\nConversation so far:\n");
            for message in recent {
                prompt.push_str(&format!("{}: {}\n", message.role, message.content.trim()));
            }
        }

        prompt.push_str(&format!("\nQuestion: {}\n", question.trim()));
        for step in steps {
            prompt.push_str(&format!(
                "{} {}\n{} {}\n",
                QUERY_MARKER,
                step.sql,
                RESULT_MARKER,
                step.observation()
            ));
        }
        prompt
    }

    /// Answer `question`, running each query the model writes through `execute`.
    ///
    /// Failed queries are shown to the model so it can correct them. Running
    /// out of steps before an answer is a generation error.
    pub async fn run<F>(&self, question: &str, history: &[ChatMessage], mut execute: F) -> PadResult<AgentAnswer>
    where
        F: FnMut(&str) -> PadResult<Arc<QueryOutcome>>,
    {
        info!("Agent answering with {} (max {} steps)", self.backend.model_name(), self.max_steps);
        let mut steps: Vec<AgentStep> = Vec::new();

        for step in 0..=self.max_steps {
            let reply = self
                .backend
                .complete(&self.prompt(question, history, &steps), &["\nSQLResult:"])
                .await?;
            debug!("Agent reply {}: {}", step + 1, reply);

            match parse_reply(&reply)? {
                Reply::Answer(answer) => return Ok(AgentAnswer { answer, steps }),
                Reply::Query(_) if step == self.max_steps => break,
                Reply::Query(sql) => {
                    let outcome = execute(&sql);
                    if let Err(e) = &outcome {
                        warn!("Agent query failed ({}): {}", e.kind(), e);
                    }
                    steps.push(AgentStep { sql, outcome });
                }
            }
        }

        Err(PadError::generation_error(format!(
            "agent gave no answer after {} queries",
            self.max_steps
        )))
    }
}

fn parse_reply(reply: &str) -> PadResult<Reply> {
    if let Some(idx) = reply.find(ANSWER_MARKER) {
        let answer = reply[idx + ANSWER_MARKER.len()..].trim();
        if answer.is_empty() {
            return Err(PadError::generation_error("agent gave an empty answer"));
        }
        return Ok(Reply::Answer(answer.to_string()));
    }
    extract_sql(reply).map(Reply::Query).ok_or_else(|| {
        PadError::generation_error(format!(
            "agent reply had neither a query nor an answer: {:?}",
            reply.trim()
        ))
    })
}
