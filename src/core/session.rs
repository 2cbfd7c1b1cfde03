use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::PadConfig;
use crate::error::{PadError, PadResult};
use crate::integrations::{BackendFactory, OpenAIBackendFactory};
use crate::llm::{AgentAnswer, ChatMessage, ModelRegistry, SqlAgent, TextToSqlChain, DEFAULT_AGENT_STEPS};
use crate::pipeline::{QueryOutcome, QueryPipeline};

/// Per-call selection: which model answers and how many rows come back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub model: String,
    pub row_limit: usize,
}

impl SessionConfig {
    pub fn from_config(config: &PadConfig) -> Self {
        Self {
            model: config.llm.default_model.clone(),
            row_limit: config.query.row_limit,
        }
    }
}

/// One question answered: the generated SQL and what running it produced.
///
/// Execution or decode failures are kept here rather than returned as an
/// error so the caller can still show the SQL that failed.
#[derive(Debug)]
pub struct Turn {
    pub question: String,
    pub sql: String,
    pub outcome: PadResult<Arc<QueryOutcome>>,
}

/// A chat session over one database
pub struct Session {
    pipeline: QueryPipeline,
    registry: ModelRegistry,
    factory: Box<dyn BackendFactory>,
    /// Schema description captured once at startup
    table_info: String,
    top_k: usize,
    /// Label and chain of the model currently in use
    active: Option<(String, TextToSqlChain)>,
    /// Agent questions and answers so far
    history: Vec<ChatMessage>,
    max_steps: usize,
}

impl Session {
    pub fn new(
        pipeline: QueryPipeline,
        registry: ModelRegistry,
        factory: Box<dyn BackendFactory>,
        sample_rows: usize,
        top_k: usize,
    ) -> PadResult<Self> {
        let table_info = pipeline.describe_schema(sample_rows)?;
        Ok(Self {
            pipeline,
            registry,
            factory,
            table_info,
            top_k,
            active: None,
            history: Vec::new(),
            max_steps: DEFAULT_AGENT_STEPS,
        })
    }

    /// Cap the number of queries the agent may run per question
    pub fn with_agent_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Open the configured database and model registry
    pub fn open(config: &PadConfig) -> PadResult<Self> {
        let pipeline = QueryPipeline::open(&config.database, config.query.cache_capacity)?;
        let registry = ModelRegistry::with_overrides(&config.llm.models);
        registry.select(&config.llm.default_model)?;

        let session = Self::new(
            pipeline,
            registry,
            Box::new(OpenAIBackendFactory::new(config.llm.clone())),
            config.query.sample_rows,
            config.query.top_k,
        )?;
        Ok(session.with_agent_steps(config.query.agent_max_steps))
    }

    /// Make `label` the active model, rebuilding the chain only when it changes
    pub fn select_model(&mut self, label: &str) -> PadResult<&TextToSqlChain> {
        let current = self.active.as_ref().map(|(l, _)| l.as_str());
        if current != Some(label) {
            let backend = self.registry.select(label)?;
            let completion = self.factory.connect(backend)?;
            info!("Switched model to {} ({})", label, backend.model);
            let chain = TextToSqlChain::new(completion, self.table_info.clone(), self.top_k);
            self.active = Some((label.to_string(), chain));
        }

        match &self.active {
            Some((_, chain)) => Ok(chain),
            None => Err(PadError::config_error("no model selected")),
        }
    }

    pub fn active_model(&self) -> Option<&str> {
        self.active.as_ref().map(|(label, _)| label.as_str())
    }

    /// Translate `question` to SQL with the configured model and run it.
    ///
    /// Generation failures are returned as errors; execution and decode
    /// failures are reported inside the [`Turn`].
    pub async fn ask(&mut self, question: &str, config: &SessionConfig) -> PadResult<Turn> {
        let sql = {
            let chain = self.select_model(&config.model)?;
            chain.invoke(question).await?
        };

        let outcome = self.pipeline.run_query(&sql, config.row_limit);
        if let Err(e) = &outcome {
            warn!("Generated SQL failed ({}): {}", e.kind(), e);
        }

        Ok(Turn {
            question: question.to_string(),
            sql,
            outcome,
        })
    }

    /// Answer `question` with the multi-step agent, continuing the
    /// conversation kept in this session. Only answered questions are
    /// added to the history.
    pub async fn agent(&mut self, question: &str, config: &SessionConfig) -> PadResult<AgentAnswer> {
        let backend = self.select_model(&config.model)?.backend();
        let agent = SqlAgent::new(backend, self.table_info.clone(), self.top_k, self.max_steps);

        let pipeline = &mut self.pipeline;
        let answer = agent
            .run(question, &self.history, |sql| pipeline.run_query(sql, config.row_limit))
            .await?;

        self.history.push(ChatMessage::user(question.trim()));
        self.history.push(ChatMessage::assistant(answer.answer.clone()));
        Ok(answer)
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Forget the agent conversation
    pub fn reset_history(&mut self) {
        info!("Clearing {} history message(s)", self.history.len());
        self.history.clear();
    }

    /// Run SQL typed by the user
    pub fn run_sql(&mut self, sql: &str, config: &SessionConfig) -> PadResult<Arc<QueryOutcome>> {
        self.pipeline.run_query(sql.trim(), config.row_limit)
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn table_info(&self) -> &str {
        &self.table_info
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::llm::{CompletionBackend, ModelBackend};
    use std::sync::Mutex;

    /// Factory handing out scripted backends, counting how often it was asked
    pub struct ScriptedFactory {
        replies: Vec<String>,
        pub connects: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedFactory {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().map(|r| r.to_string()).collect(),
                connects: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl BackendFactory for ScriptedFactory {
        fn connect(&self, backend: &ModelBackend) -> PadResult<Arc<dyn CompletionBackend>> {
            self.connects.lock().unwrap().push(backend.model.clone());
            let replies: Vec<&str> = self.replies.iter().map(|s| s.as_str()).collect();
            Ok(Arc::new(ScriptedBackend::new(&backend.model, &replies)))
        }
    }
}
