use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use padchat::commands::{answer_agent, answer_question, answer_sql, list_models, run_chat};
use padchat::core::{default_config_path, PadConfig, Session, SessionConfig};
use padchat::integrations::ollama;
use padchat::llm::ModelRegistry;
use padchat::pipeline::QueryPipeline;
use padchat::render::Presenter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to <config dir>/padchat/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// DuckDB database file to query
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Model label to generate SQL with
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Maximum rows shown and mapped per query
    #[arg(short = 'n', long, global = true)]
    row_limit: Option<usize>,

    /// Print geometry results as GeoJSON instead of writing the map page
    #[arg(long, global = true)]
    geojson: bool,

    /// Where to write the map page
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about the protected areas
    Ask {
        /// The question text
        #[arg(required = true)]
        question: Vec<String>,
    },

    /// Answer a question with the agent, which may run several queries
    Agent {
        /// The question text
        #[arg(required = true)]
        question: Vec<String>,

        /// Most queries the agent may run
        #[arg(long)]
        max_steps: Option<usize>,
    },

    /// Run a SQL query directly
    Sql {
        /// The SQL query
        query: String,
    },

    /// Ask questions interactively
    Chat,

    /// List the available models
    Models {
        /// Ask the local Ollama server which models are pulled
        #[arg(long)]
        check: bool,
    },

    /// Print the schema description given to the model
    Schema,

    /// Print the effective configuration
    Config {
        /// Write it to the config file instead
        #[arg(long)]
        init: bool,
    },
}

impl Cli {
    /// Command-line flags take precedence over the config file
    fn apply(&self, config: &mut PadConfig) {
        if let Some(database) = &self.database {
            config.database.path = database.clone();
        }
        if let Some(model) = &self.model {
            config.llm.default_model = model.clone();
        }
        if let Some(row_limit) = self.row_limit {
            config.query.row_limit = row_limit;
        }
        if let Some(output) = &self.output {
            config.map.output = output.clone();
        }
    }
}

async fn run_cli(cli: Cli) -> Result<()> {
    let mut config = PadConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate().context("Invalid settings")?;

    let presenter = Presenter::new(&config.map, cli.geojson);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Commands::Ask { question } => {
            let mut session = Session::open(&config)?;
            let session_config = SessionConfig::from_config(&config);
            answer_question(&mut session, &session_config, &presenter, &question.join(" "), &mut out)
                .await?;
        }

        Commands::Agent { question, max_steps } => {
            let steps = max_steps.unwrap_or(config.query.agent_max_steps);
            if steps == 0 {
                bail!("--max-steps must be at least 1");
            }
            let mut session = Session::open(&config)?.with_agent_steps(steps);
            let session_config = SessionConfig::from_config(&config);
            answer_agent(&mut session, &session_config, &presenter, &question.join(" "), &mut out)
                .await?;
        }

        Commands::Sql { query } => {
            let mut session = Session::open(&config)?;
            let session_config = SessionConfig::from_config(&config);
            answer_sql(&mut session, &session_config, &presenter, query, &mut out)?;
        }

        Commands::Chat => {
            let mut session = Session::open(&config)?;
            let mut session_config = SessionConfig::from_config(&config);
            let stdin = io::stdin();
            run_chat(&mut session, &mut session_config, &presenter, stdin.lock(), &mut out).await?;
        }

        Commands::Models { check } => {
            let registry = ModelRegistry::with_overrides(&config.llm.models);
            let available = if *check {
                match ollama::list_local_models(&config.llm.ollama_url).await {
                    Ok(names) => Some(names),
                    Err(e) => {
                        warn!("{}", e);
                        None
                    }
                }
            } else {
                None
            };
            list_models(
                &registry,
                Some(config.llm.default_model.as_str()),
                available.as_deref(),
                &mut out,
            )?;
        }

        Commands::Schema => {
            let pipeline = QueryPipeline::open(&config.database, 0)?;
            writeln!(out, "{}", pipeline.describe_schema(config.query.sample_rows)?)?;
        }

        Commands::Config { init } => {
            if *init {
                let path = match cli.config.clone().or_else(default_config_path) {
                    Some(path) => path,
                    None => bail!("No config directory on this platform; pass --config"),
                };
                if path.exists() {
                    bail!("{} already exists", path.display());
                }
                config.save(&path)?;
                writeln!(out, "Wrote {}", path.display())?;
            } else {
                write!(out, "{}", config.to_toml()?)?;
            }
        }
    }

    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up OPENAI_API_KEY and RUST_LOG from a local .env
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    padchat::init_with_logger(io::stderr().is_terminal(), cli.verbose)?;
    info!("Starting padchat v{} on {}", padchat::version(), std::env::consts::OS);

    run_cli(cli).await
}
