use std::io::{BufRead, Write};
use tracing::{debug, info};

use super::query::{answer_agent, answer_question, answer_sql, list_models};
use crate::core::session::{Session, SessionConfig};
use crate::error::PadResult;
use crate::render::Presenter;

const PROMPT: &str = "padchat> ";

/// One line of chat input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Ask(String),
    Sql(String),
    Agent(String),
    Reset,
    Model(String),
    Models,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Parse a chat line. Anything not starting with `/` is a question.
pub fn parse_line(line: &str) -> ChatCommand {
    let line = line.trim();
    if line.is_empty() {
        return ChatCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatCommand::Ask(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match (name, arg.is_empty()) {
        ("sql", false) => ChatCommand::Sql(arg.to_string()),
        ("agent", false) => ChatCommand::Agent(arg.to_string()),
        ("reset", _) => ChatCommand::Reset,
        ("model", false) => ChatCommand::Model(arg.to_string()),
        ("models", _) => ChatCommand::Models,
        ("help", _) => ChatCommand::Help,
        ("quit" | "exit", _) => ChatCommand::Quit,
        _ => ChatCommand::Unknown(line.to_string()),
    }
}

const HELP: &str = "\
Type a question to have it answered from the database.
  /sql <query>     run SQL directly
  /agent <q>       answer with the agent, which may run several queries
  /reset           forget the agent conversation
  /model <label>   switch model
  /models          list models
  /quit            leave";

/// Interactive loop. A failed turn prints its error as the response and the
/// loop carries on; only a failure to write the response ends it.
pub async fn run_chat<R: BufRead, W: Write>(
    session: &mut Session,
    config: &mut SessionConfig,
    presenter: &Presenter,
    input: R,
    out: &mut W,
) -> PadResult<()> {
    info!("Starting chat with model {}", config.model);
    writeln!(out, "Using model {}. /help for commands.", config.model)?;

    let mut lines = input.lines();
    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        let line = line?;
        debug!("Chat input: {}", line);

        match parse_line(&line) {
            ChatCommand::Empty => {}
            ChatCommand::Quit => break,
            ChatCommand::Help => writeln!(out, "{}", HELP)?,
            ChatCommand::Models => list_models(session.registry(), Some(config.model.as_str()), None, out)?,
            ChatCommand::Model(label) => match session.select_model(&label) {
                Ok(_) => {
                    config.model = label;
                    writeln!(out, "Now using {}", config.model)?;
                }
                Err(e) => presenter.present_error(out, &e)?,
            },
            ChatCommand::Sql(sql) => {
                if let Err(e) = answer_sql(session, config, presenter, &sql, out) {
                    presenter.present_error(out, &e)?;
                }
            }
            ChatCommand::Agent(question) => {
                if let Err(e) = answer_agent(session, config, presenter, &question, out).await {
                    presenter.present_error(out, &e)?;
                }
            }
            ChatCommand::Reset => {
                session.reset_history();
                writeln!(out, "Conversation cleared")?;
            }
            ChatCommand::Ask(question) => {
                if let Err(e) = answer_question(session, config, presenter, &question, out).await {
                    presenter.present_error(out, &e)?;
                }
            }
            ChatCommand::Unknown(text) => {
                writeln!(out, "Unknown command: {}. /help for commands.", text)?;
            }
        }
    }

    info!("Chat ended");
    Ok(())
}
