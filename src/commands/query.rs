use std::io::Write;
use tracing::debug;

use crate::core::session::{Session, SessionConfig};
use crate::error::PadResult;
use crate::integrations::ollama;
use crate::llm::{BackendKind, ModelRegistry};
use crate::render::Presenter;

/// Answer a natural-language question: show the generated SQL, then its result
pub async fn answer_question<W: Write>(
    session: &mut Session,
    config: &SessionConfig,
    presenter: &Presenter,
    question: &str,
    out: &mut W,
) -> PadResult<()> {
    let turn = session.ask(question, config).await?;
    presenter.present_sql(out, &turn.sql)?;
    let outcome = turn.outcome?;
    presenter.present(out, &outcome)
}

/// Answer with the multi-step agent: each query it ran, the last result
/// that succeeded, then its answer
pub async fn answer_agent<W: Write>(
    session: &mut Session,
    config: &SessionConfig,
    presenter: &Presenter,
    question: &str,
    out: &mut W,
) -> PadResult<()> {
    let answer = session.agent(question, config).await?;
    for step in &answer.steps {
        presenter.present_sql(out, &step.sql)?;
        if let Err(e) = &step.outcome {
            presenter.present_error(out, e)?;
        }
    }
    if let Some(outcome) = answer.last_outcome() {
        presenter.present(out, outcome)?;
    }
    writeln!(out, "Answer: {}", answer.answer)?;
    Ok(())
}

/// Run SQL given directly by the user
pub fn answer_sql<W: Write>(
    session: &mut Session,
    config: &SessionConfig,
    presenter: &Presenter,
    sql: &str,
    out: &mut W,
) -> PadResult<()> {
    debug!("Running user SQL: {}", sql);
    let outcome = session.run_sql(sql, config)?;
    presenter.present(out, &outcome)
}

/// List the registry. `active` is starred; with `available` (the models
/// pulled into Ollama) local entries are marked as present or missing.
pub fn list_models<W: Write>(
    registry: &ModelRegistry,
    active: Option<&str>,
    available: Option<&[String]>,
    out: &mut W,
) -> PadResult<()> {
    let width = registry.entries().iter().map(|e| e.label.len()).max().unwrap_or(0);

    for entry in registry.entries() {
        let marker = if active == Some(entry.label.as_str()) { "*" } else { " " };
        let kind = match entry.backend.kind {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        };
        let status = match (entry.backend.kind, available) {
            (BackendKind::Local, Some(names)) if ollama::is_pulled(&entry.backend.model, names) => " (pulled)",
            (BackendKind::Local, Some(_)) => " (not pulled)",
            _ => "",
        };
        writeln!(
            out,
            "{} {:width$}  {:6}  {}{}",
            marker,
            entry.label,
            kind,
            entry.backend.model,
            status,
            width = width
        )?;
    }
    Ok(())
}
