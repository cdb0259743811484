use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::agent::{
    generate_sql_query, render_schema, run_query_workflow, GenerationOutcome, WorkflowOutcome,
};
use common::db::QueryResults;
use common::llm::GeminiClient;
use common::schema::{inspect, is_valid_database};
use common::session::SessionContext;
use common::tracing::init_tracing;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sqlgen")]
#[command(about = "turn natural language questions into SQLite queries", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema of a SQLite database
    Schema {
        /// Database file path
        db: PathBuf,

        /// Emit the schema as JSON instead of the text rendering
        #[arg(long)]
        json: bool,
    },

    /// Generate a SQL query from a question, then run it
    Ask {
        /// Database file path
        db: PathBuf,

        /// The question, in natural language
        question: String,

        /// Generation mode: "safe" includes the schema in the prompt,
        /// "fast" omits it
        #[arg(long, default_value = "safe", env = "SQLGEN_MODE")]
        mode: String,

        /// Print the generated query without validating or executing it
        #[arg(long)]
        no_execute: bool,

        /// Write the result set to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let _guard = init_tracing("sqlgen")?;

        match self.command {
            Commands::Schema { db, json } => show_schema(db, json),
            Commands::Ask {
                db,
                question,
                mode,
                no_execute,
                csv,
            } => ask(db, question, mode, no_execute, csv).await,
        }
    }
}

fn show_schema(db: PathBuf, json: bool) -> Result<()> {
    if !is_valid_database(&db) {
        bail!("{} is not a valid SQLite database", db.display());
    }

    let schema = inspect(&db)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&schema)?);
    } else {
        print!("{}", render_schema(&schema));
    }
    Ok(())
}

async fn ask(
    db: PathBuf,
    question: String,
    mode: String,
    no_execute: bool,
    csv: Option<PathBuf>,
) -> Result<()> {
    // credential check happens before any prompt is built
    let client = GeminiClient::from_env()?;

    if !is_valid_database(&db) {
        bail!("{} is not a valid SQLite database", db.display());
    }

    let mut session = SessionContext::new();
    session.mode = mode.parse()?;
    session.load_database(&db)?;

    tracing::info!(
        "asking in {} mode: {}",
        session.mode.as_str(),
        question
    );

    let schema = session.schema_for_generation().cloned();

    if no_execute {
        return match generate_sql_query(&client, &question, schema.as_ref()).await {
            GenerationOutcome::Query(query) => {
                session.record_query(&question, &query);
                println!("{}", query);
                emit_session_log(&session);
                Ok(())
            }
            GenerationOutcome::Rejected { message, .. } => bail!("{}", message),
            GenerationOutcome::Failure(message) => bail!("{}", message),
        };
    }

    match run_query_workflow(&client, &db, &question, schema.as_ref()).await {
        WorkflowOutcome::Rows {
            query,
            corrected,
            results,
        } => {
            session.record_query(&question, &query);
            if corrected {
                eprintln!("query corrected automatically:");
            }
            println!("{}\n", query);

            if results.columns.is_empty() {
                println!("(statement executed, no result rows)");
            } else {
                print!("{}", render_table(&results));
                println!("\n{} rows", results.rows.len());
            }

            if let Some(csv_path) = csv {
                std::fs::write(&csv_path, results.to_csv())?;
                eprintln!("results written to {}", csv_path.display());
            }
            emit_session_log(&session);
            Ok(())
        }
        WorkflowOutcome::Rejected { message, .. } => bail!("{}", message),
        WorkflowOutcome::GenerationFailed(message) => bail!("{}", message),
        WorkflowOutcome::ExecutionFailed { query, error } => {
            session.record_query(&question, &query);
            emit_session_log(&session);
            bail!("Error executing query: {}", error)
        }
    }
}

/// One line per (question, generated query) pair recorded this session.
fn session_log(session: &SessionContext) -> Vec<String> {
    session
        .history()
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{}. {} -> {}", i + 1, entry.question, entry.query))
        .collect()
}

fn emit_session_log(session: &SessionContext) {
    for line in session_log(session) {
        tracing::info!("session log: {}", line);
    }
}

/// Width-aligned text table: header, separator, then one line per row.
fn render_table(results: &QueryResults) -> String {
    let mut widths: Vec<usize> = results.columns.iter().map(|c| c.len()).collect();
    let rendered_rows: Vec<Vec<String>> = results
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect();

    for row in &rendered_rows {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = results
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
        .collect();
    out.push_str(header.join(" | ").trim_end());
    out.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&separator.join("-+-"));
    out.push('\n');

    for row in &rendered_rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        out.push_str(line.join(" | ").trim_end());
        out.push('\n');
    }

    out
}
