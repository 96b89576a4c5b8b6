//! ---
//! ctl_section: "07-binary"
//! ctl_subsection: "binary"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Binary entrypoint for the controller test harness."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ctl_common::config::AppConfig;
use ctl_common::logging::init_tracing;
use ctl_common::OutboundClient;
use ctl_facade::{spawn_stub, FacadeStub, Question, QuestionType};
use ctl_harness::{render_json, render_table, Harness, Selection, TestOutcome};
use serde_json::{json, Value};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Controller conformance test harness",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "URL", env = "CTL_FACADE_URL", help = "Override the testing facade URL")]
    facade_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the controller test suite")]
    Run {
        #[arg(long, default_value = "all", help = "`all` or a comma-separated list of procedures")]
        tests: Selection,
        #[arg(long, help = "Print results as JSON instead of a table")]
        json: bool,
    },
    #[command(about = "Serve a stub testing facade on the configured facade URL")]
    Facade {
        #[arg(long, help = "Answer action questions without prompting")]
        auto_action: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(url) = cli.facade_url {
        config.facade.url = url;
        config.facade.validate()?;
    }
    init_tracing("ctl-testd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("configuration defaults in use"),
    }

    match cli.command.unwrap_or(Commands::Run {
        tests: Selection::All,
        json: false,
    }) {
        Commands::Run { tests, json } => run_suite(config, tests, json).await,
        Commands::Facade { auto_action } => run_facade(config, auto_action).await,
    }
}

async fn run_suite(config: AppConfig, selection: Selection, json: bool) -> Result<()> {
    let harness = Harness::start(&config).await?;
    let finished = harness.run_until(&selection, signal::ctrl_c()).await;
    let suite = harness.suite().name().to_owned();
    harness.shutdown().await?;

    let Some(results) = finished else {
        warn!("ctrl-c received; run abandoned");
        return Ok(());
    };
    let results = results?;
    if json {
        println!("{}", serde_json::to_string_pretty(&render_json(&suite, &results))?);
    } else {
        println!("{}", render_table(&results));
    }
    let failed = results
        .iter()
        .filter(|result| result.outcome == TestOutcome::Fail)
        .count();
    info!(procedures = results.len(), failed, "suite finished");
    Ok(())
}

async fn run_facade(config: AppConfig, auto_action: bool) -> Result<()> {
    let http = OutboundClient::new(config.facade.request_timeout, config.facade.max_redirects)
        .context("failed to build outbound HTTP client")?;
    let stub = Arc::new(FacadeStub::new(http));
    let path = config.facade.path();
    let server = spawn_stub(config.facade.stub_listen, &path, stub.clone()).await?;
    info!(address = %server.local_addr(), path = %path, "stub facade waiting for questions");

    loop {
        let question = tokio::select! {
            question = stub.next_question(Duration::from_secs(3600)) => question,
            _ = signal::ctrl_c() => break,
        };
        let Some(question) = question else { continue };
        let response = if auto_action && question.kind == QuestionType::Action {
            json!("")
        } else {
            prompt(&question).await?
        };
        if let Err(err) = stub.answer(&question, response).await {
            warn!(question = %question.question_id, error = %err, "failed to deliver answer");
        }
    }

    info!("ctrl-c received; shutting down");
    server.shutdown().await
}

/// Show `question` on the terminal and read the operator's answer.
async fn prompt(question: &Question) -> Result<Value> {
    println!("\n[{}] {}\n{}", question.kind, question.question_id, question.question);
    for option in &question.answers {
        let text = option.answer_str.as_deref().unwrap_or(&option.label);
        println!("  {}: {}", option.answer_id, text);
    }
    match question.kind {
        QuestionType::Action => println!("Press enter to continue"),
        QuestionType::Radio => println!("Enter one answer id"),
        QuestionType::Checkbox => println!("Enter answer ids separated by commas"),
    }

    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await
    .context("stdin reader panicked")?
    .context("failed to read answer from stdin")?;
    let line = line.trim();

    Ok(match question.kind {
        QuestionType::Action => json!(""),
        QuestionType::Radio => json!(line),
        QuestionType::Checkbox => json!(line
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect::<Vec<_>>()),
    })
}
