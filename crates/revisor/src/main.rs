mod api;
mod config;
mod serve;
mod service;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use revisor_agent::{create_agent, AgentType};
use revisor_core::{FinalAnswer, RevisionError, RevisionRequest, RevisionResult};
use revisor_logging::{LogFormat, Logger, ResultsLog};

use crate::config::ProjectConfig;
use crate::service::RevisionService;

#[derive(Parser, Debug)]
#[command(
    name = "revisor",
    about = "Multi-reviewer revision of customer answers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ./revisor.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Generation backend for every role
    #[arg(short, long, value_enum, global = true)]
    agent: Option<AgentChoice>,

    /// Model to use (if the backend supports it)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Tracing filter when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Also write tracing output and revision events (JSON) to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Results log (CSV) path
    #[arg(long, global = true)]
    results: Option<PathBuf>,

    /// Do not write the results log
    #[arg(long, global = true)]
    no_results: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the revision HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Revise request(s) read from a JSON file or stdin
    Revise {
        /// Input file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
        /// Input is a JSON array of requests
        #[arg(long)]
        batch: bool,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the configured backend is available
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AgentChoice {
    Claude,
    Opencode,
    Cursor,
    Openai,
}

impl From<AgentChoice> for AgentType {
    fn from(choice: AgentChoice) -> Self {
        match choice {
            AgentChoice::Claude => AgentType::ClaudeCode,
            AgentChoice::Opencode => AgentType::OpenCode,
            AgentChoice::Cursor => AgentType::Cursor,
            AgentChoice::Openai => AgentType::OpenAi,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_format: LogFormat = cli.log_format.into();
    let _guard = revisor_logging::init_tracing(
        &cli.log_level,
        log_format,
        cli.log_file.as_deref(),
    );

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".bright_red().bold(), e);
            // Revision failures exit 1; config and usage problems exit 2
            match e.downcast_ref::<RevisionError>() {
                Some(RevisionError::ConfigError(_)) | None => ExitCode::from(2),
                Some(_) => ExitCode::from(1),
            }
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let working_dir = std::env::current_dir().context("Failed to get current directory")?;

    let project_config = match cli.config {
        Some(ref path) => ProjectConfig::load_from(path)?,
        None => ProjectConfig::load(&working_dir)?.unwrap_or_default(),
    };

    // CLI > config file > default
    let agent_type: AgentType = match cli.agent {
        Some(choice) => choice.into(),
        None => match project_config.agent.as_deref() {
            Some(name) => name.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            None => AgentType::OpenAi,
        },
    };

    let agent = create_agent(agent_type, &project_config.backend_options());

    if let Command::Check = cli.command {
        return check(agent.as_ref()).await;
    }

    if !agent.is_available().await {
        anyhow::bail!(
            "Agent '{}' is not available. Make sure it's installed and in PATH, or that its API key is set.",
            agent.name()
        );
    }

    let settings = project_config.revision_settings(cli.model.clone(), working_dir.clone())?;

    let log_format: LogFormat = cli.log_format.into();
    let logger = match cli.log_file {
        Some(ref path) => Logger::with_file(log_format, &events_path(path))
            .with_context(|| format!("Failed to open {}", path.display()))?,
        None => Logger::new(log_format),
    };

    let results = if cli.no_results {
        None
    } else {
        let path = project_config.results_path(cli.results.clone())?;
        let log = ResultsLog::open(&path)
            .with_context(|| format!("Failed to open results log {}", path.display()))?;
        Some(log)
    };

    let service = Arc::new(RevisionService::new(
        agent,
        settings,
        Arc::new(logger),
        results,
    ));

    match cli.command {
        Command::Serve { host, port } => {
            let host = project_config.host(host);
            let port = project_config.port(port);
            serve::run(&host, port, service).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Revise { input, batch, json } => {
            let raw = read_input(&input)?;
            let results = if batch {
                let requests: Vec<RevisionRequest> =
                    serde_json::from_str(&raw).context("Failed to parse request batch")?;
                service.process_batch(&requests).await?
            } else {
                let request: RevisionRequest =
                    serde_json::from_str(&raw).context("Failed to parse request")?;
                vec![service.process(&request).await?]
            };

            if json {
                print_json(&results, batch)?;
            } else {
                for result in &results {
                    print_result(result);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => Ok(ExitCode::SUCCESS),
    }
}

async fn check(agent: &dyn revisor_agent::Agent) -> Result<ExitCode> {
    if agent.is_available().await {
        println!("{} {} is available", "✓".bright_green(), agent.name());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} {} is not available", "✗".bright_red(), agent.name());
        Ok(ExitCode::from(1))
    }
}

/// Revision events go next to the tracing log, with a `.events.jsonl` suffix
fn events_path(log_file: &Path) -> PathBuf {
    log_file.with_extension("events.jsonl")
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))
    }
}

fn print_json(results: &[RevisionResult], batch: bool) -> Result<()> {
    let json = if batch {
        serde_json::json!({
            "responses": results.iter().map(|r| &r.response).collect::<Vec<_>>()
        })
    } else {
        serde_json::json!({ "response": results.first().map(|r| &r.response) })
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_result(result: &RevisionResult) {
    let score = |s: Option<u8>| s.map_or("-".to_string(), |s| format!("{}/10", s));

    eprintln!();
    match result.answer {
        FinalAnswer::Original(_) => eprintln!("{}", "=== ORIGINAL ANSWER KEPT ===".bright_green().bold()),
        FinalAnswer::Revised(_) => eprintln!("{}", "=== REVISED ===".bright_green().bold()),
        FinalAnswer::DoNotAnswer => eprintln!("{}", "=== DO NOT ANSWER ===".bright_yellow().bold()),
    }
    eprintln!("Request: {}", result.audit.request_id);
    eprintln!("Original score: {}", score(result.response.previous_score));
    eprintln!("New score: {}", score(result.response.new_score));
    eprintln!("Revisions: {}", result.audit.revisions);
    if let Some(tokens) = result.audit.token_usage {
        eprintln!("Tokens: {}", tokens);
    }
    if !result.audit.decision.is_empty() {
        eprintln!("Decision: {}", result.audit.decision);
    }
    if !result.audit.justification.is_empty() {
        eprintln!("Justification: {}", result.audit.justification);
    }
    if let Some(ref answer) = result.response.final_answer {
        println!("{}", answer);
    }
}
