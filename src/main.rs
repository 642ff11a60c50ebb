//! Symphony - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use symphony::audit::{AuditSink, JsonlAuditLog};
use symphony::catalogue::CapabilityCatalogue;
use symphony::cli::{Args, Commands, Verbosity};
use symphony::config::{Config, LoggingConfig};
use symphony::learning::{LearningEngine, StrategyLedger};
use symphony::llm::OllamaGenerator;
use symphony::orchestrator::{OrchestrationState, SolveResult, Symphony};
use symphony::types::{Task, TaskPriority, TaskStatus};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.clone()).context("Failed to load configuration")?;
    args.apply_overrides(&mut config);

    init_logging(&config.logging, args.verbosity())?;

    match &args.command {
        Commands::Solve {
            objective,
            priority,
            context,
            json,
        } => solve(config, objective, *priority, context, *json).await,
        Commands::Suggest { objective, priority } => suggest(&config, objective, *priority),
        Commands::Report { task_id, save } => report(&config, task_id, *save),
        Commands::Catalogue => catalogue(&config),
        Commands::Config => show_config(&config),
    }
}

/// Initialize tracing subscriber; RUST_LOG wins over configuration
fn init_logging(logging: &LoggingConfig, verbosity: Verbosity) -> Result<()> {
    let level = verbosity.filter_directive(&logging.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

async fn solve(
    config: Config,
    objective: &str,
    priority: TaskPriority,
    context: &[(String, serde_json::Value)],
    json: bool,
) -> Result<()> {
    let backend = OllamaGenerator::from_config(&config).context("Failed to create text backend")?;
    if !backend.health_check().await {
        warn!(
            url = %backend.base_url(),
            model = %backend.model(),
            "text backend is not reachable, decomposition will likely fail"
        );
    }
    let engine = Symphony::from_config(config, Arc::new(backend))
        .context("Failed to initialize orchestrator")?;

    let task = context
        .iter()
        .fold(Task::new(objective).with_priority(priority), |task, (key, value)| {
            task.with_context(key.clone(), value.clone())
        });
    let task_id = task.id.clone();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling subtasks that have not started");
            on_interrupt.cancel();
        }
    });

    info!(task_id = %task_id, "solving objective");
    let result = engine
        .solve(task, cancel)
        .await
        .with_context(|| format!("Failed to decompose task {}", task_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &SolveResult) {
    let summary = &result.summary;
    let state = match result.state {
        OrchestrationState::Done => result.state.to_string().green().bold(),
        _ => result.state.to_string().yellow().bold(),
    };

    println!("{} {}", "Task".bold(), result.task.id);
    println!("  {} {}", "Status:".bold(), state);
    println!(
        "  {} {} total, {} completed, {} failed, {} cancelled ({}ms)",
        "Subtasks:".bold(),
        summary.total,
        summary.completed.to_string().green(),
        summary.failed.to_string().red(),
        summary.cancelled,
        result.duration_ms
    );
    println!();

    for (i, entry) in summary.results.iter().enumerate() {
        let marker = match entry.status {
            TaskStatus::Completed => "✓".green(),
            TaskStatus::Cancelled => "-".yellow(),
            _ => "✗".red(),
        };
        let capabilities = entry
            .capabilities
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "[]".to_string());
        println!("{} {}. {} {}", marker, i + 1, entry.description, capabilities.dimmed());

        match (&entry.result, &entry.error) {
            (_, Some(error)) => println!("     {}", error.red()),
            (Some(value), None) => println!("     {}", render_result(value)),
            (None, None) => {}
        }
    }

    for warning in &summary.warnings {
        println!("{}: {}", "Warning".yellow(), warning);
    }

    if let Some(optimization) = &result.optimization {
        println!(
            "\n{} generation {} best {} (improvement {:+.3})",
            "Evolution:".bold(),
            optimization.generation,
            optimization.best_capabilities,
            optimization.improvement
        );
    }
}

/// Generated text is shown as-is, anything else as compact JSON
fn render_result(value: &serde_json::Value) -> String {
    let text = value
        .get("content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string());
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default().to_string();
    if lines.next().is_some() {
        format!("{} ...", first)
    } else {
        first
    }
}

fn suggest(config: &Config, objective: &str, priority: TaskPriority) -> Result<()> {
    let catalogue = Arc::new(CapabilityCatalogue::from_config(&config.catalogue)?);
    let engine = LearningEngine::new(
        config.learning.clone(),
        catalogue,
        Arc::new(StrategyLedger::new()),
    );

    let task = Task::new(objective).with_priority(priority);
    let action = engine.recommend(&task);
    println!(
        "{} {} (state {})",
        "Suggested:".bold(),
        action.to_string().green(),
        symphony::planning::state_key(&task)
    );
    Ok(())
}

fn report(config: &Config, task_id: &str, save: bool) -> Result<()> {
    let log = JsonlAuditLog::new(config.audit_dir()).context("Failed to open audit log")?;

    let report = if save {
        let (report, path) = log.save_report(task_id)?;
        eprintln!("{} {}", "Saved:".green(), path.display());
        report
    } else {
        log.report(task_id)?
    };

    if report.timeline.is_empty() {
        eprintln!("{}: no audit records for task {}", "Warning".yellow(), task_id);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn catalogue(config: &Config) -> Result<()> {
    let catalogue = CapabilityCatalogue::from_config(&config.catalogue)?;

    println!("{} v{}", "Capability catalogue".bold(), catalogue.version());
    println!("\n{}", "Capabilities:".bold());
    for capability in catalogue.capabilities() {
        let marker = if catalogue.default_set().contains(capability) {
            " (default)".dimmed().to_string()
        } else {
            String::new()
        };
        println!("  {}{}", capability, marker);
    }

    println!("\n{}", "Actions:".bold());
    for (i, action) in catalogue.actions().iter().enumerate() {
        println!("  {}. {}", i + 1, action);
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let path = Config::default_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<no home directory>".to_string());
    println!("{} {}", "Default location:".bold(), path);
    println!();
    println!("{}", toml::to_string_pretty(config).context("Failed to render configuration")?);
    Ok(())
}
