//! Command-line argument parsing for Symphony
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use crate::config::Config;
use crate::types::TaskPriority;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Symphony - adaptive task orchestration over local models
#[derive(Parser, Debug)]
#[command(name = "symphony")]
#[command(version)]
#[command(about = "Decompose objectives, orchestrate capability executors and learn from outcomes", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.symphony/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the text-generation model
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Override the text-generation host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Override the text-generation port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decompose and execute an objective
    Solve {
        /// Objective to work on
        #[arg(value_name = "OBJECTIVE")]
        objective: String,

        /// Task priority (low, medium, high, critical)
        #[arg(short, long, default_value = "medium", value_parser = parse_priority)]
        priority: TaskPriority,

        /// Context entries as key=value; values are parsed as JSON when possible
        #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_context)]
        context: Vec<(String, serde_json::Value)>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the capability set value learning would pick for an objective
    Suggest {
        #[arg(value_name = "OBJECTIVE")]
        objective: String,

        #[arg(short, long, default_value = "medium", value_parser = parse_priority)]
        priority: TaskPriority,
    },

    /// Print the transparency report of a task
    Report {
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        /// Also write the report file next to the audit logs
        #[arg(long)]
        save: bool,
    },

    /// List catalogue capabilities and actions
    Catalogue,

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Apply command-line overrides on top of loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(host) = &self.host {
            config.llm.host = host.clone();
        }
        if let Some(port) = self.port {
            config.llm.port = port;
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

impl Verbosity {
    /// Log filter directive; `configured` applies at normal verbosity
    pub fn filter_directive<'a>(&self, configured: &'a str) -> &'a str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => configured,
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }
}

fn parse_priority(value: &str) -> Result<TaskPriority, String> {
    value.parse().map_err(|e: crate::errors::SymphonyError| e.to_string())
}

fn parse_context(value: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", value))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("context key must not be empty".to_string());
    }
    let parsed = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), parsed))
}
