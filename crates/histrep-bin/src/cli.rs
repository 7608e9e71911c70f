// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start replication (default)
//! - `validate`: Validate configuration and points file
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// histrep - historian data replicator
///
/// Copies time-series data from a source historian to a destination
/// historian, either as it arrives or by backfilling a past window.
#[derive(Parser, Debug)]
#[command(
    name = "histrep",
    author = "Sylvex <contact@sylvex.io>",
    version = histrep_core::VERSION,
    about = "Historian data replicator",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "histrep.yaml",
        env = "HISTREP_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the config file's level
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json, compact); defaults to the config file's format
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the histrep CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start replicating
    ///
    /// This is the default command when no subcommand is specified.
    /// Runs until SIGINT or SIGTERM.
    Run(RunArgs),

    /// Validate the configuration and points file
    ///
    /// Parses and validates both files without contacting any historian.
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Exit once historical recovery has finished instead of waiting for a signal
    #[arg(long)]
    pub exit_when_done: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Strict mode: treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<histrep_config::LogFormat> for LogFormat {
    fn from(format: histrep_config::LogFormat) -> Self {
        match format {
            histrep_config::LogFormat::Pretty => LogFormat::Text,
            histrep_config::LogFormat::Compact => LogFormat::Compact,
            histrep_config::LogFormat::Json => LogFormat::Json,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
    /// YAML format
    Yaml,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Check if verbose logging is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Get the effective log level.
    ///
    /// `-q` and `-v` win over `-l`, which wins over `configured`.
    pub fn effective_log_level(&self, configured: Option<histrep_config::LogLevel>) -> String {
        if self.quiet {
            "warn".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else if let Some(level) = &self.log_level {
            level.clone()
        } else {
            configured.unwrap_or_default().as_str().to_string()
        }
    }

    /// Get the effective log format; `--log-format` wins over `configured`.
    pub fn effective_log_format(&self, configured: Option<histrep_config::LogFormat>) -> LogFormat {
        self.log_format
            .or_else(|| configured.map(LogFormat::from))
            .unwrap_or_default()
    }
}

impl Default for ValidateArgs {
    fn default() -> Self {
        Self {
            show_config: false,
            format: OutputFormat::Text,
            strict: false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
