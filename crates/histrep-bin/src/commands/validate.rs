// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use std::path::{Path, PathBuf};

use histrep_config::{load_config, load_points, HistrepConfig};
use histrep_core::{DataCollectionMode, HistorianRegistry};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// The result of validating a configuration and its points file.
#[derive(Debug)]
pub struct ValidationReport {
    /// Configuration file that was validated.
    pub config_path: PathBuf,
    /// Parsed configuration.
    pub config: HistrepConfig,
    /// Number of distinct point names.
    pub point_count: usize,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
}

/// Loads and checks the configuration at `config_path`.
pub fn validate_config(config_path: &Path) -> BinResult<ValidationReport> {
    if !config_path.exists() {
        return Err(BinError::config(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = load_config(config_path)?;
    let points = load_points(&config.points.file)?;

    let registry = HistorianRegistry::with_defaults();
    for (endpoint, backend) in [
        ("source", &config.source.backend),
        ("destination", &config.destination.backend),
    ] {
        if !registry.supports(backend) {
            return Err(BinError::config(format!(
                "Unknown {} backend '{}' (supported: {})",
                endpoint,
                backend,
                registry.supported_backends().join(", ")
            )));
        }
    }

    let mut warnings: Vec<String> = Vec::new();

    if config.mode == DataCollectionMode::Realtime
        && (config.historical.start.is_some() || config.historical.end.is_some())
    {
        warnings.push("historical.start/end are ignored in realtime mode".to_string());
    }

    if config.source.server.trim() == config.destination.server.trim()
        && config.source.backend == config.destination.backend
    {
        warnings.push(format!(
            "Source and destination are the same server: {}",
            config.source.server.trim()
        ));
    }

    if config.points.allow_create {
        warnings.push("Missing destination points will be created".to_string());
    }

    if let Ok(metadata) = std::fs::metadata(&config.dead_letter.path) {
        if metadata.len() > 0 {
            warnings.push(format!(
                "Dead-letter file already holds {} bytes: {}",
                metadata.len(),
                config.dead_letter.path.display()
            ));
        }
    }

    Ok(ValidationReport {
        config_path: config_path.to_path_buf(),
        config,
        point_count: points.len(),
        warnings,
    })
}

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let report = validate_config(&cli.config)?;
    let config = &report.config;
    let warnings = &report.warnings;

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", report.config_path.display());
            println!();
            println!("Summary:");
            println!("  Mode: {}", config.mode);
            println!("  Source: {} ({})", config.source.server, config.source.backend);
            println!(
                "  Destination: {} ({})",
                config.destination.server, config.destination.backend
            );
            println!("  Points: {} ({})", report.point_count, config.points.file.display());
            println!(
                "  Send period: {} ms ({})",
                config.dispatch.send_period_ms, config.dispatch.tick_policy
            );
            match config.mode {
                DataCollectionMode::Realtime => println!(
                    "  Read period: {} ms, max {} events per pump",
                    config.realtime.read_period_ms, config.realtime.max_events_per_pump
                ),
                DataCollectionMode::Historical => {
                    if let Ok(Some(window)) = config.window() {
                        println!("  Recovery window: {}", window);
                    }
                }
            }
            println!("  Dead-letter file: {}", config.dead_letter.path.display());

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", to_pretty_json(config)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": report.config_path.display().to_string(),
                "summary": {
                    "mode": config.mode,
                    "source_server": config.source.server,
                    "destination_server": config.destination.server,
                    "point_count": report.point_count,
                    "send_period_ms": config.dispatch.send_period_ms,
                    "dead_letter_path": config.dead_letter.path.display().to_string(),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(config) } else { None },
            });
            println!("{}", to_pretty_json(&output)?);
        }
        OutputFormat::Yaml => {
            println!("valid: true");
            println!("config_path: {}", report.config_path.display());
            println!("mode: {}", config.mode);
            println!("source_server: {}", config.source.server);
            println!("destination_server: {}", config.destination.server);
            println!("point_count: {}", report.point_count);
            if !warnings.is_empty() {
                println!("warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::config(format!(
            "Strict mode: {} warning(s) found",
            warnings.len()
        )));
    }

    Ok(())
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> BinResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| BinError::runtime(format!("Failed to serialize output: {}", e)))
}
