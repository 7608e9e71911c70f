// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! histrep - historian data replicator
//!
//! Main binary entry point.

use histrep_bin::cli::Cli;
use histrep_bin::commands;
use histrep_bin::error::report_error_and_exit;
use histrep_bin::logging::init_logging;
use histrep_config::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // The logging section is read before the command runs; errors surface later.
    let logging = ConfigLoader::new()
        .load(&cli.config)
        .ok()
        .map(|config| config.logging);

    let level = cli.effective_log_level(logging.map(|l| l.level));
    let format = cli.effective_log_format(logging.map(|l| l.format));
    if let Err(e) = init_logging(&level, format) {
        eprintln!("warning: {}", e);
    }

    if let Err(e) = commands::execute(cli).await {
        report_error_and_exit(e);
    }
}
