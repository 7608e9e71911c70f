// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Executes the `run` command to start replicating.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let runtime = RuntimeBuilder::new()
        .config_path(&cli.config)
        .exit_when_done(args.exit_when_done)
        .build()?;

    let report = runtime.run().await?;

    if let Some(stats) = &report.dispatch {
        info!(
            written = stats.written,
            failed = stats.failed,
            dead_lettered = stats.dead_lettered,
            "Replication finished"
        );
    }
    if !cli.quiet {
        if let Some(recovery) = &report.recovery {
            println!(
                "Recovered {} item(s): {} range(s) succeeded, {} failed",
                recovery.items(),
                recovery.succeeded(),
                recovery.failed()
            );
        }
    }

    Ok(())
}
