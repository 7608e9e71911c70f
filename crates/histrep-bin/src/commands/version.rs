// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use histrep_core::HistorianRegistry;

use crate::cli::Cli;
use crate::error::BinResult;

/// Executes the `version` command to display version information.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("histrep - historian data replicator");
    println!();
    println!("Version Information:");
    println!("  histrep-bin:    {}", env!("CARGO_PKG_VERSION"));
    println!("  histrep-core:   {}", histrep_core::VERSION);
    println!("  histrep-config: {}", histrep_config::VERSION);
    println!();
    println!("Build Information:");
    println!("  Target:   {}", std::env::consts::ARCH);
    println!("  OS:       {}", std::env::consts::OS);
    println!("  Backends: {}", HistorianRegistry::with_defaults().supported_backends().join(", "));
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
