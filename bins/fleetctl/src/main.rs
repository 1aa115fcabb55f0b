// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! fleetctl
//!
//! Command-line front end for the fleet tire tracker. Every invocation runs the
//! schema guard and account bootstrap before its command, then prints JSON.

use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(io::stderr)
        .init();

    let output = app::run(cli)?;
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output)?;
    writeln!(stdout)?;
    Ok(())
}
