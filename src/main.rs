//! # Accounting Projects CLI
//!
//! This is the binary entry point for the `acc-projects` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments and environment using `clap`.
//! - Executing the selected action against the selected clients.
//! - Logging any error before exiting with status 1.
//!
//! The provisioning logic lives in the `acc_projects` library; the binary is
//! a thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
