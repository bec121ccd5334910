// src/bin/spinup.rs

//! The `spinup` command-line tool.

use anyhow::Result;
use clap::Parser;
use colored::*;
use spinup::{
    cli::{Cli, dispatcher},
    core::config_loader::Config,
};

/// Sets up logging, loads the configuration, dispatches, and reports any
/// error in one place.
fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);
    let config = Config::load()?;
    dispatcher::dispatch(cli.args, &config)
}
