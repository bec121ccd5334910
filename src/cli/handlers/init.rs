// src/cli/handlers/init.rs

use anyhow::Result;
use clap::Parser;

use super::commons;
use crate::{cli::output, core::config_loader::Config};

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, name = "init")]
struct InitArgs {}

/// Creates the config and proxy directories and the managed hosts section.
pub fn handle(args: Vec<String>, config: &Config) -> Result<()> {
    InitArgs::try_parse_from(&args)?;
    let sync = commons::open_privileged(config)?;
    output::report(sync.init())
}
