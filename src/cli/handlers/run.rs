// src/cli/handlers/run.rs

use anyhow::{Result, anyhow};
use clap::Parser;

use super::commons;
use crate::{
    cli::output,
    core::{
        config_loader::Config,
        runner::{RunError, Runner},
    },
};

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, name = "run")]
struct RunArgs {
    /// The project to run.
    project: String,
    /// Run only these of the project's commands.
    commands: Vec<String>,
}

/// `spinup run <project> [commands...]`
pub fn handle(args: Vec<String>, config: &Config) -> Result<()> {
    let run_args = RunArgs::try_parse_from(&args)?;
    run(&run_args, config)
}

/// `spinup <project> [commands...]`: like `run`, with a hint when the first
/// word is neither an action nor a project.
pub fn handle_shortcut(args: Vec<String>, config: &Config) -> Result<()> {
    let run_args = RunArgs::try_parse_from(&args)?;
    run(&run_args, config).map_err(|e| match e.downcast_ref::<RunError>() {
        Some(RunError::ProjectNotFound(name)) => anyhow!(
            "Unknown action or project '{}'. Expected 'init', 'project|p', 'command|c', 'variable|v', 'domain-alias|da', 'run' or a project name.",
            name
        ),
        _ => e,
    })
}

fn run(run_args: &RunArgs, config: &Config) -> Result<()> {
    let sync = commons::open(config)?;
    let report = Runner::stdio().run_project(sync.repository(), &run_args.project, &run_args.commands)?;
    output::report(report.outcome())
}
