// src/cli/handlers/variable.rs

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::commons;
use crate::{
    cli::output,
    core::{config_loader::Config, outcome::Outcome},
};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "variable")]
struct VariableArgs {
    #[command(subcommand)]
    action: VariableAction,
}

#[derive(Subcommand, Debug)]
enum VariableAction {
    #[command(visible_alias = "ls")]
    List { project: String },
    /// Add a variable usable as `{{name}}` in the project's commands.
    Add {
        project: String,
        name: String,
        value: String,
    },
    #[command(visible_alias = "rm")]
    Remove { project: String, name: String },
}

/// Parses and runs the `variable` action.
pub fn handle(args: Vec<String>, config: &Config) -> Result<()> {
    let variable_args = VariableArgs::try_parse_from(&args)?;
    let sync = commons::open(config)?;

    match variable_args.action {
        VariableAction::List { project } => {
            let project = sync.get_project(&project)?;
            if project.variables.is_empty() {
                return output::report(Outcome::info(format!(
                    "Project '{}' has no variables.",
                    project.name
                )));
            }
            let rows: Vec<Vec<String>> = project
                .variables
                .into_iter()
                .map(|v| vec![v.name, v.value])
                .collect();
            println!("{}", output::table(&["Name", "Value"], &rows));
            Ok(())
        }
        VariableAction::Add {
            project,
            name,
            value,
        } => output::report(sync.add_variable(&project, &name, &value)),
        VariableAction::Remove { project, name } => {
            output::report(sync.remove_variable(&project, &name))
        }
    }
}
