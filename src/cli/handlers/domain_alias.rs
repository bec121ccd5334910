// src/cli/handlers/domain_alias.rs

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::commons;
use crate::{
    cli::output,
    core::{config_loader::Config, outcome::Outcome},
};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "domain-alias")]
struct DomainAliasArgs {
    #[command(subcommand)]
    action: DomainAliasAction,
}

#[derive(Subcommand, Debug)]
enum DomainAliasAction {
    #[command(visible_alias = "ls")]
    List { project: String },
    /// Serve the project on an extra hostname.
    Add { project: String, alias: String },
    #[command(visible_alias = "rm")]
    Remove { project: String, alias: String },
}

/// Parses and runs the `domain-alias` action.
pub fn handle(args: Vec<String>, config: &Config) -> Result<()> {
    match DomainAliasArgs::try_parse_from(&args)?.action {
        DomainAliasAction::List { project } => {
            let project = commons::open(config)?.get_project(&project)?;
            if project.domain_aliases.is_empty() {
                return output::report(Outcome::info(format!(
                    "Project '{}' has no domain aliases.",
                    project.name
                )));
            }
            for alias in project.domain_aliases {
                println!("{}", alias.value);
            }
            Ok(())
        }
        DomainAliasAction::Add { project, alias } => {
            output::report(commons::open_privileged(config)?.add_domain_alias(&project, &alias))
        }
        DomainAliasAction::Remove { project, alias } => {
            output::report(commons::open_privileged(config)?.remove_domain_alias(&project, &alias))
        }
    }
}
