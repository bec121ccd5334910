// src/cli/handlers/command.rs

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use dialoguer::{Input, theme::ColorfulTheme};

use super::commons;
use crate::{
    cli::output,
    core::{config_loader::Config, outcome::Outcome},
};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "command")]
struct CommandArgs {
    #[command(subcommand)]
    action: CommandAction,
}

#[derive(Subcommand, Debug)]
enum CommandAction {
    /// List the command catalogue.
    #[command(visible_alias = "ls")]
    List {
        #[arg(long)]
        json: bool,
    },
    /// Add a command. `{{port}}`, `{{domain}}` and project variables are
    /// substituted when a project runs it.
    Add {
        name: Option<String>,
        template: Option<String>,
    },
    /// Remove a command and detach it from every project.
    #[command(visible_alias = "rm")]
    Remove {
        name: String,
        #[arg(long, short)]
        yes: bool,
    },
    #[command(visible_alias = "e")]
    Edit { name: String, template: String },
    #[command(visible_alias = "mv")]
    Rename { old: String, new: String },
}

/// Parses and runs the `command` action.
pub fn handle(args: Vec<String>, config: &Config) -> Result<()> {
    let command_args = CommandArgs::try_parse_from(&args)?;
    let sync = commons::open(config)?;

    match command_args.action {
        CommandAction::List { json } => {
            let commands = sync.list_commands()?;
            if json {
                return output::print_json(&commands);
            }
            if commands.is_empty() {
                return output::report(Outcome::info(
                    "No commands yet. Add one with 'spinup command add'.",
                ));
            }
            let rows: Vec<Vec<String>> = commands
                .into_iter()
                .map(|c| vec![c.name, c.command])
                .collect();
            println!("{}", output::table(&["Name", "Command"], &rows));
            Ok(())
        }
        CommandAction::Add { name, template } => {
            let (name, template) = match (name, template) {
                (Some(name), Some(template)) => (name, template),
                (None, None) => {
                    let theme = ColorfulTheme::default();
                    let name: String = Input::with_theme(&theme)
                        .with_prompt("Command name")
                        .interact_text()?;
                    let template: String = Input::with_theme(&theme)
                        .with_prompt("Command")
                        .interact_text()?;
                    (name, template)
                }
                _ => return Err(anyhow!("Usage: spinup command add <name> <command>")),
            };
            output::report(sync.add_command(&name, &template))
        }
        CommandAction::Remove { name, yes } => {
            let prompt = format!("Remove command '{}' from the catalogue and all projects?", name);
            if !yes && !commons::confirm(&prompt)? {
                return output::report(Outcome::info("Operation cancelled."));
            }
            output::report(sync.remove_command(&name))
        }
        CommandAction::Edit { name, template } => output::report(sync.edit_command(&name, &template)),
        CommandAction::Rename { old, new } => output::report(sync.rename_command(&old, &new)),
    }
}
