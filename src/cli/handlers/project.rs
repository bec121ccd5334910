// src/cli/handlers/project.rs

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{Input, MultiSelect, theme::ColorfulTheme};
use std::path::PathBuf;

use super::commons;
use crate::{
    cli::output,
    core::{config_loader::Config, outcome::Outcome, synchronizer::Synchronizer},
};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "project")]
struct ProjectArgs {
    #[command(subcommand)]
    action: ProjectAction,
}

#[derive(Subcommand, Debug)]
enum ProjectAction {
    /// List every project.
    #[command(visible_alias = "ls")]
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show one project with its commands, variables and aliases.
    Show {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Add a project. Asks interactively when no name is given.
    Add {
        name: Option<String>,
        port: Option<u16>,
        /// Names of existing commands to attach.
        commands: Vec<String>,
    },
    /// Remove a project with its proxy config and hosts entries.
    #[command(visible_alias = "rm")]
    Remove {
        name: String,
        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },
    /// Change the port and replace the command set.
    #[command(visible_alias = "e")]
    Edit {
        name: String,
        port: u16,
        commands: Vec<String>,
    },
    #[command(visible_alias = "mv")]
    Rename { old: String, new: String },
    #[command(visible_alias = "ac")]
    AddCommand { project: String, command: String },
    #[command(visible_alias = "rc")]
    RemoveCommand { project: String, command: String },
    /// Set the working directory; defaults to the current directory.
    #[command(visible_alias = "sd")]
    SetDir { project: String, dir: Option<PathBuf> },
    #[command(visible_alias = "gd")]
    GetDir { project: String },
}

/// Parses and runs the `project` action.
pub fn handle(args: Vec<String>, config: &Config) -> Result<()> {
    let project_args = ProjectArgs::try_parse_from(&args)?;

    match project_args.action {
        ProjectAction::List { json } => list(&commons::open(config)?, json),
        ProjectAction::Show { name, json } => show(&commons::open(config)?, &name, json),
        ProjectAction::Add {
            name,
            port,
            commands,
        } => {
            let sync = commons::open_privileged(config)?;
            let (name, port, commands) = match (name, port) {
                (Some(name), Some(port)) => (name, port, commands),
                (None, None) => ask_new_project(&sync)?,
                _ => {
                    return Err(anyhow!(
                        "Usage: spinup project add <name> <port> [commands...]"
                    ));
                }
            };
            output::report(sync.add_project(&name, port, &commands))
        }
        ProjectAction::Remove { name, yes } => {
            let sync = commons::open_privileged(config)?;
            let prompt = format!(
                "Remove project '{}' with its proxy config and hosts entries?",
                name
            );
            if !yes && !commons::confirm(&prompt)? {
                return output::report(Outcome::info("Operation cancelled."));
            }
            output::report(sync.remove_project(&name))
        }
        ProjectAction::Edit {
            name,
            port,
            commands,
        } => output::report(commons::open_privileged(config)?.update_project(&name, port, &commands)),
        ProjectAction::Rename { old, new } => {
            output::report(commons::open_privileged(config)?.rename_project(&old, &new))
        }
        ProjectAction::AddCommand { project, command } => {
            output::report(commons::open(config)?.add_command_to_project(&project, &command))
        }
        ProjectAction::RemoveCommand { project, command } => output::report(
            commons::open(config)?.remove_command_from_project(&project, &command),
        ),
        ProjectAction::SetDir { project, dir } => {
            output::report(commons::open(config)?.set_project_dir(&project, dir.as_deref()))
        }
        ProjectAction::GetDir { project } => {
            let dir = commons::open(config)?.get_project_dir(&project)?;
            println!("{}", dir.display());
            Ok(())
        }
    }
}

fn list(sync: &Synchronizer, json: bool) -> Result<()> {
    let projects = sync.list_projects()?;
    if json {
        return output::print_json(&projects);
    }
    if projects.is_empty() {
        return output::report(Outcome::info("No projects yet. Add one with 'spinup project add'."));
    }

    let rows: Vec<Vec<String>> = projects
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                p.domain.clone(),
                p.port.to_string(),
                p.command_names().join(", "),
            ]
        })
        .collect();
    println!("{}", output::table(&["Name", "Domain", "Port", "Commands"], &rows));
    Ok(())
}

fn show(sync: &Synchronizer, name: &str, json: bool) -> Result<()> {
    let project = sync.get_project(name)?;
    if json {
        return output::print_json(&project);
    }

    println!("{}", project.name.bold());
    println!("  domain:   http://{}", project.domain.cyan());
    println!("  port:     {}", project.port);
    match &project.dir {
        Some(dir) => println!("  dir:      {}", dir.display()),
        None => println!("  dir:      {}", "(not set)".dimmed()),
    }
    if !project.domain_aliases.is_empty() {
        let aliases: Vec<&str> = project.domain_aliases.iter().map(|a| a.value.as_str()).collect();
        println!("  aliases:  {}", aliases.join(", "));
    }
    for command in &project.commands {
        println!("  {} {}", format!("[{}]", command.name).green(), command.command);
    }
    for variable in &project.variables {
        println!("  {} = {}", variable.name.yellow(), variable.value);
    }
    Ok(())
}

fn ask_new_project(sync: &Synchronizer) -> Result<(String, u16, Vec<String>)> {
    let theme = ColorfulTheme::default();
    let name: String = Input::with_theme(&theme)
        .with_prompt("Project name")
        .interact_text()?;
    let port: u16 = Input::with_theme(&theme).with_prompt("Port").interact_text()?;

    let available: Vec<String> = sync.list_commands()?.into_iter().map(|c| c.name).collect();
    let commands = if available.is_empty() {
        Vec::new()
    } else {
        MultiSelect::with_theme(&theme)
            .with_prompt("Commands (space to toggle)")
            .items(&available)
            .interact()?
            .into_iter()
            .filter_map(|i| available.get(i).cloned())
            .collect()
    };
    Ok((name, port, commands))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &[&str]) -> ProjectAction {
        ProjectArgs::try_parse_from(line).unwrap().action
    }

    #[test]
    fn test_aliases_parse() {
        assert!(matches!(parse(&["ls", "--json"]), ProjectAction::List { json: true }));
        assert!(matches!(
            parse(&["rm", "app", "-y"]),
            ProjectAction::Remove { yes: true, .. }
        ));
        assert!(matches!(parse(&["gd", "app"]), ProjectAction::GetDir { .. }));
        assert!(matches!(
            parse(&["sd", "app"]),
            ProjectAction::SetDir { dir: None, .. }
        ));
    }

    #[test]
    fn test_add_takes_commands_after_port() {
        match parse(&["add", "app", "8080", "serve", "worker"]) {
            ProjectAction::Add {
                name,
                port,
                commands,
            } => {
                assert_eq!(name.as_deref(), Some("app"));
                assert_eq!(port, Some(8080));
                assert_eq!(commands, vec!["serve", "worker"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_port_must_be_a_number() {
        assert!(ProjectArgs::try_parse_from(["edit", "app", "http"]).is_err());
        assert!(ProjectArgs::try_parse_from(["edit", "app", "70000"]).is_err());
    }
}
