use anyhow::Result;
use clap::CommandFactory;

use crate::{
    cli::{Cli, handlers},
    core::config_loader::Config,
};

/// A top-level action, its aliases and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &Config) -> Result<()>,
}

/// The single source of truth for all top-level actions.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "init",
        aliases: &[],
        handler: handlers::init::handle,
    },
    CommandDefinition {
        name: "project",
        aliases: &["p"],
        handler: handlers::project::handle,
    },
    CommandDefinition {
        name: "command",
        aliases: &["c"],
        handler: handlers::command::handle,
    },
    CommandDefinition {
        name: "variable",
        aliases: &["v"],
        handler: handlers::variable::handle,
    },
    CommandDefinition {
        name: "domain-alias",
        aliases: &["da"],
        handler: handlers::domain_alias::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &[],
        handler: handlers::run::handle,
    },
];

impl std::fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl PartialEq for CommandDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for CommandDefinition {}

fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Where a command line goes.
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Help,
    Action(&'static CommandDefinition, Vec<String>),
    /// `spinup <project> [commands...]`
    RunShortcut(Vec<String>),
}

fn route(all_args: &[String]) -> Route {
    let Some((first, rest)) = all_args.split_first() else {
        return Route::Help;
    };
    match find_command(first) {
        Some(command) => Route::Action(command, rest.to_vec()),
        None => Route::RunShortcut(all_args.to_vec()),
    }
}

/// Runs the action named by the first argument, or the run shortcut.
pub fn dispatch(all_args: Vec<String>, config: &Config) -> Result<()> {
    log::debug!("Dispatching args: {:?}", all_args);

    match route(&all_args) {
        Route::Help => {
            Cli::command().print_help()?;
            Ok(())
        }
        Route::Action(command, args) => (command.handler)(args, config),
        Route::RunShortcut(args) => handlers::run::handle_shortcut(args, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_aliases_resolve_to_actions() {
        assert_eq!(find_command("p").map(|c| c.name), Some("project"));
        assert_eq!(find_command("da").map(|c| c.name), Some("domain-alias"));
        assert_eq!(find_command("command").map(|c| c.name), Some("command"));
        assert!(find_command("my-app").is_none());
    }

    fn action(name: &str, rest: &[&str]) -> Route {
        Route::Action(find_command(name).unwrap(), args(rest))
    }

    #[test]
    fn test_route() {
        assert_eq!(route(&[]), Route::Help);
        assert_eq!(
            route(&args(&["v", "ls", "app"])),
            action("variable", &["ls", "app"])
        );
        assert_eq!(route(&args(&["run", "app"])), action("run", &["app"]));
        assert_eq!(
            route(&args(&["app", "serve"])),
            Route::RunShortcut(args(&["app", "serve"]))
        );
    }
}
