//! Command-line interface of the `spinup` binary.

use clap::Parser;

/// Routes the first argument to an action handler.
pub mod dispatcher;
/// One handler per top-level action.
pub mod handlers;
/// Colored outcomes, tables and JSON listings.
pub mod output;

const HELP_TEMPLATE: &str = "\
<title>spinup</title> {version}
Local domains, an nginx proxy and concurrent commands for every project.

<title>USAGE</title>
  <cmd>spinup</cmd> <hl><project></hl> [commands...]        Run a project (shortcut for <cmd>run</cmd>)
  <cmd>spinup</cmd> <group><action></group> [args...]

<title>ACTIONS</title>
  <group>init</group>                              Prepare the hosts file and proxy directory
  <group>project</group>, <group>p</group>        <dim>ls | add | rm | edit | rename | add-command | remove-command | set-dir | get-dir</dim>
  <group>command</group>, <group>c</group>        <dim>ls | add | rm | edit | rename</dim>
  <group>variable</group>, <group>v</group>       <dim>ls | add | rm</dim>
  <group>domain-alias</group>, <group>da</group>  <dim>ls | add | rm</dim>
  <group>run</group> <hl><project></hl> [commands...]     Run all (or the named) commands until Ctrl-C

Run <cmd>spinup</cmd> <group><action></group> <cmd>--help</cmd> for the arguments of an action.
Set <hl>RUST_LOG=debug</hl> for diagnostics.
";

/// Builds the colored help text once per process.
fn build_help_string() -> &'static str {
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();
    let style = |code: &'static str| if use_colors { code } else { "" };

    let title = style("\x1b[1;33m");
    let hl = style("\x1b[1;36m");
    let cmd = style("\x1b[36m");
    let group = style("\x1b[1;32m");
    let dim = style("\x1b[2m");
    let reset = style("\x1b[0m");

    let formatted = HELP_TEMPLATE
        .replace("<title>", title)
        .replace("</title>", reset)
        .replace("<hl>", hl)
        .replace("</hl>", reset)
        .replace("<cmd>", cmd)
        .replace("</cmd>", reset)
        .replace("<group>", group)
        .replace("</group>", reset)
        .replace("<dim>", dim)
        .replace("</dim>", reset);

    Box::leak(formatted.into_boxed_str())
}

/// spinup: local development environments with real domains.
///
/// Only collects the raw arguments; [`dispatcher::dispatch`] routes them.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// Everything after the program name; routed by the dispatcher.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
