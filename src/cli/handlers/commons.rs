// src/cli/handlers/commons.rs

// Shared helpers for the handlers.

use anyhow::Result;
use dialoguer::{Confirm, theme::ColorfulTheme};

use crate::core::{config_loader::Config, synchronizer::Synchronizer};

/// Opens the synchronizer for read-only work or database-only changes.
pub fn open(config: &Config) -> Result<Synchronizer> {
    Ok(Synchronizer::open(config.clone())?)
}

/// Opens the synchronizer for an action that writes the hosts file or the
/// proxy config directory. Fails early when those cannot be written.
pub fn open_privileged(config: &Config) -> Result<Synchronizer> {
    let sync = open(config)?;
    sync.require_privileges()?;
    Ok(sync)
}

/// Asks a yes/no question, defaulting to no.
pub fn confirm(prompt: &str) -> Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
