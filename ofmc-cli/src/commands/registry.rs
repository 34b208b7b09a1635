//! Inspect the link registry of a vault.

use anyhow::{Context, Result};
use ofmc_core::{vault_notes, Config, LinkRegistry};
use std::path::Path;

/// Build the registry for every note in the vault and print it
pub fn show_registry(config_path: &Path, json: bool) -> Result<()> {
    let config = Config::from_file(config_path).context("Failed to load configuration")?;
    config
        .existing_vault_dir()
        .context("Invalid configuration")?;

    let notes = vault_notes(&config);
    let registry = LinkRegistry::build(&notes);

    if json {
        println!("{}", registry.to_json()?);
    } else {
        for (key, label) in registry.iter() {
            println!("{:<50} {}", key, label);
        }
        println!("{} targets in {} notes", registry.len(), notes.len());
    }

    Ok(())
}
