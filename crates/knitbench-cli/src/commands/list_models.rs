//! The `knitbench list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use knitbench_providers::config::load_config_from;
use knitbench_providers::create_provider;

pub fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut found_any = false;

    for (name, provider_config) in &config.providers {
        if provider_filter.as_ref().is_some_and(|f| f != name) {
            continue;
        }

        let provider = create_provider(provider_config)?;
        let models = provider.available_models();

        if !models.is_empty() {
            found_any = true;
            println!("Provider: {name}");
            for model in &models {
                println!(
                    "  {} ({}, {}K context)",
                    model.id,
                    model.name,
                    model.max_context / 1000,
                );
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `knitbench init` to create a config file.");
    }

    Ok(())
}
