//! Init and Config commands.

use std::path::PathBuf;

use crate::config::{CONFIG_DIR, CONFIG_FILE, Settings};

/// Run init command - create configuration file.
pub fn run_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    let path = Settings::init_config_file(force).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to customize your settings.");
    Ok(())
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    match toml::to_string_pretty(config) {
        Ok(toml_str) => println!("{toml_str}"),
        Err(e) => eprintln!("Error displaying config: {e}"),
    }
    println!("Skills directory: {}", config.resolved_skills_dir().display());
}
