use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use skilldeck::Settings;
use skilldeck::cli::commands::{init, inspect, serve, watch};
use skilldeck::cli::{Cli, Commands};

/// Settings from `--config` or the discovered settings file, falling back
/// to defaults, with `--skills-dir` applied last.
fn load_settings(config: Option<&PathBuf>, skills_dir: Option<PathBuf>) -> Settings {
    let loaded = match config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let mut settings = loaded.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });
    if let Some(dir) = skills_dir {
        settings.skills_dir = dir;
    }
    skilldeck::logging::init_with_config(&settings.logging);
    settings
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Cli {
        config,
        skills_dir,
        command,
    } = cli;

    match command {
        // Runs before any settings file exists
        Commands::Init { force } => init::run_init(force),
        Commands::Config => {
            init::run_config(&load_settings(config.as_ref(), skills_dir));
            Ok(())
        }
        Commands::List { json } => {
            inspect::run_list(&load_settings(config.as_ref(), skills_dir), json);
            Ok(())
        }
        Commands::Read { uri } => {
            inspect::run_read(&load_settings(config.as_ref(), skills_dir), &uri)
        }
        Commands::Serve { no_watch } => {
            let mut settings = load_settings(config.as_ref(), skills_dir);
            if no_watch {
                settings.watch.enabled = false;
            }
            serve::run(Arc::new(settings)).await
        }
        Commands::Watch => watch::run(Arc::new(load_settings(config.as_ref(), skills_dir))).await,
    }
}
