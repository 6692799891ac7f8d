//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Live skill catalog served over MCP
#[derive(Parser)]
#[command(
    name = "skilldeck",
    version = env!("CARGO_PKG_VERSION"),
    about = "Live skill catalog served over MCP",
    long_about = "Discover skills on disk, serve them as MCP resources and tell subscribers when they change.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ skilldeck init\n  $ skilldeck list\n  $ skilldeck read skill://my-skill/SKILL.md\n  $ skilldeck serve"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding one subdirectory per skill (overrides config)
    #[arg(long, global = true, env = "SKILLDECK_SKILLS_DIR", value_name = "DIR")]
    pub skills_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .skilldeck directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .skilldeck/settings.toml")]
    Config,

    /// Start MCP server
    #[command(
        about = "Start MCP server on stdio",
        after_help = "Examples:\n  skilldeck serve\n  skilldeck serve --skills-dir ~/.skills --no-watch"
    )]
    Serve {
        /// Do not watch the skills directory for added or removed skills
        #[arg(long)]
        no_watch: bool,
    },

    /// List skills
    #[command(about = "Scan once and print the skills index")]
    List {
        /// Print the JSON index instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Read one resource
    #[command(
        about = "Scan once and print one resource",
        after_help = "Examples:\n  skilldeck read skill://index\n  skilldeck read skill://prompt-xml\n  skilldeck read skill://pdf/_manifest\n  skilldeck read skill://pdf/references/forms.md"
    )]
    Read {
        /// Resource identifier
        uri: String,
    },

    /// Follow catalog changes
    #[command(about = "Watch every skill and print change events until Ctrl-C")]
    Watch,
}
