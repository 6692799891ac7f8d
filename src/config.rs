//! Configuration module for the skill catalog.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SKILLDECK_` and use double
//! underscores to separate nested levels:
//! - `SKILLDECK_SKILLS_DIR=./skills` sets `skills_dir`
//! - `SKILLDECK_WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`
//! - `SKILLDECK_CATALOG__MAX_FILE_SIZE=2097152` sets `catalog.max_file_size`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Directory holding the settings file, searched for from the current directory upwards.
pub const CONFIG_DIR: &str = ".skilldeck";
/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "SKILLDECK_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory containing one subdirectory per skill
    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,

    /// Workspace root directory (where .skilldeck is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Scanning limits and identifier scheme
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// File watching and debounce settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// MCP server identity
    #[serde(default)]
    pub server: ServerConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogConfig {
    /// Largest file (definition or document) the scanner will read, in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Recognized definition file names, in priority order
    #[serde(default = "default_definition_files")]
    pub definition_files: Vec<String>,

    /// Scheme name of logical identifiers (`skill` gives `skill://name/SKILL.md`)
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Watch the skills directory for skills being added or removed
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period before a subscribed resource is reported as updated
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Quiet period before a structural change triggers a re-scan
    #[serde(default = "default_structural_debounce_ms")]
    pub structural_debounce_ms: u64,

    /// Capacity of the channels carrying raw filesystem events
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Server name reported during the MCP handshake
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Instructions sent to clients during the handshake
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `skilldeck::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_skills_dir() -> PathBuf {
    PathBuf::from("skills")
}
fn default_max_file_size() -> u64 {
    1024 * 1024
}
fn default_definition_files() -> Vec<String> {
    vec!["SKILL.md".to_string(), "skill.md".to_string()]
}
fn default_scheme() -> String {
    "skill".to_string()
}
fn default_true() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_structural_debounce_ms() -> u64 {
    300
}
fn default_channel_capacity() -> usize {
    256
}
fn default_server_name() -> String {
    "skilldeck".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            skills_dir: default_skills_dir(),
            workspace_root: None,
            catalog: CatalogConfig::default(),
            watch: WatchConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            definition_files: default_definition_files(),
            scheme: default_scheme(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            structural_debounce_ms: default_structural_debounce_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            instructions: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .skilldeck directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore
            // stays inside field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the workspace config by looking for a .skilldeck directory.
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .skilldeck is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Absolute skills directory.
    ///
    /// Relative paths are taken from the workspace root when one is known,
    /// otherwise from the current directory.
    pub fn resolved_skills_dir(&self) -> PathBuf {
        if self.skills_dir.is_absolute() {
            return self.skills_dir.clone();
        }
        let base = self
            .workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(&self.skills_dir)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        if let Ok(current_dir) = std::env::current_dir() {
            settings.workspace_root = Some(current_dir);
        }

        settings.save(&config_path)?;
        Ok(config_path)
    }
}
