//! Process configuration.
//!
//! Read from `config/emplette.toml` when present, then from `EMPLETTE_*`
//! environment variables. The server section is optional; without it the
//! process has nothing to run.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config/emplette";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub server: Option<Server>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct App {
    /// Log level applied to every crate of the workspace.
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    /// Address to bind, loopback when absent.
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
}

/// Storage backing the server.
///
/// `database = "memory"` keeps everything in RAM, a `{ sqlite = "path" }`
/// table persists to disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_PATH).required(false))
            .add_source(Environment::with_prefix("EMPLETTE").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
