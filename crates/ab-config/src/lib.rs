//! # ab-config
//!
//! Layered settings: built-in defaults, then an optional `anon-board.toml`,
//! then `ANON_BOARD_*` environment variables (`__` separates nested keys,
//! e.g. `ANON_BOARD_SERVER__PORT=9000`). A `.env` file is read first when present.

use ab_core::identity::OperatorName;
use ab_core::models::Order;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "ANON_BOARD";
pub const DEFAULT_FILE: &str = "anon-board.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub board: BoardSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardSettings {
    /// Reserved name; blank values fail deserialization.
    pub operator_name: OperatorName,
    /// Ordering of the root index page.
    pub index_order: Order,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub json: bool,
}

impl Settings {
    /// Reads `.env`, then layers defaults, `anon-board.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_from(Some(DEFAULT_FILE))
    }

    /// Same layering without touching `.env`; `file` may be absent on disk.
    pub fn load_from(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite:anon_board.db")?
            .set_default("database.max_connections", 5)?
            .set_default("board.operator_name", "admin")?
            .set_default("board.index_order", "ascending")?
            .set_default("log.json", false)?;

        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        debug!(
            host = %settings.server.host,
            port = settings.server.port,
            database = %settings.database.url,
            "configuration loaded"
        );
        Ok(settings)
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}
