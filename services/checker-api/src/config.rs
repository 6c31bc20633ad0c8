//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The notifier bot token is loaded from the NOTIFY_BOT_TOKEN env var or
//! token_file, never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub bridge: BridgeConfig,
    /// Path to the JSON accounts file
    pub accounts_file: PathBuf,
    #[serde(default)]
    pub notifier: Option<NotifierConfig>,
}

/// HTTP server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// MTProto bridge sidecar settings
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Operator alert settings
#[derive(Debug, Deserialize)]
pub struct NotifierConfig {
    pub chat_id: String,
    #[serde(skip)]
    pub bot_token: Option<Secret<String>>,
    /// Path to a file containing the bot token (alternative to NOTIFY_BOT_TOKEN)
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_max_connections() -> usize {
    100
}

fn default_timeout() -> u64 {
    30
}

fn default_cooldown() -> u64 {
    300
}

fn default_check_interval() -> u64 {
    300
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Bot token resolution order:
    /// 1. NOTIFY_BOT_TOKEN env var
    /// 2. token_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.bridge.url.starts_with("http://") && !config.bridge.url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "bridge url must start with http:// or https://, got: {}",
                config.bridge.url
            )));
        }

        if config.bridge.timeout_secs == 0 {
            return Err(common::Error::Config(
                "bridge timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if let Some(notifier) = &mut config.notifier {
            if let Ok(token) = std::env::var("NOTIFY_BOT_TOKEN") {
                notifier.bot_token = Some(Secret::new(token));
            } else if let Some(token_file) = &notifier.token_file {
                let token = Secret::from_file(token_file).map_err(|e| {
                    common::Error::Config(format!(
                        "failed to read token_file {}: {e}",
                        token_file.display()
                    ))
                })?;
                if !token.expose().is_empty() {
                    notifier.bot_token = Some(token);
                }
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("telegram-checker.toml")
    }
}
