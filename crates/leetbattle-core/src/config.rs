// Client configuration loading and validation (client.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::match_state::DEFAULT_LANGUAGE;
use crate::reducer::DEFAULT_PLAYER_NAME;

/// File name looked up in `./config/` and in the per-user config directory.
pub const CONFIG_FILE_NAME: &str = "client.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "LEETBATTLE_CONFIG";

/// Environment variable overriding `server.url`.
pub const SERVER_URL_ENV: &str = "LEETBATTLE_SERVER_URL";

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:4000/ws";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// client.toml structs
// ---------------------------------------------------------------------------

/// The assembled client configuration. Every section is optional in the
/// file; missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub player: PlayerConfig,
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket address of the match server (`ws://` or `wss://`).
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Name used when `join` is given no name.
    pub name: String,
    /// Preferred starter-code language.
    pub language: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            name: DEFAULT_PLAYER_NAME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub ping_interval_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            reconnect: true,
            reconnect_delay_ms: 2000,
            ping_interval_secs: 15,
            idle_timeout_secs: 45,
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate a config file. No environment overrides are applied.
pub fn load_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let config = parse_config(&text, path)?;
    validate(&config)?;
    Ok(config)
}

/// Parse TOML text into a config. `path` is only used for error messages.
pub fn parse_config(text: &str, path: &Path) -> Result<ClientConfig, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Pick the config file to load.
///
/// An explicit path (CLI flag, then `$LEETBATTLE_CONFIG`) is returned as-is
/// even when missing so the caller reports it. Otherwise the first existing
/// candidate among `<cwd>/config/client.toml` and the per-user config
/// directory wins. `None` means run on built-in defaults.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env_path: Option<PathBuf>,
    cwd: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        return Some(path);
    }

    let mut candidates = vec![cwd.join("config").join(CONFIG_FILE_NAME)];
    if let Some(dirs) = ProjectDirs::from("dev", "leetbattle", "leetbattle") {
        candidates.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }
    candidates.into_iter().find(|p| p.is_file())
}

/// Apply a server URL override (from the environment or the command line).
/// Blank values are ignored.
pub fn apply_server_override(mut config: ClientConfig, url: Option<String>) -> ClientConfig {
    if let Some(url) = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
        config.server.url = url;
    }
    config
}

/// Command-line overrides, applied after the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub player_name: Option<String>,
}

/// Resolve the file relative to the current working directory and the
/// environment and parse it, or fall back to the defaults. No overrides
/// are applied and nothing is validated yet.
pub fn read_config(explicit: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);

    match resolve_config_path(explicit, env_path, &cwd) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|_| ConfigError::FileNotFound { path: path.clone() })?;
            parse_config(&text, &path)
        }
        None => Ok(ClientConfig::default()),
    }
}

/// Layer the overrides onto a parsed config: `$LEETBATTLE_SERVER_URL`
/// first, then the command line. Validation runs once, on the result.
pub fn finish_config(
    config: ClientConfig,
    env_server_url: Option<String>,
    overrides: &ConfigOverrides,
) -> Result<ClientConfig, ConfigError> {
    let config = apply_server_override(config, env_server_url);
    let mut config = apply_server_override(config, overrides.server_url.clone());
    if let Some(name) = overrides.player_name.as_deref().filter(|n| !n.is_empty()) {
        config.player.name = name.to_string();
    }
    validate(&config)?;
    Ok(config)
}

/// Read the config file, apply environment and command-line overrides in
/// that order, then validate.
pub fn load_config(
    explicit: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ClientConfig, ConfigError> {
    let config = read_config(explicit)?;
    finish_config(config, std::env::var(SERVER_URL_ENV).ok(), overrides)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &ClientConfig) -> Result<(), ConfigError> {
    let url = config.server.url.trim();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(ConfigError::ValidationError {
            field: "server.url".into(),
            message: format!("must start with ws:// or wss://, got {url:?}"),
        });
    }
    if url.starts_with("wss://") && !cfg!(feature = "tls") {
        return Err(ConfigError::ValidationError {
            field: "server.url".into(),
            message: "wss:// needs the `tls` feature of leetbattle-core".into(),
        });
    }

    if config.player.language.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "player.language".into(),
            message: "must not be empty".into(),
        });
    }

    let conn = &config.connection;
    let positive_fields: &[(&str, u64)] = &[
        ("connection.reconnect_delay_ms", conn.reconnect_delay_ms),
        ("connection.ping_interval_secs", conn.ping_interval_secs),
        ("connection.idle_timeout_secs", conn.idle_timeout_secs),
    ];
    for (name, val) in positive_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if conn.idle_timeout_secs <= conn.ping_interval_secs {
        return Err(ConfigError::ValidationError {
            field: "connection.idle_timeout_secs".into(),
            message: format!(
                "must be greater than ping_interval_secs ({}), got {}",
                conn.ping_interval_secs, conn.idle_timeout_secs
            ),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
