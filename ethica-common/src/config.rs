//! Configuration loading and root folder resolution
//!
//! Resolution order for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "ETHICA_ROOT_FOLDER";

/// Environment variable naming an explicit TOML config file
pub const CONFIG_FILE_ENV: &str = "ETHICA_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "ethica.db";

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5780;

/// Contents of `ethica.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<String>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. "info" or "ethica_common=debug"
    pub level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Upper bound on time spent retrying a write that hit a locked database
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    12
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CorsConfig {
    /// Allow any origin (browser clients served from elsewhere)
    #[serde(default)]
    pub permissive: bool,
}

/// Load the TOML config file
///
/// An explicit path must exist and parse. Without one, the platform config
/// locations are tried and a missing file yields the defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => match find_config_file() {
                Some(path) => path,
                None => return Ok(TomlConfig::default()),
            },
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    parse_toml_config(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

pub fn parse_toml_config(content: &str) -> std::result::Result<TomlConfig, toml::de::Error> {
    toml::from_str(content)
}

/// First existing config file for the platform
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("ethica").join("ethica.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/ethica/ethica.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve the root folder holding the database
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(root_folder) = &toml_config.root_folder {
        return PathBuf::from(root_folder);
    }

    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("ethica"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ethica"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("ethica"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ethica"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("ethica"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/ethica"))
    }
}

/// Fully resolved settings for the tracking service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub db_path: PathBuf,
    pub bind: String,
    pub port: u16,
    pub log_level: Option<String>,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cors_permissive: bool,
}

/// Values that came from the command line (clap already folded in env vars)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl ServiceConfig {
    pub fn resolve(cli: CliOverrides, toml_config: TomlConfig) -> Self {
        let root_folder =
            resolve_root_folder(cli.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);
        let db_path = root_folder.join(DATABASE_FILE);

        Self {
            db_path,
            root_folder,
            bind: cli
                .bind
                .or(toml_config.bind)
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            port: cli.port.or(toml_config.port).unwrap_or(DEFAULT_PORT),
            log_level: cli.log_level.or(toml_config.logging.level),
            database: toml_config.database,
            auth: toml_config.auth,
            cors_permissive: toml_config.cors.permissive,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
