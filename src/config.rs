use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Cost range accepted by bcrypt.
const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

#[derive(Parser, Debug)]
#[command(name = "potluck", about = "A recipe sharing server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Grant admin privileges to an existing user on startup
    #[arg(long, value_name = "USERNAME")]
    pub grant_admin: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allow_any_origin: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    pub max_upload_mb: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
    pub temp_code_minutes: u64,
    pub bcrypt_cost: u32,
    pub secure_cookie: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allow_any_origin: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_upload_mb: 10,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "Authorization".to_string(),
            session_hours: 168,
            temp_code_minutes: 10,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            secure_cookie: false,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("potluck.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }

        if !BCRYPT_COST_RANGE.contains(&config.auth.bcrypt_cost) {
            anyhow::bail!(
                "auth.bcrypt_cost must be between {} and {}",
                BCRYPT_COST_RANGE.start(),
                BCRYPT_COST_RANGE.end()
            );
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".potluck")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("potluck.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("uploads"))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.storage.max_upload_mb * 1024 * 1024
    }
}
