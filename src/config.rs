use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

/// Where artifact blobs are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory for the filesystem backend
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Base URL for the HTTP backend
    pub endpoint: Option<String>,
    pub access_token: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            bucket: default_bucket(),
            root: default_storage_root(),
            endpoint: None,
            access_token: None,
            timeout_secs: None,
        }
    }
}

fn default_storage_backend() -> StorageBackend { StorageBackend::Fs }
fn default_bucket() -> String { "farmers-markets".to_string() }
fn default_storage_root() -> PathBuf { PathBuf::from("data/blobs") }

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_true")]
    pub bounding_box_prefilter: bool,
    #[serde(default = "default_rating_cache_ttl")]
    pub rating_cache_ttl_secs: u64,
    #[serde(default = "default_rating_cache_size")]
    pub rating_cache_size: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            bounding_box_prefilter: default_true(),
            rating_cache_ttl_secs: default_rating_cache_ttl(),
            rating_cache_size: default_rating_cache_size(),
        }
    }
}

fn default_page_size() -> u32 { 10 }
fn default_true() -> bool { true }
fn default_rating_cache_ttl() -> u64 { 60 }
fn default_rating_cache_size() -> u64 { 10_000 }

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    #[serde(default = "default_import_extensions")]
    pub allowed_import_extensions: Vec<String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            allowed_import_extensions: default_import_extensions(),
        }
    }
}

fn default_chunk_size() -> u32 { 1000 }
fn default_import_extensions() -> Vec<String> {
    vec![".xlsx".to_string(), ".xls".to_string(), ".csv".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with MARKETS__)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., MARKETS__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("MARKETS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("MARKETS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Apply well-known environment variables that do not follow the prefix scheme
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    // DATABASE_URL wins over the file so containers can inject credentials
    let database_url = env::var("DATABASE_URL").ok();
    let storage_token = env::var("MARKETS_STORAGE_TOKEN").ok();

    let mut builder = Config::builder().add_source(settings);

    if let Some(url) = database_url {
        builder = builder.set_override("database.url", url)?;
    }
    if let Some(token) = storage_token {
        builder = builder.set_override("storage.access_token", token)?;
    }

    builder.build()
}
