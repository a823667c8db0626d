use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "buzzhub.toml",
    "config/buzzhub.toml",
    "crates/config/buzzhub.toml",
    "../buzzhub.toml",
    "../config/buzzhub.toml",
    "../crates/config/buzzhub.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
    /// Origins allowed to call the API from a browser. Empty means any origin.
    #[serde(default = "HttpConfig::default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl HttpConfig {
    fn default_cors_origins() -> Vec<String> {
        vec!["http://localhost:3000".to_string()]
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 4000,
            cors_origins: Self::default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://buzzhub.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
    /// Enables `/api/auth/dev/token`, which hands out sessions without an
    /// identity provider. Never turn this on outside local development.
    #[serde(default)]
    pub dev_tokens: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
            dev_tokens: false,
        }
    }
}

impl AuthConfig {
    const fn default_session_ttl() -> u64 {
        86_400
    }
}

/// Sizing of the in-process fan-out path.
///
/// ```
/// use buzzhub_config::DeliveryConfig;
///
/// let delivery = DeliveryConfig::default();
/// assert_eq!(delivery.bus_queue_capacity, 256);
/// assert_eq!(delivery.channel_capacity, 64);
/// assert_eq!(delivery.max_message_length, 10_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Events buffered per bus handler before new events are dropped.
    #[serde(default = "DeliveryConfig::default_bus_queue_capacity")]
    pub bus_queue_capacity: usize,
    /// Events buffered per client connection before new events are dropped.
    #[serde(default = "DeliveryConfig::default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "DeliveryConfig::default_max_message_length")]
    pub max_message_length: usize,
}

impl DeliveryConfig {
    const fn default_bus_queue_capacity() -> usize {
        256
    }

    const fn default_channel_capacity() -> usize {
        64
    }

    const fn default_max_message_length() -> usize {
        10_000
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            bus_queue_capacity: Self::default_bus_queue_capacity(),
            channel_capacity: Self::default_channel_capacity(),
            max_message_length: Self::default_max_message_length(),
        }
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use buzzhub_config::load;
///
/// std::env::remove_var("BUZZHUB_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("http.cors_origins", defaults.http.cors_origins.clone())?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default(
            "auth.session_ttl_seconds",
            clamp_to_i64(defaults.auth.session_ttl_seconds),
        )?
        .set_default("auth.dev_tokens", defaults.auth.dev_tokens)?
        .set_default(
            "delivery.bus_queue_capacity",
            clamp_to_i64(defaults.delivery.bus_queue_capacity as u64),
        )?
        .set_default(
            "delivery.channel_capacity",
            clamp_to_i64(defaults.delivery.channel_capacity as u64),
        )?
        .set_default(
            "delivery.max_message_length",
            clamp_to_i64(defaults.delivery.max_message_length as u64),
        )?;

    let environment_overrides = config::Environment::with_prefix("BUZZHUB")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("http.cors_origins");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("BUZZHUB_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via BUZZHUB_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    // tokio rejects zero-capacity channels.
    config.delivery.bus_queue_capacity = config.delivery.bus_queue_capacity.max(1);
    config.delivery.channel_capacity = config.delivery.channel_capacity.max(1);

    debug!(?config, "loaded backend configuration");
    Ok(config)
}
