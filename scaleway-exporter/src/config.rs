//! Exporter configuration.
//!
//! Resolution order, lowest precedence first: built-in defaults, `.env`,
//! environment variables, the external YAML/JSON file, command-line flags.
//! A broken layer is logged and skipped; only an unusable final result is an
//! error.

use clap::Parser;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("timeoutInMs must be greater than 0")]
    InvalidTimeout,
    #[error("metricEndpoint '{0}' collides with a built-in route")]
    ReservedMetricEndpoint(String),
    #[error("metricEndpoint '{0}' must not contain '{{', '}}' or '*'")]
    InvalidMetricEndpoint(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported config file format '{0}'")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub scaleway_access_key: String,
    pub scaleway_secret_key: String,
    pub scaleway_region: String,
    pub scaleway_zone: String,
    pub scaleway_project_id: String,
    pub http_port: u16,
    pub metric_endpoint: String,
    pub timeout_in_ms: u64,
    pub external_config_file: String,
    /// Cap on simultaneous telemetry fetches, 0 for no cap.
    pub max_concurrent_fetches: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scaleway_access_key: String::new(),
            scaleway_secret_key: String::new(),
            scaleway_region: String::new(),
            scaleway_zone: String::new(),
            scaleway_project_id: String::new(),
            http_port: 9706,
            metric_endpoint: "/metrics".into(),
            timeout_in_ms: 5_000,
            external_config_file: "./config.yaml".into(),
            max_concurrent_fetches: 0,
        }
    }
}

impl Config {
    /// Copy safe to log: keys are masked.
    pub fn redacted(&self) -> Self {
        let mask = |s: &str| if s.is_empty() { String::new() } else { "***".to_string() };
        Self {
            scaleway_access_key: mask(&self.scaleway_access_key),
            scaleway_secret_key: mask(&self.scaleway_secret_key),
            ..self.clone()
        }
    }

    fn validate(mut self) -> Result<Self, ConfigError> {
        if self.timeout_in_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if !self.metric_endpoint.starts_with('/') {
            self.metric_endpoint.insert(0, '/');
        }
        if self.metric_endpoint.contains(|c: char| matches!(c, '{' | '}' | '*')) {
            return Err(ConfigError::InvalidMetricEndpoint(self.metric_endpoint));
        }
        if self.metric_endpoint == "/" || self.metric_endpoint == "/health" {
            return Err(ConfigError::ReservedMetricEndpoint(self.metric_endpoint));
        }
        Ok(self)
    }
}

/// One source of settings. Every field is optional so layers only override
/// what they actually set. The same struct reads the config file (serde) and
/// the command line (clap).
#[derive(Debug, Default, Clone, Deserialize, Parser)]
#[command(name = "scaleway-exporter", version, about = "Prometheus exporter for Scaleway RDB instances")]
#[serde(rename_all = "camelCase")]
pub struct ConfigLayer {
    #[arg(long)]
    pub scaleway_access_key: Option<String>,
    #[arg(long)]
    pub scaleway_secret_key: Option<String>,
    #[arg(long)]
    pub scaleway_region: Option<String>,
    #[arg(long)]
    pub scaleway_zone: Option<String>,
    #[arg(long)]
    #[serde(rename = "scalewayProjectID")]
    pub scaleway_project_id: Option<String>,
    #[arg(long)]
    pub http_port: Option<u16>,
    #[arg(long)]
    pub metric_endpoint: Option<String>,
    #[arg(long)]
    pub timeout_in_ms: Option<u64>,
    #[arg(long)]
    pub external_config_file: Option<String>,
    #[arg(long)]
    pub max_concurrent_fetches: Option<usize>,
}

impl ConfigLayer {
    /// Reads the `SCALEWAY_*`, `HTTP_PORT`, ... variables through `lookup`.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn number<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("ignoring {key}={raw:?}: not a valid number");
                    None
                }
            }
        }

        Self {
            scaleway_access_key: lookup("SCALEWAY_ACCESS_KEY"),
            scaleway_secret_key: lookup("SCALEWAY_SECRET_KEY"),
            scaleway_region: lookup("SCALEWAY_REGION"),
            scaleway_zone: lookup("SCALEWAY_ZONE"),
            scaleway_project_id: lookup("SCALEWAY_PROJECT_ID"),
            http_port: number("HTTP_PORT", lookup("HTTP_PORT")),
            metric_endpoint: lookup("METRIC_ENDPOINT"),
            timeout_in_ms: number("TIMEOUT_IN_MS", lookup("TIMEOUT_IN_MS")),
            external_config_file: lookup("EXTERNAL_CONFIG_FILE"),
            max_concurrent_fetches: number("MAX_CONCURRENT_FETCHES", lookup("MAX_CONCURRENT_FETCHES")),
        }
    }

    /// Parses a `.yaml`/`.yml` or `.json` file; an empty file is an empty layer.
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let txt = fs::read_to_string(path).await?;
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }

        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or_default();
        match ext {
            "yaml" | "yml" => Ok(serde_yaml::from_str(&txt)?),
            "json" => Ok(serde_json::from_str(&txt)?),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn apply(self, cfg: &mut Config) {
        fn set<T>(target: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *target = v;
            }
        }

        set(&mut cfg.scaleway_access_key, self.scaleway_access_key);
        set(&mut cfg.scaleway_secret_key, self.scaleway_secret_key);
        set(&mut cfg.scaleway_region, self.scaleway_region);
        set(&mut cfg.scaleway_zone, self.scaleway_zone);
        set(&mut cfg.scaleway_project_id, self.scaleway_project_id);
        set(&mut cfg.http_port, self.http_port);
        set(&mut cfg.metric_endpoint, self.metric_endpoint);
        set(&mut cfg.timeout_in_ms, self.timeout_in_ms);
        set(&mut cfg.external_config_file, self.external_config_file);
        set(&mut cfg.max_concurrent_fetches, self.max_concurrent_fetches);
    }
}

/// Merges defaults, `env`, the config file and `args`.
///
/// The file path is taken from `args` first, then `env`, so that
/// `--external-config-file` selects the file it is layered under.
pub async fn resolve(env: ConfigLayer, args: ConfigLayer) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    let file = args
        .external_config_file
        .clone()
        .or_else(|| env.external_config_file.clone())
        .unwrap_or_else(|| cfg.external_config_file.clone());

    env.apply(&mut cfg);

    match ConfigLayer::from_file(Path::new(&file)).await {
        Ok(layer) => layer.apply(&mut cfg),
        Err(ConfigError::Io(e)) => warn!("cannot read {file} file. details: {e}"),
        Err(e) => error!("failed to load config file {file}: {e}"),
    }

    args.apply(&mut cfg);
    cfg.validate()
}

/// Loads the process configuration from `.env`, the environment, the config
/// file and the command line.
pub async fn load_config() -> Result<Config, ConfigError> {
    if let Err(e) = dotenvy::dotenv() {
        warn!("failed to read .env file, {e}");
    }

    let env = ConfigLayer::from_env(|key| std::env::var(key).ok());
    resolve(env, ConfigLayer::parse()).await
}
