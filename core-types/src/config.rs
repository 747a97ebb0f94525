use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Runtime configuration, built once at startup and passed by reference
/// into the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub interval: String,
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "fs" or "s3".
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_fs_root")]
    pub fs_root: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default = "default_raw_dataset")]
    pub raw_dataset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "default_output_root")]
    pub output_root: String,
    #[serde(default = "default_watermark_key")]
    pub watermark_key: String,
    /// Lower bound for the first run, when no watermark exists yet.
    #[serde(default)]
    pub bootstrap_start_date: Option<NaiveDate>,
}

fn default_exchange() -> String {
    "binance".to_string()
}

fn default_rest_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_backend() -> String {
    "fs".to_string()
}

fn default_fs_root() -> String {
    "data".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_raw_dataset() -> String {
    "coin_prices".to_string()
}

fn default_output_root() -> String {
    "silver".to_string()
}

fn default_watermark_key() -> String {
    "metadata/silver_watermark.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            fs_root: default_fs_root(),
            bucket: String::new(),
            endpoint: String::new(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            raw_dataset: default_raw_dataset(),
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            watermark_key: default_watermark_key(),
            bootstrap_start_date: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config.toml").required(false))
            .add_source(
                Environment::with_prefix("CRYPTOFLOW")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("symbols")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validated()
    }

    /// Normalizes the symbol list and rejects configurations the
    /// ingestion pass cannot run with.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.symbols = self
            .symbols
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if self.symbols.is_empty() {
            return Err(ConfigError::Message(
                "symbols must contain at least one entry".to_string(),
            ));
        }
        if self.interval.trim().is_empty() {
            return Err(ConfigError::Message("interval must not be blank".to_string()));
        }
        if self.storage.backend == "s3" && self.storage.bucket.is_empty() {
            return Err(ConfigError::Message(
                "storage.bucket is required for the s3 backend".to_string(),
            ));
        }
        Ok(self)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            symbols: Vec::new(),
            interval: String::new(),
            rest_base_url: default_rest_base_url(),
            storage: StorageConfig::default(),
            compaction: CompactionConfig::default(),
            metrics_addr: default_metrics_addr(),
        }
    }
}
