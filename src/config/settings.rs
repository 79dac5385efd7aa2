//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
    /// How often idle client state is pruned
    #[serde(default = "default_rate_limit_cleanup")]
    pub cleanup_interval_secs: u64,
}

fn default_rps() -> u32 {
    10
}

fn default_burst() -> u32 {
    20
}

fn default_rate_limit_cleanup() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: default_rps(),
            burst_size: default_burst(),
            cleanup_interval_secs: default_rate_limit_cleanup(),
        }
    }
}

/// Submission queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueSettings {
    /// Pause between two vendor submissions (milliseconds)
    #[serde(default = "default_queue_delay")]
    pub delay_ms: u64,
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_queue_delay() -> u64 {
    2000
}

fn default_max_pending() -> usize {
    100
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            delay_ms: default_queue_delay(),
            max_pending: default_max_pending(),
        }
    }
}

/// Job poller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// How long an unread terminal job stays queryable
    #[serde(default = "default_job_retention")]
    pub job_retention_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    30
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_job_retention() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_poll_interval(),
            job_retention_secs: default_job_retention(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// When false, vendor URLs are relayed as-is
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// "local" or "firebase"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_storage_path")]
    pub base_path: String,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default = "default_image_folder")]
    pub image_folder: String,
    #[serde(default = "default_video_folder")]
    pub video_folder: String,
    #[serde(default = "default_upload_folder")]
    pub upload_folder: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub firebase: FirebaseConfig,
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_storage_path() -> String {
    "./generated_assets".to_string()
}

fn default_url_prefix() -> String {
    "http://localhost:8080/files".to_string()
}

fn default_image_folder() -> String {
    "generated-images".to_string()
}

fn default_video_folder() -> String {
    "generated-videos".to_string()
}

fn default_upload_folder() -> String {
    "reference-images".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_storage_backend(),
            base_path: default_storage_path(),
            url_prefix: default_url_prefix(),
            image_folder: default_image_folder(),
            video_folder: default_video_folder(),
            upload_folder: default_upload_folder(),
            max_upload_bytes: default_max_upload_bytes(),
            firebase: FirebaseConfig::default(),
        }
    }
}

/// Firebase Storage REST configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FirebaseConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_firebase_base_url")]
    pub base_url: String,
    /// OAuth bearer token, sent when present
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_firebase_base_url() -> String {
    "https://firebasestorage.googleapis.com".to_string()
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            base_url: default_firebase_base_url(),
            auth_token: None,
        }
    }
}

/// Vendor API configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub bfl: BflConfig,
    #[serde(default)]
    pub minimax: MiniMaxConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BflConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_bfl_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_bfl_base_url() -> String {
    "https://api.bfl.ai/v1".to_string()
}

fn default_timeout() -> u64 {
    60000
}

impl Default for BflConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_bfl_base_url(),
            timeout_ms: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MiniMaxConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_minimax_base_url")]
    pub base_url: String,
    /// Overrides the GroupID claim embedded in the API key
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default = "default_music_timeout")]
    pub timeout_ms: u64,
}

fn default_minimax_base_url() -> String {
    "https://api.minimax.io/v1".to_string()
}

// Music generation answers synchronously and can take minutes.
fn default_music_timeout() -> u64 {
    300000
}

impl Default for MiniMaxConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_minimax_base_url(),
            group_id: None,
            timeout_ms: default_music_timeout(),
        }
    }
}

/// Image proxy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Substrings a proxied URL must contain
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

fn default_allowed_hosts() -> Vec<String> {
    vec![
        "firebasestorage.googleapis.com".to_string(),
        "bfl.ai".to_string(),
        "ngrok-free.app".to_string(),
    ]
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl PollerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl QueueSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (prefixed with GEN_GATEWAY_)
            .add_source(
                Environment::with_prefix("GEN_GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.apply_legacy_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Fill vendor keys from the plain variables most deployments already set
    fn apply_legacy_env(&mut self) {
        if self.providers.bfl.api_key.is_none() {
            self.providers.bfl.api_key = std::env::var("FLUX_API_KEY").ok().filter(|k| !k.is_empty());
        }
        if self.providers.minimax.api_key.is_none() {
            self.providers.minimax.api_key = std::env::var("MINIMAX_API_KEY").ok().filter(|k| !k.is_empty());
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if self.poller.max_attempts == 0 {
            return Err(invalid("poller.max_attempts must be at least 1"));
        }
        if self.poller.interval_ms == 0 {
            return Err(invalid("poller.interval_ms must be greater than 0"));
        }
        if self.rate_limit.enabled && self.rate_limit.cleanup_interval_secs == 0 {
            return Err(invalid("rate_limit.cleanup_interval_secs must be greater than 0"));
        }
        if self.poller.sweep_interval_secs == 0 {
            return Err(invalid("poller.sweep_interval_secs must be greater than 0"));
        }
        if self.queue.max_pending == 0 {
            return Err(invalid("queue.max_pending must be at least 1"));
        }

        match self.storage.backend.as_str() {
            "local" => {}
            "firebase" => {
                if self.storage.enabled && self.storage.firebase.bucket.is_empty() {
                    return Err(invalid("storage.firebase.bucket is required for the firebase backend"));
                }
            }
            other => {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Unknown storage backend '{}'. Must be 'local' or 'firebase'",
                    other
                ))));
            }
        }

        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Config(config::ConfigError::Message(message.to_string()))
}
