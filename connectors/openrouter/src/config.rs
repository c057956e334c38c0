//! Configuration for the OpenRouter connector

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use larder_core::errors::ClassifiedError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default upstream endpoint
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Files looked up in the working directory by [`OpenRouterConfig::load`]
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["openrouter.yaml", "openrouter.yml"];

/// OpenRouter API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    /// OpenRouter API key
    pub api_key: String,
    /// API base URL
    pub base_url: String,
    /// Per-attempt request timeout in milliseconds
    pub timeout_ms: u64,
    /// Total attempts for a request, first try included
    pub max_attempts: u32,
    /// Delay before the first retry, doubled for each later one
    pub retry_base_delay_ms: u64,
    /// Upper bound for a single backoff delay
    pub retry_max_delay_ms: u64,
    /// Sent as `HTTP-Referer` for app attribution
    pub app_url: Option<String>,
    /// Sent as `X-Title` for app attribution
    pub app_title: Option<String>,
}

impl OpenRouterConfig {
    /// Create a new config with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 60_000,
            max_attempts: 2,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            app_url: None,
            app_title: None,
        }
    }

    /// Load configuration from defaults, a YAML file and `OPENROUTER_*` environment variables.
    ///
    /// Without an explicit path the first of `openrouter.yaml`/`openrouter.yml`
    /// found in the working directory is used. An explicit path must exist.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ClassifiedError> {
        let mut figment = Figment::from(Serialized::defaults(OpenRouterConfig::default()));

        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ClassifiedError::configuration(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }
                figment = figment.merge(Yaml::file(path));
            }
            None => {
                if let Some(path) = DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
                    figment = figment.merge(Yaml::file(path));
                }
            }
        }

        figment = figment.merge(Env::prefixed("OPENROUTER_"));

        figment.extract().map_err(|e| {
            ClassifiedError::configuration(format!("Failed to parse configuration: {}", e))
        })
    }

    /// Set the API base URL (for proxies or other compatible services)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the total number of attempts (at least one)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the backoff delays
    pub fn with_retry_delay(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.retry_base_delay_ms = base_delay_ms;
        self.retry_max_delay_ms = max_delay_ms.max(base_delay_ms);
        self
    }

    /// Set the app attribution headers
    pub fn with_app(mut self, url: impl Into<String>, title: impl Into<String>) -> Self {
        self.app_url = Some(url.into());
        self.app_title = Some(title.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Base URL without a trailing slash
    pub fn api_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Full URL of an API path such as `/chat/completions`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base(), path)
    }
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self::new("") // Empty API key - must be set by user
    }
}
