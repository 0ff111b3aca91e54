//! Configuration management for deskpilot.
//!
//! Configuration can be set via environment variables:
//! - `GEMINI_API_KEY` - Required (`GOOGLE_API_KEY` is accepted as well).
//! - `GEMINI_HOST` - Optional. API host. Defaults to `https://generativelanguage.googleapis.com`.
//! - `FAST_MODEL` - Optional. Low-cost tier model. Defaults to `gemini-2.0-flash`.
//! - `CAPABLE_MODEL` - Optional. Quota-limited tier model. Defaults to `gemini-2.5-pro`.
//! - `CAPABLE_DAILY_QUOTA` - Optional. Capable-tier calls per day. Defaults to `100`.
//! - `MAX_ITERATIONS` - Optional. Model round-trips per user turn. Defaults to `25`.
//! - `MAX_RETRIES` - Optional. Whole-turn attempts on provider failure. Defaults to `3`.
//! - `MAX_HISTORY_TURNS` - Optional. Turn pairs kept in history. Defaults to `50`.
//! - `TEMPERATURE` - Optional. Sampling temperature. Defaults to `0.2`.
//! - `MAX_OUTPUT_TOKENS` - Optional. Output cap per model call. Defaults to `4096`.
//! - `WORKSPACE_PATH` - Optional. Base directory for relative paths. Defaults to current directory.
//! - `WEBDRIVER_URL` - Optional. WebDriver endpoint for browser tools. Defaults to `http://localhost:9515`.
//! - `BROWSER_HEADLESS` - Optional. Run the browser headless. Defaults to `false`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_FAST_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_CAPABLE_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Model names for the two capability tiers.
#[derive(Debug, Clone)]
pub struct ModelTiers {
    /// Low-latency, low-cost model
    pub fast: String,

    /// Higher-quality model, limited by the daily quota
    pub capable: String,

    /// Capable-tier calls allowed per calendar day
    pub capable_daily_quota: u32,
}

impl Default for ModelTiers {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST_MODEL.to_string(),
            capable: DEFAULT_CAPABLE_MODEL.to_string(),
            capable_daily_quota: 100,
        }
    }
}

/// Retry timing for provider failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Whole-turn attempts before a failure is surfaced
    pub max_attempts: u32,

    /// Base delay for rate-limit backoff
    pub backoff_base: Duration,

    /// Upper bound for rate-limit backoff
    pub backoff_max: Duration,

    /// Delay before retrying an unclassified failure
    pub fixed_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(60),
            fixed_delay: Duration::from_secs(3),
        }
    }
}

impl RetryConfig {
    /// Retry timing with every delay set to zero (useful for testing).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
            fixed_delay: Duration::ZERO,
        }
    }

    /// Rate-limit delay for a zero-based attempt number.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let delay_secs = self.backoff_base.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = delay_secs.min(self.backoff_max.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Browser automation settings.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// WebDriver server endpoint (chromedriver, geckodriver, ...)
    pub webdriver_url: String,

    /// Launch the browser without a visible window
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: false,
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key
    pub api_key: String,

    /// Gemini API host
    pub api_host: String,

    /// Model tier names and quota
    pub models: ModelTiers,

    /// Maximum model round-trips per user turn
    pub max_iterations: usize,

    /// Turn pairs kept in conversation history
    pub max_history_turns: usize,

    /// Sampling temperature for every model call
    pub temperature: f32,

    /// Output token cap for every model call
    pub max_output_tokens: u32,

    /// Retry policy for provider failures
    pub retry: RetryConfig,

    /// Base directory for relative tool paths
    pub workspace_path: PathBuf,

    /// Browser tool settings
    pub browser: BrowserConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if neither `GEMINI_API_KEY` nor
    /// `GOOGLE_API_KEY` is set, and `ConfigError::InvalidValue` for values that
    /// fail to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| ConfigError::MissingEnvVar("GEMINI_API_KEY".to_string()))?;

        let api_host =
            std::env::var("GEMINI_HOST").unwrap_or_else(|_| DEFAULT_GEMINI_HOST.to_string());

        let models = ModelTiers {
            fast: std::env::var("FAST_MODEL").unwrap_or_else(|_| DEFAULT_FAST_MODEL.to_string()),
            capable: std::env::var("CAPABLE_MODEL")
                .unwrap_or_else(|_| DEFAULT_CAPABLE_MODEL.to_string()),
            capable_daily_quota: env_parse("CAPABLE_DAILY_QUOTA", 100)?,
        };

        let retry = RetryConfig {
            max_attempts: env_parse("MAX_RETRIES", 3)?,
            ..RetryConfig::default()
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_RETRIES".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let workspace_path = std::env::var("WORKSPACE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let browser = BrowserConfig {
            webdriver_url: std::env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.to_string()),
            headless: std::env::var("BROWSER_HEADLESS")
                .ok()
                .map(|v| {
                    parse_bool(&v)
                        .map_err(|e| ConfigError::InvalidValue("BROWSER_HEADLESS".to_string(), e))
                })
                .transpose()?
                .unwrap_or(false),
        };

        Ok(Self {
            api_key,
            api_host,
            models,
            max_iterations: env_parse("MAX_ITERATIONS", 25)?,
            max_history_turns: env_parse("MAX_HISTORY_TURNS", 50)?,
            temperature: env_parse("TEMPERATURE", 0.2)?,
            max_output_tokens: env_parse("MAX_OUTPUT_TOKENS", 4096)?,
            retry,
            workspace_path,
            browser,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, workspace_path: PathBuf) -> Self {
        Self {
            api_key,
            api_host: DEFAULT_GEMINI_HOST.to_string(),
            models: ModelTiers::default(),
            max_iterations: 25,
            max_history_turns: 50,
            temperature: 0.2,
            max_output_tokens: 4096,
            retry: RetryConfig::default(),
            workspace_path,
            browser: BrowserConfig::default(),
        }
    }
}

/// Read and parse an optional environment variable, falling back to `default`.
fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
