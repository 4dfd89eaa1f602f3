//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Login identity and Twilio credentials are not part of this file; they
//! live in the credential record at `[state].path`, which the watcher
//! rewrites as sessions are renewed.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ais_session::{DEFAULT_BASE_URL, DEFAULT_LOCALE, Endpoints, RetryPolicy};
use ais_watch::notify::TWILIO_BASE_URL;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Appointment portal settings
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    pub schedule_id: String,
    pub facility_id: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Localized label of the sign-in button; defaults to the es-co label
    #[serde(default)]
    pub sign_in_label: Option<String>,
}

/// Credential record location and session policy
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: PathBuf,
    /// Negotiate a fresh session at the start of every run instead of
    /// reusing the stored one.
    pub always_login: bool,
}

/// Run cadence
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Cron expression with a seconds field (cron crate syntax)
    pub cron: String,
    /// Upper bound of the random delay added before each run
    pub max_jitter_secs: u64,
    /// Hard limit on a single run
    pub run_timeout_secs: u64,
}

/// Transient failure retry for the days query
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub twilio_base_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus scrape listener; disabled when unset
    pub listen_addr: Option<SocketAddr>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config.json"),
            always_login: false,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 */2 * * *".to_string(),
            max_jitter_secs: 3600,
            run_timeout_secs: 600,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 8000,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            twilio_base_url: TWILIO_BASE_URL.to_string(),
        }
    }
}

fn require_http(name: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {url}"
        )))
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `STATE_PATH` overrides `[state].path`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_http("provider.base_url", &config.provider.base_url)?;
        require_http("notify.twilio_base_url", &config.notify.twilio_base_url)?;

        if config.provider.schedule_id.trim().is_empty() {
            return Err(common::Error::Config(
                "provider.schedule_id must not be empty".into(),
            ));
        }

        if config.provider.timeout_secs == 0 {
            return Err(common::Error::Config(
                "provider.timeout_secs must be greater than 0".into(),
            ));
        }

        if config.schedule.run_timeout_secs == 0 {
            return Err(common::Error::Config(
                "schedule.run_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.retry.max_attempts == 0 {
            return Err(common::Error::Config(
                "retry.max_attempts must be greater than 0".into(),
            ));
        }

        cron::Schedule::from_str(&config.schedule.cron).map_err(|e| {
            common::Error::Config(format!(
                "schedule.cron {:?} is invalid: {e}",
                config.schedule.cron
            ))
        })?;

        if let Ok(state_path) = std::env::var("STATE_PATH") {
            config.state.path = PathBuf::from(state_path);
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("appointment-watcher.toml")
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(self.provider.schedule_id.clone(), self.provider.facility_id)
            .with_base_url(&self.provider.base_url)
            .with_locale(&self.provider.locale)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule.run_timeout_secs)
    }
}
