use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::MediaKind;
use crate::store::ReleaseStore;

/// Main configuration structure for ReleaseSentry
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Stremio account used to read the library
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Release metadata service
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Home Assistant calendar that receives events
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Check interval, lookahead and tracked kinds
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Notification state file
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Stremio account configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogConfig {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,

    /// Stremio API base URL
    #[serde(default = "default_catalog_url")]
    pub api_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout: u64,
}

/// Metadata service configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetadataConfig {
    /// Cinemeta base URL (without the /series or /movie segment)
    #[serde(default = "default_metadata_url")]
    pub base_url: String,

    /// Pause between consecutive lookups in milliseconds
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout: u64,
}

/// Home Assistant calendar configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CalendarConfig {
    /// Home Assistant Core API base URL
    #[serde(default = "default_calendar_url")]
    pub base_url: String,

    /// Long-lived access token (or the supervisor token inside an add-on)
    #[serde(default)]
    pub token: String,

    /// Calendar entity that receives the events
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    /// Request timeout in seconds
    #[serde(default = "default_calendar_timeout")]
    pub timeout: u64,
}

/// Scheduling configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    /// Hours between check cycles
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u64,

    /// Size of the lookahead window in days
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,

    #[serde(default = "default_true")]
    pub track_series: bool,

    #[serde(default = "default_true")]
    pub track_movies: bool,

    /// Forget every recorded notification at startup
    #[serde(default)]
    pub force_refresh: bool,
}

/// State file configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level: debug, info, warning, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: compact, full, pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_catalog_url() -> String {
    "https://api.strem.io/api".to_string()
}
fn default_metadata_url() -> String {
    "https://v3-cinemeta.strem.io/meta".to_string()
}
fn default_calendar_url() -> String {
    "http://supervisor/core".to_string()
}
fn default_calendar_id() -> String {
    "calendar.stremio_releases".to_string()
}
fn default_remote_timeout() -> u64 {
    30
}
fn default_calendar_timeout() -> u64 {
    10
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_check_interval_hours() -> u64 {
    6
}
fn default_days_ahead() -> u32 {
    14
}
fn default_true() -> bool {
    true
}
fn default_state_path() -> String {
    ReleaseStore::default_path().to_string_lossy().into_owned()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

// Default implementations
impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            api_url: default_catalog_url(),
            timeout: default_remote_timeout(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: default_metadata_url(),
            request_delay_ms: default_request_delay_ms(),
            timeout: default_remote_timeout(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: default_calendar_url(),
            token: String::new(),
            calendar_id: default_calendar_id(),
            timeout: default_calendar_timeout(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_hours: default_check_interval_hours(),
            days_ahead: default_days_ahead(),
            track_series: default_true(),
            track_movies: default_true(),
            force_refresh: false,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_true(),
        }
    }
}

/// Flat `options.json` written by the Home Assistant supervisor for the add-on
#[derive(Debug, Deserialize, Clone)]
pub struct AddonOptions {
    pub stremio_email: String,
    pub stremio_password: String,
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u64,
    #[serde(default = "default_calendar_id")]
    pub calendar_entity: String,
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,
    #[serde(default = "default_true")]
    pub track_series: bool,
    #[serde(default = "default_true")]
    pub track_movies: bool,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Largest accepted lookahead window, in days
pub const MAX_DAYS_AHEAD: u32 = 3650;

/// Largest accepted check interval, in hours (one year)
pub const MAX_CHECK_INTERVAL_HOURS: u64 = 24 * 365;

/// State file location inside an add-on container
pub const ADDON_STATE_PATH: &str = "/data/created_events.json";

impl From<AddonOptions> for Config {
    fn from(options: AddonOptions) -> Self {
        let mut config = Config::default();
        config.catalog.email = options.stremio_email;
        config.catalog.password = options.stremio_password;
        config.calendar.calendar_id = options.calendar_entity;
        config.schedule = ScheduleConfig {
            check_interval_hours: options.check_interval_hours,
            days_ahead: options.days_ahead,
            track_series: options.track_series,
            track_movies: options.track_movies,
            force_refresh: options.force_refresh,
        };
        config.state.path = ADDON_STATE_PATH.to_string();
        config.logging.level = options.log_level;
        config
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            // Create default config
            let mut config = Self::default();

            // Create config directory if it doesn't exist
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            // Save default config
            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            config.apply_env_overrides();
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.apply_env_overrides();
        config.expand_paths()?;

        Ok(config)
    }

    /// Load the Home Assistant add-on `options.json`
    pub fn load_addon_options(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read add-on options: {:?}", path))?;

        let options: AddonOptions = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse add-on options: {:?}", path))?;

        let mut config = Config::from(options);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("releasesentry").join("config.yml"))
    }

    /// Fill credentials from the environment when present
    ///
    /// `STREMIO_EMAIL` and `STREMIO_PASSWORD` override the file;
    /// `SUPERVISOR_TOKEN` is used only when no calendar token is configured.
    pub fn apply_env_overrides(&mut self) {
        if let Some(email) = non_empty_env("STREMIO_EMAIL") {
            self.catalog.email = email;
        }
        if let Some(password) = non_empty_env("STREMIO_PASSWORD") {
            self.catalog.password = password;
        }
        if self.calendar.token.is_empty() {
            if let Some(token) = non_empty_env("SUPERVISOR_TOKEN") {
                self.calendar.token = token;
            }
        }
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.state.path = shellexpand::full(&self.state.path)
            .context("Failed to expand state path")?
            .into_owned();

        Ok(())
    }

    /// Reject configurations the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.catalog.email.trim().is_empty() || self.catalog.password.is_empty() {
            bail!("Stremio credentials are missing: set catalog.email and catalog.password");
        }
        if self.schedule.check_interval_hours == 0 {
            bail!("schedule.check_interval_hours must be at least 1");
        }
        if self.schedule.check_interval_hours > MAX_CHECK_INTERVAL_HOURS {
            bail!(
                "schedule.check_interval_hours must be at most {}",
                MAX_CHECK_INTERVAL_HOURS
            );
        }
        if self.schedule.days_ahead > MAX_DAYS_AHEAD {
            bail!("schedule.days_ahead must be at most {}", MAX_DAYS_AHEAD);
        }
        if self.tracked_kinds().is_empty() {
            bail!("Nothing to track: enable schedule.track_series or schedule.track_movies");
        }
        if self.calendar.calendar_id.trim().is_empty() {
            bail!("calendar.calendar_id must not be empty");
        }
        Ok(())
    }

    /// Kinds of library items to check
    pub fn tracked_kinds(&self) -> BTreeSet<MediaKind> {
        let mut kinds = BTreeSet::new();
        if self.schedule.track_series {
            kinds.insert(MediaKind::Series);
        }
        if self.schedule.track_movies {
            kinds.insert(MediaKind::Movie);
        }
        kinds
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.check_interval_hours.saturating_mul(3600))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.metadata.request_delay_ms)
    }

    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(&self.state.path)
    }

    /// Log level as a tracing filter directive
    pub fn log_filter(&self) -> &'static str {
        match self.logging.level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" | "critical" | "fatal" => "error",
            _ => "info",
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
