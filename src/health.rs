//! System health checks for ReleaseSentry
//!
//! Preflight checks run by `releasesentry doctor` to verify configuration,
//! both remote services and the state file before starting the daemon.

use crate::catalog::{CatalogSource, StremioClient};
use crate::notifier::HomeAssistantCalendar;
use crate::store::ReleaseStore;
use crate::Config;
use std::path::Path;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Configuration validation
    pub config: CheckResult,
    /// Home Assistant API connectivity
    pub calendar: CheckResult,
    /// Stremio login
    pub catalog: CheckResult,
    /// State file status (warning only, a missing file is created on first save)
    pub state: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(config: &Config) -> Self {
        Self {
            config: Self::check_config(config),
            calendar: Self::check_calendar(config).await,
            catalog: Self::check_catalog(config).await,
            state: Self::check_state(&config.state_path()),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.config.passed && self.calendar.passed && self.catalog.passed
        // State file problems degrade to an empty store, not required
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.is_warning)
            .collect()
    }

    fn check_config(config: &Config) -> CheckResult {
        match config.validate() {
            Ok(()) => CheckResult::ok_with_details(
                "Configuration valid",
                format!(
                    "Every {}h, {} days ahead, tracking {:?}",
                    config.schedule.check_interval_hours,
                    config.schedule.days_ahead,
                    config.tracked_kinds()
                ),
            ),
            Err(e) => CheckResult::error_with_details("Configuration invalid", e.to_string()),
        }
    }

    async fn check_calendar(config: &Config) -> CheckResult {
        let calendar = match HomeAssistantCalendar::new(&config.calendar) {
            Ok(calendar) => calendar,
            Err(e) => {
                return CheckResult::error_with_details("Calendar client unavailable", e.to_string())
            }
        };

        match calendar.check_connection().await {
            Ok(()) => CheckResult::ok_with_details(
                "Home Assistant API reachable",
                format!("{} -> {}", config.calendar.base_url, calendar.calendar_id()),
            ),
            Err(e) => CheckResult::error_with_details(
                "Home Assistant API check failed",
                format!("{}\nCheck calendar.base_url and calendar.token", e),
            ),
        }
    }

    async fn check_catalog(config: &Config) -> CheckResult {
        let mut client = match StremioClient::new(&config.catalog) {
            Ok(client) => client,
            Err(e) => {
                return CheckResult::error_with_details("Stremio client unavailable", e.to_string())
            }
        };

        match client.authenticate().await {
            Ok(_) => CheckResult::ok_with_details(
                "Stremio login successful",
                format!("Account: {}", client.email()),
            ),
            Err(e) => CheckResult::error_with_details(
                "Stremio login failed",
                format!("{}\nCheck catalog.email and catalog.password", e),
            ),
        }
    }

    /// Check the state file (warning only)
    fn check_state(path: &Path) -> CheckResult {
        if !path.exists() {
            return CheckResult::warning_with_details(
                "State file not found",
                format!("{} will be created after the first cycle", path.display()),
            );
        }

        let readable = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .is_some_and(|value| value.is_object());

        if readable {
            let store = ReleaseStore::open(path);
            CheckResult::ok_with_details(
                "State file readable",
                format!("{} ({} records)", path.display(), store.len()),
            )
        } else {
            CheckResult::warning_with_details(
                "State file unreadable",
                format!(
                    "{} will be replaced; every upcoming release will be announced again",
                    path.display()
                ),
            )
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Config", &self.config),
            ("Calendar", &self.calendar),
            ("Stremio", &self.catalog),
            ("State", &self.state),
        ]
    }
}
