//! ReleaseSentry - Upcoming Release Notifier Daemon
//!
//! ReleaseSentry periodically reads the series and movies tracked in a
//! Stremio library, looks up their release dates in Cinemeta and creates a
//! Home Assistant calendar event for every release inside a lookahead
//! window, announcing each release exactly once.
//!
//! ## Core Features
//!
//! - **Library Tracking**: Stremio login and library retrieval with one re-login on failure
//! - **Release Detection**: Per-episode and per-movie checks against a date window
//! - **Deduplication**: JSON state file of announced releases with 90-day retention
//! - **Calendar Events**: All-day events through the Home Assistant REST API
//! - **Configuration Management**: YAML configuration with XDG compliance, or add-on options
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`catalog`]: Stremio API client
//! - [`metadata`]: Cinemeta release metadata client
//! - [`checker`]: Release window filtering
//! - [`store`]: Persistent notification records
//! - [`notifier`]: Home Assistant calendar client
//! - [`cycle`]: The fetch, check, notify, prune and save cycle
//! - [`daemon`]: Startup sequence and the periodic loop

pub mod catalog;
pub mod checker;
pub mod config;
pub mod cycle;
pub mod daemon;
pub mod error;
pub mod health;
pub mod metadata;
pub mod models;
pub mod notifier;
pub mod store;

pub use catalog::{AuthToken, CatalogSource, StremioClient};
pub use checker::{ReleaseChecker, ReleaseWindow};
pub use config::Config;
pub use cycle::{CycleRunner, CycleSettings, CycleSummary, RetryPolicy, UpcomingRelease};
pub use daemon::{Daemon, DaemonStatus};
pub use error::{Error, Result};
pub use health::HealthCheck;
pub use metadata::{CinemetaClient, MetadataSource, MovieMeta, SeriesMeta, VideoEntry};
pub use models::{EpisodeRef, LibraryItem, MediaKind, NotificationKey, ReleaseCandidate};
pub use notifier::{CalendarEvent, HomeAssistantCalendar, Notifier};
pub use store::ReleaseStore;
