//! Cycle Orchestrator - one pass of fetch, check, notify, prune and save
//!
//! A cycle is the only place that decides whether a release gets announced.
//! The store is consulted before every notification and updated only after
//! the notifier confirmed it, so a release is announced at least once and,
//! once recorded, never again while its record is retained.

use crate::catalog::{AuthToken, CatalogSource};
use crate::checker::{ReleaseChecker, ReleaseWindow};
use crate::config::Config;
use crate::models::{LibraryItem, MediaKind, ReleaseCandidate};
use crate::notifier::Notifier;
use crate::store::{ReleaseStore, RETENTION_DAYS};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often a failed library fetch may trigger a fresh login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_reauth_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_reauth_attempts: 1,
        }
    }
}

/// Per-cycle parameters taken from the configuration
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub days_ahead: u32,
    pub tracked_kinds: BTreeSet<MediaKind>,
    pub retry: RetryPolicy,
}

impl CycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            days_ahead: config.schedule.days_ahead,
            tracked_kinds: config.tracked_kinds(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Counters from one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub library_items: usize,
    pub candidates: usize,
    pub notified: usize,
    pub already_notified: usize,
    pub failed: usize,
    pub pruned: usize,
    pub duration: Duration,
}

/// A release in the window together with the date it was announced, if ever
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingRelease {
    pub release: ReleaseCandidate,
    pub notified_on: Option<NaiveDate>,
}

/// Owns the service clients and the store for the lifetime of the process
pub struct CycleRunner {
    catalog: Box<dyn CatalogSource>,
    checker: ReleaseChecker,
    notifier: Box<dyn Notifier>,
    store: ReleaseStore,
    settings: CycleSettings,
}

impl CycleRunner {
    pub fn new(
        catalog: Box<dyn CatalogSource>,
        checker: ReleaseChecker,
        notifier: Box<dyn Notifier>,
        store: ReleaseStore,
        settings: CycleSettings,
    ) -> Self {
        Self {
            catalog,
            checker,
            notifier,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &ReleaseStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ReleaseStore {
        &mut self.store
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    /// Log in to the catalog; used once at startup
    pub async fn authenticate(&mut self) -> Result<AuthToken> {
        self.catalog
            .authenticate()
            .await
            .context("Failed to authenticate with the catalog")
    }

    /// Fetch the tracked library, re-authenticating on failure within the retry policy
    pub async fn fetch_library(&mut self) -> Result<Vec<LibraryItem>> {
        let max_attempts = self.settings.retry.max_reauth_attempts;
        let mut attempts = 0;

        loop {
            match self.catalog.fetch_library(&self.settings.tracked_kinds).await {
                Ok(items) => return Ok(items),
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    attempts += 1;
                    warn!(
                        "Library fetch failed ({}), re-authenticating (attempt {}/{})",
                        e, attempts, max_attempts
                    );
                    self.catalog
                        .authenticate()
                        .await
                        .context("Re-authentication after failed library fetch")?;
                }
                Err(e) => return Err(e).context("Failed to fetch library"),
            }
        }
    }

    /// Run one full cycle as of `today`
    ///
    /// Returns an error only when the library cannot be fetched (nothing was
    /// changed) or the store cannot be saved (notifications were sent and the
    /// in-memory records are kept for the next attempt).
    pub async fn run_cycle(&mut self, today: NaiveDate) -> Result<CycleSummary> {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        info!("Starting release check for {}", today);

        let items = self.fetch_library().await?;
        summary.library_items = items.len();

        if items.is_empty() {
            info!("Library is empty, nothing to check");
            summary.duration = started.elapsed();
            return Ok(summary);
        }

        let window = ReleaseWindow::lookahead(today, self.settings.days_ahead);
        let candidates = self.checker.check_releases(&items, &window).await;
        summary.candidates = candidates.len();

        for release in &candidates {
            let key = release.key();
            if self.store.is_notified(&key) {
                debug!("Already notified: {}", key);
                summary.already_notified += 1;
                continue;
            }

            match self.notifier.notify(release).await {
                Ok(()) => {
                    self.store.mark_notified(key, today);
                    summary.notified += 1;
                }
                Err(e) => {
                    warn!("Failed to notify {} ({}): {}", release.summary(), key, e);
                    summary.failed += 1;
                }
            }
        }

        let cutoff = today - chrono::Duration::days(RETENTION_DAYS);
        summary.pruned = self.store.prune_older_than(cutoff);
        self.store
            .save()
            .context("Failed to save notification state")?;

        summary.duration = started.elapsed();
        info!(
            "Cycle completed in {:.2}s: {} items, {} upcoming, {} notified, {} already notified, {} failed, {} pruned",
            summary.duration.as_secs_f64(),
            summary.library_items,
            summary.candidates,
            summary.notified,
            summary.already_notified,
            summary.failed,
            summary.pruned
        );

        Ok(summary)
    }

    /// Releases in the window as of `today`, without notifying or touching the store
    pub async fn upcoming(&mut self, today: NaiveDate) -> Result<Vec<UpcomingRelease>> {
        let items = self.fetch_library().await?;
        let window = ReleaseWindow::lookahead(today, self.settings.days_ahead);
        let candidates = self.checker.check_releases(&items, &window).await;

        Ok(candidates
            .into_iter()
            .map(|release| UpcomingRelease {
                notified_on: self.store.notified_on(&release.key()),
                release,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalogSource;
    use crate::error::Error;
    use crate::metadata::{MockMetadataSource, MovieMeta};
    use crate::models::NotificationKey;
    use crate::notifier::MockNotifier;
    use mockall::Sequence;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn settings() -> CycleSettings {
        CycleSettings {
            days_ahead: 14,
            tracked_kinds: [MediaKind::Series, MediaKind::Movie].into_iter().collect(),
            retry: RetryPolicy::default(),
        }
    }

    fn movie_source(released: &'static str) -> MockMetadataSource {
        let mut source = MockMetadataSource::new();
        source.expect_movie_meta().returning(move |_| {
            Ok(MovieMeta {
                released: Some(released.to_string()),
            })
        });
        source
    }

    fn runner(
        catalog: MockCatalogSource,
        source: MockMetadataSource,
        notifier: MockNotifier,
        dir: &TempDir,
    ) -> CycleRunner {
        CycleRunner::new(
            Box::new(catalog),
            ReleaseChecker::new(Box::new(source)).with_request_delay(Duration::ZERO),
            Box::new(notifier),
            ReleaseStore::new(dir.path().join("state.json")),
            settings(),
        )
    }

    fn one_movie() -> Vec<LibraryItem> {
        vec![LibraryItem::new("tt001", "Dune", MediaKind::Movie)]
    }

    #[test]
    fn test_default_retry_policy_is_single_attempt() {
        assert_eq!(RetryPolicy::default().max_reauth_attempts, 1);
    }

    #[tokio::test]
    async fn test_retryable_fetch_failure_reauthenticates_once() {
        let dir = TempDir::new().unwrap();
        let mut seq = Sequence::new();
        let mut catalog = MockCatalogSource::new();
        catalog
            .expect_fetch_library()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(Error::Auth("session expired".to_string())));
        catalog
            .expect_authenticate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(AuthToken::new("fresh")));
        catalog
            .expect_fetch_library()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(one_movie()));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| Ok(()));

        let mut cycle = runner(catalog, movie_source("2024-05-04"), notifier, &dir);
        let summary = cycle.run_cycle(date(2024, 5, 1)).await.unwrap();

        assert_eq!(summary.notified, 1);
        assert!(cycle.store().is_notified(&NotificationKey::from("tt001")));
    }

    #[tokio::test]
    async fn test_malformed_library_response_reauthenticates() {
        let dir = TempDir::new().unwrap();
        let mut seq = Sequence::new();
        let mut catalog = MockCatalogSource::new();
        catalog
            .expect_fetch_library()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(Error::parse("datastoreGet response", "missing result field")));
        catalog
            .expect_authenticate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(AuthToken::new("fresh")));
        catalog
            .expect_fetch_library()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Vec::new()));

        let mut cycle = runner(catalog, MockMetadataSource::new(), MockNotifier::new(), &dir);
        let summary = cycle.run_cycle(date(2024, 5, 1)).await.unwrap();

        assert_eq!(summary.library_items, 0);
    }

    #[tokio::test]
    async fn test_second_fetch_failure_aborts_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let mut catalog = MockCatalogSource::new();
        catalog
            .expect_fetch_library()
            .times(2)
            .returning(|_| Err(Error::remote("Stremio", "HTTP 502")));
        catalog
            .expect_authenticate()
            .times(1)
            .returning(|| Ok(AuthToken::new("fresh")));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let mut cycle = runner(catalog, MockMetadataSource::new(), notifier, &dir);
        let result = cycle.run_cycle(date(2024, 5, 1)).await;

        assert!(result.is_err());
        assert!(cycle.store().is_empty());
        assert!(!dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn test_not_authenticated_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let mut catalog = MockCatalogSource::new();
        catalog
            .expect_fetch_library()
            .times(1)
            .returning(|_| Err(Error::NotAuthenticated));
        catalog.expect_authenticate().never();

        let mut cycle = runner(catalog, MockMetadataSource::new(), MockNotifier::new(), &dir);

        assert!(cycle.run_cycle(date(2024, 5, 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_library_skips_prune_and_save() {
        let dir = TempDir::new().unwrap();
        let mut catalog = MockCatalogSource::new();
        catalog.expect_fetch_library().returning(|_| Ok(Vec::new()));

        let mut cycle = runner(catalog, MockMetadataSource::new(), MockNotifier::new(), &dir);
        cycle
            .store_mut()
            .mark_notified(NotificationKey::from("tt999"), date(2020, 1, 1));

        let summary = cycle.run_cycle(date(2024, 5, 1)).await.unwrap();

        assert_eq!(summary, CycleSummary {
            duration: summary.duration,
            ..Default::default()
        });
        assert_eq!(cycle.store().len(), 1);
        assert!(!dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn test_failed_notification_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let mut catalog = MockCatalogSource::new();
        catalog.expect_fetch_library().returning(|_| Ok(one_movie()));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_| Err(Error::remote("Home Assistant", "HTTP 500")));

        let mut cycle = runner(catalog, movie_source("2024-05-04"), notifier, &dir);
        let summary = cycle.run_cycle(date(2024, 5, 1)).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.notified, 0);
        assert!(cycle.store().is_empty());
        // The cycle still saves after failures
        assert!(dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn test_records_notification_with_cycle_date_and_prunes() {
        let dir = TempDir::new().unwrap();
        let today = date(2024, 5, 1);
        let mut catalog = MockCatalogSource::new();
        catalog.expect_fetch_library().returning(|_| Ok(one_movie()));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| Ok(()));

        let mut cycle = runner(catalog, movie_source("2024-05-10"), notifier, &dir);
        let cutoff = today - chrono::Duration::days(RETENTION_DAYS);
        cycle
            .store_mut()
            .mark_notified(NotificationKey::from("tt-old"), cutoff - chrono::Duration::days(1));
        cycle
            .store_mut()
            .mark_notified(NotificationKey::from("tt-edge"), cutoff);

        let summary = cycle.run_cycle(today).await.unwrap();

        assert_eq!(summary.pruned, 1);
        assert_eq!(
            cycle.store().notified_on(&NotificationKey::from("tt001")),
            Some(today)
        );
        assert!(cycle.store().is_notified(&NotificationKey::from("tt-edge")));

        let reloaded = ReleaseStore::open(dir.path().join("state.json"));
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn test_upcoming_reports_notified_state_without_notifying() {
        let dir = TempDir::new().unwrap();
        let mut catalog = MockCatalogSource::new();
        catalog.expect_fetch_library().returning(|_| Ok(one_movie()));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let mut cycle = runner(catalog, movie_source("2024-05-04"), notifier, &dir);
        cycle
            .store_mut()
            .mark_notified(NotificationKey::from("tt001"), date(2024, 4, 30));

        let upcoming = cycle.upcoming(date(2024, 5, 1)).await.unwrap();

        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].notified_on, Some(date(2024, 4, 30)));
        assert!(!dir.path().join("state.json").exists());
    }
}
