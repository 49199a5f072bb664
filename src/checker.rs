//! Release Checker - finds library items releasing inside the lookahead window
//!
//! Every item is looked up on its own. A failed lookup is logged and the
//! item skipped; the rest of the batch still runs. Lookups are sequential
//! and spaced by a fixed delay to stay polite to the shared metadata service.

use crate::error::{Error, Result};
use crate::metadata::{MetadataSource, MovieMeta, SeriesMeta};
use crate::models::{LibraryItem, MediaKind, ReleaseCandidate};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default spacing between consecutive metadata lookups
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(500);

/// Inclusive date range `[start, end]` in which a release counts as upcoming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReleaseWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `[today, today + days_ahead]`, capped at the last representable date
    pub fn lookahead(today: NaiveDate, days_ahead: u32) -> Self {
        Self {
            start: today,
            end: today
                .checked_add_signed(chrono::Duration::days(days_ahead as i64))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Parse a release timestamp into a calendar date
///
/// Accepts RFC 3339 (a trailing `Z` is UTC), offset-less ISO date-times and
/// plain `YYYY-MM-DD`. The date is taken as written, without converting
/// between offsets.
pub fn parse_release_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| Error::parse(format!("release date {:?}", raw), e))
}

/// Episodes of `item` releasing inside `window`
///
/// Videos without a parseable date or without both season and episode
/// numbers are skipped.
pub fn series_releases(
    item: &LibraryItem,
    meta: &SeriesMeta,
    window: &ReleaseWindow,
) -> Vec<ReleaseCandidate> {
    let mut releases = Vec::new();

    for video in &meta.videos {
        let Some(raw) = video.released.as_deref() else {
            continue;
        };
        let released = match parse_release_date(raw) {
            Ok(date) => date,
            Err(e) => {
                debug!("{} ({}): {}", item.name, item.id, e);
                continue;
            }
        };
        if !window.contains(released) {
            continue;
        }

        match (video.season, video.episode_number()) {
            (Some(season), Some(episode)) => releases.push(ReleaseCandidate::episode(
                item,
                released,
                season,
                episode,
                video.episode_title(),
            )),
            _ => debug!(
                "Skipping video of {} on {} without season/episode numbers",
                item.id, released
            ),
        }
    }

    releases
}

/// The movie itself, if its release date falls inside `window`
pub fn movie_release(
    item: &LibraryItem,
    meta: &MovieMeta,
    window: &ReleaseWindow,
) -> Option<ReleaseCandidate> {
    let raw = meta.released.as_deref()?;
    let released = match parse_release_date(raw) {
        Ok(date) => date,
        Err(e) => {
            debug!("{} ({}): {}", item.name, item.id, e);
            return None;
        }
    };

    window
        .contains(released)
        .then(|| ReleaseCandidate::title(item, released))
}

/// Cross-references library items against release metadata
pub struct ReleaseChecker {
    source: Box<dyn MetadataSource>,
    request_delay: Duration,
}

impl ReleaseChecker {
    pub fn new(source: Box<dyn MetadataSource>) -> Self {
        Self {
            source,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    /// Set the minimum spacing between lookups; zero disables it
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    /// Upcoming releases for every item, in library order
    pub async fn check_releases(
        &self,
        items: &[LibraryItem],
        window: &ReleaseWindow,
    ) -> Vec<ReleaseCandidate> {
        let mut releases = Vec::new();

        for (i, item) in items.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            match self.check_item(item, window).await {
                Ok(found) => releases.extend(found),
                Err(e) => warn!(
                    "Failed to check releases for {} ({}): {}",
                    item.name, item.id, e
                ),
            }
        }

        info!(
            "Found {} upcoming releases across {} items ({} to {})",
            releases.len(),
            items.len(),
            window.start,
            window.end
        );
        releases
    }

    async fn check_item(
        &self,
        item: &LibraryItem,
        window: &ReleaseWindow,
    ) -> Result<Vec<ReleaseCandidate>> {
        match item.kind {
            MediaKind::Series => {
                let meta = self.source.series_meta(&item.id).await?;
                Ok(series_releases(item, &meta, window))
            }
            MediaKind::Movie => {
                let meta = self.source.movie_meta(&item.id).await?;
                Ok(movie_release(item, &meta, window).into_iter().collect())
            }
        }
    }
}
