//! Common test utilities and fakes for ReleaseSentry tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use releasesentry::cycle::{CycleRunner, CycleSettings, RetryPolicy};
use releasesentry::{
    AuthToken, CatalogSource, Error, LibraryItem, MediaKind, MetadataSource, MovieMeta,
    NotificationKey, Notifier, ReleaseCandidate, ReleaseChecker, ReleaseStore, Result, SeriesMeta,
    VideoEntry,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Temporary directory holding a config file and a state file
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub state_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let state_path = temp_dir.path().join("state").join("created_events.json");
        Self {
            temp_dir,
            state_path,
        }
    }

    pub fn create_test_config(&self, content: &str) -> PathBuf {
        let config_path = self.temp_dir.path().join("config.yml");
        std::fs::write(&config_path, content).expect("Failed to write test config");
        config_path
    }

    /// Config with credentials and a state file inside the temp dir
    pub fn create_minimal_config(&self) -> PathBuf {
        let config_content = format!(
            r#"
catalog:
  email: "user@example.com"
  password: "secret"
state:
  path: "{}"
logging:
  color: false
"#,
            self.state_path.display()
        );
        self.create_test_config(&config_content)
    }

    pub fn write_state(&self, content: &str) {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create state dir");
        }
        std::fs::write(&self.state_path, content).expect("Failed to write state file");
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn iso(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date)
}

#[derive(Default)]
struct CatalogState {
    library: Vec<LibraryItem>,
    authenticated: bool,
    failing_fetches: usize,
    logins: usize,
    fetches: usize,
}

/// Scripted catalog: a fixed library and a number of fetches to fail
#[derive(Clone, Default)]
pub struct FakeCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl FakeCatalog {
    pub fn new(library: Vec<LibraryItem>) -> Self {
        let catalog = Self::default();
        catalog.state.lock().unwrap().library = library;
        catalog
    }

    /// Mark the session as already established
    pub fn logged_in(self) -> Self {
        self.state.lock().unwrap().authenticated = true;
        self
    }

    /// Fail the next `count` fetches with an auth error
    pub fn fail_next_fetches(&self, count: usize) {
        self.state.lock().unwrap().failing_fetches = count;
    }

    pub fn set_library(&self, library: Vec<LibraryItem>) {
        self.state.lock().unwrap().library = library;
    }

    pub fn logins(&self) -> usize {
        self.state.lock().unwrap().logins
    }

    pub fn fetches(&self) -> usize {
        self.state.lock().unwrap().fetches
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn authenticate(&mut self) -> Result<AuthToken> {
        let mut state = self.state.lock().unwrap();
        state.logins += 1;
        state.authenticated = true;
        Ok(AuthToken::new(format!("key-{}", state.logins)))
    }

    async fn fetch_library(&self, kinds: &BTreeSet<MediaKind>) -> Result<Vec<LibraryItem>> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;
        if !state.authenticated {
            return Err(Error::NotAuthenticated);
        }
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(Error::Auth("session expired".to_string()));
        }
        Ok(state
            .library
            .iter()
            .filter(|item| kinds.contains(&item.kind))
            .cloned()
            .collect())
    }
}

/// In-memory metadata keyed by id; unknown ids fail like a 404
#[derive(Clone, Default)]
pub struct FakeMetadata {
    series: HashMap<String, SeriesMeta>,
    movies: HashMap<String, MovieMeta>,
}

impl FakeMetadata {
    pub fn with_movie(mut self, id: &str, released: NaiveDate) -> Self {
        self.movies.insert(
            id.to_string(),
            MovieMeta {
                released: Some(iso(released)),
            },
        );
        self
    }

    /// Episodes as `(release date, season, episode number)`
    pub fn with_series(mut self, id: &str, episodes: &[(NaiveDate, Option<u32>, Option<u32>)]) -> Self {
        let videos = episodes
            .iter()
            .map(|(released, season, number)| VideoEntry {
                released: Some(iso(*released)),
                season: *season,
                number: *number,
                ..Default::default()
            })
            .collect();
        self.series.insert(id.to_string(), SeriesMeta { videos });
        self
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn series_meta(&self, id: &str) -> Result<SeriesMeta> {
        self.series
            .get(id)
            .cloned()
            .ok_or_else(|| Error::remote("Cinemeta", format!("HTTP 404 for series {}", id)))
    }

    async fn movie_meta(&self, id: &str) -> Result<MovieMeta> {
        self.movies
            .get(id)
            .cloned()
            .ok_or_else(|| Error::remote("Cinemeta", format!("HTTP 404 for movie {}", id)))
    }
}

#[derive(Default)]
struct NotifierState {
    sent: Vec<ReleaseCandidate>,
    failing: HashSet<NotificationKey>,
}

/// Records every successful notification; selected keys can be made to fail
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl RecordingNotifier {
    pub fn fail_for(&self, key: &str) {
        self.state.lock().unwrap().failing.insert(NotificationKey::from(key));
    }

    pub fn recover(&self, key: &str) {
        self.state.lock().unwrap().failing.remove(&NotificationKey::from(key));
    }

    pub fn sent_keys(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|r| r.key().to_string())
            .collect()
    }

    pub fn sent(&self) -> Vec<ReleaseCandidate> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, release: &ReleaseCandidate) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(&release.key()) {
            return Err(Error::remote("Home Assistant", "HTTP 500 creating event"));
        }
        state.sent.push(release.clone());
        Ok(())
    }
}

/// Runner over fakes with both kinds tracked and no request delay
pub fn test_runner(
    catalog: &FakeCatalog,
    metadata: FakeMetadata,
    notifier: &RecordingNotifier,
    state_path: &Path,
    days_ahead: u32,
) -> CycleRunner {
    CycleRunner::new(
        Box::new(catalog.clone()),
        ReleaseChecker::new(Box::new(metadata)).with_request_delay(Duration::ZERO),
        Box::new(notifier.clone()),
        ReleaseStore::open(state_path),
        CycleSettings {
            days_ahead,
            tracked_kinds: [MediaKind::Series, MediaKind::Movie].into_iter().collect(),
            retry: RetryPolicy::default(),
        },
    )
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
