//! Domain types flowing through a check cycle
//!
//! Library items come from the catalog, release candidates come out of the
//! release checker, and notification keys are what the release store
//! remembers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a tracked title
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Series,
    Movie,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Series => "series",
            MediaKind::Movie => "movie",
        }
    }

    /// Parse the catalog's type string, accepting the plural "movies"
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "series" => Some(MediaKind::Series),
            "movie" | "movies" => Some(MediaKind::Movie),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One title tracked in the user's library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryItem {
    /// External catalog id (IMDb, e.g. "tt0944947")
    pub id: String,
    pub name: String,
    pub kind: MediaKind,
}

impl LibraryItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}

/// Season/episode coordinates of a series release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRef {
    pub season: u32,
    pub episode: u32,
    pub title: Option<String>,
}

/// One upcoming release inside the lookahead window
///
/// Season and episode travel together in [`EpisodeRef`], and only
/// [`ReleaseCandidate::episode`] produces one, so an episode always belongs
/// to a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCandidate {
    pub id: String,
    pub name: String,
    pub kind: MediaKind,
    pub release_date: NaiveDate,
    pub episode: Option<EpisodeRef>,
}

impl ReleaseCandidate {
    /// A whole-title release (movies)
    pub fn title(item: &LibraryItem, release_date: NaiveDate) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            kind: item.kind,
            release_date,
            episode: None,
        }
    }

    /// A single episode of a series
    pub fn episode(
        item: &LibraryItem,
        release_date: NaiveDate,
        season: u32,
        episode: u32,
        title: Option<String>,
    ) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            kind: MediaKind::Series,
            release_date,
            episode: Some(EpisodeRef {
                season,
                episode,
                title,
            }),
        }
    }

    /// Dedup identity of this release
    pub fn key(&self) -> NotificationKey {
        NotificationKey::for_release(self)
    }

    /// Calendar event title
    pub fn summary(&self) -> String {
        match (&self.kind, &self.episode) {
            (MediaKind::Series, Some(ep)) => {
                let mut title = format!("{} S{:02}E{:02}", self.name, ep.season, ep.episode);
                if let Some(name) = &ep.title {
                    title.push_str(" - ");
                    title.push_str(name);
                }
                format!("New Episode: {}", title)
            }
            _ => format!("New Movie: {}", self.name),
        }
    }

    /// Calendar event body
    pub fn description(&self) -> String {
        let kind = match self.kind {
            MediaKind::Series => "Series",
            MediaKind::Movie => "Movie",
        };
        let mut lines = vec![format!("Type: {}", kind)];
        if let Some(ep) = &self.episode {
            lines.push(format!("Season {}, Episode {}", ep.season, ep.episode));
        }
        lines.push(format!("IMDb: https://www.imdb.com/title/{}/", self.id));
        lines.join("\n")
    }
}

/// Deterministic dedup identity for one release event
///
/// `tt0944947:S08E06` for an episode, the bare id otherwise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationKey(String);

impl NotificationKey {
    pub fn for_release(release: &ReleaseCandidate) -> Self {
        match (&release.kind, &release.episode) {
            (MediaKind::Series, Some(ep)) => Self(format!(
                "{}:S{:02}E{:02}",
                release.id, ep.season, ep.episode
            )),
            _ => Self(release.id.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NotificationKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NotificationKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
