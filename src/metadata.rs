//! Release metadata source (Cinemeta)
//!
//! The release checker only needs two lookups: the video list of a series
//! and the release date of a movie. [`MetadataSource`] is that boundary;
//! [`CinemetaClient`] implements it over HTTP.

use crate::config::MetadataConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "Cinemeta";

/// One entry of a series' video list
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VideoEntry {
    /// Release timestamp as sent by the service, unparsed
    #[serde(default)]
    pub released: Option<String>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl VideoEntry {
    /// Episode number, preferring `number` over the legacy `episode` field
    pub fn episode_number(&self) -> Option<u32> {
        // Some entries carry number 0 with the real episode elsewhere
        self.number.filter(|n| *n != 0).or(self.episode)
    }

    /// Episode title, preferring `name` over `title`; blank titles count as absent
    pub fn episode_title(&self) -> Option<String> {
        [&self.name, &self.title]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Series metadata: every known video with its release timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesMeta {
    pub videos: Vec<VideoEntry>,
}

/// Movie metadata: at most one release timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieMeta {
    pub released: Option<String>,
}

/// Lookup of release metadata by kind and external id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn series_meta(&self, id: &str) -> Result<SeriesMeta>;

    async fn movie_meta(&self, id: &str) -> Result<MovieMeta>;
}

#[derive(Debug, Deserialize)]
struct MetaEnvelope<T> {
    meta: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSeriesMeta {
    #[serde(default)]
    videos: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMovieMeta {
    #[serde(default)]
    released: Option<String>,
}

/// HTTP client for the Cinemeta addon
pub struct CinemetaClient {
    client: Client,
    base_url: String,
}

impl CinemetaClient {
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| Error::remote(SERVICE, e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_meta<T>(&self, kind: &str, id: &str) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}/{}.json", self.base_url, kind, id);
        debug!("Fetching {} metadata: {}", kind, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::remote(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(Error::remote(
                SERVICE,
                format!("HTTP {} for {} {}", response.status(), kind, id),
            ));
        }

        let envelope: MetaEnvelope<T> = response
            .json()
            .await
            .map_err(|e| Error::parse(format!("{} metadata for {}", kind, id), e))?;

        Ok(envelope.meta)
    }
}

#[async_trait]
impl MetadataSource for CinemetaClient {
    async fn series_meta(&self, id: &str) -> Result<SeriesMeta> {
        let raw: RawSeriesMeta = self.get_meta("series", id).await?.unwrap_or_default();
        Ok(SeriesMeta {
            videos: parse_videos(id, raw.videos),
        })
    }

    async fn movie_meta(&self, id: &str) -> Result<MovieMeta> {
        let raw: RawMovieMeta = self.get_meta("movie", id).await?.unwrap_or_default();
        Ok(MovieMeta {
            released: raw.released,
        })
    }
}

/// Decode each video independently so one malformed entry only loses itself
fn parse_videos(id: &str, raw: Vec<serde_json::Value>) -> Vec<VideoEntry> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<VideoEntry>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping malformed video entry for {}: {}", id, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_videos_skips_malformed_entries() {
        let raw = vec![
            json!({"released": "2024-05-01T00:00:00.000Z", "season": 1, "number": 2}),
            json!({"released": "2024-05-08T00:00:00.000Z", "season": "one", "number": 3}),
            json!({"season": 1, "episode": 4, "title": "Finale"}),
        ];

        let videos = parse_videos("tt001", raw);

        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].episode_number(), Some(2));
        assert_eq!(videos[1].episode_number(), Some(4));
        assert_eq!(videos[1].released, None);
    }

    #[test]
    fn test_episode_title_fallbacks() {
        let entry = VideoEntry {
            name: Some("  ".to_string()),
            title: Some("Pilot".to_string()),
            ..Default::default()
        };
        assert_eq!(entry.episode_title(), Some("Pilot".to_string()));

        let entry = VideoEntry {
            name: Some("Winter Is Coming".to_string()),
            title: Some("Pilot".to_string()),
            ..Default::default()
        };
        assert_eq!(entry.episode_title(), Some("Winter Is Coming".to_string()));

        assert_eq!(VideoEntry::default().episode_title(), None);
    }

    #[test]
    fn test_number_preferred_over_episode() {
        let entry = VideoEntry {
            number: Some(5),
            episode: Some(9),
            ..Default::default()
        };
        assert_eq!(entry.episode_number(), Some(5));
    }

    #[test]
    fn test_zero_number_falls_back_to_episode() {
        let entry = VideoEntry {
            number: Some(0),
            episode: Some(3),
            ..Default::default()
        };
        assert_eq!(entry.episode_number(), Some(3));

        let entry = VideoEntry {
            number: Some(0),
            ..Default::default()
        };
        assert_eq!(entry.episode_number(), None);
    }
}
