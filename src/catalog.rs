//! Catalog Client - Stremio account login and library retrieval
//!
//! The library is fetched fresh every cycle. Only items of a tracked kind
//! with an IMDb id survive the fetch; anything else in the account (add-on
//! channels, custom ids, unknown types) is dropped without complaint.

use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::models::{LibraryItem, MediaKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "Stremio";

/// Only ids with this prefix can be looked up in the metadata service
pub const CATALOG_ID_PREFIX: &str = "tt";

/// Session key returned by a successful login
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the session key
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Source of the user's tracked titles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Log in and keep the session for subsequent fetches
    async fn authenticate(&mut self) -> Result<AuthToken>;

    /// Current library filtered to `kinds`; fails with
    /// [`Error::NotAuthenticated`] before a successful login
    async fn fetch_library(&self, kinds: &BTreeSet<MediaKind>) -> Result<Vec<LibraryItem>>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    #[serde(rename = "authKey")]
    auth_key: Option<String>,
}

/// Raw library entry as stored in the Stremio datastore
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLibraryItem {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: String,
}

/// HTTP client for the Stremio API
pub struct StremioClient {
    client: Client,
    api_url: String,
    email: String,
    password: String,
    token: Option<AuthToken>,
}

impl StremioClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| Error::remote(SERVICE, e))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            password: config.password.clone(),
            token: None,
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    async fn post<T>(&self, endpoint: &str, body: serde_json::Value) -> Result<ApiResponse<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.api_url, endpoint);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::remote(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(Error::remote(
                SERVICE,
                format!("HTTP {} from {}", response.status(), endpoint),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::parse(format!("{} response", endpoint), e))
    }
}

#[async_trait]
impl CatalogSource for StremioClient {
    async fn authenticate(&mut self) -> Result<AuthToken> {
        info!("Logging in to Stremio as {}", self.email);

        let body = json!({
            "type": "Login",
            "email": self.email,
            "password": self.password,
            "facebook": false,
        });
        let response: ApiResponse<LoginResult> = self.post("login", body).await?;

        let token = response
            .result
            .and_then(|r| r.auth_key)
            .filter(|key| !key.is_empty())
            .map(AuthToken::new)
            .ok_or_else(|| Error::Auth(describe_error(response.error.as_ref())))?;

        self.token = Some(token.clone());
        info!("Stremio login successful");
        Ok(token)
    }

    async fn fetch_library(&self, kinds: &BTreeSet<MediaKind>) -> Result<Vec<LibraryItem>> {
        let token = self.token.as_ref().ok_or(Error::NotAuthenticated)?;

        info!("Fetching Stremio library");
        let body = json!({
            "authKey": token.as_str(),
            "collection": "libraryItem",
            "all": true,
            "ids": [],
        });
        let response: ApiResponse<Vec<RawLibraryItem>> = self.post("datastoreGet", body).await?;

        let raw = match (response.result, response.error) {
            (Some(items), _) => items,
            (None, Some(error)) => return Err(Error::Auth(describe_error(Some(&error)))),
            (None, None) => {
                return Err(Error::parse(
                    "datastoreGet response",
                    "missing result field",
                ))
            }
        };

        let total = raw.len();
        let items = filter_library(raw, kinds);
        info!(
            "Found {} library items matching {:?} ({} total)",
            items.len(),
            kinds,
            total
        );
        Ok(items)
    }
}

/// Keep tracked kinds with catalog ids, in datastore order
pub fn filter_library(raw: Vec<RawLibraryItem>, kinds: &BTreeSet<MediaKind>) -> Vec<LibraryItem> {
    raw.into_iter()
        .filter_map(|entry| {
            let kind = MediaKind::parse(&entry.item_type).filter(|k| kinds.contains(k))?;
            if !entry.id.starts_with(CATALOG_ID_PREFIX) {
                debug!("Ignoring library entry with non-catalog id: {}", entry.id);
                return None;
            }
            let name = entry
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Unknown".to_string());
            Some(LibraryItem::new(entry.id, name, kind))
        })
        .collect()
}

fn describe_error(error: Option<&serde_json::Value>) -> String {
    match error {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(serde_json::Value::Object(map)) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| serde_json::Value::Object(map.clone()).to_string()),
        Some(other) => other.to_string(),
        None => "Unknown error".to_string(),
    }
}
