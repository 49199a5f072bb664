//! Notifier - Home Assistant calendar events for detected releases
//!
//! Each release becomes an all-day event spanning its release date
//! (end date is exclusive, so start + 1 day).

use crate::config::CalendarConfig;
use crate::error::{Error, Result};
use crate::models::ReleaseCandidate;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "Home Assistant";

/// Sink that announces a release
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, release: &ReleaseCandidate) -> Result<()>;
}

/// Payload of the `calendar.create_event` service call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    #[serde(rename = "entity_id")]
    pub calendar_id: String,
    #[serde(rename = "summary")]
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CalendarEvent {
    pub fn for_release(calendar_id: &str, release: &ReleaseCandidate) -> Self {
        Self {
            calendar_id: calendar_id.to_string(),
            title: release.summary(),
            description: release.description(),
            start_date: release.release_date,
            end_date: release.release_date + chrono::Duration::days(1),
        }
    }
}

/// Home Assistant REST API client scoped to one calendar entity
pub struct HomeAssistantCalendar {
    client: Client,
    base_url: String,
    token: String,
    calendar_id: String,
}

impl HomeAssistantCalendar {
    pub fn new(config: &CalendarConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| Error::remote(SERVICE, e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            calendar_id: config.calendar_id.clone(),
        })
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    /// Verify the API answers with our token
    pub async fn check_connection(&self) -> Result<()> {
        info!("Checking Home Assistant API connection");

        let response = self
            .client
            .get(format!("{}/api/", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::remote(SERVICE, e))?;

        match response.status() {
            status if status.is_success() => {
                info!("Home Assistant API is reachable");
                Ok(())
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => Err(
                Error::Auth(format!("Home Assistant rejected the token ({})", response.status())),
            ),
            status => Err(Error::remote(SERVICE, format!("HTTP {} from /api/", status))),
        }
    }

    pub async fn create_event(&self, event: &CalendarEvent) -> Result<()> {
        let url = format!("{}/api/services/calendar/create_event", self.base_url);
        debug!("Creating calendar event: {:?}", event);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(event)
            .send()
            .await
            .map_err(|e| Error::remote(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(
                SERVICE,
                format!("HTTP {} creating event: {}", status, body.trim()),
            ));
        }

        info!("Created calendar event: {} on {}", event.title, event.start_date);
        Ok(())
    }
}

#[async_trait]
impl Notifier for HomeAssistantCalendar {
    async fn notify(&self, release: &ReleaseCandidate) -> Result<()> {
        let event = CalendarEvent::for_release(&self.calendar_id, release);
        self.create_event(&event).await
    }
}
