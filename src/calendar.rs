//! Google Calendar v3 event insertion

use crate::event::EventRequest;
use crate::FaturaError;
use reqwest::blocking::Client;
use serde::Deserialize;

pub const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Subset of the created `Event` resource we care about
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertedEvent {
    pub id: Option<String>,
    pub html_link: String,
}

/// Authorized client for one calendar session
#[derive(Debug, Clone)]
pub struct CalendarClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl CalendarClient {
    pub fn new(access_token: &str) -> Result<Self, FaturaError> {
        Self::with_base_url(access_token, API_BASE)
    }

    /// Client talking to another API root, e.g. a local stub server
    pub fn with_base_url(access_token: &str, base_url: &str) -> Result<Self, FaturaError> {
        let client = Client::builder()
            .user_agent(concat!("fatura-calendar/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            access_token: access_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events?sendUpdates=all",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    /// Create an event and return its link in the Calendar web UI
    pub fn insert_event(
        &self,
        calendar_id: &str,
        event: &EventRequest,
    ) -> Result<String, FaturaError> {
        let response = self
            .client
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(event)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(FaturaError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let inserted: InsertedEvent = serde_json::from_str(&body)?;
        log::debug!("Inserted event {:?}", inserted.id);
        Ok(inserted.html_link)
    }
}
