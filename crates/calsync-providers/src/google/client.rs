//! Google Calendar v3 implementation of [`CalendarApi`].

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{RetryingClient, error_for_status};
use crate::remote::{
    AccessRole, BoxFuture, CalendarApi, CalendarPage, DeleteOutcome, EventDraft, EventPage,
    EventPageRequest, EventQuery, RemoteCalendar, RemoteEvent, RemoteEventTime,
};

use super::config::GoogleConfig;

const PROVIDER: &str = "google";

/// Calendar v3 REST client. Every call goes through a [`RetryingClient`].
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http: RetryingClient,
}

impl GoogleCalendarClient {
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        let http = RetryingClient::builder(&config.api_base_url)
            .timeout(config.timeout)
            .max_retries(config.max_retries)
            .base_delay(config.base_delay)
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self::with_client(http))
    }

    pub fn with_client(http: RetryingClient) -> Self {
        Self { http }
    }

    async fn send(
        &self,
        token: &str,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> ProviderResult<Response> {
        let response = self
            .http
            .request(token, method, path, params, body)
            .await
            .map_err(|e| e.with_provider(PROVIDER))?;
        Ok(response)
    }

    async fn fetch_calendars(
        &self,
        token: &str,
        page_token: Option<&str>,
    ) -> ProviderResult<CalendarPage> {
        let mut params = Vec::new();
        if let Some(page_token) = page_token {
            params.push(("pageToken", page_token.to_string()));
        }
        let response = self
            .send(token, Method::GET, "/users/me/calendarList", &params, None)
            .await?;
        let list: CalendarListResponse = parse_json(response).await?;

        let calendars = list
            .items
            .into_iter()
            .map(|entry| RemoteCalendar {
                name: entry.summary_override.or(entry.summary).unwrap_or_else(|| entry.id.clone()),
                access_role: entry
                    .access_role
                    .as_deref()
                    .map(AccessRole::parse)
                    .unwrap_or(AccessRole::Unknown),
                primary: entry.primary,
                id: entry.id,
            })
            .collect();

        Ok(CalendarPage {
            calendars,
            next_page_token: list.next_page_token,
        })
    }

    #[instrument(skip(self, token, request), fields(incremental = request.query.is_incremental()))]
    async fn fetch_events(
        &self,
        token: &str,
        calendar_id: &str,
        request: &EventPageRequest,
    ) -> ProviderResult<EventPage> {
        let mut params = vec![
            ("singleEvents", "true".to_string()),
            ("showDeleted", "true".to_string()),
            ("maxResults", request.max_results.to_string()),
        ];
        match &request.query {
            EventQuery::Incremental { sync_token } => {
                params.push(("syncToken", sync_token.clone()));
            }
            EventQuery::Window { time_min, time_max } => {
                params.push(("timeMin", time_min.to_rfc3339()));
                params.push(("timeMax", time_max.to_rfc3339()));
            }
        }
        if let Some(page_token) = &request.page_token {
            params.push(("pageToken", page_token.clone()));
        }

        let response = self
            .send(token, Method::GET, &events_path(calendar_id), &params, None)
            .await?;
        let list: EventListResponse = parse_json(response).await?;

        let mut items = Vec::with_capacity(list.items.len());
        for event in list.items {
            match event.into_remote() {
                Ok(event) => items.push(event),
                Err(e) => warn!(calendar_id, error = %e, "skipping malformed event"),
            }
        }
        debug!(
            calendar_id,
            count = items.len(),
            more = list.next_page_token.is_some(),
            "fetched event page"
        );

        Ok(EventPage {
            items,
            next_page_token: list.next_page_token,
            next_sync_token: list.next_sync_token,
        })
    }

    async fn write_event(
        &self,
        token: &str,
        method: Method,
        path: String,
        draft: &EventDraft,
    ) -> ProviderResult<RemoteEvent> {
        let body = event_payload(draft)?;
        let response = self.send(token, method, &path, &[], Some(&body)).await?;
        let event: ApiEvent = parse_json(response).await?;
        event.into_remote().map_err(|e| e.with_provider(PROVIDER))
    }

    async fn remove_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> ProviderResult<DeleteOutcome> {
        let path = event_path(calendar_id, event_id);
        let response = self.send(token, Method::DELETE, &path, &[], None).await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                debug!(calendar_id, event_id, "event already gone");
                Ok(DeleteOutcome::AlreadyGone)
            }
            _ => {
                error_for_status(response)
                    .await
                    .map_err(|e| e.with_provider(PROVIDER))?;
                Ok(DeleteOutcome::Deleted)
            }
        }
    }
}

impl CalendarApi for GoogleCalendarClient {
    fn list_calendars<'a>(
        &'a self,
        token: &'a str,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<CalendarPage>> {
        Box::pin(self.fetch_calendars(token, page_token))
    }

    fn list_events<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        request: &'a EventPageRequest,
    ) -> BoxFuture<'a, ProviderResult<EventPage>> {
        Box::pin(self.fetch_events(token, calendar_id, request))
    }

    fn create_event<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        Box::pin(self.write_event(token, Method::POST, events_path(calendar_id), draft))
    }

    fn patch_event<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        Box::pin(self.write_event(token, Method::PATCH, event_path(calendar_id, event_id), draft))
    }

    fn delete_event<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<DeleteOutcome>> {
        Box::pin(self.remove_event(token, calendar_id, event_id))
    }
}

fn events_path(calendar_id: &str) -> String {
    format!("/calendars/{}/events", urlencoding::encode(calendar_id))
}

fn event_path(calendar_id: &str, event_id: &str) -> String {
    format!(
        "/calendars/{}/events/{}",
        urlencoding::encode(calendar_id),
        urlencoding::encode(event_id)
    )
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> ProviderResult<T> {
    let response = error_for_status(response)
        .await
        .map_err(|e| e.with_provider(PROVIDER))?;
    let body = response.text().await.map_err(|e| {
        ProviderError::network(format!("failed to read response: {}", e)).with_provider(PROVIDER)
    })?;
    serde_json::from_str(&body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse response: {}", e))
            .with_provider(PROVIDER)
    })
}

/// Request body for insert and patch.
///
/// Both `date` and `dateTime` are always sent so that a patch switching an
/// event between all-day and timed clears the other field.
fn event_payload(draft: &EventDraft) -> ProviderResult<serde_json::Value> {
    let payload = ApiEventWrite {
        summary: &draft.summary,
        start: ApiEventTimeWrite::from(draft.start),
        end: ApiEventTimeWrite::from(draft.end),
    };
    serde_json::to_value(payload)
        .map_err(|e| ProviderError::internal(format!("failed to encode event: {}", e)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventWrite<'a> {
    summary: &'a str,
    start: ApiEventTimeWrite,
    end: ApiEventTimeWrite,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTimeWrite {
    date: Option<String>,
    date_time: Option<String>,
}

impl From<RemoteEventTime> for ApiEventTimeWrite {
    fn from(time: RemoteEventTime) -> Self {
        match time {
            RemoteEventTime::Date(date) => Self {
                date: Some(date.format("%Y-%m-%d").to_string()),
                date_time: None,
            },
            RemoteEventTime::DateTime(dt) => Self {
                date: None,
                date_time: Some(dt.to_rfc3339()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    status: Option<String>,
    summary: Option<String>,
    start: Option<ApiEventTime>,
    end: Option<ApiEventTime>,
    updated: Option<String>,
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

impl ApiEventTime {
    fn parse(&self) -> ProviderResult<Option<RemoteEventTime>> {
        if let Some(dt) = &self.date_time {
            let parsed = DateTime::parse_from_rfc3339(dt).map_err(|e| {
                ProviderError::invalid_response(format!("bad dateTime {:?}: {}", dt, e))
            })?;
            return Ok(Some(RemoteEventTime::DateTime(parsed)));
        }
        if let Some(date) = &self.date {
            let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
                ProviderError::invalid_response(format!("bad date {:?}: {}", date, e))
            })?;
            return Ok(Some(RemoteEventTime::Date(parsed)));
        }
        Ok(None)
    }
}

impl ApiEvent {
    fn into_remote(self) -> ProviderResult<RemoteEvent> {
        let id = self
            .id
            .ok_or_else(|| ProviderError::invalid_response("event without id"))?;
        let cancelled = self.status.as_deref() == Some("cancelled");

        let start = self.start.as_ref().map(ApiEventTime::parse).transpose()?.flatten();
        let end = self.end.as_ref().map(ApiEventTime::parse).transpose()?.flatten();
        if !cancelled && start.is_none() {
            return Err(ProviderError::invalid_response(format!(
                "event {} has no start",
                id
            )));
        }

        // An unparseable `updated` is treated as unknown rather than fatal.
        let updated = self.updated.as_deref().and_then(|u| {
            DateTime::parse_from_rfc3339(u)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| warn!(event_id = %id, error = %e, "bad updated timestamp"))
                .ok()
        });

        Ok(RemoteEvent {
            id,
            cancelled,
            summary: self.summary.unwrap_or_default(),
            start,
            end,
            updated,
            etag: self.etag,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
    summary_override: Option<String>,
    access_role: Option<String>,
    #[serde(default)]
    primary: bool,
}
