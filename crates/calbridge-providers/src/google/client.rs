//! Google Calendar API client.
//!
//! Lists upcoming events and inserts new ones on behalf of the HTTP layer.
//! The access token is passed per call; the client holds no credentials.

use calbridge_core::{EventDraft, UpcomingEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::BoxFuture;
use crate::calendar::{CalendarService, CreatedEvent, ListQuery};
use crate::error::{ProviderError, ProviderResult};
use crate::retry::RetryPolicy;

use super::config::GoogleConfig;

/// Google Calendar API client.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
    retry: RetryPolicy,
}

impl GoogleCalendarClient {
    /// Creates a client for the API at `config.api_base`.
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    /// Lists upcoming events, following pagination up to `max_results`.
    pub async fn list_events(
        &self,
        access_token: &str,
        query: &ListQuery,
    ) -> ProviderResult<Vec<UpcomingEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events_page(access_token, query, page_token.as_deref())
                .await?;

            events.extend(page.items.into_iter().filter_map(convert_event));

            if events.len() >= query.max_results {
                events.truncate(query.max_results);
                break;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(
            count = events.len(),
            calendar = %query.calendar_id,
            "fetched upcoming events"
        );
        Ok(events)
    }

    async fn list_events_page(
        &self,
        access_token: &str,
        query: &ListQuery,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let mut request = self
            .http_client
            .get(self.events_url(&query.calendar_id))
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", query.time_min.to_rfc3339()),
                ("maxResults", query.max_results.to_string()),
                ("singleEvents", query.single_events.to_string()),
                ("orderBy", query.order_by.clone()),
            ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(map_send_error)?;
        let body = read_success_body(response).await?;

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse event list: {}", e))
        })
    }

    /// Inserts `draft` into `calendar_id`.
    pub async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> ProviderResult<CreatedEvent> {
        let body = NewEvent::from(draft);

        let response = self
            .http_client
            .post(self.events_url(calendar_id))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;
        let body = read_success_body(response).await?;

        let created: CreatedEvent = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse created event: {}", e))
        })?;
        debug!(id = ?created.id, calendar = calendar_id, "event created");
        Ok(created)
    }
}

impl CalendarService for GoogleCalendarClient {
    fn name(&self) -> &str {
        "google"
    }

    fn list_upcoming<'a>(
        &'a self,
        access_token: &'a str,
        query: &'a ListQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<UpcomingEvent>>> {
        Box::pin(async move {
            self.retry
                .run("list_events", || self.list_events(access_token, query))
                .await
                .map_err(|e| e.with_provider("google"))
        })
    }

    fn insert_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<CreatedEvent>> {
        Box::pin(async move {
            self.retry
                .run("insert_event", || {
                    self.create_event(access_token, calendar_id, draft)
                })
                .await
                .map_err(|e| e.with_provider("google"))
        })
    }
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    let message = if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        format!("request failed: {}", e)
    };
    ProviderError::network(message).with_source(e)
}

/// Maps non-success statuses to provider errors and returns the body otherwise.
async fn read_success_body(response: reqwest::Response) -> ProviderResult<String> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(ProviderError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(match status {
            reqwest::StatusCode::UNAUTHORIZED => {
                ProviderError::authentication("access token expired or invalid")
            }
            reqwest::StatusCode::FORBIDDEN => {
                ProviderError::authorization(format!("access denied to calendar: {}", body))
            }
            reqwest::StatusCode::NOT_FOUND => ProviderError::not_found("calendar not found"),
            reqwest::StatusCode::BAD_REQUEST => {
                ProviderError::bad_request(format!("request rejected: {}", body))
            }
            _ => ProviderError::server(format!("API error ({}): {}", status, body)),
        });
    }

    response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))
}

/// Reduces an API event to the `{start, summary}` pair; cancelled and
/// start-less events are dropped.
fn convert_event(event: ApiEvent) -> Option<UpcomingEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let start = match event.start {
        Some(ApiEventTime {
            date_time: Some(dt),
            ..
        }) => dt,
        Some(ApiEventTime { date: Some(d), .. }) => d,
        _ => {
            warn!(id = ?event.id, "event has no start time");
            return None;
        }
    };

    Some(UpcomingEvent::new(start, event.summary))
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

/// A single event from the Google Calendar API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    start: Option<ApiEventTime>,
    status: Option<String>,
}

/// Event time from the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

/// Request body for events.insert.
#[derive(Debug, Serialize)]
struct NewEvent<'a> {
    summary: &'a str,
    start: NewEventTime<'a>,
    end: NewEventTime<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewEventTime<'a> {
    date_time: String,
    time_zone: &'a str,
}

impl<'a> From<&'a EventDraft> for NewEvent<'a> {
    fn from(draft: &'a EventDraft) -> Self {
        Self {
            summary: &draft.summary,
            start: NewEventTime {
                date_time: draft.start.to_string(),
                time_zone: &draft.timezone,
            },
            end: NewEventTime {
                date_time: draft.end.to_string(),
                time_zone: &draft.timezone,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use calbridge_core::EventTimestamp;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::OAuthCredentials;

    fn client(server: &MockServer) -> GoogleCalendarClient {
        let config = GoogleConfig::new(OAuthCredentials::new(
            "test.apps.googleusercontent.com",
            "secret",
        ))
        .with_endpoints("http://unused", "http://unused", server.uri());
        GoogleCalendarClient::new(&config).unwrap().with_retry(
            RetryPolicy::default().with_backoff(
                Duration::from_millis(1),
                Duration::from_millis(1),
                1.0,
            ),
        )
    }

    fn query() -> ListQuery {
        ListQuery::upcoming("primary")
            .with_time_min(Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap())
    }

    fn draft() -> EventDraft {
        let start = EventTimestamp::parse("2024-03-15T10:00:00").unwrap();
        EventDraft::new("Team sync", start, 45, "UTC").unwrap()
    }

    #[test]
    fn convert_prefers_date_time_and_defaults_title() {
        let timed: ApiEvent = serde_json::from_value(json!({
            "id": "e1",
            "start": {"dateTime": "2024-03-15T10:00:00Z", "date": "2024-03-15"}
        }))
        .unwrap();
        let event = convert_event(timed).unwrap();
        assert_eq!(event.start, "2024-03-15T10:00:00Z");
        assert_eq!(event.summary, "No title");

        let all_day: ApiEvent = serde_json::from_value(json!({
            "summary": "Holiday",
            "start": {"date": "2024-03-16"}
        }))
        .unwrap();
        assert_eq!(convert_event(all_day).unwrap().start, "2024-03-16");
    }

    #[test]
    fn convert_drops_cancelled_and_startless_events() {
        let cancelled: ApiEvent = serde_json::from_value(json!({
            "status": "cancelled",
            "start": {"dateTime": "2024-03-15T10:00:00Z"}
        }))
        .unwrap();
        assert!(convert_event(cancelled).is_none());

        let startless: ApiEvent = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert!(convert_event(startless).is_none());
    }

    #[test]
    fn insert_body_shape() {
        let draft = draft();
        let body = serde_json::to_value(NewEvent::from(&draft)).unwrap();
        assert_eq!(
            body,
            json!({
                "summary": "Team sync",
                "start": {"dateTime": "2024-03-15T10:00:00", "timeZone": "UTC"},
                "end": {"dateTime": "2024-03-15T10:45:00", "timeZone": "UTC"}
            })
        );
    }

    #[tokio::test]
    async fn list_sends_upcoming_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer tok"))
            .and(query_param("maxResults", "10"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .and(query_param("timeMin", "2024-03-15T08:00:00+00:00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"summary": "Standup", "start": {"dateTime": "2024-03-15T09:00:00Z"}},
                    {"status": "cancelled", "start": {"dateTime": "2024-03-15T09:30:00Z"}},
                    {"start": {"date": "2024-03-16"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let events = client(&server).list_upcoming("tok", &query()).await.unwrap();
        assert_eq!(
            events,
            vec![
                UpcomingEvent::new("2024-03-15T09:00:00Z", Some("Standup".to_string())),
                UpcomingEvent::new("2024-03-16", None),
            ]
        );
    }

    #[tokio::test]
    async fn list_empty_calendar() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "calendar#events"})))
            .mount(&server)
            .await;

        let events = client(&server).list_upcoming("tok", &query()).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn list_follows_pages_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"summary": "c", "start": {"date": "2024-03-17"}},
                    {"summary": "d", "start": {"date": "2024-03-18"}}
                ]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"summary": "a", "start": {"date": "2024-03-15"}},
                    {"summary": "b", "start": {"date": "2024-03-16"}}
                ],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let events = client(&server)
            .list_upcoming("tok", &query().with_max_results(3))
            .await
            .unwrap();
        let titles: Vec<_> = events.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn list_maps_error_statuses() {
        let cases = [
            (401, ProviderErrorCode::AuthenticationFailed),
            (403, ProviderErrorCode::AuthorizationFailed),
            (404, ProviderErrorCode::NotFound),
            (429, ProviderErrorCode::RateLimited),
            (500, ProviderErrorCode::ServerError),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let err = client(&server).list_upcoming("tok", &query()).await.unwrap_err();
            assert_eq!(err.code(), expected, "status {}", status);
            assert_eq!(err.provider(), Some("google"));
        }
    }

    #[tokio::test]
    async fn list_retries_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .expect(1)
            .mount(&server)
            .await;

        let events = client(&server).list_upcoming("tok", &query()).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn list_does_not_retry_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).list_upcoming("tok", &query()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn insert_posts_event_and_relays_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/team%40example.com/events"))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(json!({
                "summary": "Team sync",
                "start": {"dateTime": "2024-03-15T10:00:00", "timeZone": "UTC"},
                "end": {"dateTime": "2024-03-15T10:45:00", "timeZone": "UTC"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "new-id",
                "summary": "Team sync",
                "htmlLink": "https://calendar.google.com/event?eid=new-id",
                "status": "confirmed"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server)
            .insert_event("tok", "team@example.com", &draft())
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some("new-id"));
        assert_eq!(created.extra["status"], "confirmed");
    }

    #[tokio::test]
    async fn insert_maps_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid timeZone"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .insert_event("tok", "primary", &draft())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::BadRequest);
        assert!(err.message().contains("invalid timeZone"));
    }
}
