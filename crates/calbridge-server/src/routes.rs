//! HTTP routes.
//!
//! | Method | Path           | Response                                  |
//! |--------|----------------|-------------------------------------------|
//! | GET    | `/get-events`  | `[{start, summary}, ...]`                 |
//! | POST   | `/add-event`   | `{status: "Event created", event}`        |
//! | GET    | `/auth/status` | `{status, persistence_error}`             |
//! | GET    | `/health`      | `{status: "ok"}`                          |
//!
//! Request validation happens before credentials are acquired, so a
//! malformed request never triggers a refresh or a consent flow.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use calbridge_core::{DraftError, EventDraft, UpcomingEvent};
use calbridge_providers::{CalendarService, CredentialManager, ListQuery};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{ServerError, ServerResult};

/// Shared state handed to every handler.
pub struct AppState {
    /// Produces a valid token before every calendar call.
    pub credentials: Arc<CredentialManager>,
    /// The calendar backend.
    pub calendar: Arc<dyn CalendarService>,
    /// Calendar read and written by the endpoints.
    pub calendar_id: String,
    /// Number of events returned by `/get-events`.
    pub max_results: usize,
    /// Timezone attached to created events.
    pub timezone: String,
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/get-events", get(get_events))
        .route("/add-event", post(add_event))
        .route("/auth/status", get(auth_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_events(State(state): State<Arc<AppState>>) -> ServerResult<Json<Vec<UpcomingEvent>>> {
    let token = state
        .credentials
        .acquire()
        .await
        .map_err(ServerError::Credentials)?;

    let query = ListQuery::upcoming(&state.calendar_id).with_max_results(state.max_results);
    let events = state
        .calendar
        .list_upcoming(&token.access_token, &query)
        .await
        .map_err(ServerError::Upstream)?;

    Ok(Json(events))
}

/// Body of `POST /add-event`.
#[derive(Debug, Deserialize)]
struct AddEventRequest {
    title: Option<String>,
    start_time: Option<String>,
    duration: Option<DurationField>,
}

/// Minutes, as a JSON number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationField {
    Minutes(i64),
    Text(String),
}

impl DurationField {
    fn minutes(&self) -> Result<i64, DraftError> {
        match self {
            Self::Minutes(n) => Ok(*n),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| DraftError::InvalidDuration(s.clone())),
        }
    }
}

impl AddEventRequest {
    fn into_draft(self, timezone: &str) -> Result<EventDraft, DraftError> {
        let title = self.title.as_deref();
        let start_time = self.start_time.as_deref();

        let duration = match self.duration.as_ref().map(DurationField::minutes).transpose() {
            Ok(duration) => duration,
            Err(e) => {
                // Missing fields and a bad start time are reported first.
                EventDraft::from_request(title, start_time, None, timezone)?;
                return Err(e);
            }
        };

        EventDraft::from_request(title, start_time, duration, timezone)
    }
}

async fn add_event(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddEventRequest>, JsonRejection>,
) -> ServerResult<Json<Value>> {
    let Json(request) =
        payload.map_err(|rejection| ServerError::MalformedRequest(rejection.body_text()))?;
    let draft = request.into_draft(&state.timezone)?;

    let token = state
        .credentials
        .acquire()
        .await
        .map_err(ServerError::Credentials)?;

    let event = state
        .calendar
        .insert_event(&token.access_token, &state.calendar_id, &draft)
        .await
        .map_err(ServerError::Upstream)?;

    info!(id = ?event.id, summary = %draft.summary, start = %draft.start, "event created");
    Ok(Json(json!({ "status": "Event created", "event": event })))
}

async fn auth_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": state.credentials.status(),
        "persistence_error": state.credentials.last_persistence_error(),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use calbridge_providers::{
        AuthorizationServer, AuthorizationToken, BoxFuture, CreatedEvent, MemoryTokenStore,
        ProviderError, ProviderErrorCode, ProviderResult, RefreshedAccess,
    };
    use chrono::TimeDelta;
    use tower::ServiceExt;

    use super::*;

    const SCOPE: &str = "https://www.googleapis.com/auth/calendar";

    /// Authorization server that answers every consent flow the same way.
    struct StubAuthServer {
        outcome: Option<ProviderErrorCode>,
        calls: AtomicUsize,
    }

    impl StubAuthServer {
        fn granting() -> Arc<Self> {
            Arc::new(Self {
                outcome: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(code: ProviderErrorCode) -> Arc<Self> {
            Arc::new(Self {
                outcome: Some(code),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl AuthorizationServer for StubAuthServer {
        fn authorize<'a>(
            &'a self,
            scopes: &'a [String],
        ) -> BoxFuture<'a, ProviderResult<AuthorizationToken>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                match self.outcome {
                    None => Ok(AuthorizationToken::new(
                        "flow-token",
                        Some("refresh".to_string()),
                        Some(3600),
                        scopes.to_vec(),
                    )),
                    Some(code) => Err(ProviderError::new(code, "stubbed failure")),
                }
            })
        }

        fn refresh<'a>(
            &'a self,
            _refresh_token: &'a str,
        ) -> BoxFuture<'a, ProviderResult<RefreshedAccess>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(RefreshedAccess::new("refreshed-token", Some(3600)))
            })
        }
    }

    #[derive(Default)]
    struct FakeCalendar {
        events: Vec<UpcomingEvent>,
        failure: Option<ProviderErrorCode>,
        inserted: Mutex<Vec<EventDraft>>,
        tokens_seen: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl FakeCalendar {
        fn record(&self, access_token: &str) -> ProviderResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens_seen
                .lock()
                .unwrap()
                .push(access_token.to_string());
            match self.failure {
                Some(code) => Err(ProviderError::new(code, "stubbed calendar failure")),
                None => Ok(()),
            }
        }
    }

    impl CalendarService for FakeCalendar {
        fn name(&self) -> &str {
            "fake"
        }

        fn list_upcoming<'a>(
            &'a self,
            access_token: &'a str,
            query: &'a ListQuery,
        ) -> BoxFuture<'a, ProviderResult<Vec<UpcomingEvent>>> {
            Box::pin(async move {
                self.record(access_token)?;
                Ok(self.events.iter().take(query.max_results).cloned().collect())
            })
        }

        fn insert_event<'a>(
            &'a self,
            access_token: &'a str,
            _calendar_id: &'a str,
            draft: &'a EventDraft,
        ) -> BoxFuture<'a, ProviderResult<CreatedEvent>> {
            Box::pin(async move {
                self.record(access_token)?;
                self.inserted.lock().unwrap().push(draft.clone());
                Ok(CreatedEvent {
                    id: Some("evt-1".to_string()),
                    summary: Some(draft.summary.clone()),
                    html_link: None,
                    extra: Default::default(),
                })
            })
        }
    }

    struct Harness {
        app: Router,
        calendar: Arc<FakeCalendar>,
        auth: Arc<StubAuthServer>,
    }

    fn harness(
        stored: Option<AuthorizationToken>,
        auth: Arc<StubAuthServer>,
        calendar: FakeCalendar,
    ) -> Harness {
        let store = Arc::new(match stored {
            Some(token) => MemoryTokenStore::with_token(token),
            None => MemoryTokenStore::new(),
        });
        let credentials = Arc::new(CredentialManager::new(
            store,
            auth.clone(),
            vec![SCOPE.to_string()],
        ));
        let calendar = Arc::new(calendar);
        let state = Arc::new(AppState {
            credentials,
            calendar: calendar.clone(),
            calendar_id: "primary".to_string(),
            max_results: 10,
            timezone: "UTC".to_string(),
        });
        Harness {
            app: router(state),
            calendar,
            auth,
        }
    }

    fn valid_token() -> AuthorizationToken {
        AuthorizationToken::new(
            "stored-token",
            Some("refresh".to_string()),
            Some(3600),
            vec![SCOPE.to_string()],
        )
    }

    fn authorized(calendar: FakeCalendar) -> Harness {
        harness(Some(valid_token()), StubAuthServer::granting(), calendar)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(body: Value) -> Request<Body> {
        post_raw(body.to_string())
    }

    fn post_raw(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/add-event")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn get_events_empty_calendar() {
        let h = authorized(FakeCalendar::default());
        let (status, body) = send(&h.app, get("/get-events")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn get_events_lists_start_and_summary() {
        let h = authorized(FakeCalendar {
            events: vec![
                UpcomingEvent::new("2024-03-15T09:00:00Z", Some("Standup".to_string())),
                UpcomingEvent::new("2024-03-16", None),
            ],
            ..Default::default()
        });

        let (status, body) = send(&h.app, get("/get-events")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                {"start": "2024-03-15T09:00:00Z", "summary": "Standup"},
                {"start": "2024-03-16", "summary": "No title"}
            ])
        );
        assert_eq!(h.calendar.tokens_seen.lock().unwrap()[0], "stored-token");
        assert_eq!(h.auth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn add_event_creates_event_with_duration() {
        let h = authorized(FakeCalendar::default());
        let (status, body) = send(
            &h.app,
            post_json(json!({
                "title": "Standup",
                "start_time": "2024-01-01T09:00:00",
                "duration": 30
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Event created");
        assert_eq!(body["event"]["id"], "evt-1");

        let inserted = h.calendar.inserted.lock().unwrap();
        let draft = &inserted[0];
        assert_eq!(draft.summary, "Standup");
        assert_eq!(draft.end.local() - draft.start.local(), TimeDelta::minutes(30));
        assert_eq!(draft.timezone, "UTC");
        assert_eq!(draft.start.to_string(), "2024-01-01T09:00:00");
    }

    #[tokio::test]
    async fn add_event_defaults_to_one_hour() {
        let h = authorized(FakeCalendar::default());
        let (status, _) = send(
            &h.app,
            post_json(json!({"title": "Review", "start_time": "2024-01-01T15:00:00Z"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let inserted = h.calendar.inserted.lock().unwrap();
        assert_eq!(inserted[0].duration(), TimeDelta::minutes(60));
    }

    #[tokio::test]
    async fn add_event_accepts_numeric_string_duration() {
        let h = authorized(FakeCalendar::default());
        let (status, _) = send(
            &h.app,
            post_json(json!({
                "title": "Review",
                "start_time": "2024-01-01T15:00:00",
                "duration": "45"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            h.calendar.inserted.lock().unwrap()[0].duration(),
            TimeDelta::minutes(45)
        );
    }

    #[tokio::test]
    async fn add_event_without_title_is_rejected_before_any_call() {
        let h = harness(None, StubAuthServer::granting(), FakeCalendar::default());
        let (status, body) = send(
            &h.app,
            post_json(json!({"start_time": "2024-01-01T09:00:00"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Missing title or start_time"}));
        assert_eq!(h.calendar.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.auth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn add_event_rejects_invalid_fields() {
        let h = harness(None, StubAuthServer::granting(), FakeCalendar::default());
        let bad_bodies = [
            json!({"title": "", "start_time": "2024-01-01T09:00:00"}),
            json!({"title": "x", "start_time": "tomorrow morning"}),
            json!({"title": "x", "start_time": "2024-01-01T09:00:00", "duration": 0}),
            json!({"title": "x", "start_time": "2024-01-01T09:00:00", "duration": -15}),
            json!({"title": "x", "start_time": "2024-01-01T09:00:00", "duration": "soon"}),
            json!({"title": "x", "start_time": "2024-01-01T09:00:00", "duration": 1.5}),
        ];

        for body in bad_bodies {
            let (status, response) = send(&h.app, post_json(body.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", body);
            assert!(response["error"].is_string(), "body {}", body);
        }
        assert_eq!(h.calendar.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.auth.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_fields_are_reported_before_bad_duration() {
        let request = |title: Option<&str>, start: &str| AddEventRequest {
            title: title.map(String::from),
            start_time: Some(start.to_string()),
            duration: Some(DurationField::Text("soon".to_string())),
        };

        let missing = request(None, "2024-01-01T09:00:00").into_draft("UTC");
        assert_eq!(missing.unwrap_err(), DraftError::MissingField);

        let bad_start = request(Some("Standup"), "tomorrow").into_draft("UTC");
        assert!(matches!(bad_start, Err(DraftError::InvalidStart(_))));

        let bad_duration = request(Some("Standup"), "2024-01-01T09:00:00").into_draft("UTC");
        assert_eq!(
            bad_duration.unwrap_err(),
            DraftError::InvalidDuration("soon".to_string())
        );
    }

    #[tokio::test]
    async fn add_event_rejects_non_json_body() {
        let h = authorized(FakeCalendar::default());
        let (status, body) = send(&h.app, post_raw("title=Standup")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(h.calendar.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_store_runs_consent_flow_once() {
        let h = harness(None, StubAuthServer::granting(), FakeCalendar::default());

        let (status, _) = send(&h.app, get("/get-events")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&h.app, get("/get-events")).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(h.auth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.calendar.tokens_seen.lock().unwrap()[1], "flow-token");
    }

    #[tokio::test]
    async fn denied_consent_is_forbidden() {
        let h = harness(
            None,
            StubAuthServer::failing(ProviderErrorCode::AuthorizationDenied),
            FakeCalendar::default(),
        );
        let (status, body) = send(&h.app, get("/get-events")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "authorization_denied");
        assert_eq!(h.calendar.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn consent_timeout_is_gateway_timeout() {
        let h = harness(
            None,
            StubAuthServer::failing(ProviderErrorCode::FlowTimeout),
            FakeCalendar::default(),
        );
        let (status, body) = send(
            &h.app,
            post_json(json!({"title": "x", "start_time": "2024-01-01T09:00:00"})),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["kind"], "flow_timeout");
    }

    #[tokio::test]
    async fn calendar_failure_is_bad_gateway() {
        let h = authorized(FakeCalendar {
            failure: Some(ProviderErrorCode::ServerError),
            ..Default::default()
        });
        let (status, body) = send(&h.app, get("/get-events")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "upstream");
    }

    #[tokio::test]
    async fn auth_status_reports_stored_token() {
        let h = authorized(FakeCalendar::default());
        let (status, body) = send(&h.app, get("/auth/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "valid", "persistence_error": null}));

        let empty = harness(None, StubAuthServer::granting(), FakeCalendar::default());
        let (_, body) = send(&empty.app, get("/auth/status")).await;
        assert_eq!(body["status"], "absent");
    }

    #[tokio::test]
    async fn health_check() {
        let h = authorized(FakeCalendar::default());
        let (status, body) = send(&h.app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }
}
