//! Google Calendar tools.

pub mod auth;
pub mod credentials;

use super::{markdown, non_empty};
use crate::config::CalendarConfig;
use crate::http::HttpTransport;
use async_trait::async_trait;
use chrono::Utc;
use self::credentials::{GoogleCredentials, TokenManager};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toolhouse_core::{Mapping, ToolError, ToolResult, Value};
use toolhouse_mcp::protocol::{CallToolResult, ToolSchema};
use toolhouse_mcp::tools::{
    json_schema_array, json_schema_integer, json_schema_object, json_schema_string,
    parse_arguments, tool_schema, Tool, ToolRegistry,
};
use tracing::info;

/// Event fields that carry no meaning for the caller.
pub const SKIPPED_FIELDS: &[&str] = &[
    "kind",
    "etag",
    "htmlLink",
    "created",
    "updated",
    "creator",
    "organizer",
    "iCalUID",
    "eventType",
];

pub const DEFAULT_MAX_RESULTS: u32 = 10;
const MAX_RESULTS_LIMIT: u32 = 2500;
const SERVICE: &str = "Google Calendar";

type EventObject = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime<'a> {
    date_time: &'a str,
    time_zone: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reminders {
    use_default: bool,
    overrides: Vec<serde_json::Value>,
}

/// Insert request body.
#[derive(Debug, Serialize)]
struct NewEventBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    start: EventTime<'a>,
    end: EventTime<'a>,
    reminders: Reminders,
    attendees: Vec<serde_json::Value>,
}

/// Fields of a new event, as given by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub summary: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub reminders: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub attendees: Option<Vec<serde_json::Value>>,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

impl NewEvent {
    fn body(&self) -> NewEventBody<'_> {
        NewEventBody {
            summary: &self.summary,
            description: self.description.as_deref(),
            location: self.location.as_deref(),
            start: EventTime {
                date_time: &self.start_time,
                time_zone: &self.time_zone,
            },
            end: EventTime {
                date_time: &self.end_time,
                time_zone: &self.time_zone,
            },
            reminders: Reminders {
                use_default: false,
                overrides: self.reminders.clone().unwrap_or_default(),
            },
            attendees: self.attendees.clone().unwrap_or_default(),
        }
    }
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// Apply `updates` over `event`, replacing top-level keys wholesale.
pub fn merge_event(mut event: EventObject, updates: EventObject) -> EventObject {
    for (key, value) in updates {
        event.insert(key, value);
    }
    event
}

/// Calendar API v3 client for one calendar.
pub struct CalendarService {
    http: HttpTransport,
    tokens: TokenManager,
    calendar_id: String,
}

impl CalendarService {
    pub fn new(config: &CalendarConfig, credentials: GoogleCredentials) -> ToolResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            http: HttpTransport::new(SERVICE, Some(&config.api_base), timeout, &[])?,
            tokens: TokenManager::new(credentials, timeout)?,
            calendar_id: config.calendar_id.clone(),
        })
    }

    /// Load the credentials file and refresh the access token up front.
    pub async fn connect(config: &CalendarConfig) -> anyhow::Result<Self> {
        let credentials = GoogleCredentials::load(Path::new(&config.credentials_file))?;
        let service = Self::new(config, credentials)?;
        service.tokens.refresh().await?;
        info!(calendar_id = %config.calendar_id, "Google Calendar client ready");
        Ok(service)
    }

    /// `calendars/<id>/events[/<event id>]` with each segment escaped.
    fn events_url(&self, event_id: Option<&str>) -> ToolResult<url::Url> {
        let mut url = self.http.url("calendars")?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ToolError::config("Calendar API base URL cannot hold a path"))?;
            segments.push(&self.calendar_id).push("events");
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }

    async fn authorized(&self, method: Method, event_id: Option<&str>) -> ToolResult<RequestBuilder> {
        let url = self.events_url(event_id)?;
        let token = self.tokens.access_token().await?;
        Ok(self.http.request(method, url.as_str())?.bearer_auth(token))
    }

    pub async fn upcoming_events(&self, max_results: u32) -> ToolResult<Vec<serde_json::Value>> {
        let request = self.authorized(Method::GET, None).await?.query(&[
            ("timeMin", Utc::now().to_rfc3339()),
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ]);
        let list: EventList = self.http.send_json(request).await?;
        Ok(list.items)
    }

    pub async fn search_events(
        &self,
        query: &str,
        max_results: u32,
    ) -> ToolResult<Vec<serde_json::Value>> {
        let request = self.authorized(Method::GET, None).await?.query(&[
            ("q", query.to_string()),
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ]);
        let list: EventList = self.http.send_json(request).await?;
        Ok(list.items)
    }

    pub async fn insert_event(&self, event: &NewEvent) -> ToolResult<EventObject> {
        let request = self
            .authorized(Method::POST, None)
            .await?
            .json(&event.body());
        self.http.send_json(request).await
    }

    pub async fn get_event(&self, event_id: &str, time_zone: Option<&str>) -> ToolResult<EventObject> {
        let mut request = self.authorized(Method::GET, Some(event_id)).await?;
        if let Some(time_zone) = time_zone {
            request = request.query(&[("timeZone", time_zone)]);
        }
        self.http.send_json(request).await
    }

    /// Fetch, merge `updates` over the stored event and write it back.
    pub async fn update_event(&self, event_id: &str, updates: EventObject) -> ToolResult<EventObject> {
        let existing = self.get_event(event_id, None).await?;
        let merged = merge_event(existing, updates);
        let request = self
            .authorized(Method::PUT, Some(event_id))
            .await?
            .json(&merged);
        self.http.send_json(request).await
    }

    pub async fn delete_event(&self, event_id: &str) -> ToolResult<()> {
        let request = self.authorized(Method::DELETE, Some(event_id)).await?;
        self.http.send_empty(request).await
    }
}

fn validate_max_results(max_results: u32) -> ToolResult<u32> {
    if !(1..=MAX_RESULTS_LIMIT).contains(&max_results) {
        return Err(ToolError::invalid_input(format!(
            "max_results must be between 1 and {}, got {}",
            MAX_RESULTS_LIMIT, max_results
        )));
    }
    Ok(max_results)
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

fn render_event(event: EventObject) -> ToolResult<CallToolResult> {
    markdown(&Mapping::from(event), SKIPPED_FIELDS)
}

fn render_events(events: Vec<serde_json::Value>) -> ToolResult<CallToolResult> {
    markdown(
        &Mapping::new().with("results", Value::from(events)),
        SKIPPED_FIELDS,
    )
}

fn max_results_schema() -> serde_json::Value {
    json_schema_integer("Maximum number of events to return (default: 10)")
}

fn event_id_schema() -> serde_json::Value {
    json_schema_string("ID of the calendar event")
}

pub struct GetEventsTool {
    service: Arc<CalendarService>,
}

#[derive(Debug, Deserialize)]
struct GetEventsArgs {
    #[serde(default = "default_max_results")]
    max_results: u32,
}

#[async_trait]
impl Tool for GetEventsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_events",
            "Get Calendar Events",
            "Retrieve upcoming events from the calendar.",
            true,
            json_schema_object(
                serde_json::json!({"max_results": max_results_schema()}),
                vec![],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GetEventsArgs = parse_arguments("get_events", arguments)?;
        let events = self
            .service
            .upcoming_events(validate_max_results(args.max_results)?)
            .await?;

        if events.is_empty() {
            return Ok(CallToolResult::text("No events found in the calendar."));
        }
        info!(count = events.len(), "Fetched upcoming events");
        render_events(events)
    }
}

pub struct SearchEventTool {
    service: Arc<CalendarService>,
}

#[derive(Debug, Deserialize)]
struct SearchEventArgs {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: u32,
}

#[async_trait]
impl Tool for SearchEventTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "search_event",
            "Search Calendar Events",
            "Search for calendar events matching a query, e.g. an event title or keyword.",
            true,
            json_schema_object(
                serde_json::json!({
                    "query": json_schema_string("Search query"),
                    "max_results": max_results_schema()
                }),
                vec!["query"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: SearchEventArgs = parse_arguments("search_event", arguments)?;
        let query = non_empty(&args.query, "Search query")?;
        let events = self
            .service
            .search_events(query, validate_max_results(args.max_results)?)
            .await?;

        if events.is_empty() {
            return Ok(CallToolResult::text(
                "No events found in the calendar for the given query.",
            ));
        }
        render_events(events)
    }
}

pub struct AddEventTool {
    service: Arc<CalendarService>,
}

#[async_trait]
impl Tool for AddEventTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "add_event",
            "Add a Calendar Event",
            "Create a calendar event with time, reminders and attendees.",
            false,
            json_schema_object(
                serde_json::json!({
                    "summary": json_schema_string("Event title"),
                    "start_time": json_schema_string("Start time in RFC 3339 format, e.g. 2025-05-16T10:00:00"),
                    "end_time": json_schema_string("End time in RFC 3339 format"),
                    "description": json_schema_string("Event description"),
                    "location": json_schema_string("Event location, e.g. New York"),
                    "reminders": json_schema_array(
                        serde_json::json!({"type": "object"}),
                        "Reminder overrides, e.g. [{\"method\": \"popup\", \"minutes\": 10}]"
                    ),
                    "attendees": json_schema_array(
                        serde_json::json!({"type": "object"}),
                        "Attendees, e.g. [{\"email\": \"person@example.com\"}]"
                    ),
                    "time_zone": json_schema_string("IANA time zone (default: UTC)")
                }),
                vec!["summary", "start_time", "end_time"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let event: NewEvent = parse_arguments("add_event", arguments)?;
        non_empty(&event.summary, "Summary")?;
        non_empty(&event.start_time, "Start time")?;
        non_empty(&event.end_time, "End time")?;

        let created = self.service.insert_event(&event).await?;
        info!(summary = %event.summary, "Created calendar event");
        render_event(created)
    }
}

pub struct GetEventDetailTool {
    service: Arc<CalendarService>,
}

#[derive(Debug, Deserialize)]
struct GetEventDetailArgs {
    event_id: String,
    #[serde(default = "default_time_zone")]
    time_zone: String,
}

#[async_trait]
impl Tool for GetEventDetailTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_event_detail",
            "Get a Calendar Event Details",
            "Retrieve the details of a calendar event.",
            true,
            json_schema_object(
                serde_json::json!({
                    "event_id": event_id_schema(),
                    "time_zone": json_schema_string("Time zone for returned times (default: UTC)")
                }),
                vec!["event_id"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GetEventDetailArgs = parse_arguments("get_event_detail", arguments)?;
        let event_id = non_empty(&args.event_id, "Event ID")?;
        let event = self
            .service
            .get_event(event_id, Some(&args.time_zone))
            .await?;
        render_event(event)
    }
}

pub struct UpdateEventTool {
    service: Arc<CalendarService>,
}

#[derive(Debug, Deserialize)]
struct UpdateEventArgs {
    event_id: String,
    updated_fields: EventObject,
}

#[async_trait]
impl Tool for UpdateEventTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "update_event",
            "Update a Calendar Event Details",
            "Update fields of an existing event, e.g. {\"summary\": \"New Title\"}. \
             Top-level fields replace the stored values.",
            false,
            json_schema_object(
                serde_json::json!({
                    "event_id": event_id_schema(),
                    "updated_fields": {
                        "type": "object",
                        "description": "Event fields to overwrite"
                    }
                }),
                vec!["event_id", "updated_fields"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: UpdateEventArgs = parse_arguments("update_event", arguments)?;
        let event_id = non_empty(&args.event_id, "Event ID")?;
        if args.updated_fields.is_empty() {
            return Err(ToolError::invalid_input("updated_fields cannot be empty"));
        }

        let updated = self
            .service
            .update_event(event_id, args.updated_fields)
            .await?;
        info!(event_id = %event_id, "Updated calendar event");
        render_event(updated)
    }
}

pub struct DeleteEventTool {
    service: Arc<CalendarService>,
}

#[derive(Debug, Deserialize)]
struct DeleteEventArgs {
    event_id: String,
}

#[async_trait]
impl Tool for DeleteEventTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "delete_event",
            "Delete a Calendar Event",
            "Delete an event from the calendar.",
            false,
            json_schema_object(
                serde_json::json!({"event_id": event_id_schema()}),
                vec!["event_id"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: DeleteEventArgs = parse_arguments("delete_event", arguments)?;
        let event_id = non_empty(&args.event_id, "Event ID")?;

        self.service.delete_event(event_id).await?;
        info!(event_id = %event_id, "Deleted calendar event");
        Ok(CallToolResult::text(format!(
            "Event {} deleted successfully.",
            event_id
        )))
    }
}

pub fn registry(service: Arc<CalendarService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GetEventsTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(SearchEventTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(AddEventTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GetEventDetailTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(UpdateEventTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(DeleteEventTool { service }));
    registry
}
