//! CloudWatch Logs tools: log groups, log streams and log events.

use super::{markdown, non_empty};
use crate::config::CloudWatchConfig;
use anyhow::{bail, Context};
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::config::Region;
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use aws_sdk_cloudwatchlogs::types::OrderBy;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use toolhouse_core::{to_local_iso, Mapping, ToolError, ToolResult};
use toolhouse_mcp::protocol::{CallToolResult, ToolSchema};
use toolhouse_mcp::tools::{
    json_schema_enum, json_schema_integer, json_schema_object, json_schema_string,
    parse_arguments, tool_schema, Tool, ToolRegistry,
};
use tracing::info;

pub const DEFAULT_PAGE_SIZE: i32 = 10;

const SERVICE: &str = "CloudWatch";

/// Sort key for log stream listings. Streams always come back descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamOrder {
    LogStreamName,
    #[default]
    LastEventTime,
}

impl StreamOrder {
    pub const VALUES: [&'static str; 2] = ["LogStreamName", "LastEventTime"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LogStreamName => "LogStreamName",
            Self::LastEventTime => "LastEventTime",
        }
    }
}

impl FromStr for StreamOrder {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LogStreamName" => Ok(Self::LogStreamName),
            "LastEventTime" => Ok(Self::LastEventTime),
            other => Err(ToolError::invalid_input(format!(
                "Invalid order by value '{}'. Valid values are: {}",
                other,
                Self::VALUES.join(", ")
            ))),
        }
    }
}

/// One page of results plus the tokens to move around it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
    pub previous_token: Option<String>,
}

// No `T: Default` bound, unlike the derive.
impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_token: None,
            previous_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogGroup {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogStream {
    pub name: String,
    pub creation_time: Option<i64>,
    pub first_event_timestamp: Option<i64>,
    pub last_event_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamQuery {
    pub log_group_name: String,
    pub limit: i32,
    pub order_by: StreamOrder,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub log_group_name: String,
    pub log_stream_name: String,
    pub limit: i32,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub next_token: Option<String>,
}

/// The slice of the CloudWatch Logs API the tools need.
#[async_trait]
pub trait LogsClient: Send + Sync {
    async fn log_groups(&self, limit: i32, next_token: Option<String>) -> ToolResult<Page<LogGroup>>;

    async fn log_streams(&self, query: StreamQuery) -> ToolResult<Page<LogStream>>;

    async fn log_events(&self, query: EventQuery) -> ToolResult<Page<LogEvent>>;
}

/// `LogsClient` backed by the AWS SDK.
pub struct AwsLogsClient {
    client: aws_sdk_cloudwatchlogs::Client,
}

impl AwsLogsClient {
    /// Build from the AWS environment and verify access with a one-item listing.
    pub async fn connect(config: &CloudWatchConfig) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        if sdk_config.region().is_none() {
            bail!("AWS region is not configured (set AWS_DEFAULT_REGION or cloudwatch.region)");
        }
        if sdk_config.credentials_provider().is_none() {
            bail!("AWS credentials are not configured");
        }

        let client = Self {
            client: aws_sdk_cloudwatchlogs::Client::new(&sdk_config),
        };
        client
            .log_groups(1, None)
            .await
            .context("Failed to connect to AWS CloudWatch")?;

        info!("Successfully connected to AWS CloudWatch");
        Ok(client)
    }
}

fn upstream<E: std::error::Error>(error: E) -> ToolError {
    ToolError::upstream(SERVICE, DisplayErrorContext(error))
}

#[async_trait]
impl LogsClient for AwsLogsClient {
    async fn log_groups(&self, limit: i32, next_token: Option<String>) -> ToolResult<Page<LogGroup>> {
        let output = self
            .client
            .describe_log_groups()
            .limit(limit)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(upstream)?;

        Ok(Page {
            items: output
                .log_groups()
                .iter()
                .map(|group| LogGroup {
                    name: group.log_group_name().unwrap_or_default().to_string(),
                })
                .collect(),
            next_token: output.next_token().map(str::to_string),
            previous_token: None,
        })
    }

    async fn log_streams(&self, query: StreamQuery) -> ToolResult<Page<LogStream>> {
        let order_by = match query.order_by {
            StreamOrder::LogStreamName => OrderBy::LogStreamName,
            StreamOrder::LastEventTime => OrderBy::LastEventTime,
        };

        let output = self
            .client
            .describe_log_streams()
            .log_group_name(query.log_group_name)
            .limit(query.limit)
            .order_by(order_by)
            .descending(true)
            .set_next_token(query.next_token)
            .send()
            .await
            .map_err(upstream)?;

        Ok(Page {
            items: output
                .log_streams()
                .iter()
                .map(|stream| LogStream {
                    name: stream.log_stream_name().unwrap_or_default().to_string(),
                    creation_time: stream.creation_time(),
                    first_event_timestamp: stream.first_event_timestamp(),
                    last_event_timestamp: stream.last_event_timestamp(),
                })
                .collect(),
            next_token: output.next_token().map(str::to_string),
            previous_token: None,
        })
    }

    async fn log_events(&self, query: EventQuery) -> ToolResult<Page<LogEvent>> {
        let output = self
            .client
            .get_log_events()
            .log_group_name(query.log_group_name)
            .log_stream_name(query.log_stream_name)
            .limit(query.limit)
            .set_start_time(query.start_time)
            .set_end_time(query.end_time)
            .set_next_token(query.next_token)
            .send()
            .await
            .map_err(upstream)?;

        Ok(Page {
            items: output
                .events()
                .iter()
                .map(|event| LogEvent {
                    timestamp: event.timestamp(),
                    message: event.message().map(str::to_string),
                })
                .collect(),
            next_token: output.next_forward_token().map(str::to_string),
            previous_token: output.next_backward_token().map(str::to_string),
        })
    }
}

fn iso(millis: Option<i64>) -> Option<String> {
    millis.map(to_local_iso)
}

pub fn format_log_groups(page: Page<LogGroup>) -> Mapping {
    Mapping::new()
        .with("next_page_token", page.next_token)
        .with(
            "results",
            page.items
                .into_iter()
                .map(|group| Mapping::new().with("name", group.name))
                .collect::<Vec<_>>(),
        )
}

pub fn format_log_streams(page: Page<LogStream>) -> Mapping {
    Mapping::new()
        .with("next_page_token", page.next_token)
        .with(
            "results",
            page.items
                .into_iter()
                .map(|stream| {
                    Mapping::new()
                        .with("name", stream.name)
                        .with("created_at", iso(stream.creation_time))
                        .with("first_event_timestamp", iso(stream.first_event_timestamp))
                        .with("last_event_timestamp", iso(stream.last_event_timestamp))
                })
                .collect::<Vec<_>>(),
        )
}

pub fn format_log_events(page: Page<LogEvent>) -> Mapping {
    Mapping::new()
        .with("next_page_token", page.next_token)
        .with("previous_page_token", page.previous_token)
        .with(
            "results",
            page.items
                .into_iter()
                .map(|event| {
                    Mapping::new()
                        .with("timestamp", iso(event.timestamp))
                        .with("message", event.message)
                })
                .collect::<Vec<_>>(),
        )
}

fn default_page_size() -> i32 {
    DEFAULT_PAGE_SIZE
}

fn check_page_size(page_size: i32) -> ToolResult<i32> {
    if page_size < 1 {
        return Err(ToolError::invalid_input(format!(
            "page_size must be at least 1, got {}",
            page_size
        )));
    }
    Ok(page_size)
}

/// Empty tokens mean "first page".
fn token(next_page_token: Option<String>) -> Option<String> {
    next_page_token.filter(|t| !t.is_empty())
}

/// Tool that lists log groups
pub struct GetLogGroupsTool {
    client: Arc<dyn LogsClient>,
}

#[derive(Debug, Deserialize)]
struct GetLogGroupsArgs {
    #[serde(default = "default_page_size")]
    page_size: i32,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait]
impl Tool for GetLogGroupsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_log_groups",
            "Get Log Groups",
            "Retrieve a page of log groups from AWS CloudWatch.",
            true,
            json_schema_object(
                serde_json::json!({
                    "page_size": json_schema_integer("Maximum number of log groups to return (default: 10)"),
                    "next_page_token": json_schema_string("Token for retrieving the next page of results")
                }),
                vec![],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GetLogGroupsArgs = parse_arguments("get_log_groups", arguments)?;
        let page_size = check_page_size(args.page_size)?;

        info!(page_size, "Fetching log groups");
        let page = self
            .client
            .log_groups(page_size, token(args.next_page_token))
            .await?;
        info!(count = page.items.len(), "Retrieved log groups");

        markdown(&format_log_groups(page), &[])
    }
}

/// Tool that lists the streams of one log group
pub struct GetLogStreamsTool {
    client: Arc<dyn LogsClient>,
}

#[derive(Debug, Deserialize)]
struct GetLogStreamsArgs {
    log_group_name: String,
    #[serde(default = "default_page_size")]
    page_size: i32,
    #[serde(default)]
    order_by: Option<String>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait]
impl Tool for GetLogStreamsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_log_streams",
            "Get Log Streams",
            "Get the log streams of a log group, newest or last-named first.",
            true,
            json_schema_object(
                serde_json::json!({
                    "log_group_name": json_schema_string("Name of the log group"),
                    "page_size": json_schema_integer("Maximum number of streams to return (default: 10)"),
                    "order_by": json_schema_enum(&StreamOrder::VALUES, "Sort order (default: LastEventTime)"),
                    "next_page_token": json_schema_string("Token for retrieving the next page of results")
                }),
                vec!["log_group_name"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GetLogStreamsArgs = parse_arguments("get_log_streams", arguments)?;
        let log_group_name = non_empty(&args.log_group_name, "log_group_name")?.to_string();
        let order_by = match args.order_by.as_deref() {
            Some(order) => order.parse()?,
            None => StreamOrder::default(),
        };
        let limit = check_page_size(args.page_size)?;

        info!(
            log_group = %log_group_name,
            page_size = limit,
            order_by = order_by.as_str(),
            "Fetching log streams"
        );
        let page = self
            .client
            .log_streams(StreamQuery {
                log_group_name,
                limit,
                order_by,
                next_token: token(args.next_page_token),
            })
            .await?;
        info!(count = page.items.len(), "Retrieved log streams");

        markdown(&format_log_streams(page), &[])
    }
}

/// Tool that reads events from one log stream
pub struct GetLogEventsTool {
    client: Arc<dyn LogsClient>,
}

#[derive(Debug, Deserialize)]
struct GetLogEventsArgs {
    log_group_name: String,
    log_stream_name: String,
    #[serde(default = "default_page_size")]
    page_size: i32,
    #[serde(default)]
    start_time: Option<i64>,
    #[serde(default)]
    end_time: Option<i64>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait]
impl Tool for GetLogEventsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_log_events",
            "Get Log Events",
            "Get log events from a log stream, optionally bounded by time.",
            true,
            json_schema_object(
                serde_json::json!({
                    "log_group_name": json_schema_string("Name of the log group"),
                    "log_stream_name": json_schema_string("Name of the log stream"),
                    "page_size": json_schema_integer("Maximum number of events to return (default: 10)"),
                    "start_time": json_schema_integer("Start time in milliseconds since the Unix epoch (inclusive)"),
                    "end_time": json_schema_integer("End time in milliseconds since the Unix epoch (exclusive)"),
                    "next_page_token": json_schema_string("Token for retrieving the next page of results")
                }),
                vec!["log_group_name", "log_stream_name"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GetLogEventsArgs = parse_arguments("get_log_events", arguments)?;
        let log_group_name = non_empty(&args.log_group_name, "log_group_name")?.to_string();
        let log_stream_name = non_empty(&args.log_stream_name, "log_stream_name")?.to_string();
        let limit = check_page_size(args.page_size)?;

        info!(
            log_group = %log_group_name,
            log_stream = %log_stream_name,
            page_size = limit,
            "Fetching log events"
        );
        let page = self
            .client
            .log_events(EventQuery {
                log_group_name,
                log_stream_name,
                limit,
                start_time: args.start_time,
                end_time: args.end_time,
                next_token: token(args.next_page_token),
            })
            .await?;
        info!(count = page.items.len(), "Retrieved log events");

        markdown(&format_log_events(page), &[])
    }
}

pub fn registry(client: Arc<dyn LogsClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GetLogGroupsTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(GetLogStreamsTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(GetLogEventsTool { client }));
    registry
}
