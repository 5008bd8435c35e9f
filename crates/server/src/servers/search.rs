//! Web search (Brave) and page extraction (Tavily) tools.

use super::{markdown, non_empty};
use crate::config::{env_var, SearchConfig};
use crate::http::HttpTransport;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use toolhouse_core::{Mapping, ToolError, ToolResult};
use toolhouse_mcp::protocol::{CallToolResult, ToolSchema};
use toolhouse_mcp::tools::{
    json_schema_array, json_schema_object, json_schema_string, parse_arguments, tool_schema, Tool,
    ToolRegistry,
};
use tracing::info;

pub const RESULTS_PER_PAGE: u32 = 10;
pub const DEFAULT_COUNTRY: &str = "IN";

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    raw_content: String,
}

#[derive(Debug, Serialize)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

#[derive(Debug, Serialize)]
struct PageContent {
    url: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct Results<T> {
    results: Vec<T>,
}

pub struct SearchService {
    http: HttpTransport,
    brave_url: String,
    tavily_url: String,
    brave_api_key: Option<String>,
    tavily_api_key: Option<String>,
}

impl SearchService {
    /// Keys are optional here; a tool without its key fails at call time.
    pub fn new(
        config: &SearchConfig,
        brave_api_key: Option<String>,
        tavily_api_key: Option<String>,
    ) -> ToolResult<Self> {
        let http = HttpTransport::new(
            "Search",
            None,
            Duration::from_secs(config.timeout_secs),
            &[("accept", "application/json".to_string())],
        )?;

        Ok(Self {
            http,
            brave_url: config.brave_url.clone(),
            tavily_url: config.tavily_url.clone(),
            brave_api_key,
            tavily_api_key,
        })
    }

    pub fn from_env(config: &SearchConfig) -> ToolResult<Self> {
        let service = Self::new(config, env_var("BRAVE_API_KEY"), env_var("TAVILY_API_KEY"))?;
        if service.brave_api_key.is_none() {
            tracing::warn!("BRAVE_API_KEY is not set; web_search will fail");
        }
        if service.tavily_api_key.is_none() {
            tracing::warn!("TAVILY_API_KEY is not set; extract_web_page_content will fail");
        }
        Ok(service)
    }

    pub async fn web_search(&self, query: &str, country: &str) -> ToolResult<Option<Mapping>> {
        let api_key = self.brave_api_key.as_deref().ok_or_else(|| {
            ToolError::config("Brave API Key is not configured. Please check your environment variables.")
        })?;

        let count = RESULTS_PER_PAGE.to_string();
        let request = self
            .http
            .request(Method::GET, &self.brave_url)?
            .header("x-subscription-token", api_key)
            .query(&[
                ("q", query),
                ("result_filter", "web"),
                ("count", count.as_str()),
                ("search_lang", "en"),
                ("country", country),
            ]);
        let response: BraveResponse = self.http.send_json(request).await?;

        let results: Vec<SearchResult> = response
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                snippet: r.description,
            })
            .collect();

        if results.is_empty() {
            return Ok(None);
        }
        Ok(Some(Mapping::from_serialize(&Results { results })?))
    }

    pub async fn extract(&self, urls: &[String]) -> ToolResult<Option<Mapping>> {
        let api_key = self.tavily_api_key.as_deref().ok_or_else(|| {
            ToolError::config("Tavily API Key is not configured. Please check your environment variables.")
        })?;

        let request = self
            .http
            .request(Method::POST, &self.tavily_url)?
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "urls": urls,
                "extract_depth": "basic",
                "include_images": false
            }));
        let response: TavilyResponse = self.http.send_json(request).await?;

        let results: Vec<PageContent> = response
            .results
            .into_iter()
            .map(|r| PageContent {
                url: r.url,
                content: r.raw_content,
            })
            .collect();

        if results.is_empty() {
            return Ok(None);
        }
        Ok(Some(Mapping::from_serialize(&Results { results })?))
    }
}

/// Tool that runs a Brave web search
pub struct WebSearchTool {
    service: Arc<SearchService>,
}

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    country: Option<String>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "web_search",
            "Web Search",
            "Perform a web search using the Brave Search API.",
            true,
            json_schema_object(
                serde_json::json!({
                    "query": json_schema_string("The search query"),
                    "country": json_schema_string("Two-letter country code the results come from (default: IN)")
                }),
                vec!["query"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: WebSearchArgs = parse_arguments("web_search", arguments)?;
        let query = non_empty(&args.query, "query")?;
        let country = args
            .country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COUNTRY);

        info!(query = %query, country = %country, "Running web search");
        match self.service.web_search(query, country).await? {
            Some(results) => markdown(&results, &[]),
            None => Ok(CallToolResult::text("No search results found for the query.")),
        }
    }
}

/// Tool that extracts page content with Tavily
pub struct ExtractWebPageContentTool {
    service: Arc<SearchService>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Urls {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct ExtractArgs {
    urls: Urls,
}

#[async_trait]
impl Tool for ExtractWebPageContentTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "extract_web_page_content",
            "Extract Web Page Content",
            "Extract web page content from URLs using the Tavily Extract API.",
            true,
            json_schema_object(
                serde_json::json!({
                    "urls": json_schema_array(json_schema_string("URL"), "One or more URLs to extract content from")
                }),
                vec!["urls"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: ExtractArgs = parse_arguments("extract_web_page_content", arguments)?;
        let urls: Vec<String> = match args.urls {
            Urls::One(url) => vec![url],
            Urls::Many(urls) => urls,
        }
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();

        if urls.is_empty() {
            return Err(ToolError::invalid_input("urls cannot be empty"));
        }

        info!(count = urls.len(), "Extracting web page content");
        match self.service.extract(&urls).await? {
            Some(results) => markdown(&results, &[]),
            None => Ok(CallToolResult::text(
                "No content could be extracted from the provided URLs.",
            )),
        }
    }
}

pub fn registry(service: Arc<SearchService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WebSearchTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(ExtractWebPageContentTool { service }));
    registry
}
