//! RAWG video game database tools.
//!
//! Upstream payloads are cached as raw JSON under per-resource keys
//! (`genres:<page>`, `games/<id>`, ...) and decoded into typed structs on
//! every read, so a cached and a fresh response render identically.

use super::markdown;
use crate::config::{require_env, GamesConfig};
use crate::http::HttpTransport;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use toolhouse_core::{
    Mapping, MemoryCache, RedisCache, ResponseCache, ToolError, ToolResult,
};
use toolhouse_mcp::protocol::{CallToolResult, ToolSchema};
use toolhouse_mcp::tools::{
    json_schema_integer, json_schema_object, json_schema_string, parse_arguments, tool_schema,
    Tool, ToolRegistry,
};
use tracing::{debug, info, warn};

pub const RESULT_PAGE_SIZE: u32 = 10;
const SERVICE: &str = "RAWG";

// Upstream shapes. Only the fields that are rendered are declared.

#[derive(Debug, Deserialize)]
struct RawPage<T> {
    count: u64,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawGenre {
    id: u64,
    name: String,
    #[serde(default)]
    games_count: u64,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPlatformEntry {
    platform: Named,
    #[serde(default)]
    released_at: Option<String>,
    #[serde(default)]
    requirements: Option<Requirements>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Requirements {
    #[serde(default)]
    pub minimum: Option<String>,
    #[serde(default)]
    pub recommended: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGame {
    id: u64,
    name: String,
    #[serde(default)]
    released: Option<String>,
    #[serde(default)]
    rating: f64,
    #[serde(default)]
    playtime: u64,
    #[serde(default)]
    metacritic: Option<u32>,
    #[serde(default)]
    esrb_rating: Option<Named>,
    #[serde(default)]
    genres: Vec<Named>,
    #[serde(default)]
    platforms: Option<Vec<RawPlatformEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawMetacriticPlatform {
    metascore: u32,
    platform: Named,
}

#[derive(Debug, Deserialize)]
struct RawGameDetail {
    id: u64,
    name: String,
    #[serde(default)]
    name_original: Option<String>,
    #[serde(default)]
    alternative_names: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    metacritic: Option<u32>,
    #[serde(default)]
    metacritic_platforms: Vec<RawMetacriticPlatform>,
    #[serde(default)]
    released: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    rating: f64,
    #[serde(default)]
    playtime: u64,
    #[serde(default)]
    esrb_rating: Option<Named>,
    #[serde(default)]
    platforms: Option<Vec<RawPlatformEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawScreenshot {
    id: u64,
    image: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Deserialize)]
struct MovieData {
    max: String,
}

#[derive(Debug, Deserialize)]
struct RawMovie {
    id: u64,
    name: String,
    data: MovieData,
}

#[derive(Debug, Deserialize)]
struct RawPlatform {
    id: u64,
    name: String,
    #[serde(default)]
    games_count: u64,
    #[serde(default)]
    year_start: Option<u32>,
    #[serde(default)]
    year_end: Option<u32>,
}

// Rendered shapes.

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub count: u64,
    pub current_page: u32,
    pub page_size: u32,
    pub results: Vec<T>,
}

impl<T> ListResponse<T> {
    fn from_page<R>(page: RawPage<R>, current_page: u32, convert: impl FnMut(R) -> T) -> Self {
        Self {
            count: page.count,
            current_page,
            page_size: RESULT_PAGE_SIZE,
            results: page.results.into_iter().map(convert).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Genre {
    pub id: u64,
    pub name: String,
    pub games_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<RawGenre> for Genre {
    fn from(raw: RawGenre) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            games_count: raw.games_count,
            description: raw.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GameSummary {
    pub id: u64,
    pub name: String,
    pub released: Option<String>,
    pub rating: f64,
    pub playtime: u64,
    pub platforms: String,
    pub genres: String,
    pub esrb_rating: Option<String>,
    pub metacritic: Option<u32>,
}

impl From<RawGame> for GameSummary {
    fn from(raw: RawGame) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            released: raw.released,
            rating: raw.rating,
            playtime: raw.playtime,
            platforms: raw
                .platforms
                .unwrap_or_default()
                .into_iter()
                .map(|p| p.platform.name)
                .collect::<Vec<_>>()
                .join(","),
            genres: raw
                .genres
                .into_iter()
                .map(|g| g.name)
                .collect::<Vec<_>>()
                .join(","),
            esrb_rating: raw.esrb_rating.map(|e| e.name),
            metacritic: raw.metacritic,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetacriticPlatform {
    pub metascore: u32,
    pub platform: String,
}

#[derive(Debug, Serialize)]
pub struct GamePlatform {
    pub name: String,
    pub released_at: Option<String>,
    pub requirements: Option<Requirements>,
}

#[derive(Debug, Serialize)]
pub struct GameDetail {
    pub id: u64,
    pub name: String,
    pub name_original: Option<String>,
    pub alternative_names: Vec<String>,
    pub description: Option<String>,
    pub metacritic: Option<u32>,
    pub metacritic_platforms: Vec<MetacriticPlatform>,
    pub released: Option<String>,
    pub website: Option<String>,
    pub rating: f64,
    pub playtime: u64,
    pub esrb_rating: Option<String>,
    pub platforms: Vec<GamePlatform>,
}

impl From<RawGameDetail> for GameDetail {
    fn from(raw: RawGameDetail) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            name_original: raw.name_original,
            alternative_names: raw.alternative_names,
            description: raw.description,
            metacritic: raw.metacritic,
            metacritic_platforms: raw
                .metacritic_platforms
                .into_iter()
                .map(|m| MetacriticPlatform {
                    metascore: m.metascore,
                    platform: m.platform.name,
                })
                .collect(),
            released: raw.released,
            website: raw.website.filter(|w| !w.is_empty()),
            rating: raw.rating,
            playtime: raw.playtime,
            esrb_rating: raw.esrb_rating.map(|e| e.name),
            platforms: raw
                .platforms
                .unwrap_or_default()
                .into_iter()
                .map(|p| GamePlatform {
                    name: p.platform.name,
                    released_at: p.released_at,
                    requirements: p.requirements,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Screenshot {
    pub id: u64,
    pub image: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize)]
pub struct Trailer {
    pub id: u64,
    pub name: String,
    pub trailer: String,
}

#[derive(Debug, Serialize)]
pub struct Platform {
    pub id: u64,
    pub name: String,
    pub games_count: u64,
    pub year_start: Option<u32>,
    pub year_end: Option<u32>,
}

/// Filters for the game list endpoint. Empty strings are ignored.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct GameFilters {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub genres: Option<String>,
    #[serde(default)]
    pub dates: Option<String>,
    #[serde(default)]
    pub metacritic: Option<String>,
    #[serde(default)]
    pub ordering: Option<String>,
}

impl GameFilters {
    fn params(&self) -> Vec<(&'static str, String)> {
        [
            ("search", &self.search),
            ("genres", &self.genres),
            ("dates", &self.dates),
            ("metacritic", &self.metacritic),
            ("ordering", &self.ordering),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name, v.to_string()))
        })
        .collect()
    }
}

pub struct GamesService {
    http: HttpTransport,
    cache: Arc<dyn ResponseCache>,
    api_key: String,
}

impl GamesService {
    pub fn new(
        config: &GamesConfig,
        api_key: String,
        cache: Arc<dyn ResponseCache>,
    ) -> ToolResult<Self> {
        let http = HttpTransport::new(
            SERVICE,
            Some(&config.base_url),
            Duration::from_secs(config.timeout_secs),
            &[("accept", "application/json".to_string())],
        )?;
        Ok(Self {
            http,
            cache,
            api_key,
        })
    }

    /// Build the client and its cache: Redis when a URL is configured,
    /// in-process otherwise.
    pub async fn connect(config: &GamesConfig) -> anyhow::Result<Self> {
        let api_key = require_env("RAWG_API_KEY")?;
        let ttl = Duration::from_secs(config.cache_ttl_secs);

        let cache: Arc<dyn ResponseCache> = match &config.redis_url {
            Some(url) => Arc::new(RedisCache::connect(url, ttl).await?),
            None => {
                info!(
                    max_entries = config.cache_max_entries,
                    "No Redis URL configured, caching responses in memory"
                );
                Arc::new(MemoryCache::new(ttl, config.cache_max_entries))
            }
        };

        Ok(Self::new(config, api_key, cache)?)
    }

    async fn fetch(
        &self,
        path: &str,
        params: Vec<(&'static str, String)>,
    ) -> ToolResult<serde_json::Value> {
        let mut query = vec![
            ("key", self.api_key.clone()),
            ("page_size", RESULT_PAGE_SIZE.to_string()),
        ];
        query.extend(params);
        self.http.get_json(path, &query).await
    }

    /// Serve `path` from the cache under `key`, fetching and storing it on a
    /// miss. Cache failures only cost the round trip.
    async fn cached<T: DeserializeOwned>(
        &self,
        key: &str,
        path: &str,
        params: Vec<(&'static str, String)>,
    ) -> ToolResult<T> {
        match self.cache.get(key).await {
            Ok(Some(cached)) => match serde_json::from_str(&cached) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key = %key, "Cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Cache read failed"),
        }

        let raw = self.fetch(path, params).await?;
        if let Err(e) = self.cache.set(key, &raw.to_string()).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
        decode(raw)
    }

    pub async fn genres(&self, page: u32) -> ToolResult<ListResponse<Genre>> {
        let raw: RawPage<RawGenre> = self
            .cached(&format!("genres:{}", page), "genres", page_param(page))
            .await?;
        Ok(ListResponse::from_page(raw, page, |g| Genre {
            description: None,
            ..Genre::from(g)
        }))
    }

    pub async fn genre(&self, genre_id: u64) -> ToolResult<Genre> {
        let raw: RawGenre = self
            .cached(
                &format!("genres/{}", genre_id),
                &format!("genres/{}", genre_id),
                Vec::new(),
            )
            .await?;
        Ok(raw.into())
    }

    pub async fn games(
        &self,
        page: u32,
        filters: &GameFilters,
    ) -> ToolResult<ListResponse<GameSummary>> {
        let mut params = page_param(page);
        params.push(("exclude_stores", "true".to_string()));
        params.extend(filters.params());

        let raw: RawPage<RawGame> = decode(self.fetch("games", params).await?)?;
        Ok(ListResponse::from_page(raw, page, GameSummary::from))
    }

    pub async fn additions(
        &self,
        game_id: u64,
        page: u32,
    ) -> ToolResult<ListResponse<GameSummary>> {
        let raw: RawPage<RawGame> = self
            .cached(
                &format!("additions/{}:{}", game_id, page),
                &format!("games/{}/additions", game_id),
                page_param(page),
            )
            .await?;
        Ok(ListResponse::from_page(raw, page, GameSummary::from))
    }

    pub async fn series(&self, game_id: u64, page: u32) -> ToolResult<ListResponse<GameSummary>> {
        let raw: RawPage<RawGame> = self
            .cached(
                &format!("game-series/{}:{}", game_id, page),
                &format!("games/{}/game-series", game_id),
                page_param(page),
            )
            .await?;
        Ok(ListResponse::from_page(raw, page, GameSummary::from))
    }

    pub async fn screenshots(
        &self,
        game_id: u64,
        page: u32,
    ) -> ToolResult<ListResponse<Screenshot>> {
        let raw: RawPage<RawScreenshot> = self
            .cached(
                &format!("screenshots/{}:{}", game_id, page),
                &format!("games/{}/screenshots", game_id),
                page_param(page),
            )
            .await?;
        Ok(ListResponse::from_page(raw, page, |s| Screenshot {
            id: s.id,
            image: s.image,
            width: s.width,
            height: s.height,
        }))
    }

    pub async fn trailers(&self, game_id: u64, page: u32) -> ToolResult<ListResponse<Trailer>> {
        let raw: RawPage<RawMovie> = self
            .cached(
                &format!("movies/{}:{}", game_id, page),
                &format!("games/{}/movies", game_id),
                page_param(page),
            )
            .await?;
        Ok(ListResponse::from_page(raw, page, |m| Trailer {
            id: m.id,
            name: m.name,
            trailer: m.data.max,
        }))
    }

    pub async fn details(&self, game_id: u64) -> ToolResult<GameDetail> {
        let raw: RawGameDetail = self
            .cached(
                &format!("games/{}", game_id),
                &format!("games/{}", game_id),
                Vec::new(),
            )
            .await?;
        Ok(raw.into())
    }

    pub async fn platforms(&self, page: u32) -> ToolResult<ListResponse<Platform>> {
        let raw: RawPage<RawPlatform> = self
            .cached(&format!("platforms:{}", page), "platforms", page_param(page))
            .await?;
        Ok(ListResponse::from_page(raw, page, |p| Platform {
            id: p.id,
            name: p.name,
            games_count: p.games_count,
            year_start: p.year_start,
            year_end: p.year_end,
        }))
    }
}

fn page_param(page: u32) -> Vec<(&'static str, String)> {
    vec![("page", page.to_string())]
}

fn decode<T: DeserializeOwned>(raw: serde_json::Value) -> ToolResult<T> {
    serde_json::from_value(raw)
        .map_err(|e| ToolError::upstream(SERVICE, format!("Invalid response body: {}", e)))
}

fn validate_page(page: u32) -> ToolResult<u32> {
    if page == 0 {
        return Err(ToolError::invalid_input("page must be at least 1"));
    }
    Ok(page)
}

fn render_response<T: Serialize>(response: &T) -> ToolResult<CallToolResult> {
    markdown(&Mapping::from_serialize(response)?, &[])
}

fn default_page() -> u32 {
    1
}

fn page_schema() -> serde_json::Value {
    json_schema_integer("Page number to fetch (default: 1)")
}

fn game_id_schema() -> serde_json::Value {
    json_schema_integer("RAWG game ID")
}

#[derive(Debug, Deserialize)]
struct PageArgs {
    #[serde(default = "default_page")]
    page: u32,
}

#[derive(Debug, Deserialize)]
struct GamePageArgs {
    game_id: u64,
    #[serde(default = "default_page")]
    page: u32,
}

#[derive(Debug, Deserialize)]
struct GameIdArgs {
    game_id: u64,
}

#[derive(Debug, Deserialize)]
struct GenreIdArgs {
    genre_id: u64,
}

#[derive(Debug, Deserialize)]
struct GamesListArgs {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(flatten)]
    filters: GameFilters,
}

pub struct GenreListTool {
    service: Arc<GamesService>,
}

#[async_trait]
impl Tool for GenreListTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_video_games_genre_list",
            "Video Game Genres",
            "Get the list of video game genres, e.g. Action, Adventure, Indie.",
            true,
            json_schema_object(serde_json::json!({"page": page_schema()}), vec![]),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: PageArgs = parse_arguments("get_video_games_genre_list", arguments)?;
        let response = self.service.genres(validate_page(args.page)?).await?;
        render_response(&response)
    }
}

pub struct GenreDetailTool {
    service: Arc<GamesService>,
}

#[async_trait]
impl Tool for GenreDetailTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_video_game_genre_detail",
            "Video Game Genre Detail",
            "Get the description and game count of a genre.",
            true,
            json_schema_object(
                serde_json::json!({"genre_id": json_schema_integer("RAWG genre ID")}),
                vec!["genre_id"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GenreIdArgs = parse_arguments("get_video_game_genre_detail", arguments)?;
        let genre = self.service.genre(args.genre_id).await?;
        render_response(&genre)
    }
}

pub struct GamesListTool {
    service: Arc<GamesService>,
}

#[async_trait]
impl Tool for GamesListTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_video_games_list",
            "Video Games",
            "Get a list of video games, optionally filtered and ordered.",
            true,
            json_schema_object(
                serde_json::json!({
                    "page": page_schema(),
                    "search": json_schema_string("Search query"),
                    "genres": json_schema_string("Comma-separated genre IDs or slugs, e.g. action,indie"),
                    "dates": json_schema_string("Release date range, e.g. 2010-01-01,2018-12-31"),
                    "metacritic": json_schema_string("Metacritic score range, e.g. 80,100"),
                    "ordering": json_schema_string(
                        "One of name, released, created, rating, metacritic; prefix with '-' to reverse"
                    )
                }),
                vec![],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GamesListArgs = parse_arguments("get_video_games_list", arguments)?;
        let response = self
            .service
            .games(validate_page(args.page)?, &args.filters)
            .await?;
        info!(count = response.results.len(), "Fetched games list");
        render_response(&response)
    }
}

pub struct GameAdditionsTool {
    service: Arc<GamesService>,
}

#[async_trait]
impl Tool for GameAdditionsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_video_game_additions",
            "Video Game Additions",
            "Get DLCs, GOTY and other editions and companion apps of a game.",
            true,
            json_schema_object(
                serde_json::json!({"game_id": game_id_schema(), "page": page_schema()}),
                vec!["game_id"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GamePageArgs = parse_arguments("get_video_game_additions", arguments)?;
        let response = self
            .service
            .additions(args.game_id, validate_page(args.page)?)
            .await?;
        render_response(&response)
    }
}

pub struct GameSeriesTool {
    service: Arc<GamesService>,
}

#[async_trait]
impl Tool for GameSeriesTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_video_game_series",
            "Video Game Series",
            "Get the other games in the same series as a game.",
            true,
            json_schema_object(
                serde_json::json!({"game_id": game_id_schema(), "page": page_schema()}),
                vec!["game_id"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GamePageArgs = parse_arguments("get_video_game_series", arguments)?;
        let response = self
            .service
            .series(args.game_id, validate_page(args.page)?)
            .await?;
        render_response(&response)
    }
}

pub struct GameScreenshotsTool {
    service: Arc<GamesService>,
}

#[async_trait]
impl Tool for GameScreenshotsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_video_game_screenshots",
            "Video Game Screenshots",
            "Get screenshots of a game.",
            true,
            json_schema_object(
                serde_json::json!({"game_id": game_id_schema(), "page": page_schema()}),
                vec!["game_id"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GamePageArgs = parse_arguments("get_video_game_screenshots", arguments)?;
        let response = self
            .service
            .screenshots(args.game_id, validate_page(args.page)?)
            .await?;
        render_response(&response)
    }
}

pub struct GameTrailersTool {
    service: Arc<GamesService>,
}

#[async_trait]
impl Tool for GameTrailersTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_video_game_trailers",
            "Video Game Trailers",
            "Get trailers and gameplay videos of a game.",
            true,
            json_schema_object(
                serde_json::json!({"game_id": game_id_schema(), "page": page_schema()}),
                vec!["game_id"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GamePageArgs = parse_arguments("get_video_game_trailers", arguments)?;
        let response = self
            .service
            .trailers(args.game_id, validate_page(args.page)?)
            .await?;
        render_response(&response)
    }
}

pub struct GameDetailsTool {
    service: Arc<GamesService>,
}

#[async_trait]
impl Tool for GameDetailsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_video_game_details",
            "Video Game Details",
            "Get the details of a game.",
            true,
            json_schema_object(
                serde_json::json!({"game_id": game_id_schema()}),
                vec!["game_id"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GameIdArgs = parse_arguments("get_video_game_details", arguments)?;
        let detail = self.service.details(args.game_id).await?;
        render_response(&detail)
    }
}

pub struct PlatformsTool {
    service: Arc<GamesService>,
}

#[async_trait]
impl Tool for PlatformsTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_video_game_platforms",
            "Video Game Platforms",
            "Get the list of gaming platforms.",
            true,
            json_schema_object(serde_json::json!({"page": page_schema()}), vec![]),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: PageArgs = parse_arguments("get_video_game_platforms", arguments)?;
        let response = self.service.platforms(validate_page(args.page)?).await?;
        render_response(&response)
    }
}

pub fn registry(service: Arc<GamesService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GenreListTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GenreDetailTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GamesListTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GameAdditionsTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GameSeriesTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GameScreenshotsTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GameTrailersTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GameDetailsTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(PlatformsTool { service }));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct BrokenCache;

    #[async_trait]
    impl ResponseCache for BrokenCache {
        async fn get(&self, _key: &str) -> ToolResult<Option<String>> {
            Err(ToolError::upstream("redis", "connection refused"))
        }

        async fn set(&self, _key: &str, _value: &str) -> ToolResult<()> {
            Err(ToolError::upstream("redis", "connection refused"))
        }

        fn ttl(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    fn config(server: &MockServer) -> GamesConfig {
        GamesConfig {
            base_url: format!("{}/api", server.uri()),
            timeout_secs: 5,
            ..GamesConfig::default()
        }
    }

    fn service_with(server: &MockServer, cache: Arc<dyn ResponseCache>) -> Arc<GamesService> {
        Arc::new(GamesService::new(&config(server), "rawg-key".to_string(), cache).unwrap())
    }

    fn registry_for(server: &MockServer) -> ToolRegistry {
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(60), 100));
        registry(service_with(server, cache))
    }

    #[test]
    fn test_page_without_results_decodes_empty() {
        let page: RawPage<RawGenre> = decode(serde_json::json!({"count": 0})).unwrap();
        assert_eq!(page.count, 0);
        assert!(page.results.is_empty());

        let page: RawPage<RawGame> = decode(serde_json::json!({"count": 3, "results": []})).unwrap();
        assert_eq!(page.count, 3);
        assert!(page.results.is_empty());
    }

    #[tokio::test]
    async fn test_genre_list_is_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/genres"))
            .and(query_param("key", "rawg-key"))
            .and(query_param("page_size", "10"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 19,
                "results": [
                    {"id": 4, "name": "Action", "slug": "action", "games_count": 180000},
                    {"id": 51, "name": "Indie", "slug": "indie", "games_count": 60000}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registry = registry_for(&server);
        let expected = "- **count**: 19\n\
                        - **current_page**: 1\n\
                        - **page_size**: 10\n\
                        - **results**: \n\
                        \t- **id**: 4\n\
                        \t- **name**: Action\n\
                        \t- **games_count**: 180000\n\
                        \t---\n\
                        \t- **id**: 51\n\
                        \t- **name**: Indie\n\
                        \t- **games_count**: 60000\n\
                        \t---\n\
                        \n";

        let first = registry
            .call("get_video_games_genre_list", serde_json::json!({}))
            .await;
        assert_eq!(first.joined_text(), expected);

        let second = registry
            .call("get_video_games_genre_list", serde_json::json!({"page": 1}))
            .await;
        assert_eq!(second.joined_text(), expected);
    }

    #[tokio::test]
    async fn test_games_list_filters_and_per_item_genres() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/games"))
            .and(query_param("page", "2"))
            .and(query_param("exclude_stores", "true"))
            .and(query_param("ordering", "-released"))
            .and(query_param("metacritic", "80,100"))
            .and(query_param_is_missing("search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "results": [{
                    "id": 3498,
                    "name": "Grand Theft Auto V",
                    "released": "2013-09-17",
                    "rating": 4.47,
                    "playtime": 74,
                    "metacritic": 92,
                    "esrb_rating": {"id": 4, "name": "Mature"},
                    "genres": [{"name": "Action"}, {"name": "Adventure"}],
                    "platforms": [
                        {"platform": {"id": 4, "name": "PC"}},
                        {"platform": {"id": 187, "name": "PlayStation 5"}}
                    ]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = registry_for(&server)
            .call(
                "get_video_games_list",
                serde_json::json!({
                    "page": 2,
                    "search": "  ",
                    "metacritic": "80,100",
                    "ordering": "-released"
                }),
            )
            .await;
        assert_eq!(
            result.joined_text(),
            "- **count**: 1\n\
             - **current_page**: 2\n\
             - **page_size**: 10\n\
             - **results**: \n\
             \t- **id**: 3498\n\
             \t- **name**: Grand Theft Auto V\n\
             \t- **released**: 2013-09-17\n\
             \t- **rating**: 4.47\n\
             \t- **playtime**: 74\n\
             \t- **platforms**: PC,PlayStation 5\n\
             \t- **genres**: Action,Adventure\n\
             \t- **esrb_rating**: Mature\n\
             \t- **metacritic**: 92\n\
             \t---\n\
             \n"
        );
    }

    #[tokio::test]
    async fn test_trailers_use_max_quality() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/games/3498/movies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "results": [{
                    "id": 16432,
                    "name": "Trailer",
                    "preview": "https://media.example/preview.jpg",
                    "data": {"480": "https://media.example/480.mp4", "max": "https://media.example/max.mp4"}
                }]
            })))
            .mount(&server)
            .await;

        let result = registry_for(&server)
            .call("get_video_game_trailers", serde_json::json!({"game_id": 3498}))
            .await;
        assert!(result
            .joined_text()
            .contains("\t- **trailer**: https://media.example/max.mp4\n"));
        assert!(!result.joined_text().contains("480.mp4"));
    }

    #[tokio::test]
    async fn test_screenshots_and_platforms() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/games/1/screenshots"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "results": [{"id": 9, "image": "https://media.example/s.jpg", "width": 1920, "height": 1080}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/platforms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "results": [{"id": 4, "name": "PC", "games_count": 500000, "year_start": null, "year_end": null}]
            })))
            .mount(&server)
            .await;

        let registry = registry_for(&server);
        let screenshots = registry
            .call(
                "get_video_game_screenshots",
                serde_json::json!({"game_id": 1, "page": 1}),
            )
            .await;
        assert!(screenshots.joined_text().contains(
            "\t- **id**: 9\n\t- **image**: https://media.example/s.jpg\n\t- **width**: 1920\n\t- **height**: 1080\n"
        ));

        let platforms = registry
            .call("get_video_game_platforms", serde_json::json!({}))
            .await;
        assert!(platforms
            .joined_text()
            .ends_with("\t- **id**: 4\n\t- **name**: PC\n\t- **games_count**: 500000\n\t---\n\n"));
    }

    #[tokio::test]
    async fn test_game_details() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/games/28"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 28,
                "name": "Red Dead Redemption 2",
                "name_original": "Red Dead Redemption 2",
                "alternative_names": ["RDR2"],
                "description": "<p>America, 1899.</p>",
                "metacritic": 96,
                "metacritic_platforms": [
                    {"metascore": 97, "url": "x", "platform": {"platform": 18, "name": "PlayStation 4"}}
                ],
                "released": "2018-10-26",
                "website": "",
                "rating": 4.59,
                "playtime": 20,
                "esrb_rating": null,
                "platforms": [{
                    "platform": {"id": 4, "name": "PC"},
                    "released_at": "2018-10-26",
                    "requirements": {"minimum": "8GB RAM"}
                }]
            })))
            .mount(&server)
            .await;

        let result = registry_for(&server)
            .call("get_video_game_details", serde_json::json!({"game_id": 28}))
            .await;
        assert_eq!(
            result.joined_text(),
            "- **id**: 28\n\
             - **name**: Red Dead Redemption 2\n\
             - **name_original**: Red Dead Redemption 2\n\
             - **alternative_names**: \n\
             \t- RDR2\n\
             \t---\n\
             \n\
             - **description**: <p>America, 1899.</p>\n\
             - **metacritic**: 96\n\
             - **metacritic_platforms**: \n\
             \t- **metascore**: 97\n\
             \t- **platform**: PlayStation 4\n\
             \t---\n\
             \n\
             - **released**: 2018-10-26\n\
             - **rating**: 4.59\n\
             - **playtime**: 20\n\
             - **platforms**: \n\
             \t- **name**: PC\n\
             \t- **released_at**: 2018-10-26\n\
             \t- **requirements**: \n\
             \t\t- **minimum**: 8GB RAM\n\
             \n\
             \t---\n\
             \n"
        );
    }

    #[tokio::test]
    async fn test_genre_detail_and_series() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/genres/4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 4, "name": "Action", "games_count": 10, "description": "<p>Fast.</p>"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/games/28/game-series"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "results": [{"id": 27, "name": "Red Dead Redemption", "rating": 4.3, "playtime": 10}]
            })))
            .mount(&server)
            .await;

        let registry = registry_for(&server);
        let genre = registry
            .call("get_video_game_genre_detail", serde_json::json!({"genre_id": 4}))
            .await;
        assert_eq!(
            genre.joined_text(),
            "- **id**: 4\n- **name**: Action\n- **games_count**: 10\n- **description**: <p>Fast.</p>\n"
        );

        let series = registry
            .call("get_video_game_series", serde_json::json!({"game_id": 28}))
            .await;
        assert!(series.joined_text().contains("\t- **name**: Red Dead Redemption\n"));
    }

    #[tokio::test]
    async fn test_cache_failures_are_bypassed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/genres"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 0, "results": []
            })))
            .expect(2)
            .mount(&server)
            .await;

        let registry = registry(service_with(&server, Arc::new(BrokenCache)));
        for _ in 0..2 {
            let result = registry
                .call("get_video_games_genre_list", serde_json::json!({}))
                .await;
            assert_eq!(
                result.joined_text(),
                "- **current_page**: 1\n- **page_size**: 10\n"
            );
        }
    }

    #[tokio::test]
    async fn test_upstream_errors_and_bad_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/games/999999"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"detail\":\"Not found.\"}"))
            .mount(&server)
            .await;

        let registry = registry_for(&server);
        let result = registry
            .call("get_video_game_details", serde_json::json!({"game_id": 999999}))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.joined_text(), "Error: RAWG error: API request failed: 404");

        let result = registry
            .call("get_video_games_genre_list", serde_json::json!({"page": 0}))
            .await;
        assert_eq!(
            result.joined_text(),
            "Error: Invalid input: page must be at least 1"
        );
    }
}
