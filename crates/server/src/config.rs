use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `toolhouse.toml`. Secrets never live here; they come from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolhouseConfig {
    #[serde(default)]
    pub cloudwatch: CloudWatchConfig,

    #[serde(default)]
    pub s3: S3Config,

    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub maps: MapsConfig,

    #[serde(default)]
    pub postgres: PostgresConfig,

    #[serde(default)]
    pub games: GamesConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudWatchConfig {
    /// Overrides the region from the AWS environment.
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    /// Buckets the server may touch.
    #[serde(default)]
    pub buckets: Vec<String>,

    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,

    #[serde(default = "default_client_secret_file")]
    pub client_secret_file: String,

    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    #[serde(default = "default_calendar_api_base")]
    pub api_base: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_credentials_file() -> String {
    "credentials.json".to_string()
}

fn default_client_secret_file() -> String {
    "client_secret.json".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:8080".to_string()
}

fn default_calendar_api_base() -> String {
    "https://www.googleapis.com/calendar/v3/".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            credentials_file: default_credentials_file(),
            client_secret_file: default_client_secret_file(),
            redirect_uri: default_redirect_uri(),
            api_base: default_calendar_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,

    #[serde(default = "default_places_url")]
    pub places_url: String,

    #[serde(default = "default_routes_url")]
    pub routes_url: String,

    #[serde(default = "default_weather_url")]
    pub weather_url: String,

    #[serde(default = "default_air_quality_url")]
    pub air_quality_url: String,
}

fn default_geocoding_url() -> String {
    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
}

fn default_places_url() -> String {
    "https://places.googleapis.com/v1/places:searchText".to_string()
}

fn default_routes_url() -> String {
    "https://routes.googleapis.com/directions/v2:computeRoutes".to_string()
}

fn default_weather_url() -> String {
    "https://weather.googleapis.com/v1/forecast/days:lookup".to_string()
}

fn default_air_quality_url() -> String {
    "https://airquality.googleapis.com/v1/forecast:lookup".to_string()
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            geocoding_url: default_geocoding_url(),
            places_url: default_places_url(),
            routes_url: default_routes_url(),
            weather_url: default_weather_url(),
            air_quality_url: default_air_quality_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamesConfig {
    #[serde(default = "default_rawg_base_url")]
    pub base_url: String,

    /// Without a Redis URL responses are cached in-process.
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_rawg_base_url() -> String {
    "https://api.rawg.io/api".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_max_entries() -> u64 {
    10_000
}

impl Default for GamesConfig {
    fn default() -> Self {
        Self {
            base_url: default_rawg_base_url(),
            redis_url: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_brave_url")]
    pub brave_url: String,

    #[serde(default = "default_tavily_url")]
    pub tavily_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_brave_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".to_string()
}

fn default_tavily_url() -> String {
    "https://api.tavily.com/extract".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            brave_url: default_brave_url(),
            tavily_url: default_tavily_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolhouseConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!(
                path = %config_path.display(),
                "Configuration file not found, using defaults"
            );
            Self::default()
        };

        config.apply_env_overrides(env_var);
        Ok(config)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup("RAWG_API_BASE_URL") {
            self.games.base_url = base_url;
        }
        if let Some(redis_url) = lookup("REDIS_URL") {
            self.games.redis_url = Some(redis_url);
        }
    }
}

/// A set, non-empty environment variable.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn require_env(name: &str) -> Result<String> {
    env_var(name).with_context(|| format!("{} environment variable is required", name))
}

/// `DATABASE_URL`, or a URL assembled from the `DB_*` variables.
pub fn database_url(lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    if let Some(url) = lookup("DATABASE_URL") {
        return Ok(url);
    }

    let parts = ["DB_HOST", "DB_PORT", "DB_NAME", "DB_USER", "DB_PASSWORD"];
    let missing: Vec<&str> = parts
        .iter()
        .copied()
        .filter(|name| lookup(name).is_none())
        .collect();
    if !missing.is_empty() {
        bail!(
            "Database credentials are not configured (set DATABASE_URL or {})",
            missing.join(", ")
        );
    }

    let get = |name: &str| lookup(name).unwrap_or_default();
    let port: u16 = get("DB_PORT")
        .parse()
        .with_context(|| format!("Invalid DB_PORT: {}", get("DB_PORT")))?;

    let mut url = url::Url::parse("postgres://localhost").context("Invalid base URL")?;
    url.set_host(Some(&get("DB_HOST")))
        .context("Invalid DB_HOST")?;
    url.set_port(Some(port))
        .map_err(|_| anyhow::anyhow!("Invalid DB_PORT"))?;
    url.set_username(&get("DB_USER"))
        .map_err(|_| anyhow::anyhow!("Invalid DB_USER"))?;
    url.set_password(Some(&get("DB_PASSWORD")))
        .map_err(|_| anyhow::anyhow!("Invalid DB_PASSWORD"))?;
    url.set_path(&get("DB_NAME"));

    Ok(url.to_string())
}
