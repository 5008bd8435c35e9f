//! Google Maps Platform tools: geocoding, places, routes, weather and air
//! quality.

use super::{markdown, non_empty};
use crate::config::{require_env, MapsConfig};
use crate::http::HttpTransport;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use toolhouse_core::{Mapping, Scalar, ToolError, ToolResult, Value};
use toolhouse_mcp::protocol::{CallToolResult, ToolSchema};
use toolhouse_mcp::tools::{
    json_schema_enum, json_schema_integer, json_schema_number, json_schema_object,
    json_schema_string, parse_arguments, tool_schema, Tool, ToolRegistry,
};
use tracing::info;

pub const DEFAULT_SEARCH_RADIUS: f64 = 500.0;
pub const MAX_SEARCH_RADIUS: f64 = 50_000.0;
pub const MIN_RADIUS: f64 = 0.0;
pub const DEFAULT_FORECAST_DAYS: u32 = 7;
pub const MIN_FORECAST_DAYS: u32 = 1;
pub const MAX_FORECAST_DAYS: u32 = 14;
pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;
pub const PLACES_PAGE_SIZE: u32 = 10;

const TRAVEL_MODES: [&str; 5] = ["DRIVE", "BICYCLE", "WALK", "TWO_WHEELER", "TRANSIT"];
const TRANSIT_MODES: [&str; 2] = ["BUS", "RAIL"];
const RANK_PREFERENCES: [&str; 2] = ["RELEVANCE", "DISTANCE"];

const PLACES_FIELDS: &[&str] = &[
    "places.id",
    "places.internationalPhoneNumber",
    "places.formattedAddress",
    "places.location",
    "places.rating",
    "places.googleMapsUri",
    "places.businessStatus",
    "places.displayName",
    "places.websiteUri",
    "places.priceLevel",
    "places.userRatingCount",
];

const ROUTES_FIELDS: &[&str] = &[
    "routes.routeLabels",
    "routes.distanceMeters",
    "routes.duration",
    "routes.description",
    "routes.warnings",
    "routes.travelAdvisory",
    "routes.legs.distanceMeters",
    "routes.legs.duration",
    "routes.legs.steps.distanceMeters",
    "routes.legs.steps.staticDuration",
    "routes.legs.steps.navigationInstruction",
    "routes.legs.steps.travelMode",
    "routes.polyline",
];

const WEATHER_FIELDS: &[&str] = &[
    "timeZone",
    "forecastDays.interval",
    "forecastDays.daytimeForecast.weatherCondition.description",
    "forecastDays.nighttimeForecast.weatherCondition.description",
    "forecastDays.maxTemperature",
    "forecastDays.minTemperature",
];

const AIR_QUALITY_FIELDS: &[&str] = &[
    "nextPageToken",
    "hourlyForecasts.dateTime",
    "hourlyForecasts.indexes.aqi",
    "hourlyForecasts.indexes.category",
    "hourlyForecasts.indexes.dominantPollutant",
    "hourlyForecasts.healthRecommendations",
];

/// Geographic coordinates in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn validate(&self) -> ToolResult<()> {
        if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&self.latitude) {
            return Err(ToolError::invalid_input(format!(
                "Latitude must be between {} and {}",
                Scalar::Float(MIN_LATITUDE),
                Scalar::Float(MAX_LATITUDE)
            )));
        }
        if !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&self.longitude) {
            return Err(ToolError::invalid_input(format!(
                "Longitude must be between {} and {}",
                Scalar::Float(MIN_LONGITUDE),
                Scalar::Float(MAX_LONGITUDE)
            )));
        }
        Ok(())
    }
}

pub fn validate_radius(radius: f64) -> ToolResult<()> {
    if !(MIN_RADIUS..=MAX_SEARCH_RADIUS).contains(&radius) {
        return Err(ToolError::invalid_input(format!(
            "Radius must be between {} and {}, got {}",
            Scalar::Float(MIN_RADIUS),
            Scalar::Float(MAX_SEARCH_RADIUS),
            Scalar::Float(radius)
        )));
    }
    Ok(())
}

pub fn validate_days(days: u32) -> ToolResult<()> {
    if !(MIN_FORECAST_DAYS..=MAX_FORECAST_DAYS).contains(&days) {
        return Err(ToolError::invalid_input(format!(
            "Days must be between {} and {}, got {}",
            MIN_FORECAST_DAYS, MAX_FORECAST_DAYS, days
        )));
    }
    Ok(())
}

fn validate_choice(value: &str, choices: &[&str], field: &str) -> ToolResult<()> {
    if !choices.contains(&value) {
        return Err(ToolError::invalid_input(format!(
            "{} must be one of: {}",
            field,
            choices.join(", ")
        )));
    }
    Ok(())
}

/// Forecast window for air quality lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start_time: String,
    pub end_time: String,
}

impl Interval {
    fn validate(&self) -> ToolResult<()> {
        for (key, timestamp) in [("startTime", &self.start_time), ("endTime", &self.end_time)] {
            if timestamp.len() < 19 {
                return Err(ToolError::invalid_input(format!(
                    "Invalid timestamp format for {}: {}",
                    key, timestamp
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodingResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    #[serde(default)]
    places: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RoutesResponse {
    #[serde(default)]
    routes: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeatherResponse {
    #[serde(default)]
    forecast_days: Vec<ForecastDay>,
    #[serde(default)]
    time_zone: Option<TimeZoneId>,
}

#[derive(Debug, Deserialize)]
struct TimeZoneId {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastDay {
    #[serde(default)]
    interval: Option<ForecastInterval>,
    #[serde(default)]
    daytime_forecast: Option<DayPartForecast>,
    #[serde(default)]
    nighttime_forecast: Option<DayPartForecast>,
    #[serde(default)]
    max_temperature: Option<Temperature>,
    #[serde(default)]
    min_temperature: Option<Temperature>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastInterval {
    start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayPartForecast {
    weather_condition: Option<WeatherCondition>,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: Option<LocalizedText>,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Temperature {
    degrees: Option<f64>,
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AirQualityResponse {
    #[serde(default)]
    hourly_forecasts: Vec<serde_json::Value>,
    #[serde(default)]
    next_page_token: Option<String>,
}

fn condition(part: Option<DayPartForecast>) -> Option<String> {
    part?.weather_condition?.description?.text
}

fn temperature(t: Option<Temperature>) -> Option<String> {
    let t = t?;
    let degrees = Scalar::Float(t.degrees?).to_string();
    Some(match t.unit.as_deref() {
        Some("CELSIUS") => format!("{} °C", degrees),
        Some("FAHRENHEIT") => format!("{} °F", degrees),
        Some(unit) => format!("{} {}", degrees, unit),
        None => degrees,
    })
}

/// Flatten forecast days to `{date, daytime, nighttime, max/min temperature}`.
fn format_weather_days(days: Vec<ForecastDay>) -> Vec<Mapping> {
    days.into_iter()
        .map(|day| {
            let date = day
                .interval
                .and_then(|i| i.start_time)
                .map(|start| start.chars().take(10).collect::<String>());
            Mapping::new()
                .with("date", date)
                .with("daytime", condition(day.daytime_forecast))
                .with("nighttime", condition(day.nighttime_forecast))
                .with("max_temperature", temperature(day.max_temperature))
                .with("min_temperature", temperature(day.min_temperature))
        })
        .collect()
}

pub struct MapsService {
    http: HttpTransport,
    config: MapsConfig,
    api_key: String,
}

impl MapsService {
    pub fn new(config: &MapsConfig, api_key: String) -> ToolResult<Self> {
        let http = HttpTransport::new(
            "Google Maps",
            None,
            Duration::from_secs(config.timeout_secs),
            &[("x-goog-api-key", api_key.clone())],
        )?;
        Ok(Self {
            http,
            config: config.clone(),
            api_key,
        })
    }

    pub fn from_env(config: &MapsConfig) -> anyhow::Result<Self> {
        let api_key = require_env("GOOGLE_MAPS_API_KEY")?;
        Ok(Self::new(config, api_key)?)
    }

    pub async fn geocode(&self, address: &str) -> ToolResult<Location> {
        let response: GeocodingResponse = self
            .http
            .get_json(
                &self.config.geocoding_url,
                &[("address", address), ("key", self.api_key.as_str())],
            )
            .await?;

        match response.status.as_deref() {
            None | Some("OK") | Some("ZERO_RESULTS") => {}
            Some(status) => {
                return Err(ToolError::upstream(
                    "Google Maps",
                    format!(
                        "{}: {}",
                        status,
                        response.error_message.unwrap_or_default()
                    ),
                ))
            }
        }

        let first = response.results.into_iter().next().ok_or_else(|| {
            ToolError::not_found(format!(
                "No coordinates found for address: '{}'. \
                 Please verify the address is correct and try again.",
                address
            ))
        })?;

        Ok(Location {
            latitude: first.geometry.location.lat,
            longitude: first.geometry.location.lng,
        })
    }

    pub async fn search_places(
        &self,
        query: &str,
        location: Location,
        radius: f64,
        order_by: Option<&str>,
    ) -> ToolResult<Vec<serde_json::Value>> {
        let mut payload = serde_json::json!({
            "textQuery": query,
            "locationBias": {
                "circle": {"center": location, "radius": radius}
            },
            "pageSize": PLACES_PAGE_SIZE,
        });
        if let Some(order_by) = order_by {
            payload["rankPreference"] = serde_json::Value::from(order_by);
        }

        let request = self
            .http
            .request(Method::POST, &self.config.places_url)?
            .header("x-goog-fieldmask", PLACES_FIELDS.join(","))
            .json(&payload);
        let response: PlacesResponse = self.http.send_json(request).await?;
        Ok(response.places)
    }

    pub async fn routes(
        &self,
        source: &str,
        destination: &str,
        travel_mode: &str,
        transit_travel_mode: &str,
    ) -> ToolResult<Vec<serde_json::Value>> {
        let mut payload = serde_json::json!({
            "origin": {"address": source},
            "destination": {"address": destination},
            "travelMode": travel_mode,
            "computeAlternativeRoutes": true,
            "routeModifiers": {
                "avoidTolls": false,
                "avoidHighways": false,
                "avoidFerries": false
            }
        });
        if travel_mode == "TRANSIT" {
            payload["transitPreferences"] =
                serde_json::json!({"allowedTravelModes": [transit_travel_mode]});
        }

        let request = self
            .http
            .request(Method::POST, &self.config.routes_url)?
            .header("x-goog-fieldmask", ROUTES_FIELDS.join(","))
            .json(&payload);
        let response: RoutesResponse = self.http.send_json(request).await?;
        Ok(response.routes)
    }

    pub async fn weather(&self, location: Location, days: u32) -> ToolResult<Mapping> {
        let response: WeatherResponse = self
            .http
            .get_json(
                &self.config.weather_url,
                &[
                    ("key", self.api_key.clone()),
                    ("location.latitude", location.latitude.to_string()),
                    ("location.longitude", location.longitude.to_string()),
                    ("days", days.to_string()),
                    ("pageSize", days.to_string()),
                    ("fields", WEATHER_FIELDS.join(",")),
                ],
            )
            .await?;

        if response.forecast_days.is_empty() {
            return Err(ToolError::not_found(format!(
                "No weather forecast available for location ({}, {})",
                location.latitude, location.longitude
            )));
        }

        let timezone = response
            .time_zone
            .and_then(|tz| tz.id)
            .unwrap_or_else(|| "Unknown".to_string());

        Ok(Mapping::new()
            .with("forecast", format_weather_days(response.forecast_days))
            .with("timezone", timezone))
    }

    pub async fn air_quality(
        &self,
        location: Location,
        interval: &Interval,
        page_token: &str,
    ) -> ToolResult<Mapping> {
        let response: AirQualityResponse = self
            .http
            .post_json(
                &self.config.air_quality_url,
                &[
                    ("key", self.api_key.clone()),
                    ("fields", AIR_QUALITY_FIELDS.join(",")),
                ],
                &serde_json::json!({
                    "location": location,
                    "period": interval,
                    "pageToken": page_token
                }),
            )
            .await?;

        if response.hourly_forecasts.is_empty() {
            return Err(ToolError::not_found(format!(
                "No air quality forecast available for location ({}, {}) \
                 in the specified time interval",
                location.latitude, location.longitude
            )));
        }

        Ok(Mapping::new()
            .with("forecast", Value::from(response.hourly_forecasts))
            .with("next_page_token", response.next_page_token))
    }
}

fn location_schema() -> serde_json::Value {
    json_schema_object(
        serde_json::json!({
            "latitude": json_schema_number("Latitude in degrees (-90 to 90)"),
            "longitude": json_schema_number("Longitude in degrees (-180 to 180)")
        }),
        vec!["latitude", "longitude"],
    )
}

/// Tool that turns an address into coordinates
pub struct AddressGeocodingTool {
    service: Arc<MapsService>,
}

#[derive(Debug, Deserialize)]
struct AddressGeocodingArgs {
    address: String,
}

#[async_trait]
impl Tool for AddressGeocodingTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "address_geocoding",
            "Address Geocoding",
            "Convert a street address to geographic coordinates (latitude/longitude).",
            true,
            json_schema_object(
                serde_json::json!({"address": json_schema_string("Street address to geocode")}),
                vec!["address"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: AddressGeocodingArgs = parse_arguments("address_geocoding", arguments)?;
        let address = non_empty(&args.address, "Address")?;

        let location = self.service.geocode(address).await?;
        info!(address = %address, "Geocoded address");

        markdown(&Mapping::from_serialize(&location)?, &[])
    }
}

/// Tool that searches places around a point
pub struct SearchPlacesTool {
    service: Arc<MapsService>,
}

#[derive(Debug, Deserialize)]
struct SearchPlacesArgs {
    query: String,
    location: Location,
    #[serde(default = "default_radius")]
    radius: f64,
    #[serde(default)]
    order_by: Option<String>,
}

fn default_radius() -> f64 {
    DEFAULT_SEARCH_RADIUS
}

#[async_trait]
impl Tool for SearchPlacesTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "search_places",
            "Search Places",
            "Search for places near a location based on a text query.",
            true,
            json_schema_object(
                serde_json::json!({
                    "query": json_schema_string("Search term, e.g. 'coffee shop'"),
                    "location": location_schema(),
                    "radius": json_schema_number("Search radius in meters (0 to 50000, default: 500)"),
                    "order_by": json_schema_enum(&RANK_PREFERENCES, "Result ranking preference")
                }),
                vec!["query", "location"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: SearchPlacesArgs = parse_arguments("search_places", arguments)?;
        let query = non_empty(&args.query, "Search query")?;
        args.location.validate()?;
        validate_radius(args.radius)?;
        let order_by = args.order_by.as_deref().filter(|o| !o.is_empty());
        if let Some(order_by) = order_by {
            validate_choice(order_by, &RANK_PREFERENCES, "order_by")?;
        }

        let places = self
            .service
            .search_places(query, args.location, args.radius, order_by)
            .await?;

        if places.is_empty() {
            return Ok(CallToolResult::text(format!(
                "No places found for query '{}' within {}m radius. \
                 Try expanding your search radius or using different keywords.",
                query,
                Scalar::Float(args.radius)
            )));
        }

        info!(count = places.len(), query = %query, "Found places");
        markdown(&Mapping::new().with("places", Value::from(places)), &[])
    }
}

/// Tool that computes routes between two addresses
pub struct GetRouteTool {
    service: Arc<MapsService>,
}

#[derive(Debug, Deserialize)]
struct GetRouteArgs {
    source: String,
    destination: String,
    travel_mode: String,
    #[serde(default = "default_transit_mode")]
    transit_travel_mode: String,
}

fn default_transit_mode() -> String {
    "RAIL".to_string()
}

#[async_trait]
impl Tool for GetRouteTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_route",
            "Get Route",
            "Calculate route directions between two locations.",
            true,
            json_schema_object(
                serde_json::json!({
                    "source": json_schema_string("Starting address or plus code"),
                    "destination": json_schema_string("Destination address or plus code"),
                    "travel_mode": json_schema_enum(&TRAVEL_MODES, "Transportation method"),
                    "transit_travel_mode": json_schema_enum(&TRANSIT_MODES, "Public transit preference for TRANSIT (default: RAIL)")
                }),
                vec!["source", "destination", "travel_mode"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GetRouteArgs = parse_arguments("get_route", arguments)?;
        let source = non_empty(&args.source, "Source address")?;
        let destination = non_empty(&args.destination, "Destination address")?;
        validate_choice(&args.travel_mode, &TRAVEL_MODES, "travel_mode")?;
        validate_choice(&args.transit_travel_mode, &TRANSIT_MODES, "transit_travel_mode")?;

        let routes = self
            .service
            .routes(source, destination, &args.travel_mode, &args.transit_travel_mode)
            .await?;

        if routes.is_empty() {
            return Err(ToolError::not_found(format!(
                "No routes found between '{}' and '{}' for travel mode '{}'. \
                 Please verify the addresses.",
                source, destination, args.travel_mode
            )));
        }

        info!(count = routes.len(), source = %source, destination = %destination, "Found routes");
        markdown(&Mapping::new().with("routes", Value::from(routes)), &[])
    }
}

/// Tool that fetches a daily weather forecast
pub struct GetWeatherForecastTool {
    service: Arc<MapsService>,
}

#[derive(Debug, Deserialize)]
struct GetWeatherForecastArgs {
    location: Location,
    #[serde(default = "default_days")]
    days: u32,
}

fn default_days() -> u32 {
    DEFAULT_FORECAST_DAYS
}

#[async_trait]
impl Tool for GetWeatherForecastTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_weather_forecast",
            "Get Weather Forecast",
            "Retrieve a daily weather forecast for a location.",
            true,
            json_schema_object(
                serde_json::json!({
                    "location": location_schema(),
                    "days": json_schema_integer("Number of forecast days (1-14, default: 7)")
                }),
                vec!["location"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GetWeatherForecastArgs = parse_arguments("get_weather_forecast", arguments)?;
        args.location.validate()?;
        validate_days(args.days)?;

        let forecast = self.service.weather(args.location, args.days).await?;
        info!(days = args.days, "Retrieved weather forecast");
        markdown(&forecast, &[])
    }
}

/// Tool that fetches hourly air quality forecasts
pub struct GetAirQualityForecastTool {
    service: Arc<MapsService>,
}

#[derive(Debug, Deserialize)]
struct GetAirQualityForecastArgs {
    location: Location,
    interval: Interval,
    #[serde(default)]
    page_token: String,
}

#[async_trait]
impl Tool for GetAirQualityForecastTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "get_air_quality_forecast",
            "Get Air Quality Forecast",
            "Retrieve an hourly air quality forecast and health recommendations.",
            true,
            json_schema_object(
                serde_json::json!({
                    "location": location_schema(),
                    "interval": json_schema_object(
                        serde_json::json!({
                            "startTime": json_schema_string("RFC 3339 start, e.g. 2025-06-01T00:00:00Z"),
                            "endTime": json_schema_string("RFC 3339 end")
                        }),
                        vec!["startTime", "endTime"],
                    ),
                    "page_token": json_schema_string("Token for the next page of hourly forecasts")
                }),
                vec!["location", "interval"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: GetAirQualityForecastArgs =
            parse_arguments("get_air_quality_forecast", arguments)?;
        args.location.validate()?;
        args.interval.validate()?;

        let forecast = self
            .service
            .air_quality(args.location, &args.interval, &args.page_token)
            .await?;
        info!("Retrieved air quality forecast");
        markdown(&forecast, &[])
    }
}

pub fn registry(service: Arc<MapsService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AddressGeocodingTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(SearchPlacesTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GetRouteTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GetWeatherForecastTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GetAirQualityForecastTool { service }));
    registry
}
