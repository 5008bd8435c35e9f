//! Google OAuth credentials and access-token refresh.

use crate::http::HttpTransport;
use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use toolhouse_core::{ToolError, ToolResult};
use tracing::{debug, info};

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const OAUTH_SERVICE: &str = "Google OAuth";

/// Tokens are refreshed this long before they expire.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Authorized-user credentials file, as written by `calendar-auth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleCredentials {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub granted_scopes: Vec<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl GoogleCredentials {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read credentials file {}. Run `toolhouse calendar-auth` first",
                path.display()
            )
        })?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credentials file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write credentials file {}", path.display()))
    }

    /// A usable access token is present and not about to expire.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expiry) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(expiry)) => expiry - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > now,
        }
    }
}

/// Token endpoint response for both the code exchange and refresh grants.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + ChronoDuration::seconds(secs))
    }

    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

pub fn oauth_transport(timeout: Duration) -> ToolResult<HttpTransport> {
    HttpTransport::new(OAUTH_SERVICE, None, timeout, &[])
}

/// Holds the credentials and hands out fresh access tokens.
pub struct TokenManager {
    http: HttpTransport,
    credentials: Mutex<GoogleCredentials>,
}

impl TokenManager {
    pub fn new(credentials: GoogleCredentials, timeout: Duration) -> ToolResult<Self> {
        Ok(Self {
            http: oauth_transport(timeout)?,
            credentials: Mutex::new(credentials),
        })
    }

    /// Current access token, refreshing it first when it has expired.
    pub async fn access_token(&self) -> ToolResult<String> {
        let mut credentials = self.credentials.lock().await;
        if !credentials.is_valid(Utc::now()) {
            self.refresh_locked(&mut credentials).await?;
        }
        credentials
            .token
            .clone()
            .ok_or_else(|| ToolError::config("Google credentials have no access token"))
    }

    /// Force a refresh when a refresh token is available.
    pub async fn refresh(&self) -> ToolResult<()> {
        let mut credentials = self.credentials.lock().await;
        if credentials.refresh_token.is_some() {
            self.refresh_locked(&mut credentials).await?;
        }
        Ok(())
    }

    async fn refresh_locked(&self, credentials: &mut GoogleCredentials) -> ToolResult<()> {
        let refresh_token = credentials.refresh_token.clone().ok_or_else(|| {
            ToolError::config(
                "Google access token expired and no refresh token is available. \
                 Run `toolhouse calendar-auth` again",
            )
        })?;

        debug!(token_uri = %credentials.token_uri, "Refreshing Google access token");
        let request = self
            .http
            .request(Method::POST, &credentials.token_uri)?
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ]);
        let response: TokenResponse = self.http.send_json(request).await?;

        credentials.expiry = response.expiry(Utc::now());
        credentials.token = Some(response.access_token);
        if let Some(rotated) = response.refresh_token {
            credentials.refresh_token = Some(rotated);
        }

        info!(expiry = ?credentials.expiry, "Refreshed Google access token");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials(token_uri: &str) -> GoogleCredentials {
        GoogleCredentials {
            token: Some("stale".to_string()),
            refresh_token: Some("refresh-1".to_string()),
            token_uri: token_uri.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            expiry: Some(Utc::now() - ChronoDuration::hours(1)),
            granted_scopes: vec![CALENDAR_SCOPE.to_string()],
        }
    }

    #[test]
    fn test_parse_authorized_user_file() {
        let json = r#"{
            "token": "ya29.a0",
            "refresh_token": "1//0g",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "id.apps.googleusercontent.com",
            "client_secret": "shh",
            "granted_scopes": ["https://www.googleapis.com/auth/calendar.events"],
            "expiry": "2025-05-16T10:00:00.123456Z"
        }"#;
        let parsed: GoogleCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.refresh_token.as_deref(), Some("1//0g"));
        assert_eq!(parsed.granted_scopes, vec![CALENDAR_SCOPE.to_string()]);
        assert!(!parsed.is_valid(Utc::now()));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("credentials.json");
        let creds = credentials(DEFAULT_TOKEN_URI);

        creds.save(&file).unwrap();
        assert_eq!(GoogleCredentials::load(&file).unwrap(), creds);

        let err = GoogleCredentials::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("calendar-auth"));
    }

    #[test]
    fn test_validity() {
        let now = Utc::now();
        let mut creds = credentials(DEFAULT_TOKEN_URI);
        assert!(!creds.is_valid(now));

        creds.expiry = Some(now + ChronoDuration::seconds(30));
        assert!(!creds.is_valid(now));

        creds.expiry = Some(now + ChronoDuration::hours(1));
        assert!(creds.is_valid(now));

        creds.expiry = None;
        assert!(creds.is_valid(now));

        creds.token = None;
        assert!(!creds.is_valid(now));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = TokenManager::new(
            credentials(&format!("{}/token", server.uri())),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(manager.access_token().await.unwrap(), "fresh");
        assert_eq!(manager.access_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let mut creds = credentials(DEFAULT_TOKEN_URI);
        creds.refresh_token = None;
        let manager = TokenManager::new(creds, Duration::from_secs(5)).unwrap();

        let err = manager.access_token().await.unwrap_err();
        assert!(matches!(err, ToolError::Config(_)));
        // Nothing to do without a refresh token.
        assert!(manager.refresh().await.is_ok());
    }
}
