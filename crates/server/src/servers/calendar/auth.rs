//! Interactive OAuth consent flow behind `toolhouse calendar-auth`.
//!
//! Prints the consent URL, waits for Google to redirect the browser to a
//! local callback with `?code=...`, exchanges the code and writes the
//! authorized-user credentials file.

use super::credentials::{
    oauth_transport, GoogleCredentials, TokenResponse, CALENDAR_SCOPE, DEFAULT_TOKEN_URI,
};
use crate::config::CalendarConfig;
use crate::http::HttpTransport;
use anyhow::{bail, Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::info;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const CALLBACK_REPLY: &str = "Authentication complete. You can close this window.";

/// OAuth client from the `client_secret.json` downloaded from Google Cloud.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

impl OAuthClient {
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretFile =
            serde_json::from_str(content).context("Failed to parse client secret file")?;
        match file.installed.or(file.web) {
            Some(client) => Ok(client),
            None => bail!("Client secret file has neither an \"installed\" nor a \"web\" client"),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client secret file {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Consent page URL requesting offline access to calendar events.
    pub fn authorization_url(&self, redirect_uri: &str) -> Result<url::Url> {
        url::Url::parse_with_params(
            &self.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", CALENDAR_SCOPE),
                ("access_type", "offline"),
                ("include_granted_scopes", "true"),
                ("prompt", "consent"),
            ],
        )
        .context("Invalid auth_uri in client secret file")
    }

    /// Trade an authorization code for credentials.
    pub async fn exchange_code(
        &self,
        http: &HttpTransport,
        code: &str,
        redirect_uri: &str,
    ) -> Result<GoogleCredentials> {
        let request = http.request(Method::POST, &self.token_uri)?.form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ]);
        let response: TokenResponse = http.send_json(request).await?;

        if response.refresh_token.is_none() {
            tracing::warn!("Token response has no refresh token; access will lapse on expiry");
        }

        Ok(GoogleCredentials {
            expiry: response.expiry(Utc::now()),
            granted_scopes: response.scopes(),
            token: Some(response.access_token),
            refresh_token: response.refresh_token,
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        })
    }
}

type CodeSender = Arc<Mutex<Option<oneshot::Sender<String>>>>;

async fn callback(
    State(sender): State<CodeSender>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    let Some(code) = params.get("code").filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing authorization code.");
    };

    if let Some(tx) = sender.lock().await.take() {
        let _ = tx.send(code.clone());
    }
    (StatusCode::OK, CALLBACK_REPLY)
}

/// Router answering the OAuth redirect on any path.
fn callback_router(sender: CodeSender) -> Router {
    Router::new()
        .route("/", get(callback))
        .fallback(callback)
        .with_state(sender)
}

/// Serve the callback on `listener` until the first code arrives.
pub async fn receive_code(listener: TcpListener) -> Result<String> {
    let (tx, rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let app = callback_router(Arc::new(Mutex::new(Some(tx))));

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = done_rx.await;
            })
            .await
    });

    let code = rx.await.context("Callback server stopped before a code arrived")?;
    let _ = done_tx.send(());
    server.await.context("Callback server task failed")??;
    Ok(code)
}

fn callback_addr(redirect_uri: &str) -> Result<String> {
    let url = url::Url::parse(redirect_uri).context("Invalid redirect URI")?;
    let port = url
        .port_or_known_default()
        .context("Redirect URI has no port")?;
    Ok(format!("127.0.0.1:{}", port))
}

/// Run the whole consent flow and write the credentials file.
pub async fn run(config: &CalendarConfig) -> Result<()> {
    let client = OAuthClient::load(Path::new(&config.client_secret_file))?;
    let auth_url = client.authorization_url(&config.redirect_uri)?;

    let addr = callback_addr(&config.redirect_uri)?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind OAuth callback listener on {}", addr))?;
    info!(addr = %addr, "Waiting for the OAuth callback");

    println!("Open this URL in your browser to authorize calendar access:\n\n{}\n", auth_url);

    let code = receive_code(listener).await?;
    let http = oauth_transport(Duration::from_secs(config.timeout_secs))?;
    let credentials = client
        .exchange_code(&http, &code, &config.redirect_uri)
        .await?;

    credentials.save(Path::new(&config.credentials_file))?;
    info!(path = %config.credentials_file, "Stored Google credentials");
    println!("Credentials are stored successfully!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENT_SECRET: &str = r#"{
        "installed": {
            "client_id": "id.apps.googleusercontent.com",
            "project_id": "toolhouse",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "shh",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn test_client_secret_variants() {
        let client = OAuthClient::from_json(CLIENT_SECRET).unwrap();
        assert_eq!(client.client_id, "id.apps.googleusercontent.com");

        let web = OAuthClient::from_json(r#"{"web": {"client_id": "w", "client_secret": "s"}}"#)
            .unwrap();
        assert_eq!(web.token_uri, DEFAULT_TOKEN_URI);

        assert!(OAuthClient::from_json(r#"{"other": {}}"#).is_err());
    }

    #[test]
    fn test_authorization_url() {
        let client = OAuthClient::from_json(CLIENT_SECRET).unwrap();
        let url = client.authorization_url("http://localhost:8080").unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["scope"], CALENDAR_SCOPE);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["include_granted_scopes"], "true");
        assert_eq!(params["redirect_uri"], "http://localhost:8080");
        assert_eq!(params["response_type"], "code");
    }

    #[test]
    fn test_callback_addr() {
        assert_eq!(callback_addr("http://localhost:8080").unwrap(), "127.0.0.1:8080");
        assert_eq!(callback_addr("http://localhost").unwrap(), "127.0.0.1:80");
        assert!(callback_addr("not a url").is_err());
    }

    #[tokio::test]
    async fn test_callback_receives_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiter = tokio::spawn(receive_code(listener));

        let client = reqwest::Client::new();
        let missing = client
            .get(format!("http://{}/?state=x", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 400);

        let ok = client
            .get(format!("http://{}/?code=4%2F0Ab&scope=x", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), 200);
        assert_eq!(ok.text().await.unwrap(), CALLBACK_REPLY);

        assert_eq!(waiter.await.unwrap().unwrap(), "4/0Ab");
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3599,
                "refresh_token": "1//refresh",
                "scope": CALENDAR_SCOPE,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let client = OAuthClient {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: format!("{}/token", server.uri()),
        };
        let http = oauth_transport(Duration::from_secs(5)).unwrap();
        let creds = client
            .exchange_code(&http, "abc", "http://localhost:8080")
            .await
            .unwrap();

        assert_eq!(creds.token.as_deref(), Some("ya29.new"));
        assert_eq!(creds.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(creds.granted_scopes, vec![CALENDAR_SCOPE.to_string()]);
        assert!(creds.is_valid(Utc::now()));

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("credentials.json");
        creds.save(&file).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(written["client_id"], "id");
        assert_eq!(written["token_uri"], format!("{}/token", server.uri()));
    }
}
