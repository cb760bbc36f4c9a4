//! OAuth2 installed-application flow for the Calendar API
//!
//! Tokens are cached as JSON next to the invoices. A cached token is reused
//! while valid, refreshed when expired, and a fresh consent is requested
//! through a loopback redirect when neither is possible.

use crate::config::{Config, CALENDAR_SCOPE};
use crate::FaturaError;
use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens expiring within this window are treated as expired
const EXPIRY_MARGIN_SECS: i64 = 60;

const BROWSER_REPLY: &str = "The authentication flow has completed. You may close this window.";

/// OAuth client identity from the downloaded `credentials.json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
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

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a client secrets document (`installed` or `web` application)
    pub fn from_json(text: &str) -> Result<Self, FaturaError> {
        let file: SecretsFile = serde_json::from_str(text)?;
        file.installed.or(file.web).ok_or_else(|| {
            FaturaError::Auth(
                "client secrets have neither an \"installed\" nor a \"web\" section".to_string(),
            )
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FaturaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FaturaError::Auth(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Consent page URL redirecting back to `redirect_uri`
    pub fn authorization_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&access_type=offline&prompt=consent",
            self.auth_uri,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(CALENDAR_SCOPE),
        )
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token as kept in the cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
    pub token_type: String,
}

impl StoredToken {
    /// Build from a token response, keeping `previous_refresh` when the
    /// response carries no refresh token (refresh grants usually omit it)
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: now + Duration::seconds(response.expires_in),
            scope: response.scope,
            token_type: response.token_type,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

/// JSON file holding the last obtained token
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Cached token, or `None` when the file is missing or unreadable
    pub fn load(&self) -> Option<StoredToken> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&text) {
            Ok(token) => Some(token),
            Err(e) => {
                log::warn!("Ignoring token cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, token: &StoredToken) -> Result<(), FaturaError> {
        let text = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.path, text)?;
        log::debug!("Saved token to {}", self.path.display());
        Ok(())
    }
}

/// Obtain a usable access token: cached, refreshed, or freshly consented
pub fn authorize(config: &Config) -> Result<StoredToken, FaturaError> {
    let cache = TokenCache::new(&config.token_path);
    let now = Utc::now();
    let cached = cache.load();

    if let Some(token) = &cached {
        if token.is_valid(now) {
            log::debug!("Using cached token, expires at {}", token.expires_at);
            return Ok(token.clone());
        }
    }

    let secrets = ClientSecrets::load(&config.credentials_path)?;
    let client = Client::new();

    let token = match cached.and_then(|t| t.refresh_token) {
        Some(refresh_token) => {
            log::info!("Refreshing expired access token");
            let response = refresh(&client, &secrets, &refresh_token)?;
            StoredToken::from_response(response, Some(refresh_token), now)
        }
        None => {
            let response = consent(&client, &secrets)?;
            StoredToken::from_response(response, None, Utc::now())
        }
    };

    cache.save(&token)?;
    Ok(token)
}

/// Exchange a refresh token for a new access token
pub fn refresh(
    client: &Client,
    secrets: &ClientSecrets,
    refresh_token: &str,
) -> Result<TokenResponse, FaturaError> {
    request_token(
        client,
        secrets,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
        ],
    )
}

/// Ask the user for consent through the browser and exchange the returned code
fn consent(client: &Client, secrets: &ClientSecrets) -> Result<TokenResponse, FaturaError> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());

    println!(
        "Please visit this URL to authorize this application: {}",
        secrets.authorization_url(&redirect_uri)
    );

    let (stream, peer) = listener.accept()?;
    log::debug!("Authorization redirect from {}", peer);
    let code = answer_redirect(stream)?;

    request_token(
        client,
        secrets,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
        ],
    )
}

/// Read the browser's redirect request, reply to it, and return the code
fn answer_redirect(mut stream: TcpStream) -> Result<String, FaturaError> {
    let mut request_line = String::new();
    BufReader::new(&stream).read_line(&mut request_line)?;

    let result = code_from_request_line(&request_line);
    let body = match &result {
        Ok(_) => BROWSER_REPLY.to_string(),
        Err(e) => e.to_string(),
    };
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )?;
    stream.flush()?;
    result
}

/// Pull the authorization code out of `GET /?code=...&scope=... HTTP/1.1`
pub fn code_from_request_line(line: &str) -> Result<String, FaturaError> {
    let target = line.split_whitespace().nth(1).ok_or_else(|| {
        FaturaError::Auth(format!("malformed redirect request {:?}", line.trim()))
    })?;
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");

    let mut code = None;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(value)
            .map_err(|e| FaturaError::Auth(format!("bad redirect parameter {key}: {e}")))?
            .into_owned();
        match key {
            "error" => return Err(FaturaError::Auth(format!("consent denied: {value}"))),
            "code" if !value.is_empty() => code = Some(value),
            _ => {}
        }
    }

    code.ok_or_else(|| FaturaError::Auth("redirect carried no authorization code".to_string()))
}

fn request_token(
    client: &Client,
    secrets: &ClientSecrets,
    form: &[(&str, &str)],
) -> Result<TokenResponse, FaturaError> {
    let response = client.post(&secrets.token_uri).form(form).send()?;
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(FaturaError::Auth(format!("token endpoint returned {status}: {body}")));
    }
    Ok(serde_json::from_str(&body)?)
}
