//! OAuth2 credentials for the mail transport.
//!
//! The first authorization is interactive: the user opens the consent URL,
//! approves access, and pastes back the code (or the whole redirect URL).
//! The resulting token is cached on disk and refreshed silently whenever it
//! has expired.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PostError, Result};

/// Scope granting SMTP access.
pub const MAIL_SCOPE: &str = "https://mail.google.com/";

/// Redirect used when the client secret lists none.
const DEFAULT_REDIRECT: &str = "http://localhost";

/// Tokens this close to expiry are refreshed first.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An installed-app OAuth client.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

impl OAuthClient {
    /// Load a client secret JSON file (`{"installed": {...}}` or `{"web": {...}}`).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PostError::Config(format!("client secret {}: {e}", path.display()))
        })?;
        let file: ClientSecretFile = serde_json::from_str(&raw)
            .map_err(|e| PostError::Config(format!("client secret {}: {e}", path.display())))?;
        file.installed.or(file.web).ok_or_else(|| {
            PostError::Config(format!(
                "client secret {} has no 'installed' or 'web' section",
                path.display()
            ))
        })
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT)
    }
}

/// A token as cached on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Usable at `now` without a refresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_cached(self, now: DateTime<Utc>, previous_refresh: Option<String>) -> CachedToken {
        CachedToken {
            access_token: self.access_token,
            // Refresh responses usually omit the refresh token
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + Duration::seconds(self.expires_in.unwrap_or(3600)),
        }
    }
}

/// Hands out valid access tokens, refreshing and caching as needed.
pub struct TokenProvider {
    client: OAuthClient,
    cache_path: PathBuf,
    http: reqwest::blocking::Client,
}

impl TokenProvider {
    pub fn new(client: OAuthClient, cache_path: PathBuf) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()
            .map_err(|e| PostError::Auth(e.to_string()))?;
        Ok(Self {
            client,
            cache_path,
            http,
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn has_cached_token(&self) -> bool {
        self.cache_path.exists()
    }

    /// A valid access token, refreshing the cached one if it has expired.
    pub fn access_token(&self, now: DateTime<Utc>) -> Result<String> {
        let cached = self.load_cached()?.ok_or_else(|| {
            PostError::Auth("no cached token; run `slowpost authorize`".into())
        })?;
        if cached.is_fresh(now) {
            return Ok(cached.access_token);
        }

        let refresh_token = cached.refresh_token.clone().ok_or_else(|| {
            PostError::Auth("token expired and no refresh token is cached".into())
        })?;
        debug!("Refreshing OAuth access token");
        let response = self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ])?;
        let token = response.into_cached(now, Some(refresh_token));
        self.store(&token)?;
        info!(expires_at = %token.expires_at, "Refreshed OAuth access token");
        Ok(token.access_token)
    }

    /// The consent page the user must visit.
    pub fn authorization_url(&self) -> Result<Url> {
        Url::parse_with_params(
            &self.client.auth_uri,
            &[
                ("client_id", self.client.client_id.as_str()),
                ("redirect_uri", self.client.redirect_uri()),
                ("response_type", "code"),
                ("scope", MAIL_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| PostError::Config(format!("invalid auth_uri: {e}")))
    }

    /// Exchange an authorization code and cache the resulting token.
    pub fn exchange_code(&self, code: &str, now: DateTime<Utc>) -> Result<CachedToken> {
        let response = self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.client.redirect_uri()),
        ])?;
        let token = response.into_cached(now, None);
        self.store(&token)?;
        info!(path = %self.cache_path.display(), "Cached OAuth token");
        Ok(token)
    }

    /// Run the one-time interactive flow over the given input and output.
    pub fn authorize_interactive(
        &self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
        now: DateTime<Utc>,
    ) -> Result<CachedToken> {
        let url = self.authorization_url()?;
        writeln!(output, "Open this URL in a browser and approve access:")?;
        writeln!(output)?;
        writeln!(output, "  {url}")?;
        writeln!(output)?;
        write!(output, "Paste the code or the full redirect URL: ")?;
        output.flush()?;

        let mut line = String::new();
        input.read_line(&mut line)?;
        let code = extract_code(&line)
            .ok_or_else(|| PostError::Auth("no authorization code entered".into()))?;
        self.exchange_code(&code, now)
    }

    fn request_token(&self, grant: &[(&str, &str)]) -> Result<TokenResponse> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", self.client.client_secret.as_str()),
        ];
        form.extend_from_slice(grant);

        let response = self
            .http
            .post(&self.client.token_uri)
            .form(&form)
            .send()
            .map_err(|e| PostError::Auth(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PostError::Auth(format!("token endpoint returned {status}: {body}")));
        }
        response
            .json::<TokenResponse>()
            .map_err(|e| PostError::Auth(format!("unreadable token response: {e}")))
    }

    fn load_cached(&self) -> Result<Option<CachedToken>> {
        if !self.cache_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.cache_path)
            .map_err(|e| PostError::io(&self.cache_path, e))?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn store(&self, token: &CachedToken) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PostError::io(parent, e))?;
        }
        let raw = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.cache_path, raw).map_err(|e| PostError::io(&self.cache_path, e))
    }
}

/// Pull the authorization code out of what the user pasted: either the
/// bare code or a redirect URL carrying a `code` query parameter.
pub fn extract_code(pasted: &str) -> Option<String> {
    let trimmed = pasted.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(trimmed) {
        return url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned());
    }
    Some(trimmed.to_string())
}
