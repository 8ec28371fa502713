//! Google Sheets v4 client.
//!
//! Authorizes with an "authorized user" OAuth token (the `token.json` written
//! by Google's client libraries). An expired access token is refreshed with
//! the stored refresh token and written back to the token file.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ConfigError, StoreError};
use crate::store::{SheetRange, TabularStore};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Environment variable holding the token JSON when no token file exists.
pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_TOKEN";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorizedUserToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    /// Fields we do not use (scopes, account, ...) survive a rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AuthorizedUserToken {
    /// Read from `path`, falling back to the [`TOKEN_ENV`] variable.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = if path.exists() {
            std::fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidCredentials(format!("{}: {}", path.display(), e))
            })?
        } else {
            std::env::var(TOKEN_ENV).map_err(|_| ConfigError::MissingCredentials)?
        };
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let token: AuthorizedUserToken = serde_json::from_str(raw)
            .map_err(|e| ConfigError::InvalidCredentials(format!("not valid token JSON: {e}")))?;
        if token.token.is_none() && !token.can_refresh() {
            return Err(ConfigError::InvalidCredentials(
                "token has neither an access token nor refresh credentials".to_string(),
            ));
        }
        Ok(token)
    }

    fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Usable access token, with a minute of slack before expiry.
    fn access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.token.as_deref()?;
        match self.expiry {
            Some(expiry) if expiry <= now + ChronoDuration::seconds(60) => None,
            _ => Some(token),
        }
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Deserialize)]
struct AppendUpdates {
    #[serde(rename = "updatedRange", default)]
    updated_range: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

struct TokenSource {
    token: AuthorizedUserToken,
    path: Option<PathBuf>,
}

pub struct SheetsClient {
    http: Client,
    spreadsheet_id: String,
    auth: Mutex<TokenSource>,
}

impl SheetsClient {
    /// `token_path`, when given, receives refreshed tokens.
    pub fn new(
        spreadsheet_id: &str,
        token: AuthorizedUserToken,
        token_path: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {e}")))?;
        Ok(SheetsClient {
            http,
            spreadsheet_id: spreadsheet_id.to_string(),
            auth: Mutex::new(TokenSource {
                token,
                path: token_path,
            }),
        })
    }

    fn values_url(&self, range: &SheetRange) -> String {
        format!(
            "{}/{}/values/{}",
            SHEETS_API,
            self.spreadsheet_id,
            urlencoding::encode(&range.to_string())
        )
    }

    fn bearer(&self) -> Result<String, StoreError> {
        let mut source = self
            .auth
            .lock()
            .map_err(|_| StoreError::Auth("token lock poisoned".to_string()))?;
        if let Some(token) = source.token.access_token(Utc::now()) {
            return Ok(token.to_string());
        }
        if !source.token.can_refresh() {
            return Err(StoreError::Auth(
                "access token expired and no refresh token is available".to_string(),
            ));
        }

        info!("refreshing Google access token");
        let token = &source.token;
        let params = [
            ("client_id", token.client_id.clone().unwrap_or_default()),
            ("client_secret", token.client_secret.clone().unwrap_or_default()),
            ("refresh_token", token.refresh_token.clone().unwrap_or_default()),
            ("grant_type", "refresh_token".to_string()),
        ];
        let response = self.http.post(&token.token_uri).form(&params).send()?;
        let refreshed: RefreshResponse = check(response)
            .map_err(|e| StoreError::Auth(e.to_string()))?
            .json()?;

        source.token.token = Some(refreshed.access_token.clone());
        source.token.expiry = refreshed
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));
        if let Some(path) = &source.path {
            // Losing the cached token only costs another refresh next time.
            match serde_json::to_string(&source.token) {
                Ok(json) => {
                    if let Err(e) = std::fs::write(path, json) {
                        warn!("could not write refreshed token to {}: {}", path.display(), e);
                    }
                }
                Err(e) => warn!("could not serialize refreshed token: {}", e),
            }
        }
        Ok(refreshed.access_token)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.bearer_auth(self.bearer()?).send()?;
        check(response)
    }
}

/// Turn a non-success response into [`StoreError::Api`], keeping Google's
/// error message when the body has one.
fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

impl TabularStore for SheetsClient {
    fn read(&self, range: &SheetRange) -> Result<Vec<Vec<String>>, StoreError> {
        debug!("reading {}", range);
        let response = self.send(self.http.get(self.values_url(range)))?;
        let values: ValueRange = response.json()?;
        Ok(values.values)
    }

    fn append(&self, range: &SheetRange, row: Vec<String>) -> Result<String, StoreError> {
        debug!("appending to {}", range);
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(range)
        );
        let response = self.send(self.http.post(url).json(&json!({ "values": [row] })))?;
        let appended: AppendResponse = response.json()?;
        Ok(appended
            .updates
            .map(|updates| updates.updated_range)
            .unwrap_or_default())
    }

    fn update(&self, range: &SheetRange, row: Vec<String>) -> Result<(), StoreError> {
        debug!("updating {}", range);
        let url = format!("{}?valueInputOption=RAW", self.values_url(range));
        let body = json!({ "range": range.to_string(), "values": [row] });
        self.send(self.http.put(url).json(&body))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_authorized_user_token() {
        let raw = r#"{
            "token": "ya29.abc",
            "refresh_token": "1//r",
            "client_id": "id.apps.googleusercontent.com",
            "client_secret": "s",
            "scopes": ["https://www.googleapis.com/auth/spreadsheets"],
            "expiry": "2030-01-01T00:00:00Z"
        }"#;
        let token = AuthorizedUserToken::parse(raw).unwrap();
        assert_eq!(token.token_uri, DEFAULT_TOKEN_URI);
        assert!(token.extra.contains_key("scopes"));
        let now = "2029-12-31T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(token.access_token(now), Some("ya29.abc"));
    }

    #[test]
    fn expired_token_needs_refresh() {
        let raw = r#"{"token": "old", "expiry": "2020-01-01T00:00:00Z"}"#;
        let token = AuthorizedUserToken::parse(raw).unwrap();
        assert_eq!(token.access_token(Utc::now()), None);
        assert!(!token.can_refresh());
    }

    #[test]
    fn rejects_unusable_tokens() {
        assert!(matches!(
            AuthorizedUserToken::parse("not json"),
            Err(ConfigError::InvalidCredentials(_))
        ));
        assert!(matches!(
            AuthorizedUserToken::parse(r#"{"client_id": "x"}"#),
            Err(ConfigError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn range_is_percent_encoded() {
        let token = AuthorizedUserToken::parse(r#"{"token": "t"}"#).unwrap();
        let client =
            SheetsClient::new("sheet-id", token, None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.values_url(&SheetRange::columns("Geral", 1, 34)),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/Geral%21A1%3AAH"
        );
    }
}
