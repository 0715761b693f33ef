//! Audit sink backed by a Google spreadsheet worksheet.
//!
//! The spreadsheet is found by name through the Drive files listing (unless
//! an id is configured) and rows go through the Sheets `values:append` call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use super::{AuditRow, AuditSink};
use crate::errors::{TierError, TierResult};
use crate::secrets::ServiceAccount;

pub const SHEETS_API: &str = "https://sheets.googleapis.com";
pub const DRIVE_API: &str = "https://www.googleapis.com";
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Append rows and find the spreadsheet by name.
pub const AUDIT_SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Supplies OAuth bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self, client: &Client) -> TierResult<String>;
}

pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self, _client: &Client) -> TierResult<String> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Last issued token, reused until a minute before it expires.
#[derive(Default)]
struct TokenCache(Mutex<Option<(String, Instant)>>);

impl TokenCache {
    async fn get_or_refresh<F, Fut>(&self, refresh: F) -> TierResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TierResult<TokenResponse>>,
    {
        let mut cached = self.0.lock().await;
        if let Some((token, valid_until)) = cached.as_ref() {
            if Instant::now() < *valid_until {
                return Ok(token.clone());
            }
        }

        let resp = refresh().await?;
        let lifetime = Duration::from_secs(resp.expires_in.saturating_sub(60));
        *cached = Some((resp.access_token.clone(), Instant::now() + lifetime));
        debug!(expires_in = resp.expires_in, "access token refreshed");
        Ok(resp.access_token)
    }
}

/// Tokens from the compute metadata server.
pub struct MetadataToken {
    url: String,
    cache: TokenCache,
}

impl MetadataToken {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache: TokenCache::default(),
        }
    }
}

impl Default for MetadataToken {
    fn default() -> Self {
        Self::new(METADATA_TOKEN_URL)
    }
}

#[async_trait]
impl TokenSource for MetadataToken {
    async fn access_token(&self, client: &Client) -> TierResult<String> {
        self.cache
            .get_or_refresh(move || async move {
                let resp = client
                    .get(&self.url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| TierError::network("fetching metadata token", e))?
                    .json::<TokenResponse>()
                    .await
                    .map_err(|e| TierError::network("decoding metadata token", e))?;
                Ok::<_, TierError>(resp)
            })
            .await
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Tokens minted from a service-account key with the JWT bearer grant.
pub struct ServiceAccountToken {
    client_email: String,
    token_uri: String,
    key_id: Option<String>,
    key: EncodingKey,
    cache: TokenCache,
}

impl ServiceAccountToken {
    pub fn new(account: &ServiceAccount) -> TierResult<Self> {
        let client_email = account
            .client_email
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| TierError::config("secrets file has no client_email"))?;
        let pem = account
            .private_key
            .as_deref()
            .ok_or_else(|| TierError::config("secrets file has no private_key"))?;
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| TierError::config(format!("invalid service-account private_key: {e}")))?;

        Ok(Self {
            client_email,
            token_uri: account
                .token_uri
                .clone()
                .unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
            key_id: account.private_key_id.clone(),
            key,
            cache: TokenCache::default(),
        })
    }

    /// Signed RS256 assertion for the token endpoint.
    fn assertion(&self, now: DateTime<Utc>) -> TierResult<String> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: AUDIT_SCOPES,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| TierError::auth(format!("signing token assertion: {e}")))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountToken {
    async fn access_token(&self, client: &Client) -> TierResult<String> {
        self.cache
            .get_or_refresh(move || async move {
                let assertion = self.assertion(Utc::now())?;
                let resp = client
                    .post(&self.token_uri)
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| TierError::network("exchanging service-account assertion", e))?
                    .json::<TokenResponse>()
                    .await
                    .map_err(|e| TierError::network("decoding service-account token", e))?;
                Ok::<_, TierError>(resp)
            })
            .await
    }
}

/// Token source for a secrets file: its private key when present, otherwise
/// its pre-issued `access_token`.
pub fn secrets_token_source(account: &ServiceAccount) -> TierResult<Arc<dyn TokenSource>> {
    if account.has_private_key() {
        info!(account = %account, "signing audit tokens with the service-account key");
        return Ok(Arc::new(ServiceAccountToken::new(account)?));
    }
    let token = account.require_access_token().map_err(|_| {
        TierError::config("secrets file has neither a private_key nor an access_token")
    })?;
    info!(account = %account, "using a static access token for audit");
    Ok(Arc::new(StaticToken::new(token)))
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

pub struct SheetsAuditSink {
    client: Client,
    tokens: Arc<dyn TokenSource>,
    spreadsheet_name: String,
    worksheet: String,
    spreadsheet_id: OnceCell<String>,
    sheets_base: String,
    drive_base: String,
}

impl SheetsAuditSink {
    pub fn new(
        client: Client,
        tokens: Arc<dyn TokenSource>,
        spreadsheet_name: &str,
        spreadsheet_id: Option<String>,
        worksheet: &str,
    ) -> Self {
        Self {
            client,
            tokens,
            spreadsheet_name: spreadsheet_name.to_string(),
            worksheet: worksheet.to_string(),
            spreadsheet_id: OnceCell::new_with(spreadsheet_id),
            sheets_base: SHEETS_API.to_string(),
            drive_base: DRIVE_API.to_string(),
        }
    }

    /// Point both APIs at another host.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.sheets_base = base.trim_end_matches('/').to_string();
        self.drive_base = self.sheets_base.clone();
        self
    }

    async fn spreadsheet_id(&self, token: &str) -> TierResult<&str> {
        self.spreadsheet_id
            .get_or_try_init(|| self.find_spreadsheet(token))
            .await
            .map(String::as_str)
    }

    async fn find_spreadsheet(&self, token: &str) -> TierResult<String> {
        let query = format!(
            "name = '{}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false",
            self.spreadsheet_name.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let url = format!("{}/drive/v3/files", self.drive_base);
        let list: DriveFileList = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TierError::network("looking up audit spreadsheet", e))?
            .json()
            .await
            .map_err(|e| TierError::network("decoding spreadsheet lookup", e))?;

        let file = list.files.into_iter().next().ok_or_else(|| {
            TierError::audit("open spreadsheet", format!("no spreadsheet named '{}'", self.spreadsheet_name))
        })?;
        info!(spreadsheet = %self.spreadsheet_name, id = %file.id, "audit spreadsheet resolved");
        Ok(file.id)
    }

    fn append_url(&self, spreadsheet_id: &str) -> TierResult<Url> {
        let mut url = Url::parse(&self.sheets_base)
            .map_err(|e| TierError::config(format!("invalid sheets API base: {e}")))?;
        let range = format!("'{}'!A:B:append", self.worksheet.replace('\'', "''"));
        url.path_segments_mut()
            .map_err(|_| TierError::config("sheets API base cannot carry a path"))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values", range.as_str()]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }
}

#[async_trait]
impl AuditSink for SheetsAuditSink {
    fn name(&self) -> &'static str {
        "sheets"
    }

    async fn append_row(&self, row: &AuditRow) -> TierResult<()> {
        let token = self.tokens.access_token(&self.client).await?;
        let id = self.spreadsheet_id(&token).await?;
        let url = self.append_url(id)?;
        let body = serde_json::json!({ "values": [row.cells()] });

        self.client
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TierError::network("appending audit row", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};

    const TEST_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pub.pem");

    fn account(private_key: Option<&str>, access_token: Option<&str>) -> ServiceAccount {
        ServiceAccount {
            kind: Some("service_account".into()),
            client_email: Some("audit@newsroom.iam.gserviceaccount.com".into()),
            private_key_id: Some("key-1".into()),
            private_key: private_key.map(str::to_string),
            token_uri: Some("https://oauth2.example.com/token".into()),
            access_token: access_token.map(str::to_string),
            ..Default::default()
        }
    }

    fn sink(base: &str) -> SheetsAuditSink {
        SheetsAuditSink::new(
            Client::new(),
            Arc::new(StaticToken::new("t")),
            "Streamlit_login_track",
            Some("sheet123".into()),
            "movie_app",
        )
        .with_api_base(base)
    }

    #[test]
    fn append_url_encodes_the_range() {
        let url = sink("https://sheets.example.com").append_url("sheet123").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.example.com/v4/spreadsheets/sheet123/values/'movie_app'!A:B:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS"
        );
    }

    #[tokio::test]
    async fn configured_id_skips_lookup() {
        let sink = sink("http://127.0.0.1:9");
        assert_eq!(sink.spreadsheet_id("t").await.unwrap(), "sheet123");
    }

    #[test]
    fn assertion_is_signed_for_the_token_endpoint() {
        let tokens = ServiceAccountToken::new(&account(Some(TEST_KEY), None)).unwrap();
        let now = Utc::now();
        let assertion = tokens.assertion(now).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["https://oauth2.example.com/token"]);
        let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap();
        let decoded = jsonwebtoken::decode::<serde_json::Value>(&assertion, &key, &validation).unwrap();

        assert_eq!(decoded.header.kid.as_deref(), Some("key-1"));
        assert_eq!(decoded.claims["iss"], "audit@newsroom.iam.gserviceaccount.com");
        assert_eq!(decoded.claims["scope"], AUDIT_SCOPES);
        assert_eq!(decoded.claims["exp"].as_i64().unwrap() - now.timestamp(), 3600);
    }

    #[test]
    fn secrets_prefer_the_private_key() {
        assert!(secrets_token_source(&account(Some(TEST_KEY), Some("ya29.x"))).is_ok());
        assert!(secrets_token_source(&account(None, Some("ya29.x"))).is_ok());

        let err = secrets_token_source(&account(None, None)).err().unwrap();
        assert!(err.to_string().contains("private_key"));

        let err = ServiceAccountToken::new(&account(Some("not a pem"), None)).err().unwrap();
        assert!(err.to_string().contains("invalid service-account private_key"));
    }
}
