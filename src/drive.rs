use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::DriveConfig;
use crate::db::{DRIVE_TOKEN_KEY, DatabaseError, SettingsStore};
use crate::streaming;
use crate::web::metrics::Metrics;

pub mod token;

pub use self::token::{DriveToken, TokenResponse};

static DRIVE_FILE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-\w]{25,}").expect("drive file id pattern is valid"));

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("OAuth client not initialized (missing client id or secret)")]
    NotConfigured,
    #[error("Drive not connected: admin must authenticate via OAuth first")]
    NotConnected,
    #[error("drive request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("drive api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("failed to persist drive token: {0}")]
    Storage(#[from] DatabaseError),
    #[error("drive io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid drive payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub web_content_link: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Drive reports sizes as decimal strings.
    #[serde(default, with = "opt_string_u64")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveQuota {
    pub limit: Option<u64>,
    pub usage: Option<u64>,
    pub usage_in_drive: Option<u64>,
    pub user_email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutResponse {
    #[serde(default)]
    storage_quota: Option<StorageQuota>,
    #[serde(default)]
    user: Option<AboutUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageQuota {
    #[serde(default, with = "opt_string_u64")]
    limit: Option<u64>,
    #[serde(default, with = "opt_string_u64")]
    usage: Option<u64>,
    #[serde(default, with = "opt_string_u64")]
    usage_in_drive: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email_address: Option<String>,
}

impl From<AboutResponse> for DriveQuota {
    fn from(value: AboutResponse) -> Self {
        let quota = value.storage_quota;
        let user = value.user;
        Self {
            limit: quota.as_ref().and_then(|q| q.limit),
            usage: quota.as_ref().and_then(|q| q.usage),
            usage_in_drive: quota.as_ref().and_then(|q| q.usage_in_drive),
            user_email: user.as_ref().and_then(|u| u.email_address.clone()),
            display_name: user.and_then(|u| u.display_name),
        }
    }
}

/// Extracts the file id from a Drive share link such as
/// `https://drive.google.com/file/d/<id>/view`.
pub fn extract_file_id(link: &str) -> Option<String> {
    if !link.contains("drive.google.com") {
        return None;
    }
    DRIVE_FILE_ID.find(link).map(|m| m.as_str().to_string())
}

/// Google Drive client holding the OAuth token lifecycle.
///
/// The token is restored from the settings store on startup and written back
/// whenever it changes. Requests that come back 401 trigger exactly one refresh
/// and one retry.
pub struct DriveClient {
    http: Client,
    config: DriveConfig,
    client_secret: Option<SecretString>,
    settings: Arc<dyn SettingsStore>,
    token: RwLock<Option<DriveToken>>,
    refresh_lock: AsyncMutex<()>,
}

impl DriveClient {
    pub fn new(config: DriveConfig, settings: Arc<dyn SettingsStore>) -> Self {
        let client_secret = config
            .client_secret
            .clone()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);
        Self {
            http: Client::new(),
            config,
            client_secret,
            settings,
            token: RwLock::new(None),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    pub fn has_client(&self) -> bool {
        self.config.has_client()
    }

    pub fn folder_id(&self) -> Option<&str> {
        self.config.folder_id.as_deref().filter(|f| !f.is_empty())
    }

    pub fn is_connected(&self) -> bool {
        self.has_client() && self.token.read().as_ref().is_some_and(DriveToken::is_usable)
    }

    pub async fn restore_token(&self) -> Result<bool, DriveError> {
        let Some(blob) = self.settings.get_setting(DRIVE_TOKEN_KEY).await? else {
            info!("drive client initialized (no token)");
            return Ok(false);
        };
        let token: DriveToken = serde_json::from_str(&blob)?;
        *self.token.write() = Some(token);
        info!("drive client initialized with stored token");
        Ok(true)
    }

    pub fn auth_url(&self) -> Result<String, DriveError> {
        let client_id = self.client_id()?;
        let url = token::build_auth_url(&self.config, client_id)
            .map_err(|e| DriveError::TokenExchange(format!("invalid auth uri: {}", e)))?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<DriveToken, DriveError> {
        let client_id = self.client_id()?;
        let client_secret = self.client_secret()?;

        let response = self
            .http
            .post(&self.config.token_uri)
            .form(&[
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret.expose_secret()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        let response = Self::token_response(response).await?;

        let previous = self.token.read().as_ref().and_then(|t| t.refresh_token.clone());
        let token = DriveToken::from_response(response, Utc::now().timestamp_millis(), previous);
        self.store_token(token.clone()).await?;
        info!("drive token saved");
        Ok(token)
    }

    pub async fn refresh(&self) -> Result<DriveToken, DriveError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<DriveToken, DriveError> {
        let client_id = self.client_id()?;
        let client_secret = self.client_secret()?;
        let current = self.token.read().clone().ok_or(DriveError::NotConnected)?;
        let refresh_token = current
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DriveError::TokenExchange("no refresh token stored".to_string()))?;

        debug!("refreshing drive access token");
        let response = self
            .http
            .post(&self.config.token_uri)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret.expose_secret()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        let response = Self::token_response(response).await?;

        let token = DriveToken::from_response(
            response,
            Utc::now().timestamp_millis(),
            Some(refresh_token),
        );
        self.store_token(token.clone()).await?;
        Metrics::drive_token_refreshed();
        info!("drive access token refreshed");
        Ok(token)
    }

    pub async fn disconnect(&self) -> Result<(), DriveError> {
        *self.token.write() = None;
        self.settings.delete_setting(DRIVE_TOKEN_KEY).await?;
        info!("drive token removed");
        Ok(())
    }

    /// Sends a request built by `build` with a valid access token. A 401 response
    /// refreshes the token and retries once; the retried response is returned as is.
    pub async fn send_authorized<F>(&self, build: F) -> Result<Response, DriveError>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let access_token = self.access_token().await?;
        let response = build(&self.http, &access_token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("drive request unauthorized, refreshing token and retrying once");
        let access_token = self.refresh_after_unauthorized(&access_token).await?;
        Ok(build(&self.http, &access_token).send().await?)
    }

    pub async fn upload_file(
        &self,
        path: &Path,
        name: &str,
        mime_type: &str,
        folder_id: Option<&str>,
    ) -> Result<DriveFile, DriveError> {
        if !self.is_connected() {
            return Err(DriveError::NotConnected);
        }

        let size = tokio::fs::metadata(path).await?.len();
        let metadata = json!({
            "name": name,
            "parents": folder_id.map(|f| vec![f]).unwrap_or_default(),
        });
        let url = format!("{}/files", self.config.upload_base.trim_end_matches('/'));

        let response = self
            .send_authorized(|http, token| {
                http.post(&url)
                    .query(&[
                        ("uploadType", "resumable"),
                        ("supportsAllDrives", "true"),
                        ("fields", "id,name,webViewLink,webContentLink,mimeType,size"),
                    ])
                    .bearer_auth(token)
                    .header("X-Upload-Content-Type", mime_type)
                    .header("X-Upload-Content-Length", size)
                    .json(&metadata)
            })
            .await?;
        let response = Self::expect_success(response).await?;
        let session_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned)
            .ok_or_else(|| DriveError::Api {
                status: response.status(),
                body: "resumable upload session has no location".to_string(),
            })?;

        debug!("uploading {} ({} bytes) to drive", name, size);
        let file = streaming::open_at(path, None).await?;
        let access_token = self.access_token().await?;
        let response = self
            .http
            .put(&session_url)
            .bearer_auth(&access_token)
            .header(CONTENT_TYPE, mime_type)
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(streaming::file_chunks(file, size)))
            .send()
            .await?;
        let created: DriveFile = Self::expect_success(response).await?.json().await?;

        self.make_public(&created.id).await?;
        info!("uploaded {} to drive as {}", name, created.id);
        Ok(created)
    }

    async fn make_public(&self, file_id: &str) -> Result<(), DriveError> {
        let url = format!(
            "{}/files/{}/permissions",
            self.config.api_base.trim_end_matches('/'),
            file_id
        );
        let response = self
            .send_authorized(|http, token| {
                http.post(&url)
                    .query(&[("supportsAllDrives", "true")])
                    .bearer_auth(token)
                    .json(&json!({ "role": "reader", "type": "anyone" }))
            })
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    /// Deletes a Drive file. A file that is already gone counts as deleted.
    pub async fn delete_file(&self, file_id: &str) -> Result<(), DriveError> {
        if !self.is_connected() {
            return Err(DriveError::NotConnected);
        }
        let url = self.file_url(file_id);
        let response = self
            .send_authorized(|http, token| {
                http.delete(&url)
                    .query(&[("supportsAllDrives", "true")])
                    .bearer_auth(token)
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!("drive file {} was already deleted", file_id);
            return Ok(());
        }
        Self::expect_success(response).await?;
        info!("deleted drive file {}", file_id);
        Ok(())
    }

    pub async fn file_metadata(&self, file_id: &str) -> Result<DriveFile, DriveError> {
        let url = self.file_url(file_id);
        let response = self
            .send_authorized(|http, token| {
                http.get(&url)
                    .query(&[
                        ("supportsAllDrives", "true"),
                        ("fields", "id,name,mimeType,size,webViewLink,webContentLink"),
                    ])
                    .bearer_auth(token)
            })
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    /// Opens the media body of a file, forwarding the caller's `Range` header.
    /// 416 responses are returned so they can be passed through unchanged.
    pub async fn open_media(
        &self,
        file_id: &str,
        range: Option<&str>,
    ) -> Result<Response, DriveError> {
        if !self.is_connected() {
            return Err(DriveError::NotConnected);
        }
        let url = self.file_url(file_id);
        let response = self
            .send_authorized(|http, token| {
                let request = http
                    .get(&url)
                    .query(&[("alt", "media"), ("supportsAllDrives", "true")])
                    .bearer_auth(token);
                match range {
                    Some(range) => request.header(RANGE, range),
                    None => request,
                }
            })
            .await?;

        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(response);
        }
        Self::expect_success(response).await
    }

    pub async fn about(&self) -> Result<DriveQuota, DriveError> {
        if !self.is_connected() {
            return Err(DriveError::NotConnected);
        }
        let url = format!("{}/about", self.config.api_base.trim_end_matches('/'));
        let response = self
            .send_authorized(|http, token| {
                http.get(&url)
                    .query(&[("fields", "storageQuota,user")])
                    .bearer_auth(token)
            })
            .await?;
        let about: AboutResponse = Self::expect_success(response).await?.json().await?;
        Ok(about.into())
    }

    fn file_url(&self, file_id: &str) -> String {
        format!(
            "{}/files/{}",
            self.config.api_base.trim_end_matches('/'),
            file_id
        )
    }

    fn client_id(&self) -> Result<&str, DriveError> {
        self.config
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(DriveError::NotConfigured)
    }

    fn client_secret(&self) -> Result<&SecretString, DriveError> {
        self.client_secret.as_ref().ok_or(DriveError::NotConfigured)
    }

    async fn access_token(&self) -> Result<String, DriveError> {
        let token = self.token.read().clone().ok_or(DriveError::NotConnected)?;
        let now = Utc::now().timestamp_millis();
        if !token.access_token.is_empty() && !token.is_expired(now) {
            return Ok(token.access_token);
        }
        if !token.can_refresh() {
            return Err(DriveError::NotConnected);
        }

        let _guard = self.refresh_lock.lock().await;
        let current = self.token.read().clone();
        if let Some(current) = current {
            if !current.access_token.is_empty() && !current.is_expired(now) {
                return Ok(current.access_token);
            }
        }
        Ok(self.refresh_locked().await?.access_token)
    }

    async fn refresh_after_unauthorized(&self, rejected: &str) -> Result<String, DriveError> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.token.read().clone();
        if let Some(current) = current {
            if current.access_token != rejected && !current.access_token.is_empty() {
                return Ok(current.access_token);
            }
        }
        Ok(self.refresh_locked().await?.access_token)
    }

    async fn store_token(&self, token: DriveToken) -> Result<(), DriveError> {
        let blob = serde_json::to_string(&token)?;
        *self.token.write() = Some(token);
        self.settings.set_setting(DRIVE_TOKEN_KEY, &blob).await?;
        Ok(())
    }

    async fn token_response(response: Response) -> Result<TokenResponse, DriveError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenExchange(format!("{} - {}", status, body)));
        }
        Ok(response.json().await?)
    }

    async fn expect_success(response: Response) -> Result<Response, DriveError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DriveError::Api { status, body })
    }
}

mod opt_string_u64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(u64),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Num(n)) => Ok(Some(n)),
            Some(Raw::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}
