//! REST client for the Moneta cloud profile store.
//!
//! Implements the core `RemoteGateway` CRUD contract over the managed
//! relational store's HTTP API.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use moneta_core::sync::{EntityKind, ProfileRow, RemoteGateway};
use moneta_core::{GatewayError, IdentityKey};

use crate::error::{RemoteError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Supplies the current access token for the signed-in session.
///
/// Anonymous sessions return `None`; requests then go out unauthenticated and
/// the backend scopes them to the anonymous namespace.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Fixed token, mostly for tests and single-session tools.
pub struct StaticTokenProvider(Option<String>);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl AccessTokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[allow(dead_code)]
    error: String,
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct RowsRequest {
    rows: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct IdsRequest {
    ids: Vec<String>,
}

/// Client for the Moneta cloud profile API.
#[derive(Clone)]
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl RestGateway {
    /// Create a new gateway client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the cloud API (e.g., "https://api.moneta.app")
    pub fn new(base_url: &str, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Create headers for an API request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = self.tokens.access_token() {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::error_from_body(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            RemoteError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Check a response for success without decoding a body.
    async fn expect_success(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        Self::log_response(status, &body);
        Err(Self::error_from_body(status.as_u16(), &body))
    }

    fn error_from_body(status: u16, body: &str) -> RemoteError {
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
            return RemoteError::api(status, format!("{}: {}", error.code, error.message));
        }
        RemoteError::api(status, format!("Request failed: {}", body))
    }

    /// Fetch the scalar profile row for an identity.
    ///
    /// GET /api/v1/profiles/by-identity/{identityKey}
    pub async fn get_profile(&self, identity: &IdentityKey) -> Result<ProfileRow> {
        let url = format!(
            "{}/api/v1/profiles/by-identity/{}",
            self.base_url,
            identity.storage_key()
        );
        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        Self::parse_response(response).await
    }

    /// Fetch all rows of one collection for a profile.
    ///
    /// GET /api/v1/profiles/{profileId}/rows/{kind}
    pub async fn get_rows(&self, kind: EntityKind, profile_id: &str) -> Result<Vec<Value>> {
        let url = format!(
            "{}/api/v1/profiles/{}/rows/{}",
            self.base_url,
            profile_id,
            kind.wire_name()
        );
        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        Self::parse_response(response).await
    }

    /// Upsert the scalar profile row.
    ///
    /// POST /api/v1/profiles
    pub async fn put_profile(&self, row: &ProfileRow) -> Result<()> {
        let url = format!("{}/api/v1/profiles", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(row)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// Upsert full rows for one collection.
    ///
    /// POST /api/v1/rows/{kind}/upsert
    pub async fn put_rows(&self, kind: EntityKind, rows: Vec<Value>) -> Result<()> {
        let url = format!("{}/api/v1/rows/{}/upsert", self.base_url, kind.wire_name());
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&RowsRequest { rows })
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// Delete collection rows by id.
    ///
    /// POST /api/v1/rows/{kind}/delete
    pub async fn remove_rows(&self, kind: EntityKind, ids: Vec<String>) -> Result<()> {
        let url = format!("{}/api/v1/rows/{}/delete", self.base_url, kind.wire_name());
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&IdsRequest { ids })
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// Delete every row of one collection for a profile.
    ///
    /// DELETE /api/v1/profiles/{profileId}/rows/{kind}
    pub async fn remove_profile_rows(&self, kind: EntityKind, profile_id: &str) -> Result<()> {
        let url = format!(
            "{}/api/v1/profiles/{}/rows/{}",
            self.base_url,
            profile_id,
            kind.wire_name()
        );
        let response = self
            .client
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// Delete the scalar profile row.
    ///
    /// DELETE /api/v1/profiles/{profileId}
    pub async fn remove_profile(&self, profile_id: &str) -> Result<()> {
        let url = format!("{}/api/v1/profiles/{}", self.base_url, profile_id);
        let response = self
            .client
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::expect_success(response).await
    }
}

#[async_trait]
impl RemoteGateway for RestGateway {
    async fn fetch_profile(
        &self,
        identity: &IdentityKey,
    ) -> std::result::Result<Option<ProfileRow>, GatewayError> {
        match self.get_profile(identity).await {
            Ok(row) => Ok(Some(row)),
            Err(RemoteError::Api { status: 404, .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch_collection(
        &self,
        kind: EntityKind,
        profile_id: &str,
    ) -> std::result::Result<Vec<Value>, GatewayError> {
        self.get_rows(kind, profile_id).await.map_err(Into::into)
    }

    async fn upsert_profile(&self, row: &ProfileRow) -> std::result::Result<(), GatewayError> {
        self.put_profile(row).await.map_err(Into::into)
    }

    async fn upsert_rows(
        &self,
        kind: EntityKind,
        rows: Vec<Value>,
    ) -> std::result::Result<(), GatewayError> {
        self.put_rows(kind, rows).await.map_err(Into::into)
    }

    async fn delete_rows(
        &self,
        kind: EntityKind,
        ids: Vec<String>,
    ) -> std::result::Result<(), GatewayError> {
        self.remove_rows(kind, ids).await.map_err(Into::into)
    }

    async fn delete_profile_rows(
        &self,
        kind: EntityKind,
        profile_id: &str,
    ) -> std::result::Result<(), GatewayError> {
        self.remove_profile_rows(kind, profile_id)
            .await
            .map_err(Into::into)
    }

    async fn delete_profile(&self, profile_id: &str) -> std::result::Result<(), GatewayError> {
        self.remove_profile(profile_id).await.map_err(Into::into)
    }
}
