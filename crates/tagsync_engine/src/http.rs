//! HTTP transport implementation.
//!
//! JSON over HTTP via `reqwest`:
//!
//! ```text
//! PUT  {sync_user_api}/{user_id}          -> { idUser, notificationChannels }
//! GET  {sync_api}/{id_user}/{cursor}      -> { lastSyncedAt, changes }
//! POST {sync_api}/{id_user}/{cursor}      -> { lastSyncedAt, changes } | 409 | 412
//! ```

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{PushOutcome, SyncTransport};
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tagsync_protocol::{ConflictInfo, PushBody, SyncResponse, UserResponse};
use tracing::debug;

/// HTTP-based sync transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    sync_api: String,
    sync_user_api: String,
}

impl HttpTransport {
    /// Creates a transport for the configured endpoints.
    ///
    /// Fails with [`SyncError::NotConfigured`] unless both endpoints are set.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        if !config.has_endpoints() {
            return Err(SyncError::NotConfigured);
        }
        let base = |url: &Option<String>| {
            url.as_deref()
                .unwrap_or_default()
                .trim()
                .trim_end_matches('/')
                .to_string()
        };
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            sync_api: base(&config.sync_api),
            sync_user_api: base(&config.sync_user_api),
        })
    }

    /// Returns the sync endpoint base URL.
    pub fn sync_api(&self) -> &str {
        &self.sync_api
    }

    /// Returns the user endpoint base URL.
    pub fn sync_user_api(&self) -> &str {
        &self.sync_user_api
    }

    fn user_url(&self, user_id: &str) -> String {
        format!("{}/{}", self.sync_user_api, user_id)
    }

    fn sync_url(&self, id_user: &str, cursor: i64) -> String {
        format!("{}/{}/{}", self.sync_api, id_user, cursor)
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        Ok(request.header(CACHE_CONTROL, "no-cache").send().await?)
    }

    async fn json_or_status<T: DeserializeOwned>(
        response: Response,
        endpoint: &'static str,
    ) -> SyncResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::UnexpectedStatus {
                status: status.as_u16(),
                endpoint,
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn ensure_user(&self, user_id: &str) -> SyncResult<UserResponse> {
        let url = self.user_url(user_id);
        debug!(%url, "ensuring remote user");
        let response = self.send(self.http.put(url)).await?;
        Self::json_or_status(response, "user").await
    }

    async fn pull(&self, id_user: &str, cursor: i64) -> SyncResult<SyncResponse> {
        let response = self.send(self.http.get(self.sync_url(id_user, cursor))).await?;
        Self::json_or_status(response, "pull").await
    }

    async fn push(&self, id_user: &str, cursor: i64, body: &PushBody) -> SyncResult<PushOutcome> {
        let payload = serde_json::to_vec(body)?;
        let request = self
            .http
            .post(self.sync_url(id_user, cursor))
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::CONFLICT => {
                let bytes = response.bytes().await.unwrap_or_default();
                Ok(PushOutcome::DuplicateInsert(ConflictInfo::from_body(&bytes)))
            }
            StatusCode::PRECONDITION_FAILED => Ok(PushOutcome::PreconditionFailed),
            _ => Self::json_or_status(response, "push")
                .await
                .map(PushOutcome::Accepted),
        }
    }
}
