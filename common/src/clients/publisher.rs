// HTTP adapter for the publish target
//
// Thin REST surface over the three operations the engine needs: upload an
// artifact privately, schedule its release, promote it to public. Platform
// specifics stay behind this adapter.

use crate::clients::{PublishTarget, UploadRequest};
use crate::config::PublisherConfig;
use crate::errors::ExternalError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

/// Publish target client with a static bearer credential
pub struct HttpPublishTarget {
    client: Client,
    base_url: String,
    token: String,
    public_url_base: String,
}

impl HttpPublishTarget {
    pub fn new(config: &PublisherConfig) -> Result<Self, ExternalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                ExternalError::RequestFailed(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            public_url_base: config.public_url_base.trim_end_matches('/').to_string(),
        })
    }

    async fn post_ok(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ExternalError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::UnexpectedStatus { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl PublishTarget for HttpPublishTarget {
    #[instrument(skip(self, request), fields(title = %request.title))]
    async fn upload(&self, request: &UploadRequest) -> Result<String, ExternalError> {
        let response = self
            .post_ok(
                format!("{}/api/v1/videos", self.base_url),
                serde_json::json!({
                    "locator": request.locator,
                    "title": request.title,
                    "description": request.description,
                    "tags": request.tags,
                    "visibility": request.visibility,
                }),
            )
            .await?;

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::MalformedResponse(e.to_string()))?;
        info!(remote_id = %upload.id, "Artifact uploaded");
        Ok(upload.id)
    }

    #[instrument(skip(self))]
    async fn schedule(
        &self,
        remote_id: &str,
        publish_at: DateTime<Utc>,
    ) -> Result<(), ExternalError> {
        self.post_ok(
            format!("{}/api/v1/videos/{}/schedule", self.base_url, remote_id),
            serde_json::json!({ "publish_at": publish_at.to_rfc3339() }),
        )
        .await?;
        info!(remote_id = %remote_id, publish_at = %publish_at, "Remote release scheduled");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn make_public(&self, remote_id: &str) -> Result<(), ExternalError> {
        self.post_ok(
            format!("{}/api/v1/videos/{}/publish", self.base_url, remote_id),
            serde_json::json!({}),
        )
        .await?;
        info!(remote_id = %remote_id, "Artifact made public");
        Ok(())
    }

    fn public_locator(&self, remote_id: &str) -> String {
        format!("{}/{}", self.public_url_base, remote_id)
    }
}
