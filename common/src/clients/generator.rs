// HTTP adapter for the content generation service
//
// Submit-then-poll contract: the submit call returns a remote session id and
// the artifacts are collected from the status endpoint once it reports
// completion. A bounded number of polls caps how long one generation can
// hold the pipeline.

use crate::clients::{Artifact, ContentGenerator, GenerationRequest};
use crate::config::GeneratorConfig;
use crate::errors::ExternalError;
use crate::models::ArtifactKind;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ArtifactRef {
    file_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    progress: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    /// Artifact list for segment (short) generation
    #[serde(default)]
    videos: Option<Vec<ArtifactRef>>,
    /// Single artifact for long-form generation
    #[serde(default)]
    result: Option<ArtifactRef>,
    #[serde(default)]
    error: Option<String>,
}

/// Generation service client with a submit/poll lifecycle
pub struct HttpContentGenerator {
    client: Client,
    base_url: String,
    submit_timeout: Duration,
    poll_interval: Duration,
    max_polls: u32,
}

impl HttpContentGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, ExternalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_seconds))
            .build()
            .map_err(|e| {
                ExternalError::RequestFailed(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            submit_timeout: Duration::from_secs(config.submit_timeout_seconds),
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            max_polls: config.max_polls,
        })
    }

    fn submit_url(&self, kind: ArtifactKind) -> String {
        match kind {
            ArtifactKind::Short => format!("{}/api/v1/shorts/generate", self.base_url),
            ArtifactKind::Long => format!("{}/api/v1/voiceover/generate", self.base_url),
        }
    }

    fn status_url(&self, kind: ArtifactKind, session_id: &str) -> String {
        match kind {
            ArtifactKind::Short => format!("{}/api/v1/shorts/status/{}", self.base_url, session_id),
            ArtifactKind::Long => {
                format!("{}/api/v1/voiceover/status/{}", self.base_url, session_id)
            }
        }
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<String, ExternalError> {
        let response = self
            .client
            .post(self.submit_url(request.kind))
            .timeout(self.submit_timeout)
            .json(&serde_json::json!({
                "script": request.content,
                "voice": request.voice,
                "speed": request.speed,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::UnexpectedStatus { status, body });
        }

        let submit: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::MalformedResponse(e.to_string()))?;
        info!(session_id = %submit.session_id, "Generation request accepted");
        Ok(submit.session_id)
    }

    async fn poll(
        &self,
        kind: ArtifactKind,
        session_id: &str,
    ) -> Result<StatusResponse, ExternalError> {
        let response = self
            .client
            .get(self.status_url(kind, session_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::UnexpectedStatus { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| ExternalError::MalformedResponse(e.to_string()))
    }

    fn collect_artifacts(status: StatusResponse) -> Result<Vec<Artifact>, ExternalError> {
        let refs: Vec<ArtifactRef> = match (status.videos, status.result) {
            (Some(videos), _) => videos,
            (None, Some(single)) => vec![single],
            (None, None) => {
                return Err(ExternalError::MalformedResponse(
                    "completed status carried no artifacts".to_string(),
                ))
            }
        };
        Ok(refs
            .into_iter()
            .map(|r| Artifact { locator: r.file_url })
            .collect())
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    #[instrument(skip(self, request), fields(kind = %request.kind))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Artifact>, ExternalError> {
        let session_id = self.submit(request).await?;

        for poll_count in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let status = match self.poll(request.kind, &session_id).await {
                Ok(status) => status,
                Err(e) => {
                    // A single flaky poll is not a generation failure.
                    warn!(
                        session_id = %session_id,
                        poll_count,
                        error = %e,
                        "Status poll failed"
                    );
                    continue;
                }
            };

            debug!(
                session_id = %session_id,
                status = %status.status,
                progress = status.progress.unwrap_or(0),
                "Generation status"
            );

            match status.status.as_str() {
                "completed" => {
                    let artifacts = Self::collect_artifacts(status)?;
                    info!(
                        session_id = %session_id,
                        count = artifacts.len(),
                        "Generation completed"
                    );
                    return Ok(artifacts);
                }
                "failed" => {
                    let reason = status
                        .error
                        .or(status.message)
                        .unwrap_or_else(|| "generation failed".to_string());
                    return Err(ExternalError::ServiceReported(reason));
                }
                _ => continue,
            }
        }

        Err(ExternalError::Timeout(
            self.max_polls as u64 * self.poll_interval.as_secs(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str, max_polls: u32) -> GeneratorConfig {
        GeneratorConfig {
            base_url: url.to_string(),
            submit_timeout_seconds: 5,
            poll_timeout_seconds: 5,
            poll_interval_seconds: 0,
            max_polls,
            default_voice: "onyx".to_string(),
            default_speed: 1.2,
        }
    }

    fn request(kind: ArtifactKind) -> GenerationRequest {
        GenerationRequest {
            content: "Market update — pause — Tech news".to_string(),
            voice: "onyx".to_string(),
            speed: 1.2,
            kind,
        }
    }

    #[tokio::test]
    async fn test_generate_polls_until_completed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/shorts/generate"))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_json(serde_json::json!({"session_id": "sess_1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/shorts/status/sess_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "processing", "progress": 40
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/shorts/status/sess_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "progress": 100,
                "videos": [
                    {"file_url": "http://cdn/clip_part_1.mp4"},
                    {"file_url": "http://cdn/clip_part_2.mp4"}
                ]
            })))
            .mount(&server)
            .await;

        let generator = HttpContentGenerator::new(&test_config(&server.uri(), 10)).unwrap();
        let artifacts = generator.generate(&request(ArtifactKind::Short)).await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].locator, "http://cdn/clip_part_1.mp4");
    }

    #[tokio::test]
    async fn test_long_kind_uses_voiceover_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/voiceover/generate"))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_json(serde_json::json!({"session_id": "sess_2"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/voiceover/status/sess_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "result": {"file_url": "http://cdn/long_form.mp4"}
            })))
            .mount(&server)
            .await;

        let generator = HttpContentGenerator::new(&test_config(&server.uri(), 5)).unwrap();
        let artifacts = generator.generate(&request(ArtifactKind::Long)).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].locator, "http://cdn/long_form.mp4");
    }

    #[tokio::test]
    async fn test_reported_failure_surfaces_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/shorts/generate"))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_json(serde_json::json!({"session_id": "sess_3"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/shorts/status/sess_3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed", "error": "render engine out of capacity"
            })))
            .mount(&server)
            .await;

        let generator = HttpContentGenerator::new(&test_config(&server.uri(), 5)).unwrap();
        let err = generator.generate(&request(ArtifactKind::Short)).await.unwrap_err();
        assert!(matches!(err, ExternalError::ServiceReported(reason)
            if reason.contains("out of capacity")));
    }

    #[tokio::test]
    async fn test_poll_budget_exhaustion_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/shorts/generate"))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_json(serde_json::json!({"session_id": "sess_4"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/shorts/status/sess_4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "processing", "progress": 10
            })))
            .mount(&server)
            .await;

        let generator = HttpContentGenerator::new(&test_config(&server.uri(), 3)).unwrap();
        let err = generator.generate(&request(ArtifactKind::Short)).await.unwrap_err();
        assert!(matches!(err, ExternalError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_rejected_submit_is_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/shorts/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let generator = HttpContentGenerator::new(&test_config(&server.uri(), 5)).unwrap();
        let err = generator.generate(&request(ArtifactKind::Short)).await.unwrap_err();
        assert!(matches!(err, ExternalError::UnexpectedStatus { status: 503, .. }));
    }
}
