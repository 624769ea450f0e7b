// External service seams: content generation and the publish target
//
// The engine consumes both as traits so the pipeline can be exercised
// without network access; the worker binary wires the HTTP adapters.

pub mod generator;
pub mod publisher;

use crate::errors::ExternalError;
use crate::models::ArtifactKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use generator::HttpContentGenerator;
pub use publisher::HttpPublishTarget;

/// One rendering request handed to the generation service
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub content: String,
    pub voice: String,
    pub speed: f64,
    pub kind: ArtifactKind,
}

/// One rendered output unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Download URL or local path of the rendered file
    pub locator: String,
}

/// Content generation service: submit a request, poll until the artifacts
/// are ready.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Artifact>, ExternalError>;
}

/// Visibility of an uploaded artifact on the publish target
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Public,
}

/// Metadata for one upload to the publish target
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub locator: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
}

/// Durable publish target: upload, schedule a release, promote to public.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PublishTarget: Send + Sync {
    /// Upload an artifact; returns the remote id assigned by the target.
    async fn upload(&self, request: &UploadRequest) -> Result<String, ExternalError>;

    /// Schedule the remote release of an uploaded artifact.
    async fn schedule(&self, remote_id: &str, publish_at: DateTime<Utc>)
        -> Result<(), ExternalError>;

    /// Promote an uploaded artifact to public.
    async fn make_public(&self, remote_id: &str) -> Result<(), ExternalError>;

    /// Public watch URL for a remote id.
    fn public_locator(&self, remote_id: &str) -> String;
}
