//! Remote generation service.

use async_trait::async_trait;
use imgagent_core::{RoleDraft, SceneDraft};
use imgagent_error::GenerationError;

/// Client for the service that extracts narrative elements and renders media.
///
/// Every call may fail; [`GenerationError::is_transient`] tells the caller
/// whether the same input is worth retrying.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Extract the characters appearing in `text`.
    async fn extract_roles(&self, text: &str) -> Result<Vec<RoleDraft>, GenerationError>;

    /// Extract the ordered scenes of one chapter.
    async fn extract_scenes(&self, chapter_text: &str) -> Result<Vec<SceneDraft>, GenerationError>;

    /// Render an image for a scene and return its URL.
    async fn generate_image(&self, scene_text: &str) -> Result<String, GenerationError>;

    /// Render narration for a scene and return its URL.
    async fn generate_voice(&self, scene_text: &str) -> Result<String, GenerationError>;

    /// Service name for logs.
    fn provider_name(&self) -> &'static str;
}
