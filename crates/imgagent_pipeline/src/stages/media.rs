use super::{StageContext, StageOutput, StageProcessor};
use async_trait::async_trait;
use imgagent_core::{Document, DocumentStatus, SceneMedia};
use imgagent_error::StageError;
use imgagent_interface::StageResult;
use tracing::{debug, instrument};

/// Renders image and voice for scenes, one chapter per execution.
///
/// Only scenes missing media are rendered. The document reaches `imgReady`
/// with the commit that leaves no scene without media.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaGeneration;

#[async_trait]
impl StageProcessor for MediaGeneration {
    fn name(&self) -> &'static str {
        "media_generation"
    }

    fn pre_status(&self) -> DocumentStatus {
        DocumentStatus::SceneReady
    }

    #[instrument(skip(self, ctx, document), fields(document_id = %document.id))]
    async fn execute(
        &self,
        ctx: &StageContext,
        document: &Document,
    ) -> Result<StageOutput, StageError> {
        let chapters = ctx.store().list_chapters(document.id).await?;
        let scenes = ctx.store().list_scenes_by_document(document.id).await?;

        let target = chapters.iter().find(|chapter| {
            scenes
                .iter()
                .any(|s| s.chapter_id == chapter.id && !s.has_media())
        });
        let Some(chapter) = target else {
            return Ok(StageOutput {
                result: StageResult::Media(Vec::new()),
                next: DocumentStatus::ImgReady,
            });
        };

        let mut media = Vec::new();
        for scene in scenes
            .iter()
            .filter(|s| s.chapter_id == chapter.id && !s.has_media())
        {
            ctx.ensure_active()?;
            let image_url = ctx.generation().generate_image(&scene.content).await?;
            let voice_url = ctx.generation().generate_voice(&scene.content).await?;
            media.push(SceneMedia {
                scene_id: scene.id,
                image_url,
                voice_url,
            });
        }

        let remaining = scenes
            .iter()
            .any(|s| s.chapter_id != chapter.id && !s.has_media());
        debug!(
            chapter_index = chapter.index,
            rendered = media.len(),
            remaining,
            "Chapter media generated"
        );

        Ok(StageOutput {
            result: StageResult::Media(media),
            next: if remaining {
                DocumentStatus::SceneReady
            } else {
                DocumentStatus::ImgReady
            },
        })
    }
}
