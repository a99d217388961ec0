use super::{StageContext, StageOutput, StageProcessor, not_ready};
use async_trait::async_trait;
use chrono::Utc;
use imgagent_core::{Document, DocumentStatus, Scene};
use imgagent_error::StageError;
use imgagent_interface::StageResult;
use tracing::{debug, instrument};

/// Splits chapters into scenes, one chapter per execution.
///
/// The chapter's scenes and its scene id list are committed together. The
/// document stays at `roleReady` until the last chapter commits, so a
/// restart resumes at the first chapter without scenes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneExtraction;

#[async_trait]
impl StageProcessor for SceneExtraction {
    fn name(&self) -> &'static str {
        "scene_extraction"
    }

    fn pre_status(&self) -> DocumentStatus {
        DocumentStatus::RoleReady
    }

    #[instrument(skip(self, ctx, document), fields(document_id = %document.id))]
    async fn execute(
        &self,
        ctx: &StageContext,
        document: &Document,
    ) -> Result<StageOutput, StageError> {
        let chapters = ctx.store().list_chapters(document.id).await?;
        let pending: Vec<_> = chapters.iter().filter(|c| !c.scenes_extracted).collect();
        let Some(chapter) = pending.first() else {
            return Err(not_ready(
                document,
                self.name(),
                "every chapter already has scenes",
            ));
        };

        ctx.ensure_active()?;
        let drafts = ctx.generation().extract_scenes(&chapter.content).await?;

        let now = Utc::now();
        let scenes: Vec<Scene> = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| Scene::from_draft(document.id, chapter.id, index, draft, now))
            .collect();
        let remaining = pending.len() - 1;
        debug!(
            chapter_index = chapter.index,
            scenes = scenes.len(),
            remaining,
            "Chapter scenes extracted"
        );

        Ok(StageOutput {
            result: StageResult::ChapterScenes {
                chapter_id: chapter.id,
                scenes,
            },
            next: if remaining == 0 {
                DocumentStatus::SceneReady
            } else {
                DocumentStatus::RoleReady
            },
        })
    }
}
