use super::{StageContext, StageOutput, StageProcessor, not_ready};
use async_trait::async_trait;
use chrono::Utc;
use imgagent_core::{Document, DocumentStatus, Role, RoleDraft};
use imgagent_error::StageError;
use imgagent_interface::StageResult;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Extracts the cast of characters from the whole document text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleExtraction;

/// Keep the first draft of each name, compared case-insensitively.
fn dedupe_by_name(drafts: Vec<RoleDraft>) -> Vec<RoleDraft> {
    let mut seen = HashSet::new();
    drafts
        .into_iter()
        .filter(|d| seen.insert(d.name.trim().to_lowercase()))
        .collect()
}

#[async_trait]
impl StageProcessor for RoleExtraction {
    fn name(&self) -> &'static str {
        "role_extraction"
    }

    fn pre_status(&self) -> DocumentStatus {
        DocumentStatus::ChapterReady
    }

    #[instrument(skip(self, ctx, document), fields(document_id = %document.id))]
    async fn execute(
        &self,
        ctx: &StageContext,
        document: &Document,
    ) -> Result<StageOutput, StageError> {
        let chapters = ctx.store().list_chapters(document.id).await?;
        let text = chapters
            .iter()
            .map(|c| c.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if text.is_empty() {
            return Err(not_ready(document, self.name(), "document has no chapter text"));
        }

        ctx.ensure_active()?;
        let drafts = dedupe_by_name(ctx.generation().extract_roles(&text).await?);

        let now = Utc::now();
        let roles: Vec<Role> = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| Role::from_draft(document.id, index, draft, now))
            .collect();
        debug!(count = roles.len(), "Roles extracted");

        Ok(StageOutput {
            result: StageResult::Roles(roles),
            next: DocumentStatus::RoleReady,
        })
    }
}
