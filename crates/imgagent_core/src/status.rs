//! Document lifecycle status.

use imgagent_error::StatusError;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a document.
///
/// Statuses form a total order along the pipeline:
/// `uploaded → chapterReady → roleReady → sceneReady → imgReady`.
/// `failed` sits outside the order and is reachable from any non-terminal status.
///
/// # Examples
///
/// ```
/// use imgagent_core::DocumentStatus;
///
/// assert_eq!(DocumentStatus::ChapterReady.next(), Some(DocumentStatus::RoleReady));
/// assert!(DocumentStatus::ChapterReady.transition(DocumentStatus::SceneReady).is_err());
/// assert_eq!("roleReady".parse::<DocumentStatus>().ok(), Some(DocumentStatus::RoleReady));
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DocumentStatus {
    /// Uploaded, not yet split into chapters
    Uploaded,
    /// Chapters exist; roles are next
    ChapterReady,
    /// Roles extracted; scenes are next
    RoleReady,
    /// Scenes extracted for every chapter; media is next
    SceneReady,
    /// Every scene has image and voice
    ImgReady,
    /// Retries exhausted; needs an operator
    Failed,
}

impl DocumentStatus {
    /// The status a successful stage moves to, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            DocumentStatus::Uploaded => Some(DocumentStatus::ChapterReady),
            DocumentStatus::ChapterReady => Some(DocumentStatus::RoleReady),
            DocumentStatus::RoleReady => Some(DocumentStatus::SceneReady),
            DocumentStatus::SceneReady => Some(DocumentStatus::ImgReady),
            DocumentStatus::ImgReady | DocumentStatus::Failed => None,
        }
    }

    /// Whether the pipeline will never touch a document in this status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::ImgReady | DocumentStatus::Failed)
    }

    /// Position along the pipeline, `None` for `failed`.
    pub fn ordinal(self) -> Option<u8> {
        match self {
            DocumentStatus::Uploaded => Some(0),
            DocumentStatus::ChapterReady => Some(1),
            DocumentStatus::RoleReady => Some(2),
            DocumentStatus::SceneReady => Some(3),
            DocumentStatus::ImgReady => Some(4),
            DocumentStatus::Failed => None,
        }
    }

    /// Validate a status change requested by a stage commit.
    ///
    /// Allowed moves are one step forward, staying put on a non-terminal
    /// status (a partial commit), and any non-terminal status to `failed`.
    /// Everything else is an illegal transition.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] for skips, regressions, and moves out of a
    /// terminal status.
    #[track_caller]
    pub fn transition(self, to: DocumentStatus) -> Result<DocumentStatus, StatusError> {
        use DocumentStatus::*;

        let allowed = match (self, to) {
            (Uploaded, ChapterReady)
            | (ChapterReady, RoleReady)
            | (RoleReady, SceneReady)
            | (SceneReady, ImgReady) => true,
            (Uploaded, Uploaded)
            | (ChapterReady, ChapterReady)
            | (RoleReady, RoleReady)
            | (SceneReady, SceneReady) => true,
            (Uploaded | ChapterReady | RoleReady | SceneReady, Failed) => true,
            (Uploaded, RoleReady | SceneReady | ImgReady)
            | (ChapterReady, Uploaded | SceneReady | ImgReady)
            | (RoleReady, Uploaded | ChapterReady | ImgReady)
            | (SceneReady, Uploaded | ChapterReady | RoleReady) => false,
            (ImgReady | Failed, _) => false,
        };

        if allowed {
            Ok(to)
        } else {
            Err(StatusError::new(self.to_string(), to.to_string()))
        }
    }

    /// Statuses an operator may reset a document to.
    ///
    /// `uploaded` is excluded because the creation path, not the pipeline,
    /// produces chapters.
    pub fn is_reset_target(self) -> bool {
        matches!(
            self,
            DocumentStatus::ChapterReady | DocumentStatus::RoleReady | DocumentStatus::SceneReady
        )
    }
}
