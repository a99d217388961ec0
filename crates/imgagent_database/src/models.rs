//! Diesel models for the pipeline tables.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// Database row for the documents table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = crate::schema::documents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DocumentRow {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub failure_count: i32,
    pub retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for the chapters table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations)]
#[diesel(belongs_to(DocumentRow, foreign_key = document_id))]
#[diesel(table_name = crate::schema::chapters)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChapterRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chapter_index: i32,
    pub title: String,
    pub content: String,
    pub scene_ids: Vec<Uuid>,
    pub scenes_extracted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for the roles table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations)]
#[diesel(belongs_to(DocumentRow, foreign_key = document_id))]
#[diesel(table_name = crate::schema::roles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RoleRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub role_index: i32,
    pub name: String,
    pub gender: String,
    pub character_summary: String,
    pub appearance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for the scenes table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations)]
#[diesel(belongs_to(ChapterRow, foreign_key = chapter_id))]
#[diesel(table_name = crate::schema::scenes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SceneRow {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub document_id: Uuid,
    pub scene_index: i32,
    pub content: String,
    pub image_url: String,
    pub voice_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
