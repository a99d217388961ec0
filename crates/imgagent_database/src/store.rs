//! Diesel-backed [`DocumentStore`].

use crate::conversions::{parse_status, role_to_row};
use crate::schema::{chapters, documents, roles, scenes};
use crate::{ChapterRow, DatabaseConfig, DocumentRow, RoleRow, SceneRow};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use imgagent_core::{
    Chapter, Document, DocumentStatus, Revision, Role, Scene, validate_document_name,
};
use imgagent_error::{StoreError, StoreErrorKind};
use imgagent_interface::{DocumentStore, StageResult};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Connection pool type used by the store.
pub type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run pending migrations.
pub fn run_migrations(conn: &mut PgConnection) -> Result<(), StoreError> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|_| ())
        .map_err(|e| StoreError::new(StoreErrorKind::Migration(e.to_string())))
}

/// Document store on PostgreSQL.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDocumentStore")
            .field("max_size", &self.pool.max_size())
            .finish()
    }
}

impl PostgresDocumentStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool from `config` and apply migrations if enabled.
    #[instrument(skip(config), fields(pool_size = config.pool_size()))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config.resolved_url().ok_or_else(|| {
            StoreError::new(StoreErrorKind::Connection(
                "DATABASE_URL environment variable not set".to_string(),
            ))
        })?;
        let pool_size = *config.pool_size();
        let migrate = *config.run_migrations();

        let pool = tokio::task::spawn_blocking(move || -> Result<PgPool, StoreError> {
            let manager = ConnectionManager::<PgConnection>::new(url);
            let pool = Pool::builder().max_size(pool_size).build(manager)?;
            if migrate {
                let mut conn = pool.get()?;
                run_migrations(&mut conn)?;
            }
            Ok(pool)
        })
        .await
        .map_err(join_error)??;

        info!(pool_size, "Connected to document database");
        Ok(Self::new(pool))
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await
        .map_err(join_error)?
    }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::new(StoreErrorKind::Task(format!("Task join error: {}", e)))
}

#[track_caller]
fn not_found(what: &str, id: Uuid) -> StoreError {
    StoreError::new(StoreErrorKind::NotFound(format!("{} {}", what, id)))
}

#[track_caller]
fn invalid(message: String) -> StoreError {
    StoreError::new(StoreErrorKind::Invalid(message))
}

fn lock_document(conn: &mut PgConnection, id: Uuid) -> Result<DocumentRow, StoreError> {
    documents::table
        .find(id)
        .select(DocumentRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| not_found("document", id))
}

/// Lock the document row and check it is still at `seen`.
fn lock_at_revision(
    conn: &mut PgConnection,
    id: Uuid,
    seen: Revision,
) -> Result<DocumentStatus, StoreError> {
    let row = lock_document(conn, id)?;
    let current = parse_status(&row.status)?;
    if current != seen.status || row.updated_at != seen.updated_at {
        return Err(StoreError::new(StoreErrorKind::Conflict {
            id: id.to_string(),
            expected: format!("{} at {}", seen.status, seen.updated_at.to_rfc3339()),
            found: format!("{} at {}", current, row.updated_at.to_rfc3339()),
        }));
    }
    Ok(current)
}

/// The current time at the precision PostgreSQL stores, so a returned
/// document compares equal to the row it was written as.
fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn update_count_or_not_found(count: usize, what: &str, id: Uuid) -> Result<(), StoreError> {
    if count == 0 {
        Err(not_found(what, id))
    } else {
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self, chapter_texts), fields(chapters = chapter_texts.len()))]
    async fn create_document(
        &self,
        name: &str,
        chapter_texts: Vec<String>,
    ) -> Result<Document, StoreError> {
        validate_document_name(name).map_err(invalid)?;
        if chapter_texts.is_empty() {
            return Err(invalid("document must have at least one chapter".to_string()));
        }
        let name = name.to_string();

        let document = self
            .with_conn(move |conn| {
                conn.transaction::<_, StoreError, _>(|conn| {
                    let taken: i64 = documents::table
                        .filter(documents::name.eq(&name))
                        .count()
                        .get_result(conn)?;
                    if taken > 0 {
                        return Err(StoreError::new(StoreErrorKind::Duplicate(name.clone())));
                    }

                    let now = db_now();
                    let id = Uuid::new_v4();
                    let row = DocumentRow {
                        id,
                        name: name.clone(),
                        status: DocumentStatus::ChapterReady.to_string(),
                        failure_count: 0,
                        retry_at: None,
                        last_error: None,
                        created_at: now,
                        updated_at: now,
                    };
                    diesel::insert_into(documents::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(|e| match e {
                            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                                StoreError::new(StoreErrorKind::Duplicate(name.clone()))
                            }
                            other => StoreError::from(other),
                        })?;

                    let chapter_rows: Vec<ChapterRow> = chapter_texts
                        .into_iter()
                        .enumerate()
                        .map(|(index, content)| ChapterRow {
                            id: imgagent_core::chapter_id(id, index),
                            document_id: id,
                            chapter_index: index as i32,
                            title: format!("Chapter {}", index + 1),
                            content,
                            scene_ids: Vec::new(),
                            scenes_extracted: false,
                            created_at: now,
                            updated_at: now,
                        })
                        .collect();
                    diesel::insert_into(chapters::table)
                        .values(&chapter_rows)
                        .execute(conn)?;

                    Document::try_from(row)
                })
            })
            .await?;

        info!(document_id = %document.id, "Document created");
        Ok(document)
    }

    #[instrument(skip(self))]
    async fn get_document(&self, id: Uuid) -> Result<Document, StoreError> {
        self.with_conn(move |conn| {
            let row = documents::table
                .find(id)
                .select(DocumentRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| not_found("document", id))?;
            Document::try_from(row)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_documents(
        &self,
        status: Option<DocumentStatus>,
    ) -> Result<Vec<Document>, StoreError> {
        self.with_conn(move |conn| {
            let mut query = documents::table
                .select(DocumentRow::as_select())
                .order(documents::created_at.desc())
                .into_boxed();
            if let Some(status) = status {
                query = query.filter(documents::status.eq(status.to_string()));
            }
            query
                .load(conn)?
                .into_iter()
                .map(Document::try_from)
                .collect()
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_by_status(
        &self,
        status: DocumentStatus,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        if status.is_terminal() {
            return Ok(Vec::new());
        }
        self.with_conn(move |conn| {
            let now = db_now();
            let rows = documents::table
                .filter(documents::status.eq(status.to_string()))
                .filter(documents::retry_at.is_null().or(documents::retry_at.le(now)))
                .order(documents::updated_at.asc())
                .limit(limit as i64)
                .select(DocumentRow::as_select())
                .load(conn)?;
            debug!(count = rows.len(), "Loaded candidates");
            rows.into_iter().map(Document::try_from).collect()
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_chapters(&self, document_id: Uuid) -> Result<Vec<Chapter>, StoreError> {
        self.with_conn(move |conn| {
            let rows = chapters::table
                .filter(chapters::document_id.eq(document_id))
                .order(chapters::chapter_index.asc())
                .select(ChapterRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Chapter::from).collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_roles(&self, document_id: Uuid) -> Result<Vec<Role>, StoreError> {
        self.with_conn(move |conn| {
            let rows = roles::table
                .filter(roles::document_id.eq(document_id))
                .order(roles::role_index.asc())
                .select(RoleRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Role::from).collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_scenes_by_document(&self, document_id: Uuid) -> Result<Vec<Scene>, StoreError> {
        self.with_conn(move |conn| {
            let rows = scenes::table
                .inner_join(chapters::table)
                .filter(scenes::document_id.eq(document_id))
                .order((chapters::chapter_index.asc(), scenes::scene_index.asc()))
                .select(SceneRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Scene::from).collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_scenes_by_chapter(&self, chapter_id: Uuid) -> Result<Vec<Scene>, StoreError> {
        self.with_conn(move |conn| {
            let rows = scenes::table
                .filter(scenes::chapter_id.eq(chapter_id))
                .order(scenes::scene_index.asc())
                .select(SceneRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Scene::from).collect())
        })
        .await
    }

    #[instrument(skip(self, result), fields(result = result.label()))]
    async fn commit_stage(
        &self,
        document_id: Uuid,
        expected: DocumentStatus,
        result: StageResult,
        next: DocumentStatus,
    ) -> Result<Document, StoreError> {
        let document = self
            .with_conn(move |conn| {
                conn.transaction::<_, StoreError, _>(|conn| {
                    let row = lock_document(conn, document_id)?;
                    let current = parse_status(&row.status)?;
                    if current != expected {
                        return Err(StoreError::new(StoreErrorKind::Conflict {
                            id: document_id.to_string(),
                            expected: expected.to_string(),
                            found: current.to_string(),
                        }));
                    }
                    expected
                        .transition(next)
                        .map_err(|e| invalid(e.to_string()))?;

                    let now = db_now();
                    match result {
                        StageResult::Roles(list) => {
                            diesel::delete(roles::table.filter(roles::document_id.eq(document_id)))
                                .execute(conn)?;
                            let rows: Vec<RoleRow> = list
                                .into_iter()
                                .enumerate()
                                .map(|(index, role)| role_to_row(role, index))
                                .collect();
                            if !rows.is_empty() {
                                diesel::insert_into(roles::table).values(&rows).execute(conn)?;
                            }
                        }
                        StageResult::ChapterScenes {
                            chapter_id,
                            scenes: list,
                        } => {
                            let owner: Uuid = chapters::table
                                .find(chapter_id)
                                .select(chapters::document_id)
                                .first(conn)
                                .optional()?
                                .ok_or_else(|| not_found("chapter", chapter_id))?;
                            if owner != document_id
                                || list.iter().any(|s| s.chapter_id != chapter_id)
                            {
                                return Err(invalid(format!(
                                    "scenes do not belong to chapter {} of document {}",
                                    chapter_id, document_id
                                )));
                            }

                            diesel::delete(scenes::table.filter(scenes::chapter_id.eq(chapter_id)))
                                .execute(conn)?;
                            let ids: Vec<Uuid> = list.iter().map(|s| s.id).collect();
                            let rows: Vec<SceneRow> = list.into_iter().map(SceneRow::from).collect();
                            if !rows.is_empty() {
                                diesel::insert_into(scenes::table).values(&rows).execute(conn)?;
                            }
                            diesel::update(chapters::table.find(chapter_id))
                                .set((
                                    chapters::scene_ids.eq(ids),
                                    chapters::scenes_extracted.eq(true),
                                    chapters::updated_at.eq(now),
                                ))
                                .execute(conn)?;
                        }
                        StageResult::Media(media) => {
                            for item in media {
                                let updated = diesel::update(
                                    scenes::table
                                        .filter(scenes::id.eq(item.scene_id))
                                        .filter(scenes::document_id.eq(document_id)),
                                )
                                .set((
                                    scenes::image_url.eq(item.image_url),
                                    scenes::voice_url.eq(item.voice_url),
                                    scenes::updated_at.eq(now),
                                ))
                                .execute(conn)?;
                                update_count_or_not_found(updated, "scene", item.scene_id)?;
                            }
                        }
                    }

                    let row = diesel::update(documents::table.find(document_id))
                        .set((
                            documents::status.eq(next.to_string()),
                            documents::failure_count.eq(0),
                            documents::retry_at.eq(None::<DateTime<Utc>>),
                            documents::last_error.eq(None::<String>),
                            documents::updated_at.eq(now),
                        ))
                        .returning(DocumentRow::as_returning())
                        .get_result(conn)?;
                    Document::try_from(row)
                })
            })
            .await?;

        debug!(status = %document.status, "Stage committed");
        Ok(document)
    }

    #[instrument(skip(self, error))]
    async fn increment_failure(
        &self,
        document_id: Uuid,
        seen: Revision,
        error: &str,
    ) -> Result<u32, StoreError> {
        let error = error.to_string();
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                lock_at_revision(conn, document_id, seen)?;
                let count: i32 = diesel::update(documents::table.find(document_id))
                    .set((
                        documents::failure_count.eq(documents::failure_count + 1),
                        documents::last_error.eq(Some(error)),
                    ))
                    .returning(documents::failure_count)
                    .get_result(conn)?;
                Ok(count.max(0) as u32)
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn schedule_retry(
        &self,
        document_id: Uuid,
        seen: Revision,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                lock_at_revision(conn, document_id, seen)?;
                diesel::update(documents::table.find(document_id))
                    .set((
                        documents::retry_at.eq(Some(at)),
                        documents::updated_at.eq(db_now()),
                    ))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn reset_failure(&self, document_id: Uuid) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let updated = diesel::update(documents::table.find(document_id))
                .set((
                    documents::failure_count.eq(0),
                    documents::retry_at.eq(None::<DateTime<Utc>>),
                    documents::last_error.eq(None::<String>),
                ))
                .execute(conn)?;
            update_count_or_not_found(updated, "document", document_id)
        })
        .await
    }

    #[instrument(skip(self, reason))]
    async fn mark_failed(
        &self,
        document_id: Uuid,
        seen: Revision,
        reason: &str,
    ) -> Result<(), StoreError> {
        let reason = reason.to_string();
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let current = lock_at_revision(conn, document_id, seen)?;
                if current.is_terminal() {
                    return Err(StoreError::new(StoreErrorKind::Conflict {
                        id: document_id.to_string(),
                        expected: "non-terminal".to_string(),
                        found: current.to_string(),
                    }));
                }
                diesel::update(documents::table.find(document_id))
                    .set((
                        documents::status.eq(DocumentStatus::Failed.to_string()),
                        documents::last_error.eq(Some(reason)),
                        documents::retry_at.eq(None::<DateTime<Utc>>),
                        documents::updated_at.eq(db_now()),
                    ))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn reset_document(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> Result<Document, StoreError> {
        if !status.is_reset_target() {
            return Err(invalid(format!("cannot reset a document to {}", status)));
        }

        let document = self
            .with_conn(move |conn| {
                conn.transaction::<_, StoreError, _>(|conn| {
                    lock_document(conn, document_id)?;
                    let now = db_now();

                    if status == DocumentStatus::ChapterReady {
                        diesel::delete(roles::table.filter(roles::document_id.eq(document_id)))
                            .execute(conn)?;
                    }
                    if matches!(status, DocumentStatus::ChapterReady | DocumentStatus::RoleReady) {
                        diesel::delete(scenes::table.filter(scenes::document_id.eq(document_id)))
                            .execute(conn)?;
                        diesel::update(chapters::table.filter(chapters::document_id.eq(document_id)))
                            .set((
                                chapters::scene_ids.eq(Vec::<Uuid>::new()),
                                chapters::scenes_extracted.eq(false),
                                chapters::updated_at.eq(now),
                            ))
                            .execute(conn)?;
                    }
                    if status == DocumentStatus::SceneReady {
                        diesel::update(scenes::table.filter(scenes::document_id.eq(document_id)))
                            .set((
                                scenes::image_url.eq(""),
                                scenes::voice_url.eq(""),
                                scenes::updated_at.eq(now),
                            ))
                            .execute(conn)?;
                    }

                    let row = diesel::update(documents::table.find(document_id))
                        .set((
                            documents::status.eq(status.to_string()),
                            documents::failure_count.eq(0),
                            documents::retry_at.eq(None::<DateTime<Utc>>),
                            documents::last_error.eq(None::<String>),
                            documents::updated_at.eq(now),
                        ))
                        .returning(DocumentRow::as_returning())
                        .get_result(conn)?;
                    Document::try_from(row)
                })
            })
            .await?;

        warn!(document_id = %document_id, status = %status, "Document reset by operator");
        Ok(document)
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, document_id: Uuid) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let deleted = diesel::delete(documents::table.find(document_id)).execute(conn)?;
            update_count_or_not_found(deleted, "document", document_id)
        })
        .await?;
        info!(document_id = %document_id, "Document deleted");
        Ok(())
    }
}
