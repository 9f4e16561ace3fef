//! PostgreSQL-backed `SectionRepository`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{SectionRepository, SectionRepositoryError};
use crate::domain::{Actor, Section, SectionComment, SectionStatus, SectionType};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{ReviewSectionRow, SectionCommentRow};
use super::pool::{DbPool, PoolError};
use super::schema::{review_sections, section_comments};

/// Diesel-backed section repository.
#[derive(Clone)]
pub struct DieselSectionRepository {
    pool: DbPool,
}

impl DieselSectionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> SectionRepositoryError {
    map_basic_pool_error(error, SectionRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> SectionRepositoryError {
    map_basic_diesel_error(
        error,
        SectionRepositoryError::query,
        SectionRepositoryError::connection,
    )
}

fn row_to_comment(row: SectionCommentRow) -> Result<SectionComment, SectionRepositoryError> {
    let status = SectionStatus::from_code(row.status).ok_or_else(|| {
        SectionRepositoryError::query(format!("comment {} has status code {}", row.id, row.status))
    })?;
    Ok(SectionComment {
        reviewer: Actor::new(row.reviewer_id, row.reviewer_name),
        comment: row.comment,
        status,
        created_at: row.created_at,
    })
}

fn section_type(label: &str) -> Result<SectionType, SectionRepositoryError> {
    SectionType::from_label(label)
        .ok_or_else(|| SectionRepositoryError::query(format!("unknown section type {label}")))
}

/// Group comment rows (already in log order) into sections.
fn assemble(
    section_rows: Vec<ReviewSectionRow>,
    comment_rows: Vec<SectionCommentRow>,
) -> Result<Vec<Section>, SectionRepositoryError> {
    let mut sections: BTreeMap<SectionType, Section> = BTreeMap::new();
    for row in section_rows {
        let section_type = section_type(&row.section_type)?;
        sections.insert(section_type, Section::empty(section_type));
    }
    for row in comment_rows {
        let section_type = section_type(&row.section_type)?;
        let comment = row_to_comment(row)?;
        sections
            .entry(section_type)
            .or_insert_with(|| Section::empty(section_type))
            .record(comment);
    }
    Ok(sections.into_values().collect())
}

#[async_trait]
impl SectionRepository for DieselSectionRepository {
    async fn record(
        &self,
        request_id: &Uuid,
        section_type: SectionType,
        comment: &SectionComment,
    ) -> Result<Section, SectionRepositoryError> {
        let request_id = *request_id;
        let label = section_type.as_str();
        let section_row = ReviewSectionRow {
            request_id,
            section_type: label.to_owned(),
            status: comment.status.code(),
        };
        let comment_row = SectionCommentRow {
            id: Uuid::new_v4(),
            request_id,
            section_type: label.to_owned(),
            reviewer_id: comment.reviewer.id.clone(),
            reviewer_name: comment.reviewer.name.clone(),
            comment: comment.comment.clone(),
            status: comment.status.code(),
            created_at: comment.created_at,
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let comment_rows = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    diesel::insert_into(review_sections::table)
                        .values(&section_row)
                        .on_conflict((review_sections::request_id, review_sections::section_type))
                        .do_update()
                        .set(review_sections::status.eq(excluded(review_sections::status)))
                        .execute(conn)
                        .await?;
                    diesel::insert_into(section_comments::table)
                        .values(&comment_row)
                        .execute(conn)
                        .await?;
                    section_comments::table
                        .filter(section_comments::request_id.eq(request_id))
                        .filter(section_comments::section_type.eq(label))
                        .order((section_comments::created_at.asc(), section_comments::id.asc()))
                        .select(SectionCommentRow::as_select())
                        .load::<SectionCommentRow>(conn)
                        .await
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;

        let mut section = Section::empty(section_type);
        for row in comment_rows {
            section.record(row_to_comment(row)?);
        }
        Ok(section)
    }

    async fn list(&self, request_id: &Uuid) -> Result<Vec<Section>, SectionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let section_rows: Vec<ReviewSectionRow> = review_sections::table
            .filter(review_sections::request_id.eq(request_id))
            .select(ReviewSectionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let comment_rows: Vec<SectionCommentRow> = section_comments::table
            .filter(section_comments::request_id.eq(request_id))
            .order((section_comments::created_at.asc(), section_comments::id.asc()))
            .select(SectionCommentRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        assemble(section_rows, comment_rows)
    }
}
