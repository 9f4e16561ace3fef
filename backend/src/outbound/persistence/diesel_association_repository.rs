//! PostgreSQL-backed `AssociationRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{AssociationRepository, AssociationRepositoryError};
use crate::domain::{AssociationRecord, NormalizedImei};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::AssociationRow;
use super::pool::{DbPool, PoolError};
use super::schema::imei_associations;

/// Diesel-backed association repository.
#[derive(Clone)]
pub struct DieselAssociationRepository {
    pool: DbPool,
}

impl DieselAssociationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> AssociationRepositoryError {
    map_basic_pool_error(error, AssociationRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> AssociationRepositoryError {
    map_basic_diesel_error(
        error,
        AssociationRepositoryError::query,
        AssociationRepositoryError::connection,
    )
}

fn row_to_record(row: AssociationRow) -> Result<AssociationRecord, AssociationRepositoryError> {
    let imei = NormalizedImei::parse(&row.imei).map_err(|err| {
        AssociationRepositoryError::query(format!("association {} has invalid imei: {err}", row.id))
    })?;
    Ok(AssociationRecord {
        id: row.id,
        imei,
        uid: row.uid,
        start_date: row.start_date,
        end_date: row.end_date,
        duplicate: row.duplicate,
        exported: row.exported,
        exported_at: row.exported_at,
    })
}

fn record_row(record: &AssociationRecord) -> AssociationRow {
    AssociationRow {
        id: record.id,
        imei: record.imei.as_str().to_owned(),
        uid: record.uid.clone(),
        start_date: record.start_date,
        end_date: record.end_date,
        duplicate: record.duplicate,
        exported: record.exported,
        exported_at: record.exported_at,
    }
}

fn rows_to_records(
    rows: Vec<AssociationRow>,
) -> Result<Vec<AssociationRecord>, AssociationRepositoryError> {
    rows.into_iter().map(row_to_record).collect()
}

#[async_trait]
impl AssociationRepository for DieselAssociationRepository {
    async fn active_for_imei(
        &self,
        imei: &NormalizedImei,
    ) -> Result<Vec<AssociationRecord>, AssociationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = imei_associations::table
            .filter(imei_associations::imei.eq(imei.as_str()))
            .filter(imei_associations::end_date.is_null())
            .order(imei_associations::start_date.asc())
            .select(AssociationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_records(rows)
    }

    async fn active_count_for_uid(&self, uid: &str) -> Result<usize, AssociationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let count: i64 = imei_associations::table
            .filter(imei_associations::uid.eq(uid))
            .filter(imei_associations::end_date.is_null())
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        usize::try_from(count).map_err(|_| AssociationRepositoryError::query("negative count"))
    }

    async fn history(
        &self,
        imei: &NormalizedImei,
        uid: &str,
    ) -> Result<Vec<AssociationRecord>, AssociationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = imei_associations::table
            .filter(imei_associations::imei.eq(imei.as_str()))
            .filter(imei_associations::uid.eq(uid))
            .order(imei_associations::start_date.desc())
            .select(AssociationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_records(rows)
    }

    async fn create(&self, record: &AssociationRecord) -> Result<(), AssociationRepositoryError> {
        let row = record_row(record);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                if row.duplicate {
                    diesel::update(
                        imei_associations::table
                            .filter(imei_associations::imei.eq(&row.imei))
                            .filter(imei_associations::end_date.is_null()),
                    )
                    .set(imei_associations::duplicate.eq(true))
                    .execute(conn)
                    .await?;
                }
                diesel::insert_into(imei_associations::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn close(
        &self,
        id: &Uuid,
        end_date: DateTime<Utc>,
    ) -> Result<(), AssociationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            imei_associations::table
                .filter(imei_associations::id.eq(id))
                .filter(imei_associations::end_date.is_null()),
        )
        .set(imei_associations::end_date.eq(Some(end_date)))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        if updated == 0 {
            return Err(AssociationRepositoryError::query(format!(
                "no open association {id}"
            )));
        }
        Ok(())
    }
}
