//! PostgreSQL-backed `LedgerRepository`.
//!
//! Staging locks the rows it plans against so two concurrent processing runs
//! for overlapping IMEIs serialise on the ledger.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{ExportMark, LedgerRepository, LedgerRepositoryError};
use crate::domain::{
    DeltaStatus, LedgerEntry, LedgerStatus, ListKind, NormalizedImei, plan_staging,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::LedgerEntryRow;
use super::pool::{DbPool, PoolError};
use super::schema::ledger_entries;

/// Rows per multi-row statement; keeps bind parameters under the PostgreSQL
/// limit of 65535.
pub(super) const WRITE_CHUNK: usize = 5_000;

/// Diesel-backed ledger.
#[derive(Clone)]
pub struct DieselLedgerRepository {
    pool: DbPool,
}

impl DieselLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> LedgerRepositoryError {
    map_basic_pool_error(error, LedgerRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> LedgerRepositoryError {
    map_basic_diesel_error(
        error,
        LedgerRepositoryError::query,
        LedgerRepositoryError::connection,
    )
}

pub(super) fn ledger_row(entry: &LedgerEntry) -> LedgerEntryRow {
    LedgerEntryRow {
        id: entry.id,
        imei: entry.imei.as_str().to_owned(),
        request_id: entry.request_id,
        status: entry.status.as_str().to_owned(),
        delta: entry.delta.as_str().to_owned(),
        exported: entry.exported,
        exported_at: entry.exported_at,
        removed: entry.removed,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    }
}

/// Convert a stored row; the error names the offending column.
pub(super) fn row_to_ledger_entry(row: LedgerEntryRow) -> Result<LedgerEntry, String> {
    let imei = NormalizedImei::parse(&row.imei)
        .map_err(|err| format!("ledger entry {} has invalid imei: {err}", row.id))?;
    let status = LedgerStatus::from_label(&row.status)
        .ok_or_else(|| format!("ledger entry {} has unknown status {}", row.id, row.status))?;
    let delta = DeltaStatus::from_label(&row.delta)
        .ok_or_else(|| format!("ledger entry {} has unknown delta {}", row.id, row.delta))?;
    Ok(LedgerEntry {
        id: row.id,
        imei,
        request_id: row.request_id,
        status,
        delta,
        exported: row.exported,
        exported_at: row.exported_at,
        removed: row.removed,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Lock and load every entry owned by `request_id` plus the non-removed
/// entries for `imeis`.
pub(super) async fn lock_candidates(
    conn: &mut AsyncPgConnection,
    request_id: Option<Uuid>,
    imeis: &[NormalizedImei],
) -> QueryResult<Vec<LedgerEntryRow>> {
    let wanted: Vec<String> = imeis.iter().map(|imei| imei.as_str().to_owned()).collect();
    // No request owns the nil id, so intents without a request match on IMEI only.
    let owner = request_id.unwrap_or_else(Uuid::nil);
    ledger_entries::table
        .filter(
            ledger_entries::request_id.eq(owner).or(ledger_entries::removed
                .eq(false)
                .and(ledger_entries::imei.eq_any(wanted))),
        )
        .select(LedgerEntryRow::as_select())
        .for_update()
        .load(conn)
        .await
}

/// Delete `deletes`, then insert or overwrite every row in `upserts`.
///
/// Both run in multi-row statements of at most [`WRITE_CHUNK`] rows.
pub(super) async fn write_plan(
    conn: &mut AsyncPgConnection,
    deletes: &[Uuid],
    upserts: &[LedgerEntry],
) -> QueryResult<()> {
    for ids in deletes.chunks(WRITE_CHUNK) {
        diesel::delete(ledger_entries::table.filter(ledger_entries::id.eq_any(ids.to_vec())))
            .execute(conn)
            .await?;
    }
    for chunk in upserts.chunks(WRITE_CHUNK) {
        let rows: Vec<LedgerEntryRow> = chunk.iter().map(ledger_row).collect();
        diesel::insert_into(ledger_entries::table)
            .values(&rows)
            .on_conflict(ledger_entries::id)
            .do_update()
            .set((
                ledger_entries::imei.eq(excluded(ledger_entries::imei)),
                ledger_entries::request_id.eq(excluded(ledger_entries::request_id)),
                ledger_entries::status.eq(excluded(ledger_entries::status)),
                ledger_entries::delta.eq(excluded(ledger_entries::delta)),
                ledger_entries::exported.eq(excluded(ledger_entries::exported)),
                ledger_entries::exported_at.eq(excluded(ledger_entries::exported_at)),
                ledger_entries::removed.eq(excluded(ledger_entries::removed)),
                ledger_entries::updated_at.eq(excluded(ledger_entries::updated_at)),
            ))
            .execute(conn)
            .await?;
    }
    Ok(())
}

enum StageError {
    Diesel(diesel::result::Error),
    Decode(String),
}

impl From<diesel::result::Error> for StageError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

#[async_trait]
impl LedgerRepository for DieselLedgerRepository {
    async fn stage(
        &self,
        request_id: &Uuid,
        imeis: &[NormalizedImei],
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<NormalizedImei>, LedgerRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let request_id = *request_id;

        conn.transaction::<_, StageError, _>(|conn| {
            async move {
                let existing = lock_candidates(conn, Some(request_id), imeis)
                    .await?
                    .into_iter()
                    .map(row_to_ledger_entry)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(StageError::Decode)?;
                let plan = plan_staging(request_id, imeis, &existing, now);

                write_plan(conn, &plan.deletes, &plan.upserts).await?;
                for chunk in plan.inserts.chunks(WRITE_CHUNK) {
                    let rows: Vec<LedgerEntryRow> = chunk.iter().map(ledger_row).collect();
                    diesel::insert_into(ledger_entries::table)
                        .values(&rows)
                        .execute(conn)
                        .await?;
                }
                Ok(plan.held_elsewhere)
            }
            .scope_boxed()
        })
        .await
        .map_err(|err| match err {
            StageError::Diesel(error) => map_diesel_error(error),
            StageError::Decode(message) => LedgerRepositoryError::query(message),
        })
    }

    async fn held_elsewhere(
        &self,
        request_id: &Uuid,
        imeis: &[NormalizedImei],
    ) -> Result<BTreeSet<NormalizedImei>, LedgerRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut held = BTreeSet::new();
        for chunk in imeis.chunks(WRITE_CHUNK) {
            let wanted: Vec<String> = chunk.iter().map(|imei| imei.as_str().to_owned()).collect();
            let rows: Vec<String> = ledger_entries::table
                .filter(ledger_entries::request_id.ne(request_id))
                .filter(ledger_entries::removed.eq(false))
                .filter(ledger_entries::imei.eq_any(wanted))
                .select(ledger_entries::imei)
                .load(&mut conn)
                .await
                .map_err(map_diesel_error)?;
            for raw in rows {
                let imei = NormalizedImei::parse(&raw)
                    .map_err(|err| LedgerRepositoryError::query(err.to_string()))?;
                held.insert(imei);
            }
        }
        Ok(held)
    }

    async fn is_whitelisted(&self, imei: &NormalizedImei) -> Result<bool, LedgerRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(diesel::dsl::exists(
            ledger_entries::table
                .filter(ledger_entries::imei.eq(imei.as_str()))
                .filter(ledger_entries::status.eq(LedgerStatus::Whitelist.as_str()))
                .filter(ledger_entries::removed.eq(false)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)
    }

    async fn export_candidates(
        &self,
        kind: ListKind,
    ) -> Result<Vec<LedgerEntry>, LedgerRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let query = ledger_entries::table
            .select(LedgerEntryRow::as_select())
            .order((ledger_entries::imei.asc(), ledger_entries::created_at.asc()))
            .into_boxed();
        let query = match kind {
            ListKind::Full => query.filter(ledger_entries::removed.eq(false)),
            ListKind::Delta => query.filter(
                ledger_entries::exported
                    .eq(false)
                    .or(ledger_entries::exported_at.is_null())
                    .or(ledger_entries::updated_at
                        .nullable()
                        .gt(ledger_entries::exported_at)),
            ),
        };
        let rows = query.load(&mut conn).await.map_err(map_diesel_error)?;

        rows.into_iter()
            .map(|row| row_to_ledger_entry(row).map_err(LedgerRepositoryError::query))
            .collect()
    }

    async fn mark_exported(
        &self,
        marks: &[ExportMark],
        snapshot: DateTime<Utc>,
    ) -> Result<usize, LedgerRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                let mut marked = 0;
                for chunk in marks.chunks(WRITE_CHUNK) {
                    let ids: Vec<Uuid> = chunk.iter().map(|mark| mark.id).collect();
                    let current: HashMap<Uuid, DateTime<Utc>> = ledger_entries::table
                        .filter(ledger_entries::id.eq_any(ids))
                        .select((ledger_entries::id, ledger_entries::updated_at))
                        .for_update()
                        .load::<(Uuid, DateTime<Utc>)>(conn)
                        .await?
                        .into_iter()
                        .collect();
                    let unchanged: Vec<Uuid> = chunk
                        .iter()
                        .filter(|mark| current.get(&mark.id) == Some(&mark.updated_at))
                        .map(|mark| mark.id)
                        .collect();
                    if unchanged.is_empty() {
                        continue;
                    }
                    marked += diesel::update(
                        ledger_entries::table.filter(ledger_entries::id.eq_any(unchanged)),
                    )
                    .set((
                        ledger_entries::exported.eq(true),
                        ledger_entries::exported_at.eq(Some(snapshot)),
                    ))
                    .execute(conn)
                    .await?;
                }
                Ok(marked)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn row() -> LedgerEntryRow {
        let now = Utc::now();
        LedgerEntryRow {
            id: Uuid::new_v4(),
            imei: "35678901000001".to_owned(),
            request_id: Uuid::new_v4(),
            status: "whitelist".to_owned(),
            delta: "update".to_owned(),
            exported: true,
            exported_at: Some(now),
            removed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    fn rows_convert_both_ways(row: LedgerEntryRow) {
        let entry = row_to_ledger_entry(row.clone()).expect("valid row");
        assert_eq!(entry.status, LedgerStatus::Whitelist);
        assert_eq!(entry.delta, DeltaStatus::Update);

        let back = ledger_row(&entry);
        assert_eq!(back.imei, row.imei);
        assert_eq!(back.status, row.status);
        assert_eq!(back.exported_at, row.exported_at);
    }

    #[rstest]
    #[case("imei", "1234")]
    #[case("status", "approved")]
    #[case("delta", "insert")]
    fn corrupt_rows_are_reported(mut row: LedgerEntryRow, #[case] column: &str, #[case] value: &str) {
        match column {
            "imei" => row.imei = value.to_owned(),
            "status" => row.status = value.to_owned(),
            _ => row.delta = value.to_owned(),
        }
        let message = row_to_ledger_entry(row).expect_err("corrupt row");
        assert!(message.contains(column), "{message}");
    }

    #[rstest]
    fn write_chunks_fit_postgres_bind_limit(row: LedgerEntryRow) {
        // Columns bound per ledger row in a multi-row insert.
        let columns = [
            row.id.to_string(),
            row.imei,
            row.request_id.to_string(),
            row.status,
            row.delta,
            row.exported.to_string(),
            format!("{:?}", row.exported_at),
            row.removed.to_string(),
            row.created_at.to_string(),
            row.updated_at.to_string(),
        ]
        .len();
        assert!(WRITE_CHUNK * columns <= usize::from(u16::MAX));
    }

    #[rstest]
    fn pool_failures_are_connection_errors() {
        let error = map_pool_error(PoolError::checkout("exhausted"));
        assert!(matches!(error, LedgerRepositoryError::Connection { .. }));
    }
}
