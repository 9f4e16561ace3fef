//! PostgreSQL-backed `RequestRepository`.
//!
//! Requests, their devices, and their IMEIs live in three tables. A
//! disposition writes the request, its ledger plan, and the quota debit in one
//! transaction; the ledger rows it plans against are locked first, so
//! concurrent dispositions touching the same IMEIs apply one after the other.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{DeviceKey, DispositionCommit, RequestRepository, RequestRepositoryError};
use crate::domain::{
    Actor, CaseStatus, ComplianceSummary, Device, DeviceDescription, ImeiRecord,
    LedgerIntegrityError, NormalizedImei, PipelineStatus, QuotaDebit, Request, RequestFilter,
    RequestKind, RequestPage, RequestSearch, Tac, plan_ledger,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::diesel_ledger_repository::{WRITE_CHUNK, lock_candidates, row_to_ledger_entry, write_plan};
use super::models::{DeviceImeiRow, DeviceRow, NewRequestRow, RequestRow};
use super::pool::{DbPool, PoolError};
use super::schema::{device_imeis, device_quotas, devices, requests};

diesel::define_sql_function!(fn lower(value: Text) -> Text);

/// Diesel-backed request repository.
#[derive(Clone)]
pub struct DieselRequestRepository {
    pool: DbPool,
}

impl DieselRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> RequestRepositoryError {
    map_basic_pool_error(error, RequestRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> RequestRepositoryError {
    map_basic_diesel_error(
        error,
        RequestRepositoryError::query,
        RequestRepositoryError::connection,
    )
}

/// Failures inside a write transaction.
enum TxError {
    Diesel(diesel::result::Error),
    Integrity(LedgerIntegrityError),
    Invalid(String),
    Stale { expected: CaseStatus, found: CaseStatus },
}

impl From<diesel::result::Error> for TxError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

impl From<TxError> for RequestRepositoryError {
    fn from(error: TxError) -> Self {
        match error {
            TxError::Diesel(error) => map_diesel_error(error),
            TxError::Integrity(violation) => Self::integrity(violation),
            TxError::Invalid(message) => Self::query(message),
            TxError::Stale { expected, found } => Self::stale(expected, found),
        }
    }
}

fn count_to_i64(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn count_from_i64(value: i64, column: &str) -> Result<usize, RequestRepositoryError> {
    usize::try_from(value)
        .map_err(|_| RequestRepositoryError::query(format!("{column} is negative: {value}")))
}

fn request_row(request: &Request) -> Result<NewRequestRow<'_>, RequestRepositoryError> {
    let summary = request
        .summary
        .map(serde_json::to_value)
        .transpose()
        .map_err(|err| RequestRepositoryError::query(format!("serialise summary: {err}")))?;
    Ok(NewRequestRow {
        id: request.id,
        tracking_id: request.tracking_id,
        kind: request.kind.as_str(),
        submitter_id: &request.submitter.id,
        submitter_name: &request.submitter.name,
        reviewer_id: request.reviewer.as_ref().map(|actor| actor.id.as_str()),
        reviewer_name: request.reviewer.as_ref().map(|actor| actor.name.as_str()),
        case_status: request.case_status.code(),
        processing_status: request.processing_status.as_str(),
        report_status: request.report_status.as_str(),
        device_count: count_to_i64(request.device_count),
        imeis_per_device: count_to_i64(request.imeis_per_device),
        reason: request.reason.as_deref(),
        file_name: &request.file_name,
        summary,
        report: request.report.as_deref(),
        report_visible: request.report_visible,
        created_at: request.created_at,
        updated_at: request.updated_at,
    })
}

fn row_to_request(row: RequestRow) -> Result<Request, RequestRepositoryError> {
    let RequestRow {
        id,
        tracking_id,
        kind,
        submitter_id,
        submitter_name,
        reviewer_id,
        reviewer_name,
        case_status,
        processing_status,
        report_status,
        device_count,
        imeis_per_device,
        reason,
        file_name,
        summary,
        report,
        report_visible,
        created_at,
        updated_at,
    } = row;

    let invalid = |column: &str, value: &str| {
        RequestRepositoryError::query(format!("request {id} has invalid {column}: {value}"))
    };
    let kind = RequestKind::from_label(&kind).ok_or_else(|| invalid("kind", &kind))?;
    let case_status = CaseStatus::from_code(case_status)
        .ok_or_else(|| invalid("case_status", &case_status.to_string()))?;
    let processing_status = PipelineStatus::from_label(&processing_status)
        .ok_or_else(|| invalid("processing_status", &processing_status))?;
    let report_status = PipelineStatus::from_label(&report_status)
        .ok_or_else(|| invalid("report_status", &report_status))?;
    let summary = summary
        .map(serde_json::from_value::<ComplianceSummary>)
        .transpose()
        .map_err(|err| invalid("summary", &err.to_string()))?;
    let reviewer = match (reviewer_id, reviewer_name) {
        (Some(id), Some(name)) => Some(Actor::new(id, name)),
        (Some(id), None) => Some(Actor::new(id.clone(), id)),
        (None, _) => None,
    };

    Ok(Request {
        id,
        tracking_id,
        kind,
        submitter: Actor::new(submitter_id, submitter_name),
        reviewer,
        case_status,
        processing_status,
        report_status,
        device_count: count_from_i64(device_count, "device_count")?,
        imeis_per_device: count_from_i64(imeis_per_device, "imeis_per_device")?,
        reason,
        file_name,
        summary,
        report,
        report_visible,
        created_at,
        updated_at,
    })
}

fn device_rows(request_id: Uuid, devices: &[Device]) -> (Vec<DeviceRow>, Vec<DeviceImeiRow>) {
    let mut imei_rows = Vec::new();
    let device_rows = devices
        .iter()
        .map(|device| {
            imei_rows.extend(device.imeis.iter().enumerate().map(|(position, record)| {
                DeviceImeiRow {
                    id: Uuid::new_v4(),
                    device_id: device.id,
                    request_id,
                    position: i32::try_from(position).unwrap_or(i32::MAX),
                    raw: record.raw.clone(),
                    normalized: record.normalized.as_str().to_owned(),
                    duplicate: record.duplicate,
                }
            }));
            let description = &device.description;
            DeviceRow {
                id: device.id,
                request_id,
                tac: device.tac.as_str().to_owned(),
                brand: description.brand.clone(),
                model: description.model.clone(),
                model_number: description.model_number.clone(),
                manufacturer: description.manufacturer.clone(),
                operating_system: description.operating_system.clone(),
                device_type: description.device_type.clone(),
                radio_interface: description.radio_interface.clone(),
                device_count: count_to_i64(device.device_count),
            }
        })
        .collect();
    (device_rows, imei_rows)
}

fn description_of(row: &DeviceRow) -> DeviceDescription {
    DeviceDescription {
        brand: row.brand.clone(),
        model: row.model.clone(),
        model_number: row.model_number.clone(),
        manufacturer: row.manufacturer.clone(),
        operating_system: row.operating_system.clone(),
        device_type: row.device_type.clone(),
        radio_interface: row.radio_interface.clone(),
    }
}

fn rows_to_devices(
    device_rows: Vec<DeviceRow>,
    imei_rows: Vec<DeviceImeiRow>,
) -> Result<Vec<Device>, RequestRepositoryError> {
    let mut imeis: HashMap<Uuid, Vec<ImeiRecord>> = HashMap::new();
    for row in imei_rows {
        let normalized = NormalizedImei::parse(&row.normalized).map_err(|err| {
            RequestRepositoryError::query(format!("device imei {} is invalid: {err}", row.id))
        })?;
        imeis.entry(row.device_id).or_default().push(ImeiRecord {
            raw: row.raw,
            normalized,
            duplicate: row.duplicate,
        });
    }

    device_rows
        .into_iter()
        .map(|row| {
            let tac = Tac::new(row.tac.clone()).map_err(|err| {
                RequestRepositoryError::query(format!("device {} has invalid tac: {err}", row.id))
            })?;
            Ok(Device {
                id: row.id,
                request_id: row.request_id,
                description: description_of(&row),
                device_count: count_from_i64(row.device_count, "device_count")?,
                imeis: imeis.remove(&row.id).unwrap_or_default(),
                tac,
            })
        })
        .collect()
}

/// Escape `LIKE` wildcards so user input matches literally.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Compile a search into a boxed query over `requests`.
fn filtered(search: &RequestSearch) -> requests::BoxedQuery<'static, Pg> {
    let mut query = requests::table.into_boxed();
    if let Some(submitter_id) = &search.submitter_id {
        query = query.filter(requests::submitter_id.eq(submitter_id.clone()));
    }
    for filter in &search.filters {
        query = match filter {
            RequestFilter::TrackingId(tracking_id) => {
                query.filter(requests::tracking_id.eq(*tracking_id))
            }
            RequestFilter::Status(status) => query.filter(requests::case_status.eq(status.code())),
            RequestFilter::CreatedAt { from, to } => {
                let mut query = query;
                if let Some(from) = from {
                    query = query.filter(requests::created_at.ge(*from));
                }
                if let Some(to) = to {
                    query = query.filter(requests::created_at.le(*to));
                }
                query
            }
            RequestFilter::UserName(name) => {
                query.filter(requests::submitter_name.ilike(like_pattern(name)))
            }
            RequestFilter::Imei(imei) => query.filter(
                requests::id.eq_any(
                    device_imeis::table
                        .filter(device_imeis::normalized.eq(imei.as_str().to_owned()))
                        .select(device_imeis::request_id),
                ),
            ),
            RequestFilter::Brand(brands) => {
                let brands: Vec<String> = brands.iter().map(|brand| brand.to_lowercase()).collect();
                query.filter(
                    requests::id.eq_any(
                        devices::table
                            .filter(lower(devices::brand).eq_any(brands))
                            .select(devices::request_id),
                    ),
                )
            }
        };
    }
    query
}

async fn debit_quota(
    conn: &mut diesel_async::AsyncPgConnection,
    debit: &QuotaDebit,
) -> Result<(), TxError> {
    let amount = count_to_i64(debit.count);
    let target = device_quotas::table.find(debit.user_id.clone());
    let updated = match debit.kind {
        RequestKind::Registration => {
            diesel::update(target)
                .set(
                    device_quotas::registration_remaining
                        .eq(device_quotas::registration_remaining - amount),
                )
                .execute(conn)
                .await?
        }
        RequestKind::DeRegistration => {
            diesel::update(target)
                .set(
                    device_quotas::deregistration_remaining
                        .eq(device_quotas::deregistration_remaining - amount),
                )
                .execute(conn)
                .await?
        }
    };
    if updated == 0 {
        return Err(TxError::Invalid(format!("no quota for {}", debit.user_id)));
    }
    Ok(())
}

#[async_trait]
impl RequestRepository for DieselRequestRepository {
    async fn save(&self, request: &Request) -> Result<(), RequestRepositoryError> {
        let row = request_row(request)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(requests::table)
            .values(&row)
            .on_conflict(requests::id)
            .do_update()
            .set(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Request>, RequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = requests::table
            .filter(requests::id.eq(id))
            .select(RequestRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_request).transpose()
    }

    async fn replace_devices(
        &self,
        request_id: &Uuid,
        devices: &[Device],
    ) -> Result<(), RequestRepositoryError> {
        let request_id = *request_id;
        let (device_rows, imei_rows) = device_rows(request_id, devices);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                diesel::delete(device_imeis::table.filter(device_imeis::request_id.eq(request_id)))
                    .execute(conn)
                    .await?;
                diesel::delete(devices::table.filter(devices::request_id.eq(request_id)))
                    .execute(conn)
                    .await?;
                for chunk in device_rows.chunks(WRITE_CHUNK) {
                    diesel::insert_into(devices::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                for chunk in imei_rows.chunks(WRITE_CHUNK) {
                    diesel::insert_into(device_imeis::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn devices(&self, request_id: &Uuid) -> Result<Vec<Device>, RequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let device_rows: Vec<DeviceRow> = devices::table
            .filter(devices::request_id.eq(request_id))
            .order(devices::tac.asc())
            .select(DeviceRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let imei_rows: Vec<DeviceImeiRow> = device_imeis::table
            .filter(device_imeis::request_id.eq(request_id))
            .order(device_imeis::position.asc())
            .select(DeviceImeiRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_devices(device_rows, imei_rows)
    }

    async fn device_descriptions(
        &self,
        keys: &[DeviceKey],
    ) -> Result<BTreeMap<DeviceKey, DeviceDescription>, RequestRepositoryError> {
        let request_ids: Vec<Uuid> = keys
            .iter()
            .map(|key| key.request_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if request_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<DeviceRow> = devices::table
            .filter(devices::request_id.eq_any(request_ids))
            .select(DeviceRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let wanted: BTreeSet<&DeviceKey> = keys.iter().collect();
        let mut descriptions = BTreeMap::new();
        for row in rows {
            let Ok(tac) = Tac::new(row.tac.clone()) else {
                continue;
            };
            let key = DeviceKey {
                request_id: row.request_id,
                tac,
            };
            if wanted.contains(&key) {
                descriptions.insert(key, description_of(&row));
            }
        }
        Ok(descriptions)
    }

    async fn search(&self, search: &RequestSearch) -> Result<RequestPage, RequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let total: i64 = filtered(search)
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let rows: Vec<RequestRow> = filtered(search)
            .order((requests::created_at.desc(), requests::id.asc()))
            .limit(search.limit)
            .offset(search.offset)
            .select(RequestRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(RequestPage {
            items: rows
                .into_iter()
                .map(row_to_request)
                .collect::<Result<_, _>>()?,
            total,
            limit: search.limit,
            offset: search.offset,
        })
    }

    async fn count_by_status(
        &self,
        submitter_id: &str,
    ) -> Result<BTreeMap<CaseStatus, i64>, RequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(i16, i64)> = requests::table
            .filter(requests::submitter_id.eq(submitter_id))
            .group_by(requests::case_status)
            .select((requests::case_status, diesel::dsl::count_star()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter()
            .map(|(code, count)| {
                CaseStatus::from_code(code)
                    .map(|status| (status, count))
                    .ok_or_else(|| RequestRepositoryError::query(format!("unknown case status {code}")))
            })
            .collect()
    }

    async fn commit_disposition(
        &self,
        commit: &DispositionCommit,
    ) -> Result<(), RequestRepositoryError> {
        let row = request_row(&commit.request)?;
        let now = commit.request.updated_at;
        let request_id = commit.request.id;
        let expected = commit.expected_status;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        conn.transaction::<_, TxError, _>(|conn| {
            async move {
                let code: i16 = requests::table
                    .find(request_id)
                    .select(requests::case_status)
                    .for_update()
                    .get_result(conn)
                    .await?;
                let found = CaseStatus::from_code(code)
                    .ok_or_else(|| TxError::Invalid(format!("unknown case status {code}")))?;
                if found != expected {
                    return Err(TxError::Stale { expected, found });
                }
                if let Some(intent) = &commit.ledger {
                    let candidates = lock_candidates(conn, intent.request_id(), intent.imeis())
                        .await?
                        .into_iter()
                        .map(row_to_ledger_entry)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(TxError::Invalid)?;
                    let plan = plan_ledger(intent, candidates, now).map_err(TxError::Integrity)?;
                    write_plan(conn, &plan.deletes, &plan.upserts).await?;
                }
                if let Some(debit) = &commit.quota {
                    debit_quota(conn, debit).await?;
                }
                diesel::update(requests::table.find(request_id))
                    .set(&row)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(RequestRepositoryError::from)
    }
}
