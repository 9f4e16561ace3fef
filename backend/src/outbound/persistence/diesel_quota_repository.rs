//! PostgreSQL-backed `QuotaRepository`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{QuotaRepository, QuotaRepositoryError};
use crate::domain::{DeviceQuota, QuotaDefaults};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::DeviceQuotaRow;
use super::pool::{DbPool, PoolError};
use super::schema::device_quotas;

/// Diesel-backed quota repository.
#[derive(Clone)]
pub struct DieselQuotaRepository {
    pool: DbPool,
}

impl DieselQuotaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> QuotaRepositoryError {
    map_basic_pool_error(error, QuotaRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> QuotaRepositoryError {
    map_basic_diesel_error(
        error,
        QuotaRepositoryError::query,
        QuotaRepositoryError::connection,
    )
}

impl From<DeviceQuotaRow> for DeviceQuota {
    fn from(row: DeviceQuotaRow) -> Self {
        Self {
            user_id: row.user_id,
            registration_remaining: row.registration_remaining,
            deregistration_remaining: row.deregistration_remaining,
        }
    }
}

#[async_trait]
impl QuotaRepository for DieselQuotaRepository {
    async fn find_or_create(
        &self,
        user_id: &str,
        defaults: QuotaDefaults,
    ) -> Result<DeviceQuota, QuotaRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let seed = DeviceQuotaRow {
            user_id: user_id.to_owned(),
            registration_remaining: defaults.registration,
            deregistration_remaining: defaults.deregistration,
        };
        diesel::insert_into(device_quotas::table)
            .values(&seed)
            .on_conflict(device_quotas::user_id)
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        device_quotas::table
            .find(user_id)
            .select(DeviceQuotaRow::as_select())
            .first(&mut conn)
            .await
            .map(DeviceQuota::from)
            .map_err(map_diesel_error)
    }
}
