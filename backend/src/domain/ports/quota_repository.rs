//! Port for per-user device quotas.

use async_trait::async_trait;

use crate::domain::{DeviceQuota, QuotaDefaults};

use super::define_port_error;

define_port_error! {
    /// Errors raised by quota repository adapters.
    pub enum QuotaRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "quota repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "quota repository query failed: {message}",
    }
}

/// Port for reading quotas; decrements ride on disposition commits.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    /// Read a user's quota, creating it from `defaults` on first use.
    async fn find_or_create(
        &self,
        user_id: &str,
        defaults: QuotaDefaults,
    ) -> Result<DeviceQuota, QuotaRepositoryError>;
}
