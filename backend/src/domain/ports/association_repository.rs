//! Port for IMEI-to-UID associations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{AssociationRecord, NormalizedImei};

use super::define_port_error;

define_port_error! {
    /// Errors raised by association repository adapters.
    pub enum AssociationRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "association repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "association repository query failed: {message}",
    }
}

/// Port for association windows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssociationRepository: Send + Sync {
    /// Open windows for an IMEI.
    async fn active_for_imei(
        &self,
        imei: &NormalizedImei,
    ) -> Result<Vec<AssociationRecord>, AssociationRepositoryError>;

    /// Number of open windows held by a UID.
    async fn active_count_for_uid(&self, uid: &str) -> Result<usize, AssociationRepositoryError>;

    /// Every window ever opened for the pair, newest first.
    async fn history(
        &self,
        imei: &NormalizedImei,
        uid: &str,
    ) -> Result<Vec<AssociationRecord>, AssociationRepositoryError>;

    /// Insert a window. When `record.duplicate` is set, the IMEI's other open
    /// windows are flagged duplicate in the same transaction.
    async fn create(&self, record: &AssociationRecord) -> Result<(), AssociationRepositoryError>;

    /// Close a window.
    async fn close(
        &self,
        id: &Uuid,
        end_date: DateTime<Utc>,
    ) -> Result<(), AssociationRepositoryError>;
}
