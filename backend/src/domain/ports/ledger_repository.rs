//! Port for the approved-IMEI ledger.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{LedgerEntry, ListKind, NormalizedImei};

use super::define_port_error;

define_port_error! {
    /// Errors raised by ledger repository adapters.
    pub enum LedgerRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "ledger repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "ledger repository query failed: {message}",
    }
}

/// A ledger entry as read for an export, identified by its change time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportMark {
    /// Entry id.
    pub id: Uuid,
    /// `updated_at` seen when the entry was read.
    pub updated_at: DateTime<Utc>,
}

impl From<&LedgerEntry> for ExportMark {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id,
            updated_at: entry.updated_at,
        }
    }
}

/// Port for staging, reading, and export bookkeeping of ledger entries.
///
/// Disposition changes go through
/// [`RequestRepository::commit_disposition`](super::RequestRepository::commit_disposition)
/// so they share the request's transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Replace a registration's pending entries with `imeis`.
    ///
    /// Entries already exported are kept for IMEIs still in the file and
    /// removed for IMEIs that left it.
    ///
    /// Returns the IMEIs skipped because another request holds them.
    async fn stage(
        &self,
        request_id: &Uuid,
        imeis: &[NormalizedImei],
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<NormalizedImei>, LedgerRepositoryError>;

    /// IMEIs from `imeis` held by a non-removed entry of another request.
    async fn held_elsewhere(
        &self,
        request_id: &Uuid,
        imeis: &[NormalizedImei],
    ) -> Result<BTreeSet<NormalizedImei>, LedgerRepositoryError>;

    /// Whether the IMEI has an approved entry.
    async fn is_whitelisted(&self, imei: &NormalizedImei) -> Result<bool, LedgerRepositoryError>;

    /// Entries eligible for a list of `kind`.
    async fn export_candidates(
        &self,
        kind: ListKind,
    ) -> Result<Vec<LedgerEntry>, LedgerRepositoryError>;

    /// Mark entries as exported at `snapshot`.
    ///
    /// Entries whose `updated_at` moved since they were read are skipped and
    /// stay eligible for the next delta list. Returns the number marked.
    async fn mark_exported(
        &self,
        marks: &[ExportMark],
        snapshot: DateTime<Utc>,
    ) -> Result<usize, LedgerRepositoryError>;
}
