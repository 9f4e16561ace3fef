//! Recording and scripted doubles for the driven ports.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::ports::{
    AuditAction, AuditEntry, AuditSink, ComplianceChecker, ComplianceCheckerError,
    ComplianceQuery, ComplianceVerdict, DeviceDatabase, DeviceDatabaseError, DocumentKind,
    DocumentStore, DocumentStoreError, ListWriter, ListWriterError, Notification,
    NotificationSink, NotificationSinkError, StoredDocument, list_file_name, validate_upload,
};
use crate::domain::{ExportRow, ListKind, Tac, TacMetadata};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("test double mutex poisoned"),
    }
}

/// Device database answering from a fixed table.
#[derive(Default)]
pub struct StaticDeviceDatabase {
    entries: Mutex<BTreeMap<Tac, TacMetadata>>,
    failure: Mutex<Option<DeviceDatabaseError>>,
    batch_calls: Mutex<Vec<usize>>,
}

impl StaticDeviceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tac: &str, metadata: TacMetadata) {
        let tac = match Tac::new(tac) {
            Ok(tac) => tac,
            Err(error) => panic!("invalid TAC {tac}: {error}"),
        };
        guard(&self.entries).insert(tac, metadata);
    }

    /// Fail every lookup with `error` (or stop failing with `None`).
    pub fn fail_with(&self, error: Option<DeviceDatabaseError>) {
        *guard(&self.failure) = error;
    }

    /// Sizes of the batch lookups made so far.
    pub fn batch_calls(&self) -> Vec<usize> {
        guard(&self.batch_calls).clone()
    }

    fn check(&self) -> Result<(), DeviceDatabaseError> {
        match guard(&self.failure).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceDatabase for StaticDeviceDatabase {
    async fn lookup_batch(
        &self,
        tacs: &[Tac],
    ) -> Result<BTreeMap<Tac, TacMetadata>, DeviceDatabaseError> {
        guard(&self.batch_calls).push(tacs.len());
        self.check()?;
        let entries = guard(&self.entries);
        Ok(tacs
            .iter()
            .filter_map(|tac| entries.get(tac).map(|metadata| (tac.clone(), metadata.clone())))
            .collect())
    }

    async fn lookup_one(&self, tac: &Tac) -> Result<Option<TacMetadata>, DeviceDatabaseError> {
        self.check()?;
        Ok(guard(&self.entries).get(tac).cloned())
    }
}

/// Compliance checker returning a configurable verdict.
#[derive(Default)]
pub struct ScriptedComplianceChecker {
    verdict: Mutex<Option<Result<ComplianceVerdict, ComplianceCheckerError>>>,
    queries: Mutex<Vec<ComplianceQuery>>,
}

impl ScriptedComplianceChecker {
    /// A checker reporting every batch as compliant.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verdict(&self, verdict: ComplianceVerdict) {
        *guard(&self.verdict) = Some(Ok(verdict));
    }

    pub fn fail_with(&self, error: ComplianceCheckerError) {
        *guard(&self.verdict) = Some(Err(error));
    }

    /// Queries received so far.
    pub fn queries(&self) -> Vec<ComplianceQuery> {
        guard(&self.queries).clone()
    }
}

#[async_trait]
impl ComplianceChecker for ScriptedComplianceChecker {
    async fn check(
        &self,
        query: &ComplianceQuery,
    ) -> Result<ComplianceVerdict, ComplianceCheckerError> {
        guard(&self.queries).push(query.clone());
        guard(&self.verdict)
            .clone()
            .unwrap_or_else(|| Ok(ComplianceVerdict::default()))
    }
}

/// Notification sink keeping every delivered notification.
#[derive(Default)]
pub struct RecordingNotificationSink {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *guard(&self.failing) = failing;
    }

    pub fn sent(&self) -> Vec<Notification> {
        guard(&self.sent).clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationSinkError> {
        if *guard(&self.failing) {
            return Err(NotificationSinkError::delivery("sink offline"));
        }
        guard(&self.sent).push(notification.clone());
        Ok(())
    }
}

/// Audit sink keeping every entry.
#[derive(Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        guard(&self.entries).clone()
    }

    /// Recorded actions in order.
    pub fn actions(&self) -> Vec<AuditAction> {
        guard(&self.entries).iter().map(|entry| entry.action).collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        guard(&self.entries).push(entry.clone());
    }
}

/// Document store keeping files in memory.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    files: Mutex<HashMap<(Uuid, String), Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a stored file, as if it went missing.
    pub fn remove(&self, tracking_id: &Uuid, name: &str) {
        guard(&self.files).remove(&(*tracking_id, name.to_owned()));
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn store(
        &self,
        tracking_id: &Uuid,
        kind: DocumentKind,
        name: &str,
        content: &[u8],
    ) -> Result<StoredDocument, DocumentStoreError> {
        validate_upload(kind, name, content.len())?;
        guard(&self.files).insert((*tracking_id, name.to_owned()), content.to_vec());
        Ok(StoredDocument {
            name: name.to_owned(),
            size: content.len(),
            sha256: hex::encode(Sha256::digest(content)),
        })
    }

    async fn read(&self, tracking_id: &Uuid, name: &str) -> Result<Vec<u8>, DocumentStoreError> {
        guard(&self.files)
            .get(&(*tracking_id, name.to_owned()))
            .cloned()
            .ok_or_else(|| DocumentStoreError::not_found(name))
    }

    async fn list(&self, tracking_id: &Uuid) -> Result<Vec<String>, DocumentStoreError> {
        let mut names: Vec<String> = guard(&self.files)
            .keys()
            .filter(|(owner, _)| owner == tracking_id)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// List writer keeping every written list.
#[derive(Default)]
pub struct InMemoryListWriter {
    lists: Mutex<Vec<(String, Vec<ExportRow>)>>,
}

impl InMemoryListWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Written lists as `(file name, rows)`.
    pub fn lists(&self) -> Vec<(String, Vec<ExportRow>)> {
        guard(&self.lists).clone()
    }
}

#[async_trait]
impl ListWriter for InMemoryListWriter {
    async fn write(
        &self,
        kind: ListKind,
        generated_at: DateTime<Utc>,
        rows: &[ExportRow],
    ) -> Result<String, ListWriterError> {
        let name = list_file_name(kind, generated_at);
        guard(&self.lists).push((name.clone(), rows.to_vec()));
        Ok(name)
    }
}
