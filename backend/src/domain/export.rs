//! Full and delta registration list generation.
//!
//! Eligible ledger entries are split into partitions, a fixed pool of workers
//! joins each partition with device metadata, and the joined rows are written
//! to one file. Delta runs then mark the exported entries in a single write.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::classification::{DeviceDescription, NOT_AVAILABLE};
use super::context::ServiceContext;
use super::error::Error;
use super::ledger::{LedgerEntry, ListKind};
use super::ports::{DeviceKey, ExportMark, RequestRepository};

/// One line of an export list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "APPROVED_IMEI")]
    pub imei: String,
    pub make: String,
    pub model: String,
    pub status: String,
    pub model_number: String,
    pub brand_name: String,
    pub device_type: String,
    pub radio_interface: String,
    /// Delta lists only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_type: Option<String>,
}

impl ExportRow {
    fn new(kind: ListKind, entry: &LedgerEntry, description: Option<&DeviceDescription>) -> Self {
        let field = |pick: fn(&DeviceDescription) -> &String| {
            description
                .map(|d| pick(d).clone())
                .unwrap_or_else(|| NOT_AVAILABLE.to_owned())
        };
        Self {
            imei: entry.imei.to_string(),
            make: field(|d| &d.manufacturer),
            model: field(|d| &d.model),
            status: entry.status.as_str().to_owned(),
            model_number: field(|d| &d.model_number),
            brand_name: field(|d| &d.brand),
            device_type: field(|d| &d.device_type),
            radio_interface: field(|d| &d.radio_interface),
            change_type: match kind {
                ListKind::Full => None,
                ListKind::Delta => Some(entry.delta.as_str().to_owned()),
            },
        }
    }
}

/// Summary of a generated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReport {
    pub kind: ListKind,
    pub file_name: String,
    pub rows: usize,
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    pub workers: usize,
    pub batches: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            batches: 8,
        }
    }
}

type Partition = (usize, Vec<LedgerEntry>);
type JoinedPartition = (usize, Result<Vec<ExportRow>, Error>);

/// Generates registration lists.
#[derive(Clone)]
pub struct ListGenerator {
    ctx: Arc<ServiceContext>,
    settings: ExportSettings,
}

impl ListGenerator {
    pub fn new(ctx: Arc<ServiceContext>, settings: ExportSettings) -> Self {
        Self { ctx, settings }
    }

    /// Generate a list of `kind`.
    ///
    /// Returns `None` when no entry is eligible; no file is written then.
    /// The snapshot time is taken before the ledger is read, and a delta run
    /// only marks entries left unchanged while the list was built.
    /// Failures are returned to the caller and never retried.
    pub async fn generate(&self, kind: ListKind) -> Result<Option<ListReport>, Error> {
        let snapshot = self.ctx.now();
        let entries = self.ctx.ledger.export_candidates(kind).await?;
        if entries.is_empty() {
            info!(kind = kind.as_str(), "no ledger entries eligible for export");
            return Ok(None);
        }
        let marks: Vec<ExportMark> = entries.iter().map(ExportMark::from).collect();

        let rows = self.join(kind, entries).await?;
        let file_name = self.ctx.lists.write(kind, snapshot, &rows).await?;

        if kind == ListKind::Delta {
            let marked = self.ctx.ledger.mark_exported(&marks, snapshot).await?;
            if marked < marks.len() {
                warn!(
                    skipped = marks.len() - marked,
                    "entries changed during export stay eligible for the next delta"
                );
            }
        }
        info!(kind = kind.as_str(), rows = rows.len(), file = %file_name, "list generated");
        Ok(Some(ListReport {
            kind,
            file_name,
            rows: rows.len(),
        }))
    }

    async fn join(&self, kind: ListKind, entries: Vec<LedgerEntry>) -> Result<Vec<ExportRow>, Error> {
        let partitions = partition(entries, self.settings.batches.max(1));
        let partition_count = partitions.len();

        let (input_tx, input_rx) = mpsc::channel::<Partition>(partition_count);
        let (output_tx, mut output_rx) = mpsc::channel::<JoinedPartition>(partition_count);
        let input_rx = Arc::new(Mutex::new(input_rx));

        let workers: Vec<_> = (0..self.settings.workers.max(1))
            .map(|worker| {
                let input_rx = Arc::clone(&input_rx);
                let output_tx = output_tx.clone();
                let requests = Arc::clone(&self.ctx.requests);
                tokio::spawn(async move {
                    loop {
                        let next = input_rx.lock().await.recv().await;
                        let Some((index, partition)) = next else {
                            break;
                        };
                        debug!(worker, index, entries = partition.len(), "joining partition");
                        let joined = join_partition(requests.as_ref(), kind, &partition).await;
                        if output_tx.send((index, joined)).await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(output_tx);

        for item in partitions.into_iter().enumerate() {
            if input_tx.send(item).await.is_err() {
                break;
            }
        }
        drop(input_tx);

        let mut joined = Vec::with_capacity(partition_count);
        while let Some(item) = output_rx.recv().await {
            joined.push(item);
        }
        for worker in workers {
            worker
                .await
                .map_err(|err| Error::internal(format!("export worker failed: {err}")))?;
        }
        if joined.len() != partition_count {
            return Err(Error::internal("export workers lost partitions"));
        }

        joined.sort_by_key(|(index, _)| *index);
        let mut rows = Vec::new();
        for (_, partition) in joined {
            rows.extend(partition?);
        }
        rows.sort_by(|a, b| a.imei.cmp(&b.imei));
        Ok(rows)
    }
}

fn partition(entries: Vec<LedgerEntry>, batches: usize) -> Vec<Vec<LedgerEntry>> {
    let size = entries.len().div_ceil(batches).max(1);
    let mut partitions = Vec::with_capacity(batches);
    let mut entries = entries.into_iter().peekable();
    while entries.peek().is_some() {
        partitions.push(entries.by_ref().take(size).collect());
    }
    partitions
}

async fn join_partition(
    requests: &dyn RequestRepository,
    kind: ListKind,
    partition: &[LedgerEntry],
) -> Result<Vec<ExportRow>, Error> {
    let keys: Vec<DeviceKey> = partition
        .iter()
        .map(|entry| DeviceKey {
            request_id: entry.request_id,
            tac: entry.imei.tac(),
        })
        .collect();
    let descriptions = requests.device_descriptions(&keys).await?;
    Ok(partition
        .iter()
        .zip(&keys)
        .map(|(entry, key)| ExportRow::new(kind, entry, descriptions.get(key)))
        .collect())
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
