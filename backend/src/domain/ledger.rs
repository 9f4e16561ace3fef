//! The approved-IMEI ledger.
//!
//! Every normalised IMEI has at most one non-removed entry. Entries move
//! `pending → whitelist → removed` and carry a delta status telling the list
//! generator what changed since the last export. Changes are planned here as
//! pure functions over the affected rows; adapters apply a [`LedgerPlan`]
//! inside one transaction.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::imei::NormalizedImei;

/// Registration state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// Staged by a registration still under review.
    Pending,
    /// Approved and eligible for association.
    Whitelist,
    /// Reversed or de-registered.
    Removed,
}

impl LedgerStatus {
    /// Stable storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Whitelist => "whitelist",
            Self::Removed => "removed",
        }
    }

    /// Parse a storage label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "whitelist" => Some(Self::Whitelist),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

/// Change reported to downstream systems on the next delta export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaStatus {
    /// Not yet seen downstream.
    Add,
    /// Seen downstream with a different status.
    Update,
    /// To be dropped downstream.
    Remove,
}

impl DeltaStatus {
    /// Label written to the `change_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }

    /// Parse a storage label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "add" => Some(Self::Add),
            "update" => Some(Self::Update),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

/// One row of the approved-IMEI ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Row identity.
    pub id: Uuid,
    /// Normalised IMEI the entry covers.
    pub imei: NormalizedImei,
    /// Request that staged the entry.
    pub request_id: Uuid,
    /// Registration state.
    pub status: LedgerStatus,
    /// Change reported on the next delta list.
    pub delta: DeltaStatus,
    /// Whether any delta list carried the entry.
    pub exported: bool,
    /// Snapshot time of the last delta list that carried the entry.
    pub exported_at: Option<DateTime<Utc>>,
    /// Set once the entry leaves the approved set.
    pub removed: bool,
    /// Staging time.
    pub created_at: DateTime<Utc>,
    /// Time of the last status change.
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// A freshly staged entry awaiting the review outcome.
    pub fn staged(imei: NormalizedImei, request_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            imei,
            request_id,
            status: LedgerStatus::Pending,
            delta: DeltaStatus::Add,
            exported: false,
            exported_at: None,
            removed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the entry belongs on a delta list.
    pub fn is_delta_eligible(&self) -> bool {
        if !self.exported {
            return true;
        }
        self.exported_at
            .is_none_or(|exported_at| self.updated_at > exported_at)
    }

    /// Whether the entry belongs on a full list.
    pub fn is_full_eligible(&self) -> bool {
        !self.removed
    }

    /// Record a successful export.
    pub fn mark_exported(&mut self, now: DateTime<Utc>) {
        self.exported = true;
        self.exported_at = Some(now);
    }

    fn whitelist(&mut self, now: DateTime<Utc>) {
        self.status = LedgerStatus::Whitelist;
        if self.exported {
            self.delta = DeltaStatus::Update;
        }
        self.updated_at = now;
    }

    fn remove(&mut self, now: DateTime<Utc>) {
        self.status = LedgerStatus::Removed;
        self.delta = DeltaStatus::Remove;
        self.removed = true;
        self.updated_at = now;
    }
}

/// A ledger change requested by a disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerIntent {
    /// Promote a registration's pending entries to `whitelist`.
    Whitelist {
        /// Approved registration.
        request_id: Uuid,
        /// Distinct IMEIs of the request.
        imeis: Vec<NormalizedImei>,
    },
    /// Undo a rejected or closed registration's entries.
    ReverseRegistration {
        /// Registration being reversed.
        request_id: Uuid,
    },
    /// Remove approved IMEIs for a de-registration.
    Deregister {
        /// Distinct IMEIs to remove.
        imeis: Vec<NormalizedImei>,
    },
}

impl LedgerIntent {
    /// Request whose own entries the intent touches.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::Whitelist { request_id, .. } | Self::ReverseRegistration { request_id } => {
                Some(*request_id)
            }
            Self::Deregister { .. } => None,
        }
    }

    /// IMEIs whose non-removed entries the intent must see.
    pub fn imeis(&self) -> &[NormalizedImei] {
        match self {
            Self::Whitelist { imeis, .. } | Self::Deregister { imeis } => imeis,
            Self::ReverseRegistration { .. } => &[],
        }
    }
}

/// Failures that block a disposition to protect ledger integrity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerIntegrityError {
    /// IMEIs are already approved under another request.
    #[error("{} IMEI(s) are already registered by another request", imeis.len())]
    DuplicatesPresent {
        /// Conflicting IMEIs in ascending order.
        imeis: Vec<String>,
    },
    /// IMEIs named for de-registration have no approved entry.
    #[error("{} IMEI(s) are not registered", imeis.len())]
    NotRegistered {
        /// Unregistered IMEIs in ascending order.
        imeis: Vec<String>,
    },
}

/// Row changes produced by planning an intent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerPlan {
    /// Entries to insert or overwrite by id.
    pub upserts: Vec<LedgerEntry>,
    /// Entry ids to hard-delete.
    pub deletes: Vec<Uuid>,
}

/// Plan an intent against the rows it may touch.
///
/// `candidates` holds every entry owned by the intent's request plus every
/// non-removed entry for the intent's IMEIs. Either the whole plan applies or
/// an integrity error leaves the ledger untouched.
pub fn plan(
    intent: &LedgerIntent,
    candidates: Vec<LedgerEntry>,
    now: DateTime<Utc>,
) -> Result<LedgerPlan, LedgerIntegrityError> {
    match intent {
        LedgerIntent::Whitelist { request_id, imeis } => {
            plan_whitelist(*request_id, imeis, candidates, now)
        }
        LedgerIntent::ReverseRegistration { request_id } => {
            Ok(plan_reversal(*request_id, candidates, now))
        }
        LedgerIntent::Deregister { imeis } => plan_deregistration(imeis, candidates, now),
    }
}

fn plan_whitelist(
    request_id: Uuid,
    imeis: &[NormalizedImei],
    candidates: Vec<LedgerEntry>,
    now: DateTime<Utc>,
) -> Result<LedgerPlan, LedgerIntegrityError> {
    let wanted: HashSet<&NormalizedImei> = imeis.iter().collect();
    let conflicts: BTreeSet<String> = candidates
        .iter()
        .filter(|entry| entry.request_id != request_id && !entry.removed)
        .filter(|entry| wanted.contains(&entry.imei))
        .map(|entry| entry.imei.to_string())
        .collect();
    if !conflicts.is_empty() {
        return Err(LedgerIntegrityError::DuplicatesPresent {
            imeis: conflicts.into_iter().collect(),
        });
    }

    let upserts = candidates
        .into_iter()
        .filter(|entry| entry.request_id == request_id && entry.status == LedgerStatus::Pending)
        .map(|mut entry| {
            entry.whitelist(now);
            entry
        })
        .collect();
    Ok(LedgerPlan {
        upserts,
        deletes: Vec::new(),
    })
}

fn plan_reversal(request_id: Uuid, candidates: Vec<LedgerEntry>, now: DateTime<Utc>) -> LedgerPlan {
    let mut plan = LedgerPlan::default();
    for mut entry in candidates
        .into_iter()
        .filter(|entry| entry.request_id == request_id && !entry.removed)
    {
        if entry.exported {
            entry.remove(now);
            plan.upserts.push(entry);
        } else {
            plan.deletes.push(entry.id);
        }
    }
    plan
}

fn plan_deregistration(
    imeis: &[NormalizedImei],
    candidates: Vec<LedgerEntry>,
    now: DateTime<Utc>,
) -> Result<LedgerPlan, LedgerIntegrityError> {
    let mut approved: Vec<LedgerEntry> = candidates
        .into_iter()
        .filter(|entry| entry.status == LedgerStatus::Whitelist && !entry.removed)
        .collect();
    let held: HashSet<&NormalizedImei> = approved.iter().map(|entry| &entry.imei).collect();
    let missing: BTreeSet<String> = imeis
        .iter()
        .filter(|imei| !held.contains(imei))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(LedgerIntegrityError::NotRegistered {
            imeis: missing.into_iter().collect(),
        });
    }

    let wanted: HashSet<&NormalizedImei> = imeis.iter().collect();
    approved.retain(|entry| wanted.contains(&entry.imei));
    for entry in &mut approved {
        entry.remove(now);
    }
    Ok(LedgerPlan {
        upserts: approved,
        deletes: Vec::new(),
    })
}

/// Outcome of staging a processed registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingPlan {
    /// The request's unexported entries for IMEIs no longer in its file.
    pub deletes: Vec<Uuid>,
    /// The request's exported entries for IMEIs no longer in its file, now
    /// removed so the next delta list reports them.
    pub upserts: Vec<LedgerEntry>,
    /// New pending entries.
    pub inserts: Vec<LedgerEntry>,
    /// IMEIs already held by another request's non-removed entry.
    pub held_elsewhere: BTreeSet<NormalizedImei>,
}

/// Plan the pending entries for a processed registration.
///
/// `existing` holds the request's own entries plus every non-removed entry
/// for `imeis`. A live entry the request already owns for a wanted IMEI is
/// kept as is, so a resubmitted file never leaves two live entries for one
/// IMEI. Own entries for IMEIs dropped from the file are deleted when never
/// exported and removed otherwise.
pub fn plan_staging(
    request_id: Uuid,
    imeis: &[NormalizedImei],
    existing: &[LedgerEntry],
    now: DateTime<Utc>,
) -> StagingPlan {
    let held_elsewhere: BTreeSet<NormalizedImei> = existing
        .iter()
        .filter(|entry| entry.request_id != request_id && !entry.removed)
        .map(|entry| entry.imei.clone())
        .collect();
    let wanted: HashSet<&NormalizedImei> = imeis
        .iter()
        .filter(|imei| !held_elsewhere.contains(*imei))
        .collect();

    let mut plan = StagingPlan::default();
    let mut kept = HashSet::new();
    for entry in existing
        .iter()
        .filter(|entry| entry.request_id == request_id && !entry.removed)
    {
        if wanted.contains(&entry.imei) && kept.insert(&entry.imei) {
            continue;
        }
        if entry.exported {
            let mut stale = entry.clone();
            stale.remove(now);
            plan.upserts.push(stale);
        } else {
            plan.deletes.push(entry.id);
        }
    }

    let mut seen = HashSet::new();
    plan.inserts = imeis
        .iter()
        .filter(|imei| wanted.contains(*imei) && !kept.contains(*imei) && seen.insert(*imei))
        .map(|imei| LedgerEntry::staged(imei.clone(), request_id, now))
        .collect();
    plan.held_elsewhere = held_elsewhere;
    plan
}

/// Kind of export list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    /// Every non-removed entry.
    Full,
    /// Entries changed since their last export.
    Delta,
}

impl ListKind {
    /// Label used in file names and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Delta => "delta",
        }
    }

    /// Whether `entry` belongs on a list of this kind.
    pub fn selects(self, entry: &LedgerEntry) -> bool {
        match self {
            Self::Full => entry.is_full_eligible(),
            Self::Delta => entry.is_delta_eligible(),
        }
    }
}
