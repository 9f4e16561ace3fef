//! In-memory implementation of every repository port.
//!
//! One mutex guards the whole state, so each call behaves like a single
//! transaction. `set_unavailable` makes every call fail with a connection
//! error.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::ports::{
    AssociationRepository, AssociationRepositoryError, DeviceKey, DispositionCommit, ExportMark,
    LedgerRepository, LedgerRepositoryError, QuotaRepository, QuotaRepositoryError,
    RequestRepository, RequestRepositoryError, SectionRepository, SectionRepositoryError,
};
use crate::domain::{
    AssociationRecord, CaseStatus, Device, DeviceDescription, DeviceQuota, LedgerEntry,
    LedgerStatus, ListKind, NormalizedImei, QuotaDefaults, Request, RequestPage, RequestSearch,
    Section, SectionComment, SectionType, plan_ledger, plan_staging,
};

#[derive(Default)]
struct RegistryState {
    unavailable: bool,
    requests: HashMap<Uuid, Request>,
    devices: HashMap<Uuid, Vec<Device>>,
    sections: HashMap<Uuid, Vec<Section>>,
    ledger: BTreeMap<Uuid, LedgerEntry>,
    quotas: HashMap<String, DeviceQuota>,
    associations: Vec<AssociationRecord>,
}

/// Shared in-memory registry store.
#[derive(Clone, Default)]
pub struct InMemoryRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Snapshot of every ledger entry, ordered by IMEI.
    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self.lock().ledger.values().cloned().collect();
        entries.sort_by(|a, b| a.imei.cmp(&b.imei).then(a.created_at.cmp(&b.created_at)));
        entries
    }

    /// Seed a ledger entry directly.
    pub fn insert_ledger_entry(&self, entry: LedgerEntry) {
        self.lock().ledger.insert(entry.id, entry);
    }

    /// Seed a quota directly.
    pub fn insert_quota(&self, quota: DeviceQuota) {
        self.lock().quotas.insert(quota.user_id.clone(), quota);
    }

    /// Current quota of a user, if one was created.
    pub fn quota(&self, user_id: &str) -> Option<DeviceQuota> {
        self.lock().quotas.get(user_id).cloned()
    }

    /// Snapshot of every association window.
    pub fn associations(&self) -> Vec<AssociationRecord> {
        self.lock().associations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("registry mutex poisoned"),
        }
    }

    fn open<E>(&self, connection: impl FnOnce(String) -> E) -> Result<MutexGuard<'_, RegistryState>, E> {
        let state = self.lock();
        if state.unavailable {
            return Err(connection("registry store is unavailable".to_owned()));
        }
        Ok(state)
    }
}

impl RegistryState {
    /// Entries owned by `request_id` plus non-removed entries for `imeis`.
    fn ledger_candidates(&self, request_id: Option<Uuid>, imeis: &[NormalizedImei]) -> Vec<LedgerEntry> {
        let wanted: HashSet<&NormalizedImei> = imeis.iter().collect();
        self.ledger
            .values()
            .filter(|entry| {
                Some(entry.request_id) == request_id
                    || (!entry.removed && wanted.contains(&entry.imei))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RequestRepository for InMemoryRegistry {
    async fn save(&self, request: &Request) -> Result<(), RequestRepositoryError> {
        let mut state = self.open(RequestRepositoryError::connection)?;
        state.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Request>, RequestRepositoryError> {
        let state = self.open(RequestRepositoryError::connection)?;
        Ok(state.requests.get(id).cloned())
    }

    async fn replace_devices(
        &self,
        request_id: &Uuid,
        devices: &[Device],
    ) -> Result<(), RequestRepositoryError> {
        let mut state = self.open(RequestRepositoryError::connection)?;
        state.devices.insert(*request_id, devices.to_vec());
        Ok(())
    }

    async fn devices(&self, request_id: &Uuid) -> Result<Vec<Device>, RequestRepositoryError> {
        let state = self.open(RequestRepositoryError::connection)?;
        Ok(state.devices.get(request_id).cloned().unwrap_or_default())
    }

    async fn device_descriptions(
        &self,
        keys: &[DeviceKey],
    ) -> Result<BTreeMap<DeviceKey, DeviceDescription>, RequestRepositoryError> {
        let state = self.open(RequestRepositoryError::connection)?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                state
                    .devices
                    .get(&key.request_id)?
                    .iter()
                    .find(|device| device.tac == key.tac)
                    .map(|device| (key.clone(), device.description.clone()))
            })
            .collect())
    }

    async fn search(&self, search: &RequestSearch) -> Result<RequestPage, RequestRepositoryError> {
        let state = self.open(RequestRepositoryError::connection)?;
        let mut matches: Vec<&Request> = state
            .requests
            .values()
            .filter(|request| {
                let devices = state.devices.get(&request.id).map_or(&[][..], Vec::as_slice);
                search.matches(request, devices)
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = i64::try_from(matches.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from(search.offset).unwrap_or(0);
        let limit = usize::try_from(search.limit).unwrap_or(0);
        Ok(RequestPage {
            items: matches.into_iter().skip(offset).take(limit).cloned().collect(),
            total,
            limit: search.limit,
            offset: search.offset,
        })
    }

    async fn count_by_status(
        &self,
        submitter_id: &str,
    ) -> Result<BTreeMap<CaseStatus, i64>, RequestRepositoryError> {
        let state = self.open(RequestRepositoryError::connection)?;
        let mut counts = BTreeMap::new();
        for request in state
            .requests
            .values()
            .filter(|request| request.submitter.id == submitter_id)
        {
            *counts.entry(request.case_status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn commit_disposition(
        &self,
        commit: &DispositionCommit,
    ) -> Result<(), RequestRepositoryError> {
        let mut state = self.open(RequestRepositoryError::connection)?;
        let now = commit.request.updated_at;
        let found = state
            .requests
            .get(&commit.request.id)
            .map(|stored| stored.case_status)
            .ok_or_else(|| {
                RequestRepositoryError::query(format!("request {} not found", commit.request.id))
            })?;
        if found != commit.expected_status {
            return Err(RequestRepositoryError::stale(commit.expected_status, found));
        }

        let plan = commit
            .ledger
            .as_ref()
            .map(|intent| {
                let candidates = state.ledger_candidates(intent.request_id(), intent.imeis());
                plan_ledger(intent, candidates, now)
            })
            .transpose()
            .map_err(RequestRepositoryError::integrity)?;

        let quota = match &commit.quota {
            Some(debit) => {
                let mut quota = state.quotas.get(&debit.user_id).cloned().ok_or_else(|| {
                    RequestRepositoryError::query(format!("no quota for {}", debit.user_id))
                })?;
                quota.decrement(debit.kind, debit.count);
                Some(quota)
            }
            None => None,
        };

        if let Some(plan) = plan {
            for id in &plan.deletes {
                state.ledger.remove(id);
            }
            for entry in plan.upserts {
                state.ledger.insert(entry.id, entry);
            }
        }
        if let Some(quota) = quota {
            state.quotas.insert(quota.user_id.clone(), quota);
        }
        state
            .requests
            .insert(commit.request.id, commit.request.clone());
        Ok(())
    }
}

#[async_trait]
impl SectionRepository for InMemoryRegistry {
    async fn record(
        &self,
        request_id: &Uuid,
        section_type: SectionType,
        comment: &SectionComment,
    ) -> Result<Section, SectionRepositoryError> {
        let mut state = self.open(SectionRepositoryError::connection)?;
        let sections = state.sections.entry(*request_id).or_default();
        let index = match sections
            .iter()
            .position(|section| section.section_type == section_type)
        {
            Some(index) => index,
            None => {
                sections.push(Section::empty(section_type));
                sections.len() - 1
            }
        };
        let section = &mut sections[index];
        section.record(comment.clone());
        Ok(section.clone())
    }

    async fn list(&self, request_id: &Uuid) -> Result<Vec<Section>, SectionRepositoryError> {
        let state = self.open(SectionRepositoryError::connection)?;
        Ok(state.sections.get(request_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl LedgerRepository for InMemoryRegistry {
    async fn stage(
        &self,
        request_id: &Uuid,
        imeis: &[NormalizedImei],
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<NormalizedImei>, LedgerRepositoryError> {
        let mut state = self.open(LedgerRepositoryError::connection)?;
        let existing = state.ledger_candidates(Some(*request_id), imeis);
        let plan = plan_staging(*request_id, imeis, &existing, now);
        for id in &plan.deletes {
            state.ledger.remove(id);
        }
        for entry in plan.upserts.into_iter().chain(plan.inserts) {
            state.ledger.insert(entry.id, entry);
        }
        Ok(plan.held_elsewhere)
    }

    async fn held_elsewhere(
        &self,
        request_id: &Uuid,
        imeis: &[NormalizedImei],
    ) -> Result<BTreeSet<NormalizedImei>, LedgerRepositoryError> {
        let state = self.open(LedgerRepositoryError::connection)?;
        let wanted: HashSet<&NormalizedImei> = imeis.iter().collect();
        Ok(state
            .ledger
            .values()
            .filter(|entry| {
                entry.request_id != *request_id && !entry.removed && wanted.contains(&entry.imei)
            })
            .map(|entry| entry.imei.clone())
            .collect())
    }

    async fn is_whitelisted(&self, imei: &NormalizedImei) -> Result<bool, LedgerRepositoryError> {
        let state = self.open(LedgerRepositoryError::connection)?;
        Ok(state.ledger.values().any(|entry| {
            entry.imei == *imei && entry.status == LedgerStatus::Whitelist && !entry.removed
        }))
    }

    async fn export_candidates(
        &self,
        kind: ListKind,
    ) -> Result<Vec<LedgerEntry>, LedgerRepositoryError> {
        let state = self.open(LedgerRepositoryError::connection)?;
        let mut entries: Vec<LedgerEntry> = state
            .ledger
            .values()
            .filter(|entry| kind.selects(entry))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.imei.cmp(&b.imei));
        Ok(entries)
    }

    async fn mark_exported(
        &self,
        marks: &[ExportMark],
        snapshot: DateTime<Utc>,
    ) -> Result<usize, LedgerRepositoryError> {
        let mut state = self.open(LedgerRepositoryError::connection)?;
        let mut marked = 0;
        for mark in marks {
            let Some(entry) = state.ledger.get_mut(&mark.id) else {
                continue;
            };
            if entry.updated_at == mark.updated_at {
                entry.mark_exported(snapshot);
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[async_trait]
impl QuotaRepository for InMemoryRegistry {
    async fn find_or_create(
        &self,
        user_id: &str,
        defaults: QuotaDefaults,
    ) -> Result<DeviceQuota, QuotaRepositoryError> {
        let mut state = self.open(QuotaRepositoryError::connection)?;
        Ok(state
            .quotas
            .entry(user_id.to_owned())
            .or_insert_with(|| DeviceQuota::new(user_id, defaults))
            .clone())
    }
}

#[async_trait]
impl AssociationRepository for InMemoryRegistry {
    async fn active_for_imei(
        &self,
        imei: &NormalizedImei,
    ) -> Result<Vec<AssociationRecord>, AssociationRepositoryError> {
        let state = self.open(AssociationRepositoryError::connection)?;
        Ok(state
            .associations
            .iter()
            .filter(|record| record.imei == *imei && record.is_active())
            .cloned()
            .collect())
    }

    async fn active_count_for_uid(&self, uid: &str) -> Result<usize, AssociationRepositoryError> {
        let state = self.open(AssociationRepositoryError::connection)?;
        Ok(state
            .associations
            .iter()
            .filter(|record| record.uid == uid && record.is_active())
            .count())
    }

    async fn history(
        &self,
        imei: &NormalizedImei,
        uid: &str,
    ) -> Result<Vec<AssociationRecord>, AssociationRepositoryError> {
        let state = self.open(AssociationRepositoryError::connection)?;
        let mut history: Vec<AssociationRecord> = state
            .associations
            .iter()
            .filter(|record| record.imei == *imei && record.uid == uid)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(history)
    }

    async fn create(&self, record: &AssociationRecord) -> Result<(), AssociationRepositoryError> {
        let mut state = self.open(AssociationRepositoryError::connection)?;
        if record.duplicate {
            for other in state
                .associations
                .iter_mut()
                .filter(|other| other.imei == record.imei && other.is_active())
            {
                other.duplicate = true;
            }
        }
        state.associations.push(record.clone());
        Ok(())
    }

    async fn close(
        &self,
        id: &Uuid,
        end_date: DateTime<Utc>,
    ) -> Result<(), AssociationRepositoryError> {
        let mut state = self.open(AssociationRepositoryError::connection)?;
        let record = state
            .associations
            .iter_mut()
            .find(|record| record.id == *id)
            .ok_or_else(|| AssociationRepositoryError::query(format!("association {id} not found")))?;
        record.end_date = Some(end_date);
        Ok(())
    }
}
