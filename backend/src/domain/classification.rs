//! Device classification by type allocation code.
//!
//! IMEIs are grouped by TAC, each distinct TAC is looked up once in the
//! external device database, and the metadata is mapped back onto one
//! [`Device`] per TAC. Remote failures degrade to `N/A` metadata rather than
//! failing the request.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::imei::{ImeiRecord, Tac};
use super::ingestion::IngestedBatch;
use super::ports::DeviceDatabase;

/// Placeholder rendered for metadata the device database did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// Largest TAC set sent in one batched lookup.
pub const MAX_TAC_BATCH: usize = 1_000;

const FOURTH_GENERATION: [&str; 5] = ["LTE", "CA_", "DC_", "WIMAX", "UMB"];
const THIRD_GENERATION: [&str; 9] = [
    "HSPA", "HSUPA", "HSDPA", "EVDO", "WCDMA", "UMTS", "TDS-CDMA", "TD-SCDMA", "CDMA2000",
];
const SECOND_GENERATION: [&str; 4] = ["GSM", "GPRS", "EDGE", "CDMA"];

/// Raw metadata returned by the device database for one TAC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TacMetadata {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub model_number: Option<String>,
    pub manufacturer: Option<String>,
    pub operating_system: Option<String>,
    pub device_type: Option<String>,
    /// Radio technologies as listed by the device database.
    pub radio_interfaces: Vec<String>,
}

/// Rendered device description with `N/A` for missing fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub brand: String,
    pub model: String,
    pub model_number: String,
    pub manufacturer: String,
    pub operating_system: String,
    pub device_type: String,
    /// Network generation label (`2G`..`5G`).
    pub radio_interface: String,
}

impl DeviceDescription {
    /// Description used when no metadata is available.
    pub fn unavailable() -> Self {
        Self::from_metadata(&TacMetadata::default())
    }

    /// Render metadata, filling gaps with [`NOT_AVAILABLE`].
    pub fn from_metadata(metadata: &TacMetadata) -> Self {
        let field = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(NOT_AVAILABLE)
                .to_owned()
        };
        Self {
            brand: field(&metadata.brand),
            model: field(&metadata.model),
            model_number: field(&metadata.model_number),
            manufacturer: field(&metadata.manufacturer),
            operating_system: field(&metadata.operating_system),
            device_type: field(&metadata.device_type),
            radio_interface: radio_generation(&metadata.radio_interfaces),
        }
    }
}

/// Map radio technologies onto a network generation label.
///
/// The highest matching generation wins. A device that lists technologies
/// matching none of the known 2G-4G markers is labelled `5G`; a device that
/// lists none at all is `N/A`.
///
/// # Examples
/// ```
/// use imei_registry::domain::radio_generation;
///
/// let technologies = vec!["GSM 1800".to_owned(), "WCDMA FDD Band I".to_owned()];
/// assert_eq!(radio_generation(&technologies), "3G");
/// ```
pub fn radio_generation(technologies: &[String]) -> String {
    let listed: Vec<String> = technologies
        .iter()
        .map(|tech| tech.trim().to_ascii_uppercase())
        .filter(|tech| !tech.is_empty())
        .collect();
    if listed.is_empty() {
        return NOT_AVAILABLE.to_owned();
    }
    let mentions = |markers: &[&str]| {
        listed
            .iter()
            .any(|tech| markers.iter().any(|marker| tech.contains(marker)))
    };
    let generation = if mentions(&FOURTH_GENERATION) {
        "4G"
    } else if mentions(&THIRD_GENERATION) {
        "3G"
    } else if mentions(&SECOND_GENERATION) {
        "2G"
    } else {
        "5G"
    };
    generation.to_owned()
}

/// One device model within a request, identified by TAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub request_id: Uuid,
    pub tac: Tac,
    pub description: DeviceDescription,
    /// Number of submitted rows containing this TAC.
    pub device_count: usize,
    pub imeis: Vec<ImeiRecord>,
}

impl Device {
    /// Whether any IMEI of this device is held by another request.
    pub fn has_duplicates(&self) -> bool {
        self.imeis.iter().any(|imei| imei.duplicate)
    }
}

/// IMEIs sharing one TAC, before metadata is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TacGroup {
    pub device_count: usize,
    pub imeis: Vec<ImeiRecord>,
}

/// Group a batch by TAC.
///
/// Each row counts once towards every distinct TAC it contains.
pub fn group_by_tac(batch: &IngestedBatch) -> BTreeMap<Tac, TacGroup> {
    let mut groups: BTreeMap<Tac, TacGroup> = BTreeMap::new();
    for row in batch.rows() {
        let mut row_tacs = BTreeSet::new();
        for record in row {
            let tac = record.normalized.tac();
            row_tacs.insert(tac.clone());
            groups.entry(tac).or_default().imeis.push(record.clone());
        }
        for tac in row_tacs {
            groups.entry(tac).or_default().device_count += 1;
        }
    }
    groups
}

/// Classifies batches against the device database.
#[derive(Clone)]
pub struct ClassificationClient {
    database: Arc<dyn DeviceDatabase>,
}

impl ClassificationClient {
    /// Create a client over a device database adapter.
    pub fn new(database: Arc<dyn DeviceDatabase>) -> Self {
        Self { database }
    }

    /// Build the devices of `request_id` from a validated batch.
    pub async fn classify(&self, request_id: Uuid, batch: &IngestedBatch) -> Vec<Device> {
        let groups = group_by_tac(batch);
        let tacs: Vec<Tac> = groups.keys().cloned().collect();
        let metadata = self.lookup(&tacs).await;

        groups
            .into_iter()
            .map(|(tac, group)| {
                let description = metadata
                    .get(&tac)
                    .map(DeviceDescription::from_metadata)
                    .unwrap_or_else(DeviceDescription::unavailable);
                Device {
                    id: Uuid::new_v4(),
                    request_id,
                    tac,
                    description,
                    device_count: group.device_count,
                    imeis: group.imeis,
                }
            })
            .collect()
    }

    /// Fetch metadata for `tacs`, tolerating remote failures.
    ///
    /// A single TAC uses the point lookup; larger sets are chunked at
    /// [`MAX_TAC_BATCH`]. Failed chunks are logged and skipped.
    pub async fn lookup(&self, tacs: &[Tac]) -> BTreeMap<Tac, TacMetadata> {
        let mut found = BTreeMap::new();
        if let [tac] = tacs {
            match self.database.lookup_one(tac).await {
                Ok(Some(metadata)) => {
                    found.insert(tac.clone(), metadata);
                }
                Ok(None) => {}
                Err(error) => warn!(%error, tac = %tac, "device lookup failed"),
            }
            return found;
        }

        for chunk in tacs.chunks(MAX_TAC_BATCH) {
            match self.database.lookup_batch(chunk).await {
                Ok(batch) => found.extend(batch),
                Err(error) => warn!(%error, tacs = chunk.len(), "batched device lookup failed"),
            }
        }
        found
    }
}
