//! Batch file ingestion: parsing, normalisation, and validation of IMEIs.
//!
//! A batch file is a headerless comma-separated table with one row per device
//! and one IMEI per column. Every check runs independently and all failures
//! are reported together as one [`FieldErrors`] map, so a caller fixes the
//! whole file in one round trip.

use std::collections::{BTreeSet, HashSet};

use csv::ReaderBuilder;

use super::error::FieldErrors;
use super::imei::{ImeiRecord, MAX_IMEI_LEN, MIN_IMEI_LEN, NormalizedImei, normalize};
use super::request::RequestKind;

/// Upper bound on the total number of IMEIs in one batch.
pub const MAX_BATCH_IMEIS: usize = 10_000_000;

/// Maximum number of offending IMEIs quoted in one message.
const SAMPLE_LIMIT: usize = 10;

/// Error map key: column count differs from the declared IMEIs per device.
pub const KEY_IMEI_PER_DEVICE: &str = "imei_per_device";
/// Error map key: row count differs from the declared device count.
pub const KEY_DEVICE_COUNT: &str = "device_count";
/// Error map key: IMEIs with invalid length or characters.
pub const KEY_INVALID_IMEIS: &str = "invalid_imeis";
/// Error map key: repeated IMEIs.
pub const KEY_DUPLICATE_IMEIS: &str = "duplicate_imeis";
/// Error map key: empty cells.
pub const KEY_MISSING_IMEIS: &str = "missing_imeis";
/// Error map key: batch above [`MAX_BATCH_IMEIS`].
pub const KEY_LIMIT: &str = "limit";
/// Error map key: the file is not a readable table.
pub const KEY_INVALID_FORMAT: &str = "invalid_format";

/// Counts declared by the submitter alongside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredCounts {
    /// Number of devices (rows) in the file.
    pub device_count: usize,
    /// Number of IMEIs (columns) per device.
    pub imeis_per_device: usize,
}

/// A validated batch ready for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedBatch {
    rows: Vec<Vec<ImeiRecord>>,
}

impl IngestedBatch {
    /// IMEI records grouped by device row, in file order.
    pub fn rows(&self) -> &[Vec<ImeiRecord>] {
        &self.rows
    }

    /// Flattened normalised IMEIs in file order.
    pub fn imeis(&self) -> Vec<NormalizedImei> {
        self.rows
            .iter()
            .flatten()
            .map(|record| record.normalized.clone())
            .collect()
    }

    /// Number of IMEIs in the batch.
    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Whether the batch holds no IMEIs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse and validate a batch file.
///
/// # Examples
/// ```
/// use imei_registry::domain::{DeclaredCounts, RequestKind, ingest};
///
/// let file = b"35678901234567,35678901234568\n35678901234569,35678901234570\n";
/// let batch = ingest(
///     RequestKind::Registration,
///     file,
///     DeclaredCounts { device_count: 2, imeis_per_device: 2 },
/// )
/// .expect("clean batch");
/// assert_eq!(batch.len(), 4);
/// ```
///
/// # Errors
///
/// Returns a map keyed by failure category when any check fails.
pub fn ingest(
    kind: RequestKind,
    file: &[u8],
    declared: DeclaredCounts,
) -> Result<IngestedBatch, FieldErrors> {
    let table = match read_table(file) {
        Ok(table) => table,
        Err(message) => {
            let mut errors = FieldErrors::new();
            errors.insert(KEY_INVALID_FORMAT.to_owned(), message);
            return Err(errors);
        }
    };

    let mut errors = FieldErrors::new();
    check_shape(&table, declared, &mut errors);
    check_limit(&table, &mut errors);
    check_missing(&table, &mut errors);
    check_imeis(&table, &mut errors);
    check_duplicates(kind, &table, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    let rows = table
        .into_iter()
        .map(|row| {
            row.into_iter()
                .filter_map(|cell| {
                    NormalizedImei::parse(&cell)
                        .ok()
                        .map(|normalized| ImeiRecord::new(cell, normalized))
                })
                .collect()
        })
        .collect();
    Ok(IngestedBatch { rows })
}

fn read_table(file: &[u8]) -> Result<Vec<Vec<String>>, String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("file could not be read as a comma-separated table: {err}"))?;

    if records.is_empty() {
        return Err("file contains no rows".to_owned());
    }

    Ok(records
        .into_iter()
        .map(|record| record.iter().map(|cell| cell.trim().to_owned()).collect())
        .collect())
}

fn column_count(table: &[Vec<String>]) -> usize {
    table.iter().map(Vec::len).max().unwrap_or(0)
}

fn check_shape(table: &[Vec<String>], declared: DeclaredCounts, errors: &mut FieldErrors) {
    let columns = column_count(table);
    if columns != declared.imeis_per_device {
        errors.insert(
            KEY_IMEI_PER_DEVICE.to_owned(),
            format!(
                "file has {columns} IMEIs per device, {} declared",
                declared.imeis_per_device
            ),
        );
    }
    if table.len() != declared.device_count {
        errors.insert(
            KEY_DEVICE_COUNT.to_owned(),
            format!(
                "file has {} devices, {} declared",
                table.len(),
                declared.device_count
            ),
        );
    }
}

fn check_limit(table: &[Vec<String>], errors: &mut FieldErrors) {
    let total = table.len().saturating_mul(column_count(table));
    if total > MAX_BATCH_IMEIS {
        errors.insert(
            KEY_LIMIT.to_owned(),
            format!("batch holds {total} IMEIs, the limit is {MAX_BATCH_IMEIS}"),
        );
    }
}

fn check_missing(table: &[Vec<String>], errors: &mut FieldErrors) {
    let columns = column_count(table);
    let missing: usize = table
        .iter()
        .map(|row| {
            let blanks = row.iter().filter(|cell| cell.is_empty()).count();
            blanks + columns.saturating_sub(row.len())
        })
        .sum();
    if missing > 0 {
        errors.insert(
            KEY_MISSING_IMEIS.to_owned(),
            format!("{missing} IMEI value(s) are missing"),
        );
    }
}

fn check_imeis(table: &[Vec<String>], errors: &mut FieldErrors) {
    let present = || table.iter().flatten().filter(|cell| !cell.is_empty());

    let bad_length: Vec<&str> = present()
        .filter(|cell| !(MIN_IMEI_LEN..=MAX_IMEI_LEN).contains(&cell.chars().count()))
        .map(String::as_str)
        .collect();
    let non_digit: Vec<&str> = present()
        .filter(|cell| (MIN_IMEI_LEN..=MAX_IMEI_LEN).contains(&cell.chars().count()))
        .filter(|cell| !cell.chars().all(|c| c.is_ascii_digit()))
        .map(String::as_str)
        .collect();

    let mut parts = Vec::new();
    if !bad_length.is_empty() {
        parts.push(format!(
            "{} IMEI(s) must be {MIN_IMEI_LEN}-{MAX_IMEI_LEN} characters long: {}",
            bad_length.len(),
            sample(&bad_length)
        ));
    }
    if !non_digit.is_empty() {
        parts.push(format!(
            "{} IMEI(s) must contain digits only: {}",
            non_digit.len(),
            sample(&non_digit)
        ));
    }
    if !parts.is_empty() {
        errors.insert(KEY_INVALID_IMEIS.to_owned(), parts.join("; "));
    }
}

fn check_duplicates(kind: RequestKind, table: &[Vec<String>], errors: &mut FieldErrors) {
    let mut seen = HashSet::new();
    let mut duplicates = BTreeSet::new();
    for cell in table.iter().flatten().filter(|cell| !cell.is_empty()) {
        let key = match kind {
            RequestKind::Registration => cell.clone(),
            RequestKind::DeRegistration => normalize(cell),
        };
        if !seen.insert(key.clone()) {
            duplicates.insert(key);
        }
    }
    if !duplicates.is_empty() {
        let listed: Vec<&str> = duplicates.iter().map(String::as_str).collect();
        errors.insert(
            KEY_DUPLICATE_IMEIS.to_owned(),
            format!(
                "{} IMEI(s) are duplicated: {}",
                listed.len(),
                sample(&listed)
            ),
        );
    }
}

fn sample(values: &[&str]) -> String {
    let mut quoted = values
        .iter()
        .take(SAMPLE_LIMIT)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if values.len() > SAMPLE_LIMIT {
        quoted.push_str(", ...");
    }
    quoted
}
