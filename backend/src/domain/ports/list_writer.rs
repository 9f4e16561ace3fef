//! Driven port for writing export lists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ExportRow, ListKind};

use super::define_port_error;

define_port_error! {
    /// Errors raised while writing a list.
    pub enum ListWriterError {
        /// Underlying storage failed.
        Io { message: String } => "list could not be written: {message}",
        /// A row could not be encoded.
        Encode { message: String } => "list row could not be encoded: {message}",
    }
}

/// Port for persisting a generated list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListWriter: Send + Sync {
    /// Write every row to one file and return its name.
    async fn write(
        &self,
        kind: ListKind,
        generated_at: DateTime<Utc>,
        rows: &[ExportRow],
    ) -> Result<String, ListWriterError>;
}

/// File name of a list generated at `generated_at`.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use imei_registry::domain::ListKind;
/// use imei_registry::domain::ports::list_file_name;
///
/// let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 30, 0).single().expect("valid time");
/// assert_eq!(list_file_name(ListKind::Delta, at), "delta_registration_list_20260501123000.csv");
/// ```
pub fn list_file_name(kind: ListKind, generated_at: DateTime<Utc>) -> String {
    format!(
        "{}_registration_list_{}.csv",
        kind.as_str(),
        generated_at.format("%Y%m%d%H%M%S")
    )
}
