//! CSV `ListWriter` over a capability-scoped lists directory.

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cap_std::fs::Dir;
use chrono::{DateTime, Utc};
use tracing::info;

use super::atomic::{open_root, write_replacing};
use crate::domain::ports::{ListWriter, ListWriterError, list_file_name};
use crate::domain::{ExportRow, ListKind};

const BASE_COLUMNS: [&str; 8] = [
    "APPROVED_IMEI",
    "make",
    "model",
    "status",
    "model_number",
    "brand_name",
    "device_type",
    "radio_interface",
];
const CHANGE_TYPE_COLUMN: &str = "change_type";

/// Writes lists as CSV files named by kind and generation time.
#[derive(Clone)]
pub struct CsvListWriter {
    root: Arc<Dir>,
}

impl CsvListWriter {
    /// Open (creating if needed) the lists directory.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the directory cannot be created or opened.
    pub fn open(root: &Path) -> io::Result<Self> {
        Ok(Self {
            root: Arc::new(open_root(root)?),
        })
    }
}

fn encode(kind: ListKind, rows: &[ExportRow]) -> Result<Vec<u8>, ListWriterError> {
    let encode_error = |err: csv::Error| ListWriterError::encode(err.to_string());
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = BASE_COLUMNS.to_vec();
    if kind == ListKind::Delta {
        header.push(CHANGE_TYPE_COLUMN);
    }
    writer.write_record(&header).map_err(encode_error)?;

    for row in rows {
        let mut record = vec![
            row.imei.as_str(),
            row.make.as_str(),
            row.model.as_str(),
            row.status.as_str(),
            row.model_number.as_str(),
            row.brand_name.as_str(),
            row.device_type.as_str(),
            row.radio_interface.as_str(),
        ];
        if kind == ListKind::Delta {
            record.push(row.change_type.as_deref().unwrap_or_default());
        }
        writer.write_record(&record).map_err(encode_error)?;
    }

    writer
        .into_inner()
        .map_err(|err| ListWriterError::encode(err.to_string()))
}

#[async_trait]
impl ListWriter for CsvListWriter {
    async fn write(
        &self,
        kind: ListKind,
        generated_at: DateTime<Utc>,
        rows: &[ExportRow],
    ) -> Result<String, ListWriterError> {
        let bytes = encode(kind, rows)?;
        let name = list_file_name(kind, generated_at);
        let root = Arc::clone(&self.root);
        let target = name.clone();

        tokio::task::spawn_blocking(move || write_replacing(&root, &target, &bytes))
            .await
            .map_err(|err| ListWriterError::io(format!("list task failed: {err}")))?
            .map_err(|err| ListWriterError::io(err.to_string()))?;

        info!(list = %name, rows = rows.len(), kind = kind.as_str(), "list written");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    fn row(imei: &str, change_type: Option<&str>) -> ExportRow {
        ExportRow {
            imei: imei.to_owned(),
            make: "Acme, Inc".to_owned(),
            model: "Rocket".to_owned(),
            status: "whitelist".to_owned(),
            model_number: "A-100".to_owned(),
            brand_name: "Acme".to_owned(),
            device_type: "Smartphone".to_owned(),
            radio_interface: "3G".to_owned(),
            change_type: change_type.map(str::to_owned),
        }
    }

    #[rstest]
    fn full_lists_have_no_change_type_column() {
        let bytes = encode(ListKind::Full, &[row("35678901000001", None)]).expect("encoded");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(
            text,
            "APPROVED_IMEI,make,model,status,model_number,brand_name,device_type,radio_interface\n\
             35678901000001,\"Acme, Inc\",Rocket,whitelist,A-100,Acme,Smartphone,3G\n"
        );
    }

    #[rstest]
    fn delta_lists_append_the_change_type() {
        let bytes = encode(ListKind::Delta, &[row("35678901000001", Some("add"))]).expect("encoded");
        let text = String::from_utf8(bytes).expect("utf8");
        let mut lines = text.lines();
        assert!(lines.next().expect("header").ends_with(",radio_interface,change_type"));
        assert!(lines.next().expect("row").ends_with(",3G,add"));
    }

    #[rstest]
    #[tokio::test]
    async fn lists_land_under_their_generated_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let writer = CsvListWriter::open(temp.path()).expect("writer");
        let at = Utc
            .with_ymd_and_hms(2026, 5, 1, 12, 30, 0)
            .single()
            .expect("valid time");

        let name = writer
            .write(ListKind::Full, at, &[row("35678901000001", None)])
            .await
            .expect("written");

        assert_eq!(name, "full_registration_list_20260501123000.csv");
        assert!(temp.path().join(&name).is_file());
    }
}
