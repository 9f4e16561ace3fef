//! Wire shapes of the device database API.

use serde::{Deserialize, Serialize};

use crate::domain::{Tac, TacMetadata};

#[derive(Debug, Serialize)]
pub(super) struct BatchLookupRequestDto<'a> {
    pub(super) tacs: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BatchLookupResponseDto {
    #[serde(default)]
    pub(super) results: Vec<DeviceRecordDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeviceRecordDto {
    pub(super) tac: String,
    pub(super) brand_name: Option<String>,
    pub(super) model_name: Option<String>,
    pub(super) marketing_name: Option<String>,
    pub(super) manufacturer: Option<String>,
    pub(super) operating_system: Option<String>,
    pub(super) device_type: Option<String>,
    #[serde(default)]
    pub(super) radio_interface: Vec<String>,
}

impl DeviceRecordDto {
    /// Split into the TAC and its metadata, rejecting malformed TACs.
    pub(super) fn into_domain(self) -> Result<(Tac, TacMetadata), String> {
        let tac = Tac::new(self.tac.trim())
            .map_err(|err| format!("record carries invalid TAC {:?}: {err}", self.tac))?;
        let metadata = TacMetadata {
            brand: non_blank(self.brand_name),
            model: non_blank(self.marketing_name),
            model_number: non_blank(self.model_name),
            manufacturer: non_blank(self.manufacturer),
            operating_system: non_blank(self.operating_system),
            device_type: non_blank(self.device_type),
            radio_interfaces: self
                .radio_interface
                .into_iter()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .collect(),
        };
        Ok((tac, metadata))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}
