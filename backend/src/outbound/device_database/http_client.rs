//! Reqwest-backed device database adapter.
//!
//! The adapter owns transport details only: URL construction, timeout and
//! status mapping, and JSON decoding into `TacMetadata`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use super::dto::{BatchLookupRequestDto, BatchLookupResponseDto, DeviceRecordDto};
use crate::outbound::http_body::body_preview;
use crate::domain::ports::{DeviceDatabase, DeviceDatabaseError};
use crate::domain::{MAX_TAC_BATCH, Tac, TacMetadata};

const BATCH_PATH: &str = "tacs";
const SINGLE_PATH: &str = "tac/";

/// Device database client speaking JSON over HTTP.
pub struct DeviceDatabaseHttpClient {
    client: Client,
    base: Url,
}

impl DeviceDatabaseHttpClient {
    /// Build a client rooted at `base` with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: with_trailing_slash(base),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, DeviceDatabaseError> {
        self.base
            .join(path)
            .map_err(|err| DeviceDatabaseError::transport(format!("invalid endpoint {path}: {err}")))
    }
}

#[async_trait]
impl DeviceDatabase for DeviceDatabaseHttpClient {
    async fn lookup_batch(
        &self,
        tacs: &[Tac],
    ) -> Result<BTreeMap<Tac, TacMetadata>, DeviceDatabaseError> {
        let mut found = BTreeMap::new();
        for chunk in tacs.chunks(MAX_TAC_BATCH) {
            let payload = BatchLookupRequestDto {
                tacs: chunk.iter().map(Tac::as_str).collect(),
            };
            let response = self
                .client
                .post(self.endpoint(BATCH_PATH)?)
                .header(reqwest::header::ACCEPT, "application/json")
                .json(&payload)
                .send()
                .await
                .map_err(map_transport_error)?;

            let status = response.status();
            let body = response.bytes().await.map_err(map_transport_error)?;
            if !status.is_success() {
                return Err(map_status_error(status, body.as_ref()));
            }
            found.extend(parse_batch(body.as_ref())?);
        }
        Ok(found)
    }

    async fn lookup_one(&self, tac: &Tac) -> Result<Option<TacMetadata>, DeviceDatabaseError> {
        let url = self.endpoint(&format!("{SINGLE_PATH}{}", tac.as_str()))?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        parse_single(body.as_ref()).map(Some)
    }
}

fn with_trailing_slash(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn parse_batch(body: &[u8]) -> Result<BTreeMap<Tac, TacMetadata>, DeviceDatabaseError> {
    let decoded: BatchLookupResponseDto = serde_json::from_slice(body).map_err(|error| {
        DeviceDatabaseError::decode(format!("invalid batch lookup payload: {error}"))
    })?;
    decoded
        .results
        .into_iter()
        .map(DeviceRecordDto::into_domain)
        .collect::<Result<_, _>>()
        .map_err(DeviceDatabaseError::decode)
}

fn parse_single(body: &[u8]) -> Result<TacMetadata, DeviceDatabaseError> {
    let decoded: DeviceRecordDto = serde_json::from_slice(body).map_err(|error| {
        DeviceDatabaseError::decode(format!("invalid lookup payload: {error}"))
    })?;
    decoded
        .into_domain()
        .map(|(_, metadata)| metadata)
        .map_err(DeviceDatabaseError::decode)
}

fn map_transport_error(error: reqwest::Error) -> DeviceDatabaseError {
    if error.is_timeout() {
        DeviceDatabaseError::timeout(error.to_string())
    } else {
        DeviceDatabaseError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> DeviceDatabaseError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            DeviceDatabaseError::timeout(format!("status {}", status.as_u16()))
        }
        _ => DeviceDatabaseError::status(status.as_u16(), body_preview(body)),
    }
}

#[cfg(test)]
mod tests {
    //! Coverage for the non-network mapping helpers.

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::request_timeout(StatusCode::REQUEST_TIMEOUT, true)]
    #[case::gateway_timeout(StatusCode::GATEWAY_TIMEOUT, true)]
    #[case::bad_request(StatusCode::BAD_REQUEST, false)]
    #[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, false)]
    fn statuses_map_to_timeouts_or_status_errors(#[case] status: StatusCode, #[case] timeout: bool) {
        let error = map_status_error(status, b"{\"error\":\"unavailable\"}");
        if timeout {
            assert!(matches!(error, DeviceDatabaseError::Timeout { .. }));
        } else {
            assert_eq!(
                error,
                DeviceDatabaseError::status(status.as_u16(), "{\"error\":\"unavailable\"}")
            );
        }
    }

    #[rstest]
    fn batch_payloads_decode_into_metadata() {
        let body = r#"{
            "results": [
                {
                    "tac": "35678901",
                    "brand_name": "Acme",
                    "model_name": "A-100",
                    "marketing_name": "Rocket",
                    "manufacturer": "Acme Devices",
                    "operating_system": " ",
                    "device_type": "Smartphone",
                    "radio_interface": ["GSM", "WCDMA", ""]
                },
                { "tac": "12345678" }
            ]
        }"#;

        let found = parse_batch(body.as_bytes()).expect("decodes");

        let acme = &found[&Tac::new("35678901").expect("tac")];
        assert_eq!(acme.brand.as_deref(), Some("Acme"));
        assert_eq!(acme.model.as_deref(), Some("Rocket"));
        assert_eq!(acme.model_number.as_deref(), Some("A-100"));
        assert_eq!(acme.operating_system, None);
        assert_eq!(acme.radio_interfaces, vec!["GSM", "WCDMA"]);
        assert_eq!(
            found[&Tac::new("12345678").expect("tac")],
            TacMetadata::default()
        );
    }

    #[rstest]
    fn malformed_tacs_are_decode_errors() {
        let error = parse_single(br#"{ "tac": "12ab" }"#).expect_err("invalid tac");
        assert!(matches!(error, DeviceDatabaseError::Decode { .. }));
    }

    #[rstest]
    fn base_urls_gain_a_trailing_slash() {
        let base = Url::parse("https://devices.example/api/v1").expect("url");
        let client = DeviceDatabaseHttpClient::new(base, Duration::from_secs(1)).expect("client");
        assert_eq!(
            client.endpoint("tac/35678901").expect("endpoint").as_str(),
            "https://devices.example/api/v1/tac/35678901"
        );
    }
}
