//! Reqwest-backed `ComplianceChecker`.
//!
//! Posts one request's IMEIs and decodes the counters the service reports.
//! The tracking id travels both in the body and in a correlation header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ports::{ComplianceChecker, ComplianceCheckerError, ComplianceQuery, ComplianceVerdict};
use crate::outbound::http_body::body_preview;

const CORRELATION_HEADER: &str = "X-Correlation-Id";

#[derive(Debug, Serialize)]
struct CheckRequestDto<'a> {
    correlation_id: Uuid,
    imeis: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CheckResponseDto {
    #[serde(default)]
    non_compliant: usize,
    #[serde(default)]
    stolen: usize,
    report: Option<String>,
}

/// Compliance checker calling a single HTTP endpoint.
pub struct ComplianceHttpChecker {
    client: Client,
    endpoint: Url,
}

impl ComplianceHttpChecker {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ComplianceChecker for ComplianceHttpChecker {
    async fn check(
        &self,
        query: &ComplianceQuery,
    ) -> Result<ComplianceVerdict, ComplianceCheckerError> {
        let payload = CheckRequestDto {
            correlation_id: query.correlation_id,
            imeis: query.imeis.iter().map(|imei| imei.as_str()).collect(),
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CORRELATION_HEADER, query.correlation_id.to_string())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| ComplianceCheckerError::transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ComplianceCheckerError::transport(err.to_string()))?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        parse_verdict(body.as_ref())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> ComplianceCheckerError {
    ComplianceCheckerError::status(status.as_u16(), body_preview(body))
}

fn parse_verdict(body: &[u8]) -> Result<ComplianceVerdict, ComplianceCheckerError> {
    let decoded: CheckResponseDto = serde_json::from_slice(body).map_err(|error| {
        ComplianceCheckerError::decode(format!("invalid compliance payload: {error}"))
    })?;
    Ok(ComplianceVerdict {
        non_compliant: decoded.non_compliant,
        stolen: decoded.stolen,
        report: decoded.report.filter(|report| !report.trim().is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn verdicts_decode_with_defaults() {
        let verdict = parse_verdict(br#"{ "stolen": 2, "report": "" }"#).expect("decodes");
        assert_eq!(
            verdict,
            ComplianceVerdict {
                non_compliant: 0,
                stolen: 2,
                report: None,
            }
        );
    }

    #[rstest]
    fn negative_counters_are_decode_errors() {
        let error = parse_verdict(br#"{ "non_compliant": -1 }"#).expect_err("invalid");
        assert!(matches!(error, ComplianceCheckerError::Decode { .. }));
    }

    #[rstest]
    #[case(StatusCode::BAD_REQUEST)]
    #[case(StatusCode::SERVICE_UNAVAILABLE)]
    fn error_statuses_keep_their_code(#[case] status: StatusCode) {
        let error = map_status_error(status, b"  try   later ");
        assert_eq!(
            error,
            ComplianceCheckerError::status(status.as_u16(), "try later")
        );
    }
}
