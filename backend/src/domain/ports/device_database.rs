//! Driven port for the external device (TAC) database.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{Tac, TacMetadata};

use super::define_port_error;

define_port_error! {
    /// Errors surfaced while calling the device database.
    pub enum DeviceDatabaseError {
        /// Network transport failed before receiving a response.
        Transport { message: String } =>
            "device database transport failed: {message}",
        /// The call exceeded its timeout.
        Timeout { message: String } =>
            "device database timeout: {message}",
        /// The service answered with an error status.
        Status { status: u16, message: String } =>
            "device database returned status {status}: {message}",
        /// The response body could not be decoded.
        Decode { message: String } =>
            "device database response decode failed: {message}",
    }
}

/// Port for TAC metadata lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceDatabase: Send + Sync {
    /// Look up several TACs in one call. Unknown TACs are absent from the map.
    async fn lookup_batch(
        &self,
        tacs: &[Tac],
    ) -> Result<BTreeMap<Tac, TacMetadata>, DeviceDatabaseError>;

    /// Look up one TAC.
    async fn lookup_one(&self, tac: &Tac) -> Result<Option<TacMetadata>, DeviceDatabaseError>;
}

/// Fixture implementation that knows no TACs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureDeviceDatabase;

#[async_trait]
impl DeviceDatabase for FixtureDeviceDatabase {
    async fn lookup_batch(
        &self,
        _tacs: &[Tac],
    ) -> Result<BTreeMap<Tac, TacMetadata>, DeviceDatabaseError> {
        Ok(BTreeMap::new())
    }

    async fn lookup_one(&self, _tac: &Tac) -> Result<Option<TacMetadata>, DeviceDatabaseError> {
        Ok(None)
    }
}
