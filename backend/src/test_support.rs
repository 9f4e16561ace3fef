//! Test utilities for the registry crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`).
//! Compiled for tests and when the `test-support` feature is enabled.

mod clock;
mod doubles;
mod harness;
mod registry;

pub use clock::MutableClock;
pub use doubles::{
    InMemoryDocumentStore, InMemoryListWriter, RecordingAuditSink, RecordingNotificationSink,
    ScriptedComplianceChecker, StaticDeviceDatabase,
};
pub use harness::{RegistryHarness, csv_upload, imei, sequential_imeis};
pub use registry::InMemoryRegistry;
