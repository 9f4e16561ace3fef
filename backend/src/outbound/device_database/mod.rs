//! Device database outbound adapters.
//!
//! A thin reqwest implementation of the `DeviceDatabase` port: batched TAC
//! lookups by POST and single lookups by GET.

mod dto;
mod http_client;

pub use http_client::DeviceDatabaseHttpClient;
