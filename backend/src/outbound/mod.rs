//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL repositories using Diesel
//! - **queue**: in-process keyed task queue on Tokio
//! - **device_database**, **compliance**, **notifications**: reqwest clients
//! - **files**: capability-scoped document store and CSV list writer
//! - **audit**: `tracing`-backed audit sink
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no business rules.

pub mod audit;
pub mod compliance;
pub mod device_database;
pub mod files;
mod http_body;
pub mod notifications;
pub mod persistence;
pub mod queue;
