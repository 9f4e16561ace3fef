//! PostgreSQL persistence adapters using Diesel.
//!
//! Each repository implements one domain port over a shared [`DbPool`] of
//! `diesel-async` connections. Row structs (`models.rs`) and table
//! definitions (`schema.rs`) stay private to this module; repositories
//! translate them to domain values and map every failure onto the port's
//! error type.
//!
//! # Example
//!
//! ```ignore
//! use imei_registry::outbound::persistence::{DbPool, DieselRequestRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/registry")).await?;
//! let requests = DieselRequestRepository::new(pool.clone());
//! ```

mod diesel_association_repository;
mod diesel_basic_error_mapping;
mod diesel_ledger_repository;
mod diesel_quota_repository;
mod diesel_request_repository;
mod diesel_section_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_association_repository::DieselAssociationRepository;
pub use diesel_ledger_repository::DieselLedgerRepository;
pub use diesel_quota_repository::DieselQuotaRepository;
pub use diesel_request_repository::DieselRequestRepository;
pub use diesel_section_repository::DieselSectionRepository;
pub use migrations::{MIGRATIONS, MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
