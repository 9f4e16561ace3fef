//! IMEI registration registry.
//!
//! Layout follows ports and adapters: [`domain`] holds the workflow,
//! [`inbound`] the HTTP surface, and [`outbound`] the database, file-system,
//! and remote-service adapters. [`bootstrap`] wires them from [`settings`].

pub mod bootstrap;
pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod settings;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
