//! Compliance service outbound adapter.

mod http_checker;

pub use http_checker::ComplianceHttpChecker;
