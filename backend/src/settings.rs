//! Registry configuration loaded via OrthoConfig.
//!
//! Values come from `IMEI_REGISTRY_*` environment variables, the optional
//! configuration file, and command-line flags. Every field is optional; the
//! accessors fall back to the defaults documented on each field.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::{AssociationPolicy, ExportSettings, QuotaDefaults, RegistryPolicy};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DEVICE_DATABASE_URL: &str = "http://localhost:8081/";
const DEFAULT_COMPLIANCE_URL: &str = "http://localhost:8082/check";
const DEFAULT_NOTIFICATION_URL: &str = "http://localhost:8083/notifications";
const DEFAULT_DEVICE_DATABASE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_COMPLIANCE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NOTIFICATION_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SUMMARY_TIMEOUT_SECS: u64 = 300;

/// Failure while interpreting loaded settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("database URL is not configured; set IMEI_REGISTRY_DATABASE_URL")]
    MissingDatabaseUrl,
    #[error("{field} is not a valid URL: {message}")]
    InvalidUrl { field: &'static str, message: String },
    #[error("{field} must be at least 1")]
    NotPositive { field: &'static str },
}

/// Configuration for the registry service and its command-line tools.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "IMEI_REGISTRY")]
pub struct RegistrySettings {
    /// PostgreSQL connection URL. Required.
    pub database_url: Option<String>,
    /// Listen address. Defaults to `0.0.0.0:8080`.
    pub bind_addr: Option<SocketAddr>,
    /// Root of the per-request document store. Defaults to `data/uploads`.
    pub upload_dir: Option<PathBuf>,
    /// Directory receiving generated lists. Defaults to `data/lists`.
    pub list_dir: Option<PathBuf>,
    /// Base URL of the device database.
    pub device_database_url: Option<String>,
    /// Device database request timeout in seconds. Defaults to 10.
    pub device_database_timeout_secs: Option<u64>,
    /// Compliance checker endpoint.
    pub compliance_url: Option<String>,
    /// Compliance request timeout in seconds. Defaults to 30.
    pub compliance_timeout_secs: Option<u64>,
    /// Webhook receiving submitter notifications.
    pub notification_url: Option<String>,
    /// Settle requests from their compliance summary without a reviewer.
    #[ortho_config(default = false)]
    pub automated_decision: bool,
    /// Maximum concurrently associated devices per UID. Defaults to 5.
    pub max_devices_per_uid: Option<usize>,
    /// Allow sharing an IMEI held by another UID after confirmation.
    #[ortho_config(default = false)]
    pub association_grace_period: bool,
    /// Concurrent list-generation workers. Defaults to 4.
    pub list_workers: Option<usize>,
    /// Partitions per generated list. Defaults to 8.
    pub list_batches: Option<usize>,
    /// Upper bound on one processing run in seconds. Defaults to 300.
    pub summary_timeout_secs: Option<u64>,
}

impl RegistrySettings {
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(SettingsError::MissingDatabaseUrl)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)))
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data").join("uploads"))
    }

    pub fn list_dir(&self) -> PathBuf {
        self.list_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data").join("lists"))
    }

    pub fn device_database_url(&self) -> Result<Url, SettingsError> {
        parse_url(
            "device_database_url",
            self.device_database_url
                .as_deref()
                .unwrap_or(DEFAULT_DEVICE_DATABASE_URL),
        )
    }

    pub fn device_database_timeout(&self) -> Duration {
        Duration::from_secs(
            self.device_database_timeout_secs
                .unwrap_or(DEFAULT_DEVICE_DATABASE_TIMEOUT_SECS),
        )
    }

    pub fn compliance_url(&self) -> Result<Url, SettingsError> {
        parse_url(
            "compliance_url",
            self.compliance_url.as_deref().unwrap_or(DEFAULT_COMPLIANCE_URL),
        )
    }

    pub fn compliance_timeout(&self) -> Duration {
        Duration::from_secs(
            self.compliance_timeout_secs
                .unwrap_or(DEFAULT_COMPLIANCE_TIMEOUT_SECS),
        )
    }

    pub fn notification_url(&self) -> Result<Url, SettingsError> {
        parse_url(
            "notification_url",
            self.notification_url
                .as_deref()
                .unwrap_or(DEFAULT_NOTIFICATION_URL),
        )
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(DEFAULT_NOTIFICATION_TIMEOUT_SECS)
    }

    /// Workflow policy derived from these settings.
    pub fn policy(&self) -> Result<RegistryPolicy, SettingsError> {
        let defaults = AssociationPolicy::default();
        let max_devices_per_uid = self
            .max_devices_per_uid
            .unwrap_or(defaults.max_devices_per_uid);
        if max_devices_per_uid == 0 {
            return Err(SettingsError::NotPositive {
                field: "max_devices_per_uid",
            });
        }
        Ok(RegistryPolicy {
            automated_decision: self.automated_decision,
            association: AssociationPolicy {
                max_devices_per_uid,
                grace_period: self.association_grace_period,
            },
            quota_defaults: QuotaDefaults::default(),
            summary_timeout: Duration::from_secs(
                self.summary_timeout_secs
                    .unwrap_or(DEFAULT_SUMMARY_TIMEOUT_SECS),
            ),
        })
    }

    /// List-generation worker pool sizing.
    pub fn export(&self) -> Result<ExportSettings, SettingsError> {
        let defaults = ExportSettings::default();
        let workers = self.list_workers.unwrap_or(defaults.workers);
        let batches = self.list_batches.unwrap_or(defaults.batches);
        if workers == 0 {
            return Err(SettingsError::NotPositive {
                field: "list_workers",
            });
        }
        if batches == 0 {
            return Err(SettingsError::NotPositive {
                field: "list_batches",
            });
        }
        Ok(ExportSettings { workers, batches })
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, SettingsError> {
    Url::parse(raw).map_err(|err| SettingsError::InvalidUrl {
        field,
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    //! Unit tests for registry configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 15] = [
        "IMEI_REGISTRY_DATABASE_URL",
        "IMEI_REGISTRY_BIND_ADDR",
        "IMEI_REGISTRY_UPLOAD_DIR",
        "IMEI_REGISTRY_LIST_DIR",
        "IMEI_REGISTRY_DEVICE_DATABASE_URL",
        "IMEI_REGISTRY_DEVICE_DATABASE_TIMEOUT_SECS",
        "IMEI_REGISTRY_COMPLIANCE_URL",
        "IMEI_REGISTRY_COMPLIANCE_TIMEOUT_SECS",
        "IMEI_REGISTRY_NOTIFICATION_URL",
        "IMEI_REGISTRY_AUTOMATED_DECISION",
        "IMEI_REGISTRY_MAX_DEVICES_PER_UID",
        "IMEI_REGISTRY_ASSOCIATION_GRACE_PERIOD",
        "IMEI_REGISTRY_LIST_WORKERS",
        "IMEI_REGISTRY_LIST_BATCHES",
        "IMEI_REGISTRY_SUMMARY_TIMEOUT_SECS",
    ];

    fn cleared_except(overrides: &[(&str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    fn load_from_empty_args() -> RegistrySettings {
        RegistrySettings::load_from_iter([OsString::from("imei-registry")])
            .expect("config should load")
    }

    #[rstest]
    fn defaults_apply_when_nothing_is_set() {
        let _guard = lock_env(cleared_except(&[]));

        let settings = load_from_empty_args();

        assert_eq!(
            settings.database_url(),
            Err(SettingsError::MissingDatabaseUrl)
        );
        assert_eq!(settings.bind_addr().port(), DEFAULT_PORT);
        assert_eq!(settings.upload_dir(), PathBuf::from("data/uploads"));
        assert_eq!(settings.list_dir(), PathBuf::from("data/lists"));
        assert_eq!(
            settings.device_database_url().expect("default url").as_str(),
            DEFAULT_DEVICE_DATABASE_URL
        );
        assert_eq!(settings.compliance_timeout(), Duration::from_secs(30));
        assert_eq!(
            settings.policy().expect("policy"),
            RegistryPolicy::default()
        );
        assert_eq!(
            settings.export().expect("export"),
            ExportSettings::default()
        );
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(cleared_except(&[
            ("IMEI_REGISTRY_DATABASE_URL", "postgres://registry@db/registry"),
            ("IMEI_REGISTRY_BIND_ADDR", "127.0.0.1:9000"),
            ("IMEI_REGISTRY_AUTOMATED_DECISION", "true"),
            ("IMEI_REGISTRY_MAX_DEVICES_PER_UID", "2"),
            ("IMEI_REGISTRY_ASSOCIATION_GRACE_PERIOD", "true"),
            ("IMEI_REGISTRY_LIST_WORKERS", "6"),
            ("IMEI_REGISTRY_SUMMARY_TIMEOUT_SECS", "45"),
        ]));

        let settings = load_from_empty_args();
        let policy = settings.policy().expect("policy");

        assert_eq!(
            settings.database_url(),
            Ok("postgres://registry@db/registry")
        );
        assert_eq!(settings.bind_addr(), SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert!(policy.automated_decision);
        assert_eq!(policy.association.max_devices_per_uid, 2);
        assert!(policy.association.grace_period);
        assert_eq!(policy.summary_timeout, Duration::from_secs(45));
        assert_eq!(settings.export().expect("export").workers, 6);
    }

    #[rstest]
    #[case("IMEI_REGISTRY_LIST_WORKERS", "list_workers")]
    #[case("IMEI_REGISTRY_LIST_BATCHES", "list_batches")]
    fn zero_sized_pools_are_rejected(#[case] var: &str, #[case] field: &'static str) {
        let _guard = lock_env(cleared_except(&[(var, "0")]));

        let settings = load_from_empty_args();

        assert_eq!(settings.export(), Err(SettingsError::NotPositive { field }));
    }

    #[rstest]
    fn malformed_endpoints_name_the_field() {
        let _guard = lock_env(cleared_except(&[(
            "IMEI_REGISTRY_COMPLIANCE_URL",
            "not a url",
        )]));

        let settings = load_from_empty_args();

        assert!(matches!(
            settings.compliance_url(),
            Err(SettingsError::InvalidUrl {
                field: "compliance_url",
                ..
            })
        ));
    }
}
