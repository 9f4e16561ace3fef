//! Generate a full or delta registration list from the approved-IMEI ledger.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Context, Result, eyre};
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use imei_registry::bootstrap;
use imei_registry::domain::ListKind;
use imei_registry::settings::RegistrySettings;

/// `generate-list` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "generate-list",
    about = "Write a registration list from the approved-IMEI ledger",
    version
)]
struct CliArgs {
    /// `full` for every listable entry, `delta` for changes since the last delta.
    #[arg(value_name = "full|delta", value_parser = parse_kind)]
    kind: ListKind,
    /// Directory receiving the list. Overrides `IMEI_REGISTRY_LIST_DIR`.
    #[arg(long = "list-dir", value_name = "path")]
    list_dir: Option<PathBuf>,
    /// Database connection URL. Overrides `IMEI_REGISTRY_DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url")]
    database_url: Option<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build Tokio runtime")?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = CliArgs::parse();
    let mut settings = RegistrySettings::load_from_iter([OsString::from("generate-list")])
        .map_err(|error| eyre!("failed to load settings: {error}"))?;
    if args.list_dir.is_some() {
        settings.list_dir = args.list_dir;
    }
    if args.database_url.is_some() {
        settings.database_url = args.database_url;
    }

    let registry = bootstrap::connect(&settings)
        .await
        .wrap_err("failed to wire registry adapters")?;
    let report = registry
        .services
        .lists
        .generate(args.kind)
        .await
        .map_err(|error| eyre!("list generation failed: {error}"))?;

    match report {
        Some(report) => {
            println!("kind={}", report.kind.as_str());
            println!("file={}", report.file_name);
            println!("rows={}", report.rows);
        }
        None => println!("kind={} rows=0 (nothing eligible)", args.kind.as_str()),
    }
    Ok(())
}

fn parse_kind(raw: &str) -> Result<ListKind, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "full" => Ok(ListKind::Full),
        "delta" => Ok(ListKind::Delta),
        other => Err(format!("unknown list kind `{other}`; expected full or delta")),
    }
}
