//! boothcache - inspect and watch event administration data from the
//! command line. Reads go through the shared cache; `--watch` keeps the
//! push channel open and reprints on every change. The REST backend has no
//! push source, so `--watch` warns and only shows the initial load there.

mod format;
mod print;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use boothcache_core::backend::{NoPush, RestClient};
use boothcache_core::models::ComposedMarkers;
use boothcache_core::resources::{assignments, Assignments, Companies, Counts, Markers, Organization, Subscriptions};
use boothcache_core::snapshot::{FileKvStore, SnapshotStore};
use boothcache_core::sync::Resource;
use boothcache_core::{CacheRegistry, Config, Connectivity, MutationResult, ResourceHandle, ResourceState};

#[derive(Parser)]
#[command(name = "boothcache", version, about = "Event booth data, cached and kept in sync")]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(long, global = true, env = "BOOTHCACHE_URL")]
    url: Option<String>,

    /// Backend API key (overrides the config file)
    #[arg(long, global = true, env = "BOOTHCACHE_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print data as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Serve snapshots only; no network
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Composed booth markers for a year
    Markers {
        year: i32,
        /// Keep running and reprint on every change. Needs a backend with
        /// push notifications; over plain REST nothing arrives after the first print.
        #[arg(long)]
        watch: bool,
    },
    /// All companies
    Companies {
        /// Keep running and reprint on every change (needs push notifications)
        #[arg(long)]
        watch: bool,
    },
    /// Company-to-booth assignments for a year
    Assignments {
        year: i32,
        /// Keep running and reprint on every change (needs push notifications)
        #[arg(long)]
        watch: bool,
    },
    /// Yearly subscriptions with company names
    Subscriptions {
        year: i32,
        /// Keep running and reprint on every change (needs push notifications)
        #[arg(long)]
        watch: bool,
    },
    /// Aggregate totals for a year
    Counts { year: i32 },
    /// The organization profile
    Organization,
    /// Show the stored offline snapshot of a year's markers
    Snapshot { year: i32 },
    /// Assign a company to a booth
    Assign { year: i32, marker: i64, company: i64 },
    /// Remove an assignment
    Unassign { year: i32, assignment: i64 },
}

/// Initialize the tracing subscriber. Logs go to stderr unless a log file
/// is given; the returned guard must live until exit to flush the file.
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

fn build_registry(config: &Config, offline: bool) -> Result<CacheRegistry> {
    let url = config
        .backend_url
        .as_deref()
        .context("No backend URL configured (use --url or BOOTHCACHE_URL)")?;
    let key = config
        .api_key
        .as_deref()
        .context("No API key configured (use --key or BOOTHCACHE_KEY)")?;
    let client = RestClient::new(url, key)?;
    let snapshots = SnapshotStore::new(Arc::new(FileKvStore::new(config.cache_dir()?)?));

    Ok(CacheRegistry::new(
        Arc::new(client),
        Arc::new(NoPush),
        snapshots,
        Connectivity::new(!offline),
        config.sync_settings(),
    ))
}

fn emit<D: Serialize>(data: &D, json: bool, render: fn(&D)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        render(data);
    }
    Ok(())
}

fn report<D>(state: &ResourceState<D>) {
    if state.from_snapshot {
        eprintln!("(offline: showing last saved data)");
    }
    if let Some(ref error) = state.error {
        eprintln!("Warning: {}", error);
    }
}

fn has_push_channel<R: Resource>(handle: &ResourceHandle<R>) -> bool {
    handle.diagnostics().channel.is_some()
}

/// Mount `resource`, print it once it settles, and with `watch` keep
/// printing on every transition until interrupted.
async fn show<R: Resource>(
    registry: &CacheRegistry,
    resource: R,
    watch: bool,
    json: bool,
    render: fn(&R::Data),
) -> Result<()> {
    if !watch {
        let handle = registry.acquire(resource);
        let state = handle.settled().await;
        report(&state);
        let Some(data) = state.data else {
            bail!("{} unavailable", handle.key());
        };
        emit(&*data, json, render)?;
        handle.release();
        return Ok(());
    }

    let handle = registry.acquire_with(resource, move |state: &ResourceState<R::Data>| {
        if state.loading {
            return;
        }
        report(state);
        if let Some(ref data) = state.data {
            if let Err(e) = emit(&**data, json, render) {
                warn!(error = %e, "Failed to print update");
            }
        }
    });
    if !has_push_channel(&handle) {
        warn!(
            key = %handle.key(),
            "Push notifications are unavailable for this backend; no further updates will arrive"
        );
    }
    info!(key = %handle.key(), "Watching; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    handle.release();
    Ok(())
}

fn finish_mutation<T: Serialize>(result: MutationResult<T>) -> Result<()> {
    match (result.data, result.error) {
        (Some(data), _) => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        (None, Some(error)) => bail!(error),
        (None, None) => Ok(()),
    }
}

fn show_snapshot(config: &Config, year: i32, json: bool) -> Result<()> {
    let snapshots = SnapshotStore::new(Arc::new(FileKvStore::new(config.cache_dir()?)?));
    let name = Markers::new(year).snapshot_name().context("Markers have no snapshot")?;
    match snapshots.read::<ComposedMarkers>(&name) {
        Some(snapshot) => {
            eprintln!("Saved {}", snapshot.age_display());
            emit(&snapshot.data, json, print::markers)
        }
        None => bail!("No snapshot saved for {}", year),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_ref())?;

    let config = Config::load()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        })
        .with_overrides(cli.url.clone(), cli.key.clone());

    if let Command::Snapshot { year } = cli.command {
        return show_snapshot(&config, year, cli.json);
    }

    let registry = build_registry(&config, cli.offline || config.offline)?;
    let json = cli.json;

    match cli.command {
        Command::Markers { year, watch } => show(&registry, Markers::new(year), watch, json, print::markers).await,
        Command::Companies { watch } => show(&registry, Companies, watch, json, |list| print::companies(list)).await,
        Command::Assignments { year, watch } => {
            show(&registry, Assignments::new(year), watch, json, |list| print::assignments(list)).await
        }
        Command::Subscriptions { year, watch } => {
            show(&registry, Subscriptions::new(year), watch, json, |list| print::subscriptions(list)).await
        }
        Command::Counts { year } => show(&registry, Counts::new(year), false, json, print::counts).await,
        Command::Organization => show(&registry, Organization, false, json, print::organization).await,
        Command::Assign { year, marker, company } => {
            finish_mutation(assignments::assign_company(&registry, marker, company, year).await)
        }
        Command::Unassign { year, assignment } => {
            finish_mutation(assignments::unassign(&registry, assignment, year).await)
        }
        Command::Snapshot { .. } => Ok(()),
    }
}
