pub mod models {
    pub mod inventory;
    pub mod record;
}

pub mod client;
pub mod config;
pub mod db {
    pub mod models;
    pub mod store;
}
pub mod schema;
pub mod translate;
pub mod utils;
pub mod services {
    pub mod maintenance;
    pub mod reconcile;
    pub mod scada;
    pub mod snapshot;
    pub mod sync;
}

use crate::client::InventoryClient;
use crate::config::Config;
use crate::db::models::TableKind;
use crate::db::store;
use crate::services::maintenance;
use crate::services::scada::{DownstreamSink, Forwarder, ScadaClient};
use crate::services::snapshot::{FlatSnapshot, GatewaySelector, SkippedEntity, Snapshot, SnapshotBuilder};
use crate::services::sync::sync_snapshot;
use crate::translate::Translator;
use crate::utils::FetchPool;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Synchronize the CMA inventory into the SCADA middleware database and SCADA-LTS.
#[derive(Debug, Parser)]
#[command(name = "cma-sync", version)]
struct Cli {
    /// Load environment variables from this file instead of `./.env`.
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,
    /// Append log output to this file (default: stderr, or `LOG_FILE`).
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Default, Args)]
struct GatewayArgs {
    /// Only this gateway (overrides `GATEWAY_NAME`).
    #[arg(long, conflicts_with = "all_gateways")]
    gateway: Option<String>,
    /// Every gateway, ignoring `GATEWAY_NAME`.
    #[arg(long)]
    all_gateways: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the inventory, reconcile every table and forward changes (the default).
    Sync {
        #[command(flatten)]
        target: GatewayArgs,
        /// Compute and log the changes without writing or forwarding.
        #[arg(long)]
        dry_run: bool,
        /// Do not forward changes to SCADA-LTS.
        #[arg(long)]
        no_scada: bool,
        /// Also dump the fetched snapshot into this directory.
        #[arg(long, value_name = "DIR")]
        dump_dir: Option<PathBuf>,
    },
    /// Fetch the inventory and dump it without touching the database.
    Collect {
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
        #[command(flatten)]
        target: GatewayArgs,
    },
    /// Reconcile a previously dumped `data.json`.
    Reconcile {
        #[arg(long, value_name = "FILE")]
        snapshot: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_scada: bool,
    },
    /// Delete every row of every middleware table.
    Truncate,
    /// Print one table as JSON lines.
    Show {
        #[arg(value_enum)]
        table: TableKind,
    },
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

fn selector(cfg: &Config, target: &GatewayArgs) -> GatewaySelector {
    if target.all_gateways {
        GatewaySelector::All
    } else {
        GatewaySelector::from_name(target.gateway.as_deref().or(cfg.gateway_name.as_deref()))
    }
}

fn collect(cfg: &Config, selector: &GatewaySelector) -> Result<Snapshot, String> {
    let settings = cfg.inventory_settings().map_err(|e| e.to_string())?;
    let client = InventoryClient::connect(settings).map_err(|e| format!("Inventory login failed: {}", e))?;
    info!("Authenticated to the inventory API");

    let pool = FetchPool::new(cfg.max_parallel_requests).map_err(|e| format!("Cannot start fetch workers: {}", e))?;
    let builder = SnapshotBuilder::new(&client, &pool, cfg.max_page_size, cfg.debug);
    builder.build(selector).map_err(|e| e.to_string())
}

fn connect_scada(cfg: &Config, translator: &Translator) -> Option<Forwarder> {
    let Some(scada) = cfg.scada.as_ref() else {
        info!("SCADALTS_HOST is not set; changes stay local");
        return None;
    };
    match ScadaClient::login(&scada.base_url, &scada.username, &scada.password, cfg.request_timeout) {
        Ok(client) => Some(Forwarder::new(Box::new(client), translator, cfg.scada_push_interval)),
        Err(e) => {
            error!("{}; continuing without SCADA forwarding", e);
            None
        }
    }
}

fn reconcile_flat(
    cfg: &Config,
    flat: &FlatSnapshot,
    skipped: Vec<SkippedEntity>,
    dry_run: bool,
    no_scada: bool,
) -> Result<(), String> {
    let translator = Translator::load().map_err(|e| format!("Translation table is invalid: {}", e))?;
    let mut conn = store::open(&cfg.sqlite_path)?;

    let mut forwarder = if dry_run || no_scada {
        None
    } else {
        connect_scada(cfg, &translator)
    };
    let sink = forwarder.as_mut().map(|f| f as &mut dyn DownstreamSink);

    let mut report = sync_snapshot(&mut conn, &translator, flat, sink, dry_run);
    report.forwarded = forwarder.as_ref().map(Forwarder::stats);
    report.skipped = skipped;
    print!("{}", report);

    if report.failures.is_empty() {
        info!("Sync finished ({} tables)", report.tables.len());
        Ok(())
    } else {
        Err(format!("{} table(s) failed to reconcile", report.failures.len()))
    }
}

fn run(cli: Cli) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env().map_err(|e| e.to_string())?;
    info!(
        "Config loaded (db={}, gateway={}, scada={}, retries={}, page_size={}, parallel={}, timeout={}s, debug={})",
        cfg.sqlite_path.display(),
        cfg.gateway_name.as_deref().unwrap_or("*"),
        cfg.scada.as_ref().map(|s| s.base_url.as_str()).unwrap_or("-"),
        cfg.max_request_retries,
        cfg.max_page_size,
        cfg.max_parallel_requests,
        cfg.request_timeout.as_secs(),
        cfg.debug
    );

    let command = cli.command.unwrap_or(Command::Sync {
        target: GatewayArgs::default(),
        dry_run: false,
        no_scada: false,
        dump_dir: None,
    });

    match command {
        Command::Sync {
            target,
            dry_run,
            no_scada,
            dump_dir,
        } => {
            // 2) Walk the inventory
            let snapshot = collect(&cfg, &selector(&cfg, &target))?;
            if let Some(dir) = dump_dir {
                snapshot.dump(&dir).map_err(|e| e.to_string())?;
            }
            // 3) Reconcile and forward
            reconcile_flat(&cfg, &snapshot.flat, snapshot.report.skipped, dry_run, no_scada)
        }
        Command::Collect { out, target } => {
            let snapshot = collect(&cfg, &selector(&cfg, &target))?;
            snapshot.dump(&out).map_err(|e| e.to_string())?;
            let r = &snapshot.report;
            println!(
                "collected {} gateways, {} hardware, {} modbus sensors, {} modbus registers, {} dnp3 sensors, {} dnp3 registers into {}",
                r.gateways,
                r.hardware,
                r.sensors_modbus,
                r.registers_modbus,
                r.sensors_dnp3,
                r.registers_dnp3,
                out.display()
            );
            for s in &r.skipped {
                println!("  skipped {} {}: {}", s.kind, s.id, s.reason);
            }
            Ok(())
        }
        Command::Reconcile {
            snapshot,
            dry_run,
            no_scada,
        } => {
            let flat = FlatSnapshot::load(&snapshot).map_err(|e| e.to_string())?;
            reconcile_flat(&cfg, &flat, Vec::new(), dry_run, no_scada)
        }
        Command::Truncate => {
            let mut conn = store::open(&cfg.sqlite_path)?;
            let counts = maintenance::truncate_all(&mut conn).map_err(|e| e.to_string())?;
            for (table, deleted) in counts {
                println!("{:<14} {} rows deleted", table, deleted);
            }
            Ok(())
        }
        Command::Show { table } => {
            let mut conn = store::open(&cfg.sqlite_path)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            maintenance::show_table(&mut conn, table, &mut out).map_err(|e| e.to_string())?;
            out.flush().map_err(|e| e.to_string())
        }
    }
}

fn load_env(explicit: Option<&Path>) -> Result<Option<LoadedEnvFile>, String> {
    // dotenvy never overrides variables already present in the process environment
    match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            dotenvy::from_path(path).map_err(|e| format!("{}: {}", path.display(), e))?;
            Ok(Some(LoadedEnvFile {
                path: path.to_path_buf(),
                explicit: true,
            }))
        }
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(LoadedEnvFile { path, explicit: false })),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(format!("failed to load .env: {}", e)),
        },
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<(), String> {
    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(default_filter);
    builder.format_timestamp_secs();
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("cannot open log file {}: {}", path.display(), e))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let loaded_env = match load_env(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| std::env::var_os("LOG_FILE").filter(|v| !v.is_empty()).map(PathBuf::from));
    if let Err(err) = init_logging(log_file.as_deref()) {
        eprintln!("fatal: {}", err);
        std::process::exit(1);
    }

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "cma-sync {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_defaults_to_sync() {
        let cli = Cli::try_parse_from(["cma-sync"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["cma-sync", "sync", "--gateway", "GW-01", "--dry-run", "--log-file", "x.log"]).unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("x.log")));
        match cli.command {
            Some(Command::Sync { target, dry_run, .. }) => {
                assert_eq!(target.gateway.as_deref(), Some("GW-01"));
                assert!(dry_run);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gateway_flags_conflict() {
        assert!(Cli::try_parse_from(["cma-sync", "sync", "--gateway", "A", "--all-gateways"]).is_err());
    }

    #[test]
    fn show_takes_a_table_name() {
        let cli = Cli::try_parse_from(["cma-sync", "show", "modbus-datapoints"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Show {
                table: TableKind::ModbusDatapoints
            })
        ));
    }

    #[test]
    fn explicit_selector_beats_environment() {
        let cfg = Config::from_lookup(|k| (k == "GATEWAY_NAME").then(|| "GW-ENV".to_string())).unwrap();
        let from_env = selector(&cfg, &GatewayArgs::default());
        assert_eq!(from_env, GatewaySelector::Named("GW-ENV".into()));
        let all = GatewayArgs {
            gateway: None,
            all_gateways: true,
        };
        assert_eq!(selector(&cfg, &all), GatewaySelector::All);
    }
}
