//! Trade Journal CLI: reconcile local trades with the remote journal.
//!
//! Commands:
//! - `check`: classify trades as present or missing remotely, report drift
//! - `insert`: create missing trades with their ticker and day relations
//! - `update`: push local values onto drifted remote pages
//! - `sync`: check, insert and update in one go
//! - `config init` / `config show`: write or inspect the TOML config

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tradejournal_core::diff::DiffDisplay;
use tradejournal_core::domain::LocalIndex;
use tradejournal_core::remote::{JournalClient, NotionClient};
use tradejournal_sync::{
    load_trades, Canceller, JobKind, NoticeLevel, ProgressSnapshot, Reconciler, SyncConfig,
    SyncDriver, SyncEvent, Tally,
};

const DEFAULT_CONFIG: &str = "tradejournal.toml";

#[derive(Parser)]
#[command(
    name = "tradejournal",
    about = "Trade journal reconciliation against a remote journal database"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify each trade as existing or missing remotely and report drift.
    Check(RunArgs),
    /// Create trades that are missing remotely.
    Insert(RunArgs),
    /// Overwrite drifted remote pages with local values (runs a check first).
    Update(RunArgs),
    /// Check, then insert what is missing, then update what drifted.
    Sync(RunArgs),
    /// Configuration file commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Trade export to reconcile (.csv or .json).
    #[arg(long)]
    trades: PathBuf,

    /// TOML config file.
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Row numbers to work on (e.g. 0,1,5). Defaults to every row.
    #[arg(long, value_delimiter = ',')]
    select: Vec<LocalIndex>,

    /// Only the first N selected rows.
    #[arg(long)]
    limit: Option<usize>,

    /// Print final reports as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a starter config.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the resolved config.
    Show {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Check(args) => run_jobs(&args, &[JobKind::Check]),
        Commands::Insert(args) => run_jobs(&args, &[JobKind::Insert]),
        Commands::Update(args) => run_jobs(&args, &[JobKind::Check, JobKind::Update]),
        Commands::Sync(args) => run_jobs(
            &args,
            &[JobKind::Check, JobKind::Insert, JobKind::Update],
        ),
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => run_config_init(&path, force),
            ConfigAction::Show { path } => run_config_show(&path),
        },
    }
}

/// Ctrl-C state shared with the signal handler.
#[derive(Default)]
struct Interrupt {
    running: Mutex<Option<JobKind>>,
    requested: AtomicBool,
}

#[derive(Debug, PartialEq, Eq)]
enum InterruptAction {
    Cancelled(JobKind),
    Idle,
    Exit,
}

impl Interrupt {
    fn set_running(&self, kind: Option<JobKind>) {
        if let Ok(mut slot) = self.running.lock() {
            *slot = kind;
        }
    }

    fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// First Ctrl-C cancels the running job; a second one gives up.
    fn handle(&self, canceller: &Canceller) -> InterruptAction {
        if self.requested.swap(true, Ordering::SeqCst) {
            return InterruptAction::Exit;
        }
        let running = self.running.lock().ok().and_then(|slot| *slot);
        match running {
            Some(kind) => {
                canceller.cancel(kind);
                InterruptAction::Cancelled(kind)
            }
            None => InterruptAction::Idle,
        }
    }
}

fn install_interrupt_handler(interrupt: Arc<Interrupt>, canceller: Canceller) -> Result<()> {
    ctrlc::set_handler(move || match interrupt.handle(&canceller) {
        InterruptAction::Cancelled(kind) => {
            eprintln!("\nCancelling {kind} after the current item (Ctrl-C again to abort)");
        }
        InterruptAction::Idle => {}
        InterruptAction::Exit => {
            eprintln!("\nAborted");
            std::process::exit(130);
        }
    })
    .context("installing Ctrl-C handler")
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run `kinds` in order over the selection, on the driver thread.
fn run_jobs(args: &RunArgs, kinds: &[JobKind]) -> Result<()> {
    let config = SyncConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let loaded = load_trades(&args.trades)
        .with_context(|| format!("loading trades {}", args.trades.display()))?;
    if loaded.duplicates_dropped > 0 {
        eprintln!("Dropped {} duplicate trade(s)", loaded.duplicates_dropped);
    }
    if loaded.records.is_empty() {
        bail!("no trades in {}", args.trades.display());
    }

    let selection = resolve_selection(&args.select, args.limit, loaded.records.len())?;
    let client = NotionClient::new(&config.notion_settings()?)?;
    info!(rows = selection.len(), jobs = ?kinds, client = client.name(), "starting reconciliation");
    let reconciler = Reconciler::new(client, &config, loaded.records);
    let driver = SyncDriver::spawn(reconciler).context("starting sync worker")?;
    let interrupt = Arc::new(Interrupt::default());
    install_interrupt_handler(Arc::clone(&interrupt), driver.canceller())?;

    let mut finals: Vec<(JobKind, String, ProgressSnapshot)> = Vec::new();
    for &kind in kinds {
        if interrupt.requested() {
            eprintln!("Skipping {kind}: interrupted");
            continue;
        }
        interrupt.set_running(Some(kind));
        let mut last: Option<ProgressSnapshot> = None;
        let report = driver.run(kind, selection.clone(), |event| match event {
            SyncEvent::Progress(snap) => {
                eprintln!("{}", snap.progress_line());
                last = Some(snap.clone());
            }
            SyncEvent::Notice { notice, .. } => match notice.level {
                NoticeLevel::Error | NoticeLevel::Warning => eprintln!("  {notice}"),
                NoticeLevel::Info => eprintln!("  {}", notice.message),
            },
            SyncEvent::Finished { snapshot, .. } => last = Some(snapshot.clone()),
        });
        interrupt.set_running(None);
        let Some(report) = report else {
            bail!("sync worker stopped during {kind}");
        };
        if !args.json {
            println!("{kind}: {report}");
        }
        if let Some(snap) = last {
            finals.push((kind, report, snap));
        }
    }

    let reconciler = match driver.shutdown() {
        Ok(r) => r,
        Err(_) => bail!("sync worker panicked"),
    };

    if args.json {
        let out: Vec<serde_json::Value> = finals
            .iter()
            .map(|(kind, report, snap)| {
                serde_json::json!({
                    "job": kind,
                    "report": report,
                    "progress": snap,
                    "tally": Tally::from_results(&reconciler.job(*kind).results),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_drift(&reconciler, &selection);
    }

    let errors: usize = kinds
        .iter()
        .map(|k| Tally::from_results(&reconciler.job(*k).results).errors)
        .sum();
    if errors > 0 {
        eprintln!("\n{errors} item(s) ended in error");
        std::process::exit(1);
    }
    if interrupt.requested() {
        std::process::exit(130);
    }
    Ok(())
}

fn resolve_selection(
    select: &[LocalIndex],
    limit: Option<usize>,
    rows: usize,
) -> Result<Vec<LocalIndex>> {
    let mut selection: Vec<LocalIndex> = if select.is_empty() {
        (0..rows).collect()
    } else {
        if let Some(bad) = select.iter().find(|&&i| i >= rows) {
            bail!("--select {bad} is out of range ({rows} trades loaded)");
        }
        select.to_vec()
    };
    if let Some(n) = limit {
        selection.truncate(n);
    }
    Ok(selection)
}

fn print_drift(reconciler: &Reconciler<NotionClient>, selection: &[LocalIndex]) {
    let session = reconciler.session();
    let drifted: Vec<LocalIndex> = selection
        .iter()
        .copied()
        .filter(|&i| session.has_diff(i))
        .collect();
    if drifted.is_empty() {
        return;
    }
    println!("\nDrift ({} trade(s)):", drifted.len());
    for idx in drifted {
        let title = session
            .record(idx)
            .and_then(|r| r.title_key())
            .map(|k| k.to_string())
            .unwrap_or_default();
        println!("  #{idx} {title}");
        if let Some(diff) = session.diff(idx) {
            for line in DiffDisplay(diff).to_string().lines() {
                println!("    {line}");
            }
        }
    }
}

fn run_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    SyncConfig::template().save(path)?;
    println!("Wrote {}", path.display());
    println!("Fill in the collection ids, then export the token variable named in [remote].");
    Ok(())
}

fn run_config_show(path: &Path) -> Result<()> {
    let config = SyncConfig::load(path)?;
    println!("Config: {}", path.display());
    println!("  remote:       {}", config.remote.base_url);
    println!("  api version:  {}", config.remote.api_version);
    let token = if std::env::var(&config.remote.token_env).is_ok() {
        "set"
    } else {
        "NOT SET"
    };
    println!("  token env:    {} ({token})", config.remote.token_env);
    println!("  tickers:      {}", config.collections.tickers);
    println!("  dates:        {}", config.collections.dates);
    for (version, id) in &config.collections.trades {
        println!("  trades v{version}:    {id}");
    }
    println!(
        "  schedule:     step {}ms, retry base {}ms, max retries {}",
        config.schedule.step_delay_ms, config.schedule.retry_base_ms, config.schedule.max_retries
    );
    Ok(())
}
