//! Trade Journal Sync: reconciliation jobs over the remote journal.
//!
//! Provides:
//! - Check: classify local trades as present/absent remotely and record drift
//! - Insert: create missing trades with their relations, bounded retries
//! - Update: push local values onto drifted remote pages
//! - Run reports and progress snapshots
//! - A worker-thread driver that hosts the cooperative scheduler
//! - TOML configuration and CSV/JSON trade loading

pub mod check;
pub mod config;
pub mod driver;
pub mod insert;
pub mod job;
pub mod loader;
pub mod queue;
pub mod reconciler;
pub mod report;
pub mod retry;
pub mod session;
pub mod update;

pub use config::{CollectionsConfig, ConfigError, RemoteConfig, ScheduleConfig, SyncConfig};
pub use driver::{Canceller, SyncCommand, SyncDriver, SyncEvent};
pub use job::{JobKind, JobPhase, Notice, NoticeLevel, ReconciliationJob, Tick};
pub use loader::{load_trades, LoadError, LoadedTrades};
pub use queue::{QueuedItem, ReconciliationQueue};
pub use reconciler::Reconciler;
pub use report::{build_report, ProgressSnapshot, Tally};
pub use retry::RetryPolicy;
pub use session::{Session, StepEffects};
