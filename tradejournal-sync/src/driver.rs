//! Background driver thread: hosts a `Reconciler` and runs its ticks.
//!
//! Communication is via `mpsc` channels. Pending ticks are timers resolved
//! with `recv_timeout`, so commands (cancel included) are seen between steps.

use crate::job::{JobKind, Notice, Tick};
use crate::reconciler::Reconciler;
use crate::report::ProgressSnapshot;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::debug;
use tradejournal_core::domain::LocalIndex;
use tradejournal_core::remote::JournalClient;

/// Commands sent to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    Start {
        kind: JobKind,
        selection: Vec<LocalIndex>,
    },
    Cancel(JobKind),
    Shutdown,
}

/// Events sent back by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Progress(ProgressSnapshot),
    Notice { kind: JobKind, notice: Notice },
    Finished {
        kind: JobKind,
        report: String,
        snapshot: ProgressSnapshot,
    },
}

/// Cancels jobs on a driver from another thread, e.g. a signal handler.
#[derive(Debug, Clone)]
pub struct Canceller {
    commands: Sender<SyncCommand>,
}

impl Canceller {
    /// Returns false once the driver has stopped.
    pub fn cancel(&self, kind: JobKind) -> bool {
        self.commands.send(SyncCommand::Cancel(kind)).is_ok()
    }
}

/// Handle to a running driver thread.
pub struct SyncDriver<C> {
    commands: Sender<SyncCommand>,
    events: Receiver<SyncEvent>,
    handle: JoinHandle<Reconciler<C>>,
}

impl<C: JournalClient + 'static> SyncDriver<C> {
    pub fn spawn(reconciler: Reconciler<C>) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("tradejournal-sync".into())
            .spawn(move || driver_loop(reconciler, cmd_rx, evt_tx))?;
        Ok(Self {
            commands: cmd_tx,
            events: evt_rx,
            handle,
        })
    }

    /// Send a command. Returns false once the driver has stopped.
    pub fn send(&self, cmd: SyncCommand) -> bool {
        self.commands.send(cmd).is_ok()
    }

    pub fn start(&self, kind: JobKind, selection: Vec<LocalIndex>) -> bool {
        self.send(SyncCommand::Start { kind, selection })
    }

    pub fn cancel(&self, kind: JobKind) -> bool {
        self.send(SyncCommand::Cancel(kind))
    }

    pub fn canceller(&self) -> Canceller {
        Canceller {
            commands: self.commands.clone(),
        }
    }

    pub fn events(&self) -> &Receiver<SyncEvent> {
        &self.events
    }

    /// Start `kind` and block until it finishes, handing every event to
    /// `on_event`. Returns the final report, or `None` if the driver died.
    pub fn run(
        &self,
        kind: JobKind,
        selection: Vec<LocalIndex>,
        mut on_event: impl FnMut(&SyncEvent),
    ) -> Option<String> {
        if !self.start(kind, selection) {
            return None;
        }
        while let Ok(event) = self.events.recv() {
            on_event(&event);
            if let SyncEvent::Finished { kind: done, report, .. } = event {
                if done == kind {
                    return Some(report);
                }
            }
        }
        None
    }

    /// Stop the thread and take the reconciler back.
    pub fn shutdown(self) -> thread::Result<Reconciler<C>> {
        let _ = self.commands.send(SyncCommand::Shutdown);
        self.handle.join()
    }
}

struct Emitter {
    tx: Sender<SyncEvent>,
    notices_sent: HashMap<JobKind, usize>,
}

impl Emitter {
    fn after<C: JournalClient>(&mut self, reconciler: &Reconciler<C>, kind: JobKind, tick: Tick) {
        let job = reconciler.job(kind);
        let sent = self.notices_sent.entry(kind).or_insert(0);
        for notice in job.notices.iter().skip(*sent) {
            let _ = self.tx.send(SyncEvent::Notice {
                kind,
                notice: notice.clone(),
            });
        }
        *sent = job.notices.len();

        let _ = self.tx.send(SyncEvent::Progress(job.snapshot()));
        if tick.is_done() {
            let _ = self.tx.send(SyncEvent::Finished {
                kind,
                report: job.report(),
                snapshot: job.snapshot(),
            });
        }
    }
}

fn driver_loop<C: JournalClient>(
    mut reconciler: Reconciler<C>,
    rx: Receiver<SyncCommand>,
    tx: Sender<SyncEvent>,
) -> Reconciler<C> {
    let mut due: HashMap<JobKind, Instant> = HashMap::new();
    let mut emitter = Emitter {
        tx,
        notices_sent: HashMap::new(),
    };

    loop {
        let next_due = due.values().min().copied();
        let received = match next_due {
            None => match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            },
            Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        match received {
            Some(SyncCommand::Shutdown) => break,
            Some(SyncCommand::Start { kind, selection }) => {
                debug!(job = %kind, rows = selection.len(), "start command");
                emitter.notices_sent.insert(kind, 0);
                let tick = reconciler.start(kind, &selection, Utc::now());
                emitter.after(&reconciler, kind, tick);
                schedule(&mut due, kind, tick);
            }
            Some(SyncCommand::Cancel(kind)) => {
                reconciler.cancel(kind);
                // Let the next step observe the cancel right away.
                if due.contains_key(&kind) {
                    due.insert(kind, Instant::now());
                }
            }
            None => {
                let now = Instant::now();
                let ready: Vec<JobKind> = JobKind::ALL
                    .into_iter()
                    .filter(|k| due.get(k).is_some_and(|at| *at <= now))
                    .collect();
                for kind in ready {
                    due.remove(&kind);
                    let tick = reconciler.step(kind, Utc::now());
                    emitter.after(&reconciler, kind, tick);
                    schedule(&mut due, kind, tick);
                }
            }
        }
    }

    reconciler
}

fn schedule(due: &mut HashMap<JobKind, Instant>, kind: JobKind, tick: Tick) {
    match tick {
        Tick::After(delay) => {
            due.insert(kind, Instant::now() + delay);
        }
        Tick::Done => {
            due.remove(&kind);
        }
    }
}
