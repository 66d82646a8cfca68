use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use flume::Receiver;
use parking_lot::Mutex;
use thiserror::Error;

use crate::danbooru::{ReconciliationEngine, RunStats};

/// Events emitted by a reconciliation run, consumed by whatever front-end
/// started it. The channel is one-way and append-only; the engine never
/// touches the presentation layer directly.
#[derive(Debug, Clone)]
pub(crate) enum Progress {
    /// A log line to display.
    Log(String),
    /// The entity currently being processed (1-based) out of the run total.
    Entity { index: usize, total: usize },
    /// The run finished; final statistics attached.
    Finished(RunStats),
}

#[derive(Debug, Error)]
pub(crate) enum WorkerError {
    #[error("a reconciliation run is already in progress")]
    AlreadyRunning,
}

/// Runs the reconciliation engine off the interactive thread.
///
/// The worker is an explicit Idle/Running state machine: only one run may be
/// active at a time, and a second start attempt is refused with
/// [`WorkerError::AlreadyRunning`] rather than queued. Cancellation mid-run is
/// not supported; a run proceeds to completion.
pub(crate) struct SyncWorker {
    running: Arc<AtomicBool>,
    last_stats: Arc<Mutex<Option<RunStats>>>,
}

impl SyncWorker {
    pub(crate) fn new() -> Self {
        SyncWorker {
            running: Arc::new(AtomicBool::new(false)),
            last_stats: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether a run is currently active.
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Statistics of the most recently completed run, if any.
    pub(crate) fn last_run(&self) -> Option<RunStats> {
        self.last_stats.lock().clone()
    }

    /// Starts a run over `artists` on a background thread and returns the
    /// progress channel. The Running flag is claimed before the thread spawns,
    /// so a racing second call always observes it.
    pub(crate) fn start(
        &self,
        engine: ReconciliationEngine,
        artists: Vec<String>,
    ) -> Result<Receiver<Progress>, WorkerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(WorkerError::AlreadyRunning);
        }

        let (sender, receiver) = flume::unbounded();
        let running = Arc::clone(&self.running);
        let last_stats = Arc::clone(&self.last_stats);

        thread::spawn(move || {
            let stats = engine.run(&artists, &sender);
            *last_stats.lock() = Some(stats.clone());
            let _ = sender.send(Progress::Finished(stats));
            running.store(false, Ordering::SeqCst);
        });

        Ok(receiver)
    }
}
