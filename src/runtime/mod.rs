//! Periodic management task on tokio.
//!
//! The engine itself is synchronous. [`ManagementTask`] owns the clock: it
//! calls [`MsfEngine::tick`] once per slotframe interval until shut down.
//! Packet callbacks from the slot engine lock the same mutex.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::core::{Schedule, SixpLayer};
use crate::msf::MsfEngine;

/// Engine shared between the management task and the slot engine.
pub type SharedEngine<S, P, R> = Arc<Mutex<MsfEngine<S, P, R>>>;

/// Handle to a running management task.
///
/// Dropping the handle stops the task at its next wakeup.
pub struct ManagementTask {
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl ManagementTask {
    /// Tick `engine` once per slotframe of its configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, P, R>(engine: SharedEngine<S, P, R>) -> Self
    where
        S: Schedule + Send + 'static,
        P: SixpLayer + Send + 'static,
        R: Rng + Send + 'static,
    {
        let period = engine.lock().config().slotframe_interval();
        Self::spawn_with_period(engine, period)
    }

    /// Tick `engine` every `period`. The first tick is one period from now.
    pub fn spawn_with_period<S, P, R>(engine: SharedEngine<S, P, R>, period: Duration) -> Self
    where
        S: Schedule + Send + 'static,
        P: SixpLayer + Send + 'static,
        R: Rng + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(?period, "management task started");

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    at = ticker.tick() => {
                        let command = engine.lock().tick(at.into_std());
                        if let Some(command) = command {
                            trace!(%command, "management tick issued a request");
                        }
                    }
                }
            }
            debug!("management task stopped");
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("management task ended abnormally: {e}");
            }
        }
    }

    /// Check if the task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ManagementTask {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}
