//! Background eviction of lapsed leases.
//!
//! The reaper holds no state of its own: each tick asks the store to drop
//! every record whose lease lapsed. Cadence comes from the tokio timer, the
//! lapse decision from the store's clock.

use core::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::id::KeyId;
use crate::store::KeyStore;

#[derive(Clone, Debug)]
pub struct Reaper {
    store: KeyStore,
    interval: Duration,
}

impl Reaper {
    /// `interval` must be non-zero, see [`LeaseConfig::reap_interval`](crate::LeaseConfig::reap_interval).
    #[must_use]
    pub const fn new(store: KeyStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run a single sweep now.
    pub fn tick(&self) -> Vec<KeyId> {
        let reaped = self.store.reap();

        if !reaped.is_empty() {
            info!(count = reaped.len(), "Reaped keys with lapsed leases");
            for id in &reaped {
                debug!(%id, "Reaped key");
            }
        }

        reaped
    }

    /// Start sweeping on the current tokio runtime.
    ///
    /// The first sweep happens one full interval after the call.
    #[must_use = "dropping the handle stops the reaper"]
    pub fn spawn(self) -> ReaperHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn(self.run(token.child_token()));

        ReaperHandle {
            task,
            guard: token.drop_guard(),
        }
    }

    async fn run(self, token: CancellationToken) {
        let mut ticks = time::interval_at(Instant::now() + self.interval, self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "Reaper started");

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticks.tick() => {
                    let _reaped = self.tick();
                }
            }
        }

        info!("Reaper stopped");
    }
}

/// Owner of a running reaper task. Dropping it cancels the task.
#[derive(Debug)]
pub struct ReaperHandle {
    task: JoinHandle<()>,
    guard: DropGuard,
}

impl ReaperHandle {
    /// Cancel the task and wait for it to wind down.
    pub async fn shutdown(self) {
        let Self { task, guard } = self;
        drop(guard);

        if let Err(err) = task.await {
            warn!(%err, "Reaper task did not shut down cleanly");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
