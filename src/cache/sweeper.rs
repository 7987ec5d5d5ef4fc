//! # Expiry Sweeper
//!
//! Background task that periodically purges expired cache entries.
//!
//! ```text
//!     start_sweeper()
//!          │
//!          ▼
//!     ┌──────────────────────────────┐
//!     │ every sweep_interval:        │
//!     │   cache alive? ──No──► exit  │
//!     │   purge_expired()            │
//!     └──────────────┬───────────────┘
//!                    │ stop() / drop(handle)
//!                    ▼
//!                  exit
//! ```
//!
//! The task only holds a weak reference, so a forgotten sweeper never keeps
//! its cache alive.

use super::core::TtlCache;
use crate::utils::now;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info};

/// Owner of a running sweep task.
///
/// Call [`stop`](Self::stop) for a graceful shutdown; dropping the handle
/// aborts the task instead.
#[derive(Debug)]
pub struct SweeperHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub(crate) fn spawn<V>(cache: Weak<TtlCache<V>>, period: Duration) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let first_sweep = now() + period;

        let task = tokio::spawn(async move {
            info!("Started cache sweeper (interval: {:?})", period);

            let mut ticker = interval_at(first_sweep, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else {
                            debug!("Cache dropped, sweeper exiting");
                            break;
                        };
                        cache.purge_expired();
                    }
                }
            }

            info!("Stopped cache sweeper");
        });

        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Stops the sweep and waits for the task to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The task may already have exited on its own.
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// `true` while the sweep task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
