//! Periodic reconciliation.
//!
//! Bounds the staleness window of locally cached stock assumptions without
//! requiring server push: while the session is authenticated the engine
//! reconciles once at session start and then on a fixed interval, plus
//! immediately whenever the session transitions from unauthenticated to
//! authenticated.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time};
use tracing::{debug, warn};

use crate::{
    engine::CartSyncEngine,
    store::{RemoteCartStore, StockOracle},
};

/// Default time between reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to the background reconciliation task. Dropping it stops the task.
#[derive(Debug)]
pub struct ReconcileScheduler {
    handle: JoinHandle<()>,
}

impl ReconcileScheduler {
    /// Spawns the reconciliation task.
    ///
    /// `session` carries the ambient authentication state: `true` while a
    /// session is authenticated. The task sleeps while unauthenticated,
    /// reconciles immediately on every unauthenticated-to-authenticated
    /// transition and then once per `interval` tick. Reconciliation failures
    /// are logged and the schedule continues.
    pub fn spawn<S, O>(
        engine: Arc<CartSyncEngine<S, O>>,
        session: watch::Receiver<bool>,
        interval: Duration,
    ) -> Self
    where
        S: RemoteCartStore + 'static,
        O: StockOracle + 'static,
    {
        let handle = tokio::spawn(run(engine, session, interval));

        Self { handle }
    }
}

impl Drop for ReconcileScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<S, O>(
    engine: Arc<CartSyncEngine<S, O>>,
    mut session: watch::Receiver<bool>,
    interval: Duration,
) where
    S: RemoteCartStore,
    O: StockOracle,
{
    loop {
        // sleep until a session is authenticated
        while !*session.borrow_and_update() {
            if session.changed().await.is_err() {
                return;
            }
        }

        debug!("session authenticated; starting reconciliation schedule");
        reconcile(&engine).await;

        let mut ticker = time::interval(interval);
        // the first tick of a fresh interval completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    reconcile(&engine).await;
                }
                changed = session.changed() => {
                    match changed {
                        Err(_) => return,
                        Ok(()) => {
                            if !*session.borrow() {
                                debug!("session ended; pausing reconciliation");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn reconcile<S, O>(engine: &CartSyncEngine<S, O>)
where
    S: RemoteCartStore,
    O: StockOracle,
{
    if let Err(err) = engine.load_from_remote().await {
        warn!(error = %err, "scheduled cart reconciliation failed");
    }
}
