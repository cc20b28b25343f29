//! Optional background sweep. Every state it touches would also be repaired on
//! the next access; the sweep only makes that happen sooner.

use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::services::{BankService, SwitchService};

const BATCH_SIZE: i64 = 50;

#[derive(Clone)]
pub enum Reconcilable {
    Switch(SwitchService),
    Bank(BankService),
}

impl Reconcilable {
    fn name(&self) -> &'static str {
        match self {
            Reconcilable::Switch(_) => "switch",
            Reconcilable::Bank(_) => "bank",
        }
    }

    pub async fn run_once(&self) -> Result<usize, crate::error::AppError> {
        match self {
            Reconcilable::Switch(service) => service.reconcile_pending(BATCH_SIZE).await,
            Reconcilable::Bank(service) => service.reconcile_pending(BATCH_SIZE).await,
        }
    }
}

/// Runs the reconciliation loop until the process exits.
pub async fn run_reconciler(target: Reconcilable, interval: Duration) {
    info!(service = target.name(), interval_secs = interval.as_secs(), "reconciler started");

    loop {
        match target.run_once().await {
            Ok(0) => debug!(service = target.name(), "nothing to reconcile"),
            Ok(delivered) => info!(service = target.name(), delivered, "reconciled notifications"),
            Err(e) => error!(service = target.name(), "reconcile batch error: {}", e),
        }

        sleep(interval).await;
    }
}
