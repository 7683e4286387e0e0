//! Turns ledger page changes into queued operations.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use storyrunner_core::ledger::PageChange;

use super::operations::{Envelope, Operation};

/// Spawns the bridge. It ends when the page stops notifying or the
/// controller no longer accepts operations.
pub(crate) fn spawn(
    controller: mpsc::WeakUnboundedSender<Envelope>,
    mut changes: broadcast::Receiver<PageChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let change = match changes.recv().await {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ledger notifications dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(sender) = controller.upgrade() else {
                break;
            };
            debug!(key = %change.key, "ledger change observed");
            if sender
                .send(Envelope::new(Operation::LedgerNotification { change }))
                .is_err()
            {
                break;
            }
        }
        debug!("ledger notification bridge stopped");
    })
}
