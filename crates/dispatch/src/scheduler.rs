//! Delayed re-attempts for orders no driver could take.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::AggregateId;
use document_store::DocumentStore;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;

use crate::directory::DriverDirectory;
use crate::error::{DispatchError, Result};
use crate::service::AssignmentService;

/// An order due for another assignment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRetry {
    pub order_id: AggregateId,
    pub due_at: Instant,
}

/// Sending half: hands deferred orders to the retry worker.
///
/// An order is scheduled at most once at a time; scheduling it again before
/// its retry fired is a no-op.
#[derive(Clone)]
pub struct RetryScheduler {
    sender: mpsc::UnboundedSender<ScheduledRetry>,
    pending: Arc<Mutex<HashSet<AggregateId>>>,
}

/// Receiving half, consumed by [`run_retry_worker`].
pub struct RetryQueue {
    receiver: mpsc::UnboundedReceiver<ScheduledRetry>,
    pending: Arc<Mutex<HashSet<AggregateId>>>,
}

impl RetryScheduler {
    pub fn channel() -> (RetryScheduler, RetryQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(HashSet::new()));
        (
            RetryScheduler {
                sender,
                pending: Arc::clone(&pending),
            },
            RetryQueue { receiver, pending },
        )
    }

    /// Schedules another attempt for `order_id` after `delay`. Returns false
    /// when one is already pending.
    pub async fn schedule(&self, order_id: AggregateId, delay: Duration) -> Result<bool> {
        let mut pending = self.pending.lock().await;
        if !pending.insert(order_id) {
            return Ok(false);
        }

        let retry = ScheduledRetry {
            order_id,
            due_at: Instant::now() + delay,
        };
        if self.sender.send(retry).is_err() {
            pending.remove(&order_id);
            return Err(DispatchError::SchedulerClosed);
        }
        metrics::counter!("assignment_retries_scheduled_total").increment(1);
        Ok(true)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Re-attempts deferred orders once their delay has elapsed, until
/// `shutdown` turns true or every scheduler is dropped.
///
/// Each retry waits in its own task, so a long delay never holds back a
/// shorter one scheduled after it.
pub async fn run_retry_worker<S, D>(
    service: Arc<AssignmentService<S, D>>,
    queue: RetryQueue,
    mut shutdown: watch::Receiver<bool>,
) where
    S: DocumentStore + Clone + 'static,
    D: DriverDirectory + 'static,
{
    let RetryQueue {
        mut receiver,
        pending,
    } = queue;
    tracing::info!("Assignment retry worker started");

    loop {
        tokio::select! {
            next = receiver.recv() => {
                let Some(retry) = next else { break };
                let service = Arc::clone(&service);
                let pending = Arc::clone(&pending);
                tokio::spawn(async move {
                    tokio::time::sleep_until(retry.due_at).await;
                    pending.lock().await.remove(&retry.order_id);
                    match service.assign_delivery_to_order(retry.order_id).await {
                        Ok(outcome) => tracing::info!(
                            order_id = %retry.order_id,
                            ?outcome,
                            "Deferred assignment retried"
                        ),
                        Err(err) => tracing::warn!(
                            order_id = %retry.order_id,
                            error = %err,
                            "Deferred assignment failed"
                        ),
                    }
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Assignment retry worker stopped");
}
