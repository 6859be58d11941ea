//! Outbox processor for feeding committed events to handlers.

use std::sync::Arc;
use std::time::Duration;

use document_store::{DocumentStore, EventEnvelope};
use tokio::sync::{Mutex, watch};

use crate::Result;
use crate::handler::OutboxHandler;

const DEFAULT_BATCH_SIZE: usize = 100;

/// Reads committed, unacknowledged events from the outbox and delivers each
/// one to every registered handler.
///
/// The processor supports:
/// - Drain: delivers every pending event, acknowledging each in the store
/// - Run: drains on a fixed interval until shutdown is signalled
///
/// Progress lives in the store, not in the processor: a processor built after
/// a restart resumes with the first unacknowledged event, and an event whose
/// transaction committed after a higher sequence was delivered is still
/// picked up. An event is acknowledged once its handlers ran, so a crash in
/// between delivers that one event again. A failing handler is skipped for
/// that event; the drain continues.
///
/// One processor drains a store at a time.
pub struct OutboxProcessor<S: DocumentStore> {
    store: S,
    handlers: Vec<Arc<dyn OutboxHandler>>,
    drain: Mutex<()>,
    batch_size: usize,
}

impl<S: DocumentStore> OutboxProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: Vec::new(),
            drain: Mutex::new(()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Registers a handler with this processor.
    pub fn register(&mut self, handler: Arc<dyn OutboxHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Delivers every pending event and returns how many were delivered.
    ///
    /// Concurrent calls are serialized, so an event is never handed to the
    /// handlers twice by one processor.
    #[tracing::instrument(skip(self))]
    pub async fn process_pending(&self) -> Result<usize> {
        let _drain = self.drain.lock().await;
        let mut processed = 0;

        loop {
            let events = self.store.outbox_pending(self.batch_size).await?;
            let fetched = events.len();

            for event in &events {
                self.dispatch(event).await;
                self.store.outbox_acknowledge(event.event_id).await?;
                processed += 1;
            }

            if fetched < self.batch_size {
                break;
            }
        }

        if processed > 0 {
            tracing::debug!(processed, "Outbox drained");
        }
        Ok(processed)
    }

    async fn dispatch(&self, event: &EventEnvelope) {
        for handler in &self.handlers {
            if let Err(err) = handler.handle(event).await {
                tracing::warn!(
                    handler = handler.name(),
                    event_type = %event.event_type,
                    sequence = event.sequence,
                    error = %err,
                    "Outbox handler failed"
                );
                metrics::counter!("outbox_handler_failures_total", "handler" => handler.name())
                    .increment(1);
            }
        }
        metrics::counter!("outbox_events_processed_total").increment(1);
    }

    /// Drains the outbox every `poll_interval` until `shutdown` turns true or
    /// its sender is dropped.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            handlers = self.handlers.len(),
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Outbox processor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.process_pending().await {
                        tracing::warn!(error = %err, "Outbox drain failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Outbox processor stopped");
    }
}
