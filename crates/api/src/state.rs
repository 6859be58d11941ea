//! Shared application state and background workers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch::{
    AssignmentService, DeliveryLifecycleHandler, DispatchConfig, RetryQueue, RetryScheduler,
    StoreDriverDirectory,
};
use document_store::DocumentStore;
use domain::{CartService, OrderService, TrackingService, UserService};
use outbox::{
    Notification, NotificationGateway, NotificationHandler, OutboxProcessor, RealtimeHandler,
    StatsHandler,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Assignment service over the store-backed driver directory.
pub type Assignments<S> = AssignmentService<S, StoreDriverDirectory<S>>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: DocumentStore> {
    pub orders: OrderService<S>,
    pub trackings: TrackingService<S>,
    pub users: UserService<S>,
    pub carts: CartService<S>,
    pub assignments: Arc<Assignments<S>>,
    pub realtime: RealtimeHandler,
    pub store: S,
}

impl<S: DocumentStore + Clone + 'static> AppState<S> {
    /// Builds the services over `store`. The returned queue feeds
    /// [`spawn_workers`] with deferred assignments.
    pub fn new(store: S, dispatch: DispatchConfig) -> (Arc<Self>, RetryQueue) {
        let (scheduler, queue) = RetryScheduler::channel();
        let assignments = AssignmentService::new(
            store.clone(),
            StoreDriverDirectory::new(store.clone()),
            dispatch,
        )
        .with_scheduler(scheduler);

        let state = Arc::new(Self {
            orders: OrderService::new(store.clone()),
            trackings: TrackingService::new(store.clone()),
            users: UserService::new(store.clone()),
            carts: CartService::new(store.clone()),
            assignments: Arc::new(assignments),
            realtime: RealtimeHandler::new(1024),
            store,
        });
        (state, queue)
    }

    /// An outbox processor with every post-commit handler registered.
    pub fn outbox_processor<G>(&self, gateway: G) -> OutboxProcessor<S>
    where
        G: NotificationGateway + 'static,
    {
        let mut processor = OutboxProcessor::new(self.store.clone());
        processor.register(Arc::new(DeliveryLifecycleHandler::new(
            self.store.clone(),
            Arc::clone(&self.assignments),
        )));
        processor.register(Arc::new(StatsHandler::new(self.store.clone())));
        processor.register(Arc::new(NotificationHandler::new(gateway)));
        processor.register(Arc::new(self.realtime.clone()));
        processor
    }
}

/// Starts the outbox drain loop and the deferred-assignment worker. Both stop
/// once `shutdown` turns true.
pub fn spawn_workers<S: DocumentStore + Clone + 'static>(
    state: &AppState<S>,
    queue: RetryQueue,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let processor = state.outbox_processor(LogNotificationGateway);
    let outbox_shutdown = shutdown.clone();
    vec![
        tokio::spawn(async move { processor.run(poll_interval, outbox_shutdown).await }),
        tokio::spawn(dispatch::run_retry_worker(
            Arc::clone(&state.assignments),
            queue,
            shutdown,
        )),
    ]
}

/// Push gateway that writes each notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationGateway;

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn send(&self, notification: Notification) -> outbox::Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            order_id = %notification.order_id,
            title = %notification.title,
            body = %notification.body,
            "Push notification"
        );
        Ok(())
    }
}
