//! All-or-nothing units of work spanning several aggregates.
//!
//! A [`Transaction`] stages every write and outbox event in memory and hands
//! them to the store as one [`WriteBatch`] on commit. Reads inside the unit
//! see the unit's own staged writes. [`with_transaction`] re-runs the whole
//! unit from scratch when the commit loses a version race or hits a transient
//! store failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{AggregateId, UserId};
use document_store::{CommitReceipt, DocumentStore, EventEnvelope, Version, Write, WriteBatch};
use tokio::sync::Mutex;

use crate::aggregate::Aggregate;
use crate::cart::Cart;
use crate::error::DomainError;
use crate::order::{Order, PlaceOrder, PricingPolicy};
use crate::repository::{build_envelopes, decode_document, encode_document};
use crate::retry::{RetryError, RetryPolicy, retry_when};
use crate::tracking::{DeliveryTracking, TrackingEvent};
use crate::user::{User, UserError};
use crate::validation::ValidationError;

#[derive(Debug, Default)]
struct Staged {
    writes: Vec<Write>,
    events: Vec<EventEnvelope>,
}

impl Staged {
    fn find(&self, id: AggregateId) -> Option<&Write> {
        self.writes.iter().find(|w| w.document_id() == id)
    }

    fn take(&mut self, id: AggregateId) -> Option<Write> {
        let index = self.writes.iter().position(|w| w.document_id() == id)?;
        Some(self.writes.remove(index))
    }
}

/// A unit of work over one store. Cheap to clone; clones share the staged
/// writes.
#[derive(Clone)]
pub struct Transaction<S> {
    store: S,
    staged: Arc<Mutex<Staged>>,
}

impl<S: DocumentStore> Transaction<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            staged: Arc::new(Mutex::new(Staged::default())),
        }
    }

    /// Reads an aggregate, preferring this unit's staged version of it.
    pub async fn load<A: Aggregate>(&self, id: AggregateId) -> Result<Option<A>, DomainError> {
        {
            let staged = self.staged.lock().await;
            if let Some(write) = staged.find(id) {
                let document = match write {
                    Write::Insert(document) | Write::Update { document, .. } => document,
                };
                return decode_document(document);
            }
        }

        match self.store.get(id).await? {
            Some(document) => decode_document(&document),
            None => Ok(None),
        }
    }

    /// Reads an aggregate, failing with `AggregateNotFound` if it doesn't exist.
    pub async fn get<A: Aggregate>(&self, id: AggregateId) -> Result<A, DomainError> {
        self.load(id).await?.ok_or(DomainError::AggregateNotFound {
            aggregate_type: A::aggregate_type(),
            aggregate_id: id,
        })
    }

    /// Stages a new aggregate at version 0.
    pub async fn insert<A: Aggregate>(
        &self,
        aggregate: &mut A,
        events: &[A::Event],
    ) -> Result<(), DomainError> {
        aggregate.set_version(Version::initial());
        let document = encode_document(aggregate)?;
        let envelopes = build_envelopes(aggregate, events)?;

        let mut staged = self.staged.lock().await;
        staged.take(aggregate.id());
        staged.writes.push(Write::Insert(document));
        staged.events.extend(envelopes);
        Ok(())
    }

    /// Stages a change to an aggregate, conditioned on the version it was
    /// first read at. Nothing is staged when `events` is empty.
    ///
    /// Updating an aggregate this unit already staged keeps the original
    /// condition, so the store still sees a single write per document.
    pub async fn update<A: Aggregate>(
        &self,
        aggregate: &mut A,
        events: &[A::Event],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut staged = self.staged.lock().await;
        let id = aggregate.id();
        let previous = staged.take(id);
        let write = match previous {
            Some(Write::Insert(_)) => {
                aggregate.set_version(Version::initial());
                Write::Insert(encode_document(aggregate)?)
            }
            Some(Write::Update {
                expected_version, ..
            }) => {
                aggregate.set_version(expected_version.next());
                Write::Update {
                    document: encode_document(aggregate)?,
                    expected_version,
                }
            }
            None => {
                let expected_version = aggregate.version();
                aggregate.set_version(expected_version.next());
                Write::Update {
                    document: encode_document(aggregate)?,
                    expected_version,
                }
            }
        };
        staged.events.extend(build_envelopes(aggregate, events)?);
        staged.writes.push(write);
        Ok(())
    }

    /// Number of documents staged so far.
    pub async fn staged_writes(&self) -> usize {
        self.staged.lock().await.writes.len()
    }

    /// Commits every staged write and event atomically.
    pub async fn commit(self) -> Result<CommitReceipt, DomainError> {
        let staged = std::mem::take(&mut *self.staged.lock().await);
        if staged.writes.is_empty() && staged.events.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let batch = WriteBatch {
            writes: staged.writes,
            events: staged.events,
        };
        let receipt = self.store.commit(batch).await?;
        tracing::debug!(documents = receipt.versions.len(), "Transaction committed");
        Ok(receipt)
    }
}

/// Runs `work` as one all-or-nothing unit.
///
/// `work` receives a fresh [`Transaction`] on every attempt and must do all
/// its reads through it. When the commit conflicts or hits a transient
/// failure, the unit is re-run from scratch, up to `policy.max_attempts`
/// times. Any other error aborts with nothing written.
pub async fn with_transaction<S, T, F, Fut>(
    store: &S,
    policy: &RetryPolicy,
    work: F,
) -> Result<T, DomainError>
where
    S: DocumentStore + Clone,
    F: Fn(Transaction<S>) -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let retryable = |err: &DomainError| err.is_conflict() || err.is_transient();
    retry_when(policy, retryable, || run_once(store, &work))
        .await
        .map_err(|err| exhausted("transaction", err))
}

async fn run_once<S, T, F, Fut>(store: &S, work: &F) -> Result<T, DomainError>
where
    S: DocumentStore + Clone,
    F: Fn(Transaction<S>) -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let tx = Transaction::new(store.clone());
    let value = work(tx.clone()).await?;
    tx.commit().await?;
    Ok(value)
}

/// Retries `op` while it fails with a transient infrastructure error.
///
/// Makes up to `max_retries + 1` attempts, waiting `base_delay * 2^attempt`
/// between them. Other errors are returned immediately.
pub async fn with_retry<T, F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    op: F,
) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let policy = RetryPolicy::exponential(max_retries.saturating_add(1), base_delay);
    retry_when(&policy, DomainError::is_transient, op)
        .await
        .map_err(|err| exhausted("with_retry", err))
}

fn exhausted(operation: &'static str, err: RetryError<DomainError>) -> DomainError {
    match err {
        RetryError::Exhausted { attempts, last } => {
            tracing::warn!(operation, attempts, error = %last, "Retries exhausted");
            DomainError::RetriesExhausted {
                operation,
                attempts,
                last: Box::new(last),
            }
        }
        RetryError::Permanent(err) => err,
    }
}

/// Places an order from the customer's cart and empties the cart, in one
/// commit. A failure at any step leaves the cart as it was.
pub async fn create_order_and_clear_cart<S>(
    store: &S,
    cmd: PlaceOrder,
    pricing: &PricingPolicy,
) -> Result<Order, DomainError>
where
    S: DocumentStore + Clone,
{
    with_transaction(store, &RetryPolicy::transaction(), |tx| {
        let cmd = cmd.clone();
        async move {
            let mut cart: Cart = tx
                .load(Cart::id_for(cmd.customer_id))
                .await?
                .ok_or(ValidationError::EmptyCart)?;
            let merchant_id = cart.merchant_id().ok_or(ValidationError::EmptyCart)?;
            let merchant: User = tx.load(merchant_id.as_aggregate_id()).await?.ok_or(
                DomainError::ReferentialIntegrity {
                    entity: "merchant",
                    id: merchant_id.as_aggregate_id(),
                },
            )?;
            if merchant.as_merchant().is_none() {
                return Err(UserError::NotAMerchant(merchant_id).into());
            }

            let now = Utc::now();
            let (mut order, events) = Order::place(
                AggregateId::new(),
                &cart,
                cmd.delivery,
                cmd.payment_method,
                pricing,
                now,
            )?;
            tx.insert(&mut order, &events).await?;

            let cleared = cart.clear(now);
            tx.update(&mut cart, &cleared).await?;
            Ok(order)
        }
    })
    .await
}

/// What an assignment transaction wrote.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub order: Order,
    pub tracking: DeliveryTracking,
    pub driver: User,
}

/// Binds `driver_id` to a ready order, opens its tracking and takes the
/// driver offline, in one commit.
///
/// The order is re-read inside the unit; if a concurrent assignment already
/// bound a driver this fails with `DuplicateAssignment`. `build_tracking`
/// receives the order (already bound), its merchant and the driver.
pub async fn assign_delivery_person<S, B>(
    store: &S,
    order_id: AggregateId,
    driver_id: UserId,
    build_tracking: B,
) -> Result<Assignment, DomainError>
where
    S: DocumentStore + Clone,
    B: Fn(&Order, &User, &User) -> Result<(DeliveryTracking, Vec<TrackingEvent>), DomainError>,
{
    let build_tracking = &build_tracking;
    with_transaction(store, &RetryPolicy::transaction(), move |tx| async move {
        let mut order: Order = tx
            .load(order_id)
            .await?
            .ok_or(DomainError::ReferentialIntegrity {
                entity: "order",
                id: order_id,
            })?;
        if order.driver_id().is_some() {
            return Err(DomainError::DuplicateAssignment { order_id });
        }

        let mut driver: User = tx
            .load(driver_id.as_aggregate_id())
            .await?
            .ok_or(DomainError::DriverUnavailable { driver_id })?;
        let ready = driver
            .as_driver()
            .is_some_and(|profile| profile.approved && profile.available);
        if !ready {
            return Err(DomainError::DriverUnavailable { driver_id });
        }

        let merchant_id = order.merchant_id().as_aggregate_id();
        let merchant: User = tx
            .load(merchant_id)
            .await?
            .ok_or(DomainError::ReferentialIntegrity {
                entity: "merchant",
                id: merchant_id,
            })?;

        let now = Utc::now();
        let order_events = order.assign_driver(driver_id, now)?;
        let (mut tracking, tracking_events) = build_tracking(&order, &merchant, &driver)?;
        let driver_events = driver.set_availability(false, now)?;

        tx.update(&mut order, &order_events).await?;
        tx.insert(&mut tracking, &tracking_events).await?;
        tx.update(&mut driver, &driver_events).await?;

        Ok(Assignment {
            order,
            tracking,
            driver,
        })
    })
    .await
}
