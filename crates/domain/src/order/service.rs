//! Order service providing a simplified API for order operations.

use chrono::Utc;
use common::AggregateId;
use document_store::DocumentStore;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::repository::{CommandResult, Repository};
use crate::transaction;

use super::{Order, OrderStatus, PlaceOrder, PricingPolicy, UpdateOrderStatus};

/// Service for managing orders.
///
/// Status updates are conditioned on the version read (or the version the
/// caller supplies) and are never retried here: a conflict goes back to the
/// caller, whose intended target status may itself be stale.
pub struct OrderService<S: DocumentStore> {
    repository: Repository<S, Order>,
    pricing: PricingPolicy,
}

impl<S: DocumentStore + Clone> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            pricing: self.pricing.clone(),
        }
    }
}

impl<S: DocumentStore + Clone> OrderService<S> {
    /// Creates a new order service with the default pricing policy.
    pub fn new(store: S) -> Self {
        Self {
            repository: Repository::new(store),
            pricing: PricingPolicy::default(),
        }
    }

    /// Replaces the pricing policy applied at checkout.
    pub fn with_pricing(mut self, pricing: PricingPolicy) -> Self {
        self.pricing = pricing;
        self
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &Repository<S, Order> {
        &self.repository
    }

    /// Places an order from the customer's cart and empties the cart in the
    /// same commit.
    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<Order, DomainError> {
        let order =
            transaction::create_order_and_clear_cart(self.repository.store(), cmd, &self.pricing)
                .await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            order_number = order.order_number(),
            total = %order.total(),
            "Order placed"
        );
        Ok(order)
    }

    /// Loads an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.repository.get(order_id).await
    }

    /// Moves an order to a new status.
    ///
    /// Fails with `ConcurrencyConflict` if another writer advanced the order
    /// first; the caller must re-read and resubmit.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, status = %cmd.status))]
    pub async fn update_status(
        &self,
        cmd: UpdateOrderStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        let UpdateOrderStatus {
            order_id,
            status,
            description,
            actor,
            expected_version,
        } = cmd;

        let result = self
            .repository
            .execute(order_id, expected_version, |order| {
                order.update_status(status, description, actor, Utc::now())
            })
            .await;

        match &result {
            Ok(done) => tracing::info!(new_version = %done.new_version, "Order status updated"),
            Err(err) if err.is_conflict() => {
                metrics::counter!("order_status_conflicts_total").increment(1);
                tracing::warn!(error = %err, "Order status update lost a version race");
            }
            Err(_) => {}
        }
        result
    }

    /// Ready orders without a driver, oldest first.
    pub async fn ready_unassigned(&self, limit: usize) -> Result<Vec<Order>, DomainError> {
        self.repository
            .find(
                serde_json::json!({ "status": OrderStatus::Ready, "driver_id": null }),
                Some(limit),
            )
            .await
    }
}
