//! Delivery dispatch.
//!
//! Matches ready orders with nearby drivers and follows each delivery through
//! to the driver's release:
//! 1. Find approved, online drivers around the merchant's pickup
//! 2. Rank them by proximity, rating and current load
//! 3. Bind the best one atomically, or defer the order for a later retry
//!
//! Drivers freed by a finished delivery are offered the waiting orders,
//! oldest first.

pub mod config;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod scheduler;
pub mod scoring;
pub mod service;

pub use config::DispatchConfig;
pub use directory::{DriverDirectory, StoreDriverDirectory};
pub use error::{DispatchError, Result};
pub use lifecycle::{DeliveryLifecycleHandler, mirrored_order_status};
pub use scheduler::{RetryQueue, RetryScheduler, ScheduledRetry, run_retry_worker};
pub use scoring::{Candidate, RankedCandidate};
pub use service::{AssignmentOutcome, AssignmentService, plan_delivery};
