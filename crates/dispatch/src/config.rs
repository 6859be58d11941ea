//! Dispatch tuning.

use std::time::Duration;

/// Parameters of the matcher and the waiting queue.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Drivers farther than this from the pickup are not considered.
    pub search_radius_m: f64,

    /// Drivers holding this many live deliveries are skipped.
    pub max_active_deliveries: usize,

    /// How long to wait before re-trying an order no driver could take.
    pub retry_delay: Duration,

    /// Orders taken from the waiting queue per reprocessing pass.
    pub queue_batch_size: usize,

    /// Straight-line speed used for pickup and delivery estimates.
    pub assumed_speed_kmh: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_radius_m: 15_000.0,
            max_active_deliveries: 1,
            retry_delay: Duration::from_secs(5 * 60),
            queue_batch_size: 10,
            assumed_speed_kmh: 25.0,
        }
    }
}
