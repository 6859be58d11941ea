//! Post-commit side effects.

mod notifications;
mod realtime;
mod stats;

pub use notifications::{
    InMemoryNotificationGateway, Notification, NotificationGateway, NotificationHandler,
};
pub use realtime::{RealtimeHandler, RealtimeUpdate};
pub use stats::StatsHandler;
