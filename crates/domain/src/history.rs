//! Append-only status history shared by orders and deliveries.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// One accepted status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange<S> {
    pub status: S,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub actor: Option<UserId>,
    pub location: Option<GeoPoint>,
    /// True when the change was triggered by the system (e.g. geofencing)
    /// rather than requested by an actor.
    #[serde(default)]
    pub automatic: bool,
}

impl<S> StatusChange<S> {
    pub fn manual(
        status: S,
        description: impl Into<String>,
        actor: Option<UserId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            timestamp,
            description: description.into(),
            actor,
            location: None,
            automatic: false,
        }
    }

    pub fn automatic(
        status: S,
        description: impl Into<String>,
        location: Option<GeoPoint>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            timestamp,
            description: description.into(),
            actor: None,
            location,
            automatic: true,
        }
    }

    pub fn at(mut self, location: Option<GeoPoint>) -> Self {
        self.location = location;
        self
    }
}
