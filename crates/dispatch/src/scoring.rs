//! Candidate ranking.
//!
//! A candidate's score weighs proximity at 40% and rating at 60%, both on a
//! 0 to 100 scale, minus 10 points per delivery the driver is already
//! carrying:
//!
//! ```text
//! 0.4 * (1 - distance / radius) * 100 + 0.6 * rating * 20 - 10 * active
//! ```

use common::UserId;
use domain::GeoPoint;

const DISTANCE_WEIGHT: f64 = 0.4;
const RATING_WEIGHT: f64 = 0.6;
const ACTIVE_DELIVERY_PENALTY: f64 = 10.0;

/// An approved, online driver near a pickup.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub driver_id: UserId,
    pub location: GeoPoint,
    pub distance_m: f64,
    pub rating: f64,
    pub active_deliveries: usize,
}

/// A candidate with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

pub fn score(distance_m: f64, max_radius_m: f64, rating: f64, active_deliveries: usize) -> f64 {
    let proximity = if max_radius_m > 0.0 {
        (1.0 - distance_m / max_radius_m).clamp(0.0, 1.0)
    } else {
        0.0
    };
    DISTANCE_WEIGHT * proximity * 100.0 + RATING_WEIGHT * rating * 20.0
        - ACTIVE_DELIVERY_PENALTY * active_deliveries as f64
}

/// Scores `candidates` and orders them best first. Ties go to the nearer
/// driver.
pub fn rank(candidates: Vec<Candidate>, max_radius_m: f64) -> Vec<RankedCandidate> {
    let mut ranked: Vec<_> = candidates
        .into_iter()
        .map(|candidate| RankedCandidate {
            score: score(
                candidate.distance_m,
                max_radius_m,
                candidate.rating,
                candidate.active_deliveries,
            ),
            candidate,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.candidate.distance_m.total_cmp(&b.candidate.distance_m))
    });
    ranked
}
