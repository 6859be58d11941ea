//! Coordinates and straight-line distance.

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Mean Earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// Creates a point, rejecting coordinates outside their valid ranges.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, ValidationError> {
        let point = Self {
            longitude,
            latitude,
        };
        point.validate()?;
        Ok(point)
    }

    /// Checks longitude ∈ [-180, 180] and latitude ∈ [-90, 90].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::CoordinateOutOfRange {
                axis: "longitude",
                value: self.longitude,
            });
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::CoordinateOutOfRange {
                axis: "latitude",
                value: self.latitude,
            });
        }
        Ok(())
    }

    /// Great-circle distance to `other`, in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_distance_m(self, other)
    }
}

/// Haversine distance between two points, in meters.
pub fn haversine_distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(-69.93, 18.47).is_ok());
        assert!(GeoPoint::new(180.0, 90.0).is_ok());
        assert_eq!(
            GeoPoint::new(-180.5, 0.0),
            Err(ValidationError::CoordinateOutOfRange {
                axis: "longitude",
                value: -180.5
            })
        );
        assert!(GeoPoint::new(0.0, 91.0).is_err());
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = GeoPoint::new(-69.9365, 18.4712).unwrap();
        assert_eq!(p.distance_m(&p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = GeoPoint::new(0.0, 0.0).unwrap();
        let b = GeoPoint::new(0.0, 1.0).unwrap();
        let d = haversine_distance_m(&a, &b);
        assert!((d - 111_195.0).abs() < 1.0, "got {d}");
    }

    #[test]
    fn short_urban_hop() {
        let pickup = GeoPoint::new(-69.9365, 18.4712).unwrap();
        let sample = GeoPoint::new(-69.9360, 18.4715).unwrap();
        let d = pickup.distance_m(&sample);
        assert!(d > 55.0 && d < 70.0, "got {d}");
        assert!((d - sample.distance_m(&pickup)).abs() < 1e-9);
    }
}
