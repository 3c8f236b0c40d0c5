//! Straight test road.

use platoon_core::{GeoError, Georeference};
use platoon_types::{EcefPoint, RoutePosition};

/// A straight road starting at `origin` and running along the x axis.
///
/// Downtrack is the x offset from the origin, crosstrack the y offset.
/// Points before the origin or past the end of the road are off route.
#[derive(Debug, Clone, Copy)]
pub struct StraightRoad {
    origin: EcefPoint,
    length: f64,
}

impl StraightRoad {
    pub fn new(origin: EcefPoint, length: f64) -> Self {
        Self { origin, length }
    }

    /// ECEF point of a route position, without range checks.
    pub fn point(&self, downtrack: f64, crosstrack: f64) -> EcefPoint {
        EcefPoint::new(
            self.origin.x + downtrack,
            self.origin.y + crosstrack,
            self.origin.z,
        )
    }
}

impl Default for StraightRoad {
    fn default() -> Self {
        Self::new(EcefPoint::default(), 100_000.0)
    }
}

impl Georeference for StraightRoad {
    fn to_route(&self, point: &EcefPoint) -> Result<RoutePosition, GeoError> {
        if !point.is_finite() {
            return Err(GeoError::InvalidArgument(format!("{:?}", point)));
        }
        let downtrack = point.x - self.origin.x;
        if !(0.0..=self.length).contains(&downtrack) {
            return Err(GeoError::OffRoute(format!(
                "downtrack {:.1} outside [0, {}]",
                downtrack, self.length
            )));
        }
        Ok(RoutePosition::new(downtrack, point.y - self.origin.y))
    }

    fn to_ecef(&self, position: &RoutePosition) -> Result<EcefPoint, GeoError> {
        if !(0.0..=self.length).contains(&position.downtrack) {
            return Err(GeoError::OffRoute(format!(
                "downtrack {:.1} outside [0, {}]",
                position.downtrack, self.length
            )));
        }
        Ok(self.point(position.downtrack, position.crosstrack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection() {
        let road = StraightRoad::new(EcefPoint::new(1_000.0, 50.0, 7.0), 500.0);

        let position = road.to_route(&EcefPoint::new(1_120.0, 51.5, 7.0)).unwrap();
        assert_eq!(position, RoutePosition::new(120.0, 1.5));
        assert_eq!(
            road.to_ecef(&position).unwrap(),
            EcefPoint::new(1_120.0, 51.5, 7.0)
        );

        assert!(matches!(
            road.to_route(&EcefPoint::new(900.0, 50.0, 7.0)),
            Err(GeoError::OffRoute(_))
        ));
        assert!(matches!(
            road.to_route(&EcefPoint::new(f64::NAN, 0.0, 0.0)),
            Err(GeoError::InvalidArgument(_))
        ));
    }
}
