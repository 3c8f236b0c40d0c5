//! Position types exchanged with the georeference collaborator.

use serde::{Deserialize, Serialize};

/// Earth-centred, earth-fixed point in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EcefPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EcefPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Position relative to the shared route reference line.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutePosition {
    /// Longitudinal distance along the route (m).
    pub downtrack: f64,
    /// Signed lateral offset from the reference line (m).
    pub crosstrack: f64,
}

impl RoutePosition {
    pub fn new(downtrack: f64, crosstrack: f64) -> Self {
        Self {
            downtrack,
            crosstrack,
        }
    }
}
