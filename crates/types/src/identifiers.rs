//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters reserved by the strategy-parameter grammar.
///
/// Identifiers carried inside strategy parameters must not contain any of
/// these, otherwise the encoded string would not parse back.
pub const RESERVED_CHARS: [char; 3] = ['|', ',', ':'];

/// Broadcast identity of a vehicle (its static id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub String);

impl VehicleId {
    /// Create a new vehicle id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the id can be embedded in strategy parameters.
    pub fn is_wire_safe(&self) -> bool {
        !self.0.is_empty() && !self.0.contains(RESERVED_CHARS)
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of one negotiation plan (request and its response share it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub String);

impl PlanId {
    /// Create a new plan id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a plan id from the issuing vehicle and a local sequence number.
    ///
    /// Plan ids only need to be unique per issuer, so `<vehicle>-<seq>` is
    /// enough and keeps simulation runs reproducible.
    pub fn derive(issuer: &VehicleId, seq: u64) -> Self {
        Self(format!("{}-{}", issuer, seq))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plan({})", self.0)
    }
}

/// Identifier of a platoon.
///
/// Minted by the vehicle that forms the platoon and kept across leadership
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatoonId(pub String);

impl PlatoonId {
    /// Create a new platoon id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a platoon id for a platoon formed by `founder`.
    pub fn mint(founder: &VehicleId, seq: u64) -> Self {
        Self(format!("platoon-{}-{}", founder, seq))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatoonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
