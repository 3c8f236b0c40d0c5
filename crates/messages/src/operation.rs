//! Periodic operation broadcasts.

use crate::{InfoParams, StatusParams, StrategyParams};
use platoon_types::{PlatoonId, VehicleId};

/// Kind of operation broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Platoon summary, sent by leaders.
    Info,
    /// Vehicle kinematics, sent by every active vehicle.
    Status,
}

/// Parameters of an operation broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationParams {
    Info(InfoParams),
    Status(StatusParams),
}

impl OperationParams {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationParams::Info(_) => OperationKind::Info,
            OperationParams::Status(_) => OperationKind::Status,
        }
    }

    /// Widen into the generic strategy-parameter variant for encoding.
    pub fn to_strategy(&self) -> StrategyParams {
        match self {
            OperationParams::Info(info) => StrategyParams::Info(info.clone()),
            OperationParams::Status(status) => StrategyParams::Status(status.clone()),
        }
    }
}

/// Periodic status or platoon-info broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct MobilityOperation {
    /// Broadcasting vehicle.
    pub sender: VehicleId,
    /// Platoon the sender belongs to, `None` when not platooning.
    pub platoon_id: Option<PlatoonId>,
    /// Operation payload.
    pub params: OperationParams,
    /// Sender timestamp (ms).
    pub timestamp_ms: u64,
}

impl MobilityOperation {
    /// Vehicle status broadcast.
    pub fn status(
        sender: VehicleId,
        platoon_id: Option<PlatoonId>,
        params: StatusParams,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            sender,
            platoon_id,
            params: OperationParams::Status(params),
            timestamp_ms,
        }
    }

    /// Platoon summary broadcast.
    pub fn info(
        sender: VehicleId,
        platoon_id: Option<PlatoonId>,
        params: InfoParams,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            sender,
            platoon_id,
            params: OperationParams::Info(params),
            timestamp_ms,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.params.kind()
    }
}
