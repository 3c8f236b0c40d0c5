//! Transport records and message-level encoding.
//!
//! The transport delivers coordination messages as plain records whose
//! strategy parameters are still strings. [`decode`] turns such a record into
//! a typed [`CoordinationMessage`], rejecting anything that does not follow
//! the grammar; [`encode`] is its inverse.
//!
//! # Channels
//!
//! Each message kind travels on its own topic-like channel:
//!
//! ```text
//! platooning/request    MobilityRequest
//! platooning/response   MobilityResponse
//! platooning/operation  MobilityOperation
//! ```

use crate::{
    params, CodecError, CoordinationMessage, MobilityOperation, MobilityRequest, MobilityResponse,
    OperationParams, StrategyParams,
};
use platoon_types::{EcefPoint, PlanId, PlanType, PlatoonId, VehicleId};
use serde::{Deserialize, Serialize};

/// Strategy name carried by every platooning operation.
pub const PLATOONING_STRATEGY: &str = "platooning";

/// Header shared by all transport records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MobilityHeader {
    pub sender_id: String,
    /// Empty for broadcasts.
    pub recipient_id: String,
    /// Plan id for requests and responses, platoon id for operations.
    pub plan_id: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRequest {
    pub header: MobilityHeader,
    pub plan_type: PlanType,
    pub strategy_params: String,
    pub location: EcefPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    pub header: MobilityHeader,
    pub is_accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOperation {
    pub header: MobilityHeader,
    pub strategy: String,
    pub strategy_params: String,
}

/// A coordination message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawMessage {
    Request(RawRequest),
    Response(RawResponse),
    Operation(RawOperation),
}

impl RawMessage {
    pub fn header(&self) -> &MobilityHeader {
        match self {
            RawMessage::Request(r) => &r.header,
            RawMessage::Response(r) => &r.header,
            RawMessage::Operation(o) => &o.header,
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            RawMessage::Request(_) => Channel::Request,
            RawMessage::Response(_) => Channel::Response,
            RawMessage::Operation(_) => Channel::Operation,
        }
    }
}

/// Topic-like channel a message travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Request,
    Response,
    Operation,
}

impl Channel {
    pub fn topic(&self) -> &'static str {
        match self {
            Channel::Request => "platooning/request",
            Channel::Response => "platooning/response",
            Channel::Operation => "platooning/operation",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.topic())
    }
}

/// Decode a transport record into a typed coordination message.
pub fn decode(raw: &RawMessage) -> Result<CoordinationMessage, CodecError> {
    match raw {
        RawMessage::Request(request) => decode_request(request).map(CoordinationMessage::Request),
        RawMessage::Response(response) => {
            decode_response(response).map(CoordinationMessage::Response)
        }
        RawMessage::Operation(operation) => {
            decode_operation(operation).map(CoordinationMessage::Operation)
        }
    }
}

/// Encode a typed coordination message into a transport record.
pub fn encode(message: &CoordinationMessage) -> RawMessage {
    match message {
        CoordinationMessage::Request(request) => RawMessage::Request(RawRequest {
            header: MobilityHeader {
                sender_id: request.sender.to_string(),
                recipient_id: request
                    .recipient
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
                plan_id: request.plan_id.as_str().to_string(),
                timestamp_ms: request.timestamp_ms,
            },
            plan_type: request.plan_type,
            strategy_params: params::encode(&request.params),
            location: request.location,
        }),
        CoordinationMessage::Response(response) => RawMessage::Response(RawResponse {
            header: MobilityHeader {
                sender_id: response.sender.to_string(),
                recipient_id: response.recipient.to_string(),
                plan_id: response.plan_id.as_str().to_string(),
                timestamp_ms: response.timestamp_ms,
            },
            is_accepted: response.accepted,
        }),
        CoordinationMessage::Operation(operation) => RawMessage::Operation(RawOperation {
            header: MobilityHeader {
                sender_id: operation.sender.to_string(),
                recipient_id: String::new(),
                plan_id: operation
                    .platoon_id
                    .as_ref()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default(),
                timestamp_ms: operation.timestamp_ms,
            },
            strategy: PLATOONING_STRATEGY.to_string(),
            strategy_params: params::encode(&operation.params.to_strategy()),
        }),
    }
}

fn decode_request(raw: &RawRequest) -> Result<MobilityRequest, CodecError> {
    let sender = identifier("sender_id", &raw.header.sender_id)?;
    let plan_id = plan_id(&raw.header.plan_id)?;
    let params = params::decode(&raw.strategy_params)?;

    let expected = MobilityRequest::expected_tag(raw.plan_type);
    if params.tag() != expected {
        return Err(CodecError::ParamsMismatch {
            context: raw.plan_type.as_str(),
            expected,
            actual: params.tag(),
        });
    }

    if !raw.location.is_finite() {
        return Err(CodecError::InvalidNumber {
            key: "location",
            value: format!("{:?}", raw.location),
        });
    }

    Ok(MobilityRequest {
        sender,
        recipient: optional_identifier("recipient_id", &raw.header.recipient_id)?,
        plan_id,
        plan_type: raw.plan_type,
        params,
        location: raw.location,
        timestamp_ms: raw.header.timestamp_ms,
    })
}

fn decode_response(raw: &RawResponse) -> Result<MobilityResponse, CodecError> {
    Ok(MobilityResponse {
        sender: identifier("sender_id", &raw.header.sender_id)?,
        recipient: identifier("recipient_id", &raw.header.recipient_id)?,
        plan_id: plan_id(&raw.header.plan_id)?,
        accepted: raw.is_accepted,
        timestamp_ms: raw.header.timestamp_ms,
    })
}

fn decode_operation(raw: &RawOperation) -> Result<MobilityOperation, CodecError> {
    if raw.strategy != PLATOONING_STRATEGY {
        return Err(CodecError::ForeignStrategy(raw.strategy.clone()));
    }

    let sender = identifier("sender_id", &raw.header.sender_id)?;
    let params = match params::decode(&raw.strategy_params)? {
        StrategyParams::Info(info) => OperationParams::Info(info),
        StrategyParams::Status(status) => OperationParams::Status(status),
        other => {
            return Err(CodecError::ParamsMismatch {
                context: "Operation",
                expected: "INFO or STATUS",
                actual: other.tag(),
            })
        }
    };

    let platoon_id = if raw.header.plan_id.is_empty() {
        None
    } else {
        Some(PlatoonId::new(raw.header.plan_id.clone()))
    };

    Ok(MobilityOperation {
        sender,
        platoon_id,
        params,
        timestamp_ms: raw.header.timestamp_ms,
    })
}

/// Vehicle ids end up inside strategy parameters, so they must be wire safe.
fn identifier(key: &'static str, value: &str) -> Result<VehicleId, CodecError> {
    let id = VehicleId::new(value);
    if !id.is_wire_safe() {
        return Err(CodecError::InvalidIdentifier {
            key,
            value: value.to_string(),
        });
    }
    Ok(id)
}

fn optional_identifier(key: &'static str, value: &str) -> Result<Option<VehicleId>, CodecError> {
    if value.is_empty() {
        Ok(None)
    } else {
        identifier(key, value).map(Some)
    }
}

fn plan_id(value: &str) -> Result<PlanId, CodecError> {
    if value.is_empty() {
        return Err(CodecError::InvalidIdentifier {
            key: "plan_id",
            value: value.to_string(),
        });
    }
    Ok(PlanId::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InfoParams, JoinParams, StatusParams};

    fn status() -> StatusParams {
        StatusParams {
            command_speed: 11.0,
            downtrack: 120.5,
            speed: 10.75,
        }
    }

    #[test]
    fn test_request_round_trip() {
        let request = MobilityRequest::join(
            VehicleId::from("follower"),
            VehicleId::from("leader"),
            PlanId::new("follower-1"),
            JoinParams {
                size: 1,
                speed: 0.0,
                downtrack: 11.5599,
            },
            EcefPoint::new(1.0, 2.0, 3.0),
            42,
        );
        let message = CoordinationMessage::Request(request);

        let raw = encode(&message);
        let RawMessage::Request(raw_request) = &raw else {
            panic!("Expected a request record");
        };
        assert_eq!(raw_request.strategy_params, "JOIN|SIZE:1,SPEED:0,DTD:11.5599");
        assert_eq!(raw.channel(), Channel::Request);

        assert_eq!(decode(&raw).unwrap(), message);
    }

    #[test]
    fn test_broadcast_request_has_no_recipient() {
        let request = MobilityRequest::claim_leadership(
            VehicleId::from("v2"),
            PlanId::new("v2-9"),
            status(),
            EcefPoint::default(),
            7,
        );
        let raw = encode(&CoordinationMessage::Request(request.clone()));
        assert!(raw.header().recipient_id.is_empty());

        let decoded = decode(&raw).unwrap();
        let CoordinationMessage::Request(decoded) = decoded else {
            panic!("Expected a request");
        };
        assert_eq!(decoded.recipient, None);
        assert!(decoded.is_for(&VehicleId::from("anyone")));
    }

    #[test]
    fn test_operation_round_trip() {
        let info = MobilityOperation::info(
            VehicleId::from("leader"),
            Some(PlatoonId::new("platoon-leader-1")),
            InfoParams {
                rear: VehicleId::from("rear"),
                length: 24.0,
                speed: 12.5,
                size: 3,
            },
            100,
        );
        let message = CoordinationMessage::Operation(info);
        assert_eq!(decode(&encode(&message)).unwrap(), message);

        let lone = MobilityOperation::status(VehicleId::from("lone"), None, status(), 5);
        let raw = encode(&CoordinationMessage::Operation(lone.clone()));
        assert!(raw.header().plan_id.is_empty());
        assert_eq!(
            decode(&raw).unwrap(),
            CoordinationMessage::Operation(lone)
        );
    }

    #[test]
    fn test_response_round_trip() {
        let request = MobilityRequest::join(
            VehicleId::from("a"),
            VehicleId::from("b"),
            PlanId::new("a-1"),
            JoinParams {
                size: 1,
                speed: 5.0,
                downtrack: 10.0,
            },
            EcefPoint::default(),
            1,
        );
        let response = MobilityResponse::answer(&request, VehicleId::from("b"), true, 2);
        assert_eq!(response.recipient, VehicleId::from("a"));
        assert_eq!(response.plan_id, request.plan_id);

        let message = CoordinationMessage::Response(response);
        assert_eq!(decode(&encode(&message)).unwrap(), message);
    }

    #[test]
    fn test_params_must_match_plan_type() {
        let raw = RawMessage::Request(RawRequest {
            header: MobilityHeader {
                sender_id: "a".into(),
                recipient_id: "b".into(),
                plan_id: "a-1".into(),
                timestamp_ms: 0,
            },
            plan_type: PlanType::JoinPlatoonAtRear,
            strategy_params: "STATUS|CMDSPEED:1,DTD:4,SPEED:2".into(),
            location: EcefPoint::default(),
        });
        assert!(matches!(
            decode(&raw),
            Err(CodecError::ParamsMismatch {
                expected: "JOIN",
                actual: "STATUS",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_foreign_strategy_and_missing_ids() {
        let foreign = RawMessage::Operation(RawOperation {
            header: MobilityHeader {
                sender_id: "a".into(),
                ..Default::default()
            },
            strategy: "intersection".into(),
            strategy_params: "STATUS|CMDSPEED:1,DTD:4,SPEED:2".into(),
        });
        assert!(matches!(
            decode(&foreign),
            Err(CodecError::ForeignStrategy(_))
        ));

        let anonymous = RawMessage::Response(RawResponse {
            header: MobilityHeader {
                recipient_id: "b".into(),
                plan_id: "b-1".into(),
                ..Default::default()
            },
            is_accepted: true,
        });
        assert!(matches!(
            decode(&anonymous),
            Err(CodecError::InvalidIdentifier {
                key: "sender_id",
                ..
            })
        ));

        let join_as_operation = RawMessage::Operation(RawOperation {
            header: MobilityHeader {
                sender_id: "a".into(),
                ..Default::default()
            },
            strategy: PLATOONING_STRATEGY.into(),
            strategy_params: "JOIN|SIZE:1,SPEED:0,DTD:3".into(),
        });
        assert!(matches!(
            decode(&join_as_operation),
            Err(CodecError::ParamsMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_ids_with_reserved_characters() {
        for (sender, recipient) in [("x,y", "b"), ("a:b", "b"), ("a", "b|c")] {
            let raw = RawMessage::Response(RawResponse {
                header: MobilityHeader {
                    sender_id: sender.into(),
                    recipient_id: recipient.into(),
                    plan_id: "a-1".into(),
                    timestamp_ms: 0,
                },
                is_accepted: true,
            });
            assert!(
                matches!(decode(&raw), Err(CodecError::InvalidIdentifier { .. })),
                "accepted {} -> {}",
                sender,
                recipient
            );
        }
    }
}
