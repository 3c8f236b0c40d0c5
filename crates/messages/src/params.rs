//! Strategy-parameter codec.
//!
//! # Grammar
//!
//! ```text
//! <TAG>|<KEY1>:<VALUE1>,<KEY2>:<VALUE2>,...,<KEYn>:<VALUEn>
//! ```
//!
//! | Tag      | Keys                           |
//! |----------|--------------------------------|
//! | `INFO`   | `REAR`, `LENGTH`, `SPEED`, `SIZE` |
//! | `STATUS` | `CMDSPEED`, `DTD`, `SPEED`     |
//! | `JOIN`   | `SIZE`, `SPEED`, `DTD`         |
//!
//! Decoding is strict: every key of the tag must appear exactly once and no
//! other key is accepted. Keys may arrive in any order; encoding always emits
//! the order in the table. Numbers are written with the shortest
//! representation that parses back to the same `f64`, so
//! `decode(encode(p)) == p` for every valid `p`.

use crate::CodecError;
use platoon_types::VehicleId;
use std::fmt;
use std::str::FromStr;

const TAG_INFO: &str = "INFO";
const TAG_STATUS: &str = "STATUS";
const TAG_JOIN: &str = "JOIN";

const INFO_KEYS: [&str; 4] = ["REAR", "LENGTH", "SPEED", "SIZE"];
const STATUS_KEYS: [&str; 3] = ["CMDSPEED", "DTD", "SPEED"];
const JOIN_KEYS: [&str; 3] = ["SIZE", "SPEED", "DTD"];

/// Largest platoon size accepted in a `SIZE` field.
pub const MAX_WIRE_PLATOON_SIZE: usize = 1_000;

/// Platoon summary broadcast by a leader.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoParams {
    /// Static id of the rearmost platoon member.
    pub rear: VehicleId,
    /// Distance from the leader to the rear member (m).
    pub length: f64,
    /// Leader speed (m/s).
    pub speed: f64,
    /// Number of vehicles in the platoon, leader included.
    pub size: usize,
}

/// Kinematic status broadcast by every platooning vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusParams {
    /// Last commanded speed (m/s).
    pub command_speed: f64,
    /// Downtrack distance (m).
    pub downtrack: f64,
    /// Measured speed (m/s).
    pub speed: f64,
}

/// Payload of a join request.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinParams {
    /// Size of the joining platoon (1 for a lone vehicle).
    pub size: usize,
    /// Speed of the joining vehicle (m/s).
    pub speed: f64,
    /// Downtrack distance of the joining vehicle (m).
    pub downtrack: f64,
}

/// Decoded strategy parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyParams {
    Info(InfoParams),
    Status(StatusParams),
    Join(JoinParams),
}

impl StrategyParams {
    /// Grammar tag of this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            StrategyParams::Info(_) => TAG_INFO,
            StrategyParams::Status(_) => TAG_STATUS,
            StrategyParams::Join(_) => TAG_JOIN,
        }
    }
}

/// Decode a strategy-parameter string.
pub fn decode(raw: &str) -> Result<StrategyParams, CodecError> {
    if raw.is_empty() {
        return Err(CodecError::Empty);
    }

    let (tag, body) = raw
        .split_once('|')
        .ok_or_else(|| CodecError::MissingTag(raw.to_string()))?;

    match tag {
        TAG_INFO => {
            let fields = Fields::parse(TAG_INFO, body, &INFO_KEYS)?;
            Ok(StrategyParams::Info(InfoParams {
                rear: fields.identifier("REAR")?,
                length: fields.number("LENGTH")?,
                speed: fields.number("SPEED")?,
                size: fields.count("SIZE")?,
            }))
        }
        TAG_STATUS => {
            let fields = Fields::parse(TAG_STATUS, body, &STATUS_KEYS)?;
            Ok(StrategyParams::Status(StatusParams {
                command_speed: fields.number("CMDSPEED")?,
                downtrack: fields.number("DTD")?,
                speed: fields.number("SPEED")?,
            }))
        }
        TAG_JOIN => {
            let fields = Fields::parse(TAG_JOIN, body, &JOIN_KEYS)?;
            Ok(StrategyParams::Join(JoinParams {
                size: fields.count("SIZE")?,
                speed: fields.number("SPEED")?,
                downtrack: fields.number("DTD")?,
            }))
        }
        other => Err(CodecError::UnknownTag(other.to_string())),
    }
}

/// Encode strategy parameters to their canonical string form.
pub fn encode(params: &StrategyParams) -> String {
    match params {
        StrategyParams::Info(info) => format!(
            "{}|REAR:{},LENGTH:{},SPEED:{},SIZE:{}",
            TAG_INFO, info.rear, info.length, info.speed, info.size
        ),
        StrategyParams::Status(status) => format!(
            "{}|CMDSPEED:{},DTD:{},SPEED:{}",
            TAG_STATUS, status.command_speed, status.downtrack, status.speed
        ),
        StrategyParams::Join(join) => format!(
            "{}|SIZE:{},SPEED:{},DTD:{}",
            TAG_JOIN, join.size, join.speed, join.downtrack
        ),
    }
}

impl FromStr for StrategyParams {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

impl fmt::Display for StrategyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

/// Validated key/value pairs of one parameter body.
struct Fields<'a> {
    tag: &'static str,
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Fields<'a> {
    fn parse(tag: &'static str, body: &'a str, allowed: &[&'static str]) -> Result<Self, CodecError> {
        let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(allowed.len());

        for item in body.split(',') {
            let (key, value) = item
                .split_once(':')
                .ok_or_else(|| CodecError::MalformedPair(item.to_string()))?;

            if !allowed.iter().any(|k| *k == key) {
                return Err(CodecError::UnknownKey {
                    tag,
                    key: key.to_string(),
                });
            }
            if pairs.iter().any(|(k, _)| *k == key) {
                return Err(CodecError::DuplicateKey {
                    tag,
                    key: key.to_string(),
                });
            }
            pairs.push((key, value));
        }

        let fields = Self { tag, pairs };
        for key in allowed {
            fields.raw(*key)?;
        }
        Ok(fields)
    }

    fn raw(&self, key: &'static str) -> Result<&'a str, CodecError> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or(CodecError::MissingKey { tag: self.tag, key })
    }

    fn number(&self, key: &'static str) -> Result<f64, CodecError> {
        let value = self.raw(key)?;
        match value.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(CodecError::InvalidNumber {
                key,
                value: value.to_string(),
            }),
        }
    }

    /// Platoon size in `1..=MAX_WIRE_PLATOON_SIZE`.
    fn count(&self, key: &'static str) -> Result<usize, CodecError> {
        let value = self.raw(key)?;
        match value.parse::<usize>() {
            Ok(n) if (1..=MAX_WIRE_PLATOON_SIZE).contains(&n) => Ok(n),
            _ => Err(CodecError::InvalidNumber {
                key,
                value: value.to_string(),
            }),
        }
    }

    fn identifier(&self, key: &'static str) -> Result<VehicleId, CodecError> {
        let id = VehicleId::new(self.raw(key)?);
        if !id.is_wire_safe() {
            return Err(CodecError::InvalidIdentifier {
                key,
                value: id.0,
            });
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_example_round_trip() {
        let raw = "STATUS|CMDSPEED:1,DTD:4,SPEED:2";
        let params = decode(raw).unwrap();
        assert_eq!(
            params,
            StrategyParams::Status(StatusParams {
                command_speed: 1.0,
                downtrack: 4.0,
                speed: 2.0,
            })
        );
        assert_eq!(encode(&params), raw);
    }

    #[test]
    fn test_info_example() {
        let params = decode("INFO|REAR:1,LENGTH:2,SPEED:3,SIZE:4").unwrap();
        let StrategyParams::Info(info) = &params else {
            panic!("Expected INFO params, got {:?}", params);
        };
        assert_eq!(info.rear, VehicleId::from("1"));
        assert_eq!(info.length, 2.0);
        assert_eq!(info.speed, 3.0);
        assert_eq!(info.size, 4);
        assert_eq!(encode(&params), "INFO|REAR:1,LENGTH:2,SPEED:3,SIZE:4");
    }

    #[test]
    fn test_join_params_keep_precision() {
        let params = StrategyParams::Join(JoinParams {
            size: 1,
            speed: 0.1 + 0.2,
            downtrack: 11.5599,
        });
        let encoded = encode(&params);
        assert_eq!(encoded, "JOIN|SIZE:1,SPEED:0.30000000000000004,DTD:11.5599");
        assert_eq!(decode(&encoded).unwrap(), params);
    }

    #[test]
    fn test_keys_in_any_order() {
        let params = decode("STATUS|SPEED:2,CMDSPEED:1,DTD:4").unwrap();
        assert_eq!(encode(&params), "STATUS|CMDSPEED:1,DTD:4,SPEED:2");
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert_eq!(decode(""), Err(CodecError::Empty));
        assert!(matches!(
            decode("CMDSPEED:11,DOWNTRACK:01,SPEED:11"),
            Err(CodecError::MissingTag(_))
        ));
        assert!(matches!(
            decode("SPLIT|CMDSPEED:1"),
            Err(CodecError::UnknownTag(tag)) if tag == "SPLIT"
        ));
        assert!(matches!(
            decode("STATUS|"),
            Err(CodecError::MalformedPair(_))
        ));
        assert!(matches!(
            decode("STATUS|CMDSPEED:1,DTD:4"),
            Err(CodecError::MissingKey { key: "SPEED", .. })
        ));
        assert!(matches!(
            decode("STATUS|CMDSPEED:1,DOWNTRACK:4,SPEED:2"),
            Err(CodecError::UnknownKey { .. })
        ));
        assert!(matches!(
            decode("STATUS|CMDSPEED:1,CMDSPEED:1,DTD:4,SPEED:2"),
            Err(CodecError::DuplicateKey { .. })
        ));
        assert!(matches!(
            decode("STATUS|CMDSPEED:fast,DTD:4,SPEED:2"),
            Err(CodecError::InvalidNumber { key: "CMDSPEED", .. })
        ));
        assert!(matches!(
            decode("STATUS|CMDSPEED:NaN,DTD:4,SPEED:2"),
            Err(CodecError::InvalidNumber { .. })
        ));
        assert!(matches!(
            decode("INFO|REAR:,LENGTH:2,SPEED:3,SIZE:4"),
            Err(CodecError::InvalidIdentifier { key: "REAR", .. })
        ));
        assert!(matches!(
            decode("INFO|REAR:1,LENGTH:2,SPEED:3,SIZE:-4"),
            Err(CodecError::InvalidNumber { key: "SIZE", .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_sizes() {
        for size in ["0", "1001", "18446744073709551615", "18446744073709551616"] {
            let raw = format!("JOIN|SIZE:{},SPEED:20,DTD:80", size);
            assert!(
                matches!(decode(&raw), Err(CodecError::InvalidNumber { key: "SIZE", .. })),
                "accepted SIZE:{}",
                size
            );
        }
        assert!(decode("INFO|REAR:r,LENGTH:2,SPEED:3,SIZE:1000").is_ok());
        assert!(matches!(
            decode("INFO|REAR:r,LENGTH:2,SPEED:3,SIZE:0"),
            Err(CodecError::InvalidNumber { key: "SIZE", .. })
        ));
    }

    fn finite() -> impl Strategy<Value = f64> {
        any::<f64>().prop_filter("finite", |x| x.is_finite())
    }

    fn params() -> impl Strategy<Value = StrategyParams> {
        let size = 1..=MAX_WIRE_PLATOON_SIZE;
        prop_oneof![
            ("[A-Za-z0-9_.-]{1,16}", finite(), finite(), size.clone()).prop_map(
                |(rear, length, speed, size)| StrategyParams::Info(InfoParams {
                    rear: VehicleId::from(rear.as_str()),
                    length,
                    speed,
                    size,
                })
            ),
            (finite(), finite(), finite()).prop_map(|(command_speed, downtrack, speed)| {
                StrategyParams::Status(StatusParams {
                    command_speed,
                    downtrack,
                    speed,
                })
            }),
            (size, finite(), finite()).prop_map(|(size, speed, downtrack)| {
                StrategyParams::Join(JoinParams {
                    size,
                    speed,
                    downtrack,
                })
            }),
        ]
    }

    proptest! {
        #[test]
        fn test_decode_inverts_encode(params in params()) {
            let encoded = encode(&params);
            prop_assert_eq!(decode(&encoded), Ok(params));
        }
    }
}
