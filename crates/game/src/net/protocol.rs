use bytemuck::{Pod, PodCastError, Zeroable};
use glam::Vec2;
use thiserror::Error;

use crate::codec::{
    ByteReader, ByteWriter, CodecError, Interval, PACKED_UINT_SENTINEL, PackedFloat, PackedFloat2,
};
use crate::simulation::{ORIENTATION_RANGE, WORLD_BOUNDS_X, WORLD_BOUNDS_Y, wrap_angle};
use crate::snapshot::{Color, Entity, EntitySnapshot};

use super::transport::Channel;

pub const MAX_PACKET_SIZE: usize = 1200;
pub const DEFAULT_PORT: u16 = 10131;

pub const POSITION_BITS_X: u32 = 11;
pub const POSITION_BITS_Y: u32 = 10;
pub const ORIENTATION_BITS: u32 = 8;
pub const CONTROL_BITS: u32 = 4;

const CONTROL_RANGE: Interval = Interval::new(-1.0, 1.0);

type PackedPosition = PackedFloat2<POSITION_BITS_X, POSITION_BITS_Y>;
type PackedOrientation = PackedFloat<ORIENTATION_BITS>;
type PackedControls = PackedFloat2<CONTROL_BITS, CONTROL_BITS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Join = 0,
    Input = 1,
    NewEntity = 2,
    SetControlledEntity = 3,
    Snapshot = 4,
    RemoveEntity = 5,
}

impl TryFrom<u8> for MessageKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Join),
            1 => Ok(Self::Input),
            2 => Ok(Self::NewEntity),
            3 => Ok(Self::SetControlledEntity),
            4 => Ok(Self::Snapshot),
            5 => Ok(Self::RemoveEntity),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

impl MessageKind {
    pub fn channel(self) -> Channel {
        match self {
            Self::Input | Self::Snapshot => Channel::Unreliable,
            Self::Join | Self::NewEntity | Self::SetControlledEntity | Self::RemoveEntity => {
                Channel::Reliable
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
    #[error("truncated {kind:?} message")]
    Truncated {
        kind: MessageKind,
        #[source]
        source: CodecError,
    },
    #[error("{kind:?} message carries an out-of-range {field}")]
    UnknownValue {
        kind: MessageKind,
        field: &'static str,
    },
    #[error("{kind:?} message has {count} trailing bytes")]
    TrailingBytes { kind: MessageKind, count: usize },
    #[error("{kind:?} payload layout mismatch: {reason:?}")]
    Layout {
        kind: MessageKind,
        reason: PodCastError,
    },
}

/// Native-layout entity record carried by NEW_ENTITY.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WireEntity {
    pub color: [u8; 4],
    pub pos: [f32; 2],
    pub speed: f32,
    pub ori: f32,
    pub thr: f32,
    pub steer: f32,
    pub eid: u16,
    pub _pad: u16,
    pub tick: u32,
}

pub const WIRE_ENTITY_SIZE: usize = size_of::<WireEntity>();

const _: () = assert!(WIRE_ENTITY_SIZE == 36);

impl From<&Entity> for WireEntity {
    fn from(e: &Entity) -> Self {
        Self {
            color: e.color.to_bytes(),
            pos: e.pos.to_array(),
            speed: e.speed,
            ori: e.ori,
            thr: e.thr,
            steer: e.steer,
            eid: e.eid,
            _pad: 0,
            tick: e.tick,
        }
    }
}

impl From<WireEntity> for Entity {
    fn from(w: WireEntity) -> Self {
        Self {
            color: Color::from_bytes(w.color),
            pos: Vec2::from_array(w.pos),
            speed: w.speed,
            ori: w.ori,
            thr: w.thr,
            steer: w.steer,
            eid: w.eid,
            tick: w.tick,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Join,
    Input { eid: u16, thr: f32, steer: f32 },
    NewEntity(Entity),
    SetControlledEntity { eid: u16 },
    Snapshot { eid: u16, snapshot: EntitySnapshot },
    RemoveEntity { eid: u16 },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Join => MessageKind::Join,
            Self::Input { .. } => MessageKind::Input,
            Self::NewEntity(_) => MessageKind::NewEntity,
            Self::SetControlledEntity { .. } => MessageKind::SetControlledEntity,
            Self::Snapshot { .. } => MessageKind::Snapshot,
            Self::RemoveEntity { .. } => MessageKind::RemoveEntity,
        }
    }

    pub fn channel(&self) -> Channel {
        self.kind().channel()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(1 + WIRE_ENTITY_SIZE);
        w.write_u8(self.kind() as u8);
        match self {
            Self::Join => {}
            Self::Input { eid, thr, steer } => {
                w.write_u16(*eid);
                w.write_u8(quantize_controls(*thr, *steer));
            }
            Self::NewEntity(entity) => {
                w.write_bytes(bytemuck::bytes_of(&WireEntity::from(entity)));
            }
            Self::SetControlledEntity { eid } | Self::RemoveEntity { eid } => {
                w.write_u16(*eid);
            }
            Self::Snapshot { eid, snapshot } => {
                w.write_u16(*eid);
                w.write_u32(PackedPosition::pack(snapshot.pos, WORLD_BOUNDS_X, WORLD_BOUNDS_Y).packed);
                w.write_u8(PackedOrientation::pack(snapshot.ori, ORIENTATION_RANGE).packed as u8);
                w.write_packed_uint(snapshot.tick);
            }
        }
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let kind = peek_kind(data)?;
        let mut r = ByteReader::new(&data[1..]);
        let truncated = |source: CodecError| ProtocolError::Truncated { kind, source };

        let message = match kind {
            MessageKind::Join => Self::Join,
            MessageKind::Input => {
                let eid = r.read_u16().map_err(truncated)?;
                let (thr, steer) = dequantize_controls(r.read_u8().map_err(truncated)?);
                Self::Input { eid, thr, steer }
            }
            MessageKind::NewEntity => {
                let bytes = r.read_bytes(WIRE_ENTITY_SIZE).map_err(truncated)?;
                let wire: WireEntity = bytemuck::try_pod_read_unaligned(bytes)
                    .map_err(|reason| ProtocolError::Layout { kind, reason })?;
                Self::NewEntity(wire.into())
            }
            MessageKind::SetControlledEntity => Self::SetControlledEntity {
                eid: r.read_u16().map_err(truncated)?,
            },
            MessageKind::RemoveEntity => Self::RemoveEntity {
                eid: r.read_u16().map_err(truncated)?,
            },
            MessageKind::Snapshot => {
                let eid = r.read_u16().map_err(truncated)?;
                let pos = PackedPosition::from_packed(r.read_u32().map_err(truncated)?)
                    .unpack(WORLD_BOUNDS_X, WORLD_BOUNDS_Y);
                let ori = PackedOrientation::from_packed(u32::from(r.read_u8().map_err(truncated)?))
                    .unpack(ORIENTATION_RANGE);
                let tick = r.read_packed_uint().map_err(truncated)?;
                if tick == PACKED_UINT_SENTINEL {
                    return Err(ProtocolError::UnknownValue { kind, field: "tick" });
                }
                Self::Snapshot {
                    eid,
                    snapshot: EntitySnapshot { tick, pos, ori },
                }
            }
        };

        match r.remaining() {
            0 => Ok(message),
            count => Err(ProtocolError::TrailingBytes { kind, count }),
        }
    }
}

pub fn peek_kind(data: &[u8]) -> Result<MessageKind, ProtocolError> {
    let tag = *data.first().ok_or(ProtocolError::Empty)?;
    MessageKind::try_from(tag)
}

/// Throttle in the high nibble, steer in the low nibble.
pub fn quantize_controls(thr: f32, steer: f32) -> u8 {
    PackedControls::pack(Vec2::new(thr, steer), CONTROL_RANGE, CONTROL_RANGE).packed as u8
}

pub fn dequantize_controls(code: u8) -> (f32, f32) {
    let packed = PackedControls::from_packed(u32::from(code));
    let v = packed.unpack(CONTROL_RANGE, CONTROL_RANGE);
    let neutral = PackedFloat::<CONTROL_BITS>::pack(0.0, CONTROL_RANGE).packed;
    let snap = |c: u32, v: f32| if c == neutral { 0.0 } else { v };
    (
        snap((packed.packed >> CONTROL_BITS) & 0xF, v.x),
        snap(packed.packed & 0xF, v.y),
    )
}

/// Applies the same loss the control byte introduces, so a predicting client
/// simulates exactly what the server will.
pub fn quantized_controls(thr: f32, steer: f32) -> (f32, f32) {
    dequantize_controls(quantize_controls(thr, steer))
}

const MATCH_SLACK: f32 = 1e-4;

fn within_step(a: f32, b: f32, range: Interval, bits: u32) -> bool {
    (a - b).abs() <= range.step(bits) + MATCH_SLACK
}

fn ori_within_step(a: f32, b: f32) -> bool {
    wrap_angle(a - b).abs() <= ORIENTATION_RANGE.step(ORIENTATION_BITS) + MATCH_SLACK
}

/// True when `received` is what `predicted` would look like after a trip
/// through the SNAPSHOT encoding.
pub fn snapshot_matches(predicted: &EntitySnapshot, received: &EntitySnapshot) -> bool {
    predicted.tick == received.tick
        && within_step(predicted.pos.x, received.pos.x, WORLD_BOUNDS_X, POSITION_BITS_X)
        && within_step(predicted.pos.y, received.pos.y, WORLD_BOUNDS_Y, POSITION_BITS_Y)
        && ori_within_step(predicted.ori, received.ori)
}

/// Server-corrected pose at `received.tick`. Components the encoding cannot
/// tell apart from the prediction keep their full-precision predicted value.
pub fn correct_snapshot(predicted: &EntitySnapshot, received: &EntitySnapshot) -> EntitySnapshot {
    let pick = |p: f32, r: f32, close: bool| if close { p } else { r };
    EntitySnapshot {
        tick: received.tick,
        pos: Vec2::new(
            pick(
                predicted.pos.x,
                received.pos.x,
                within_step(predicted.pos.x, received.pos.x, WORLD_BOUNDS_X, POSITION_BITS_X),
            ),
            pick(
                predicted.pos.y,
                received.pos.y,
                within_step(predicted.pos.y, received.pos.y, WORLD_BOUNDS_Y, POSITION_BITS_Y),
            ),
        ),
        ori: pick(
            predicted.ori,
            received.ori,
            ori_within_step(predicted.ori, received.ori),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_message(tick: u32) -> Message {
        Message::Snapshot {
            eid: 0x0102,
            snapshot: EntitySnapshot {
                tick,
                pos: Vec2::new(3.3, -2.1),
                ori: 1.2,
            },
        }
    }

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(Message::Join.encode(), vec![0]);
        assert_eq!(
            Message::SetControlledEntity { eid: 0xABCD }.encode(),
            vec![3, 0xAB, 0xCD]
        );
        assert_eq!(Message::RemoveEntity { eid: 7 }.encode(), vec![5, 0, 7]);
        assert_eq!(peek_kind(&[4, 0, 0]).unwrap(), MessageKind::Snapshot);
    }

    #[test]
    fn test_input_layout() {
        let bytes = Message::Input {
            eid: 2,
            thr: 1.0,
            steer: -1.0,
        }
        .encode();
        assert_eq!(bytes, vec![1, 0, 2, 0xF0]);

        match Message::decode(&bytes).unwrap() {
            Message::Input { eid, thr, steer } => {
                assert_eq!(eid, 2);
                assert_eq!((thr, steer), (1.0, -1.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_neutral_controls_decode_to_zero() {
        assert_eq!(quantized_controls(0.0, 0.0), (0.0, 0.0));
        let (thr, steer) = quantized_controls(0.5, -0.5);
        assert!((thr - 0.5).abs() <= CONTROL_RANGE.step(CONTROL_BITS));
        assert!((steer + 0.5).abs() <= CONTROL_RANGE.step(CONTROL_BITS));
    }

    #[test]
    fn test_snapshot_layout() {
        let bytes = snapshot_message(300).encode();
        // tag, eid, packed position, orientation, two-byte tick
        assert_eq!(bytes.len(), 1 + 2 + 4 + 1 + 2);
        assert_eq!(&bytes[..3], &[4, 0x01, 0x02]);

        let Message::Snapshot { eid, snapshot } = Message::decode(&bytes).unwrap() else {
            panic!("expected snapshot");
        };
        assert_eq!(eid, 0x0102);
        assert_eq!(snapshot.tick, 300);

        let Message::Snapshot { snapshot: sent, .. } = snapshot_message(300) else {
            unreachable!()
        };
        assert!(snapshot_matches(&sent, &snapshot));
    }

    #[test]
    fn test_snapshot_sentinel_tick_rejected() {
        let mut bytes = snapshot_message(0).encode();
        bytes.pop();
        bytes.extend_from_slice(&[0xFF; 4]);
        assert!(matches!(
            Message::decode(&bytes),
            Err(ProtocolError::UnknownValue { field: "tick", .. })
        ));
    }

    #[test]
    fn test_new_entity_round_trip() {
        let mut entity = Entity::spawned(9, 1234, Vec2::new(-4.5, 2.25), -1.0, Color::rgb(10, 20, 30));
        entity.speed = 2.5;
        entity.set_controls(0.25, -0.75);

        let bytes = Message::NewEntity(entity.clone()).encode();
        assert_eq!(bytes.len(), 1 + WIRE_ENTITY_SIZE);
        assert_eq!(Message::decode(&bytes).unwrap(), Message::NewEntity(entity));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(Message::decode(&[]), Err(ProtocolError::Empty)));
        assert!(matches!(
            Message::decode(&[42]),
            Err(ProtocolError::UnknownKind(42))
        ));
        assert!(matches!(
            Message::decode(&[1, 0]),
            Err(ProtocolError::Truncated {
                kind: MessageKind::Input,
                ..
            })
        ));
        assert!(matches!(
            Message::decode(&[2, 0, 0, 0]),
            Err(ProtocolError::Truncated {
                kind: MessageKind::NewEntity,
                ..
            })
        ));
        assert!(matches!(
            Message::decode(&[0, 1]),
            Err(ProtocolError::TrailingBytes { count: 1, .. })
        ));
    }

    #[test]
    fn test_channels() {
        assert_eq!(MessageKind::Snapshot.channel(), Channel::Unreliable);
        assert_eq!(MessageKind::Input.channel(), Channel::Unreliable);
        assert_eq!(MessageKind::NewEntity.channel(), Channel::Reliable);
        assert_eq!(MessageKind::RemoveEntity.channel(), Channel::Reliable);
    }

    #[test]
    fn test_snapshot_matches_wraps_orientation() {
        let a = EntitySnapshot {
            tick: 1,
            pos: Vec2::ZERO,
            ori: std::f32::consts::PI - 0.001,
        };
        let b = EntitySnapshot {
            ori: -std::f32::consts::PI + 0.001,
            ..a
        };
        assert!(snapshot_matches(&a, &b));
        assert!(!snapshot_matches(&a, &EntitySnapshot { tick: 2, ..a }));
        assert!(!snapshot_matches(&a, &EntitySnapshot { pos: Vec2::new(0.5, 0.0), ..a }));
    }

    #[test]
    fn test_correct_snapshot_keeps_indistinguishable_components() {
        let predicted = EntitySnapshot {
            tick: 9,
            pos: Vec2::new(1.2345, -0.5),
            ori: 0.3,
        };
        let received = EntitySnapshot {
            tick: 9,
            pos: Vec2::new(1.23, 2.0),
            ori: 0.31,
        };
        let corrected = correct_snapshot(&predicted, &received);
        assert_eq!(corrected.pos, Vec2::new(1.2345, 2.0));
        assert_eq!(corrected.ori, 0.3);
        assert_eq!(corrected.tick, 9);
    }
}
