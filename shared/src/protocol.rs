//! Binary wire format exchanged between the relay and browser clients.
//!
//! Every frame is a single WebSocket binary message whose first byte is a
//! [`Tag`]. Integers are big-endian. The physics buffer is the one exception:
//! it carries the engine's `f32` array in little-endian order so the browser
//! can view it directly as a `Float32Array`.

use std::net::Ipv4Addr;

/// Bytes in a user color field.
pub const COLOR_LEN: usize = 6;

/// Bytes per record in a USERS frame: slot, color, IPv4, latency.
pub const USER_RECORD_LEN: usize = 1 + COLOR_LEN + 4 + 2;

/// Floats per simulated body in a PHYSICS_BUFFER frame:
/// position xyz, quaternion xyzw, one extra scalar.
pub const FLOATS_PER_BODY: usize = 8;

/// Index of the extra scalar inside a body record.
pub const EXTRA_SCALAR: usize = 7;

const HEARTBEAT_LEN: usize = 1 + 1 + 8;
const CONTACT_LEN: usize = 1 + 1 + 4;
const COLOR_FRAME_LEN: usize = 1 + 1 + COLOR_LEN;
const POINTER_FRAME_LEN: usize = 1 + 1 + 1 + 4 * 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Users = 0,
    Heartbeat = 1,
    PhysicsBuffer = 2,
    Contact = 3,
    Color = 4,
    Pick = 5,
    Motion = 6,
}

impl Tag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Tag::Users),
            1 => Some(Tag::Heartbeat),
            2 => Some(Tag::PhysicsBuffer),
            3 => Some(Tag::Contact),
            4 => Some(Tag::Color),
            5 => Some(Tag::Pick),
            6 => Some(Tag::Motion),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    #[error("unknown tag {0}")]
    UnknownTag(u8),
    #[error("{tag:?} frame has {len} bytes, expected {expected}")]
    Length { tag: Tag, len: usize, expected: usize },
    #[error("{0:?} is not a server-to-client frame")]
    WrongDirection(Tag),
}

/// Movement state written into a pointer body's extra scalar each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerMotion {
    Idle,
    Hover,
    Drag,
}

impl PointerMotion {
    pub fn from_flags(is_moving: bool, is_pressed: bool) -> Self {
        match (is_moving, is_pressed) {
            (false, _) => PointerMotion::Idle,
            (true, false) => PointerMotion::Hover,
            (true, true) => PointerMotion::Drag,
        }
    }

    pub fn as_scalar(self) -> f32 {
        match self {
            PointerMotion::Idle => 0.0,
            PointerMotion::Hover => 1.0,
            PointerMotion::Drag => 2.0,
        }
    }
}

/// One entry of a USERS frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRecord {
    pub slot: u8,
    pub color: [u8; COLOR_LEN],
    pub address: u32,
    pub latency_ms: u16,
}

// === Server -> Client ===

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMsg {
    Users(Vec<UserRecord>),
    Heartbeat { slot: u8, timestamp_ms: u64 },
    PhysicsBuffer(Vec<f32>),
    Contact { body: u8, force: f32 },
}

impl ServerMsg {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ServerMsg::Users(users) => encode_users(users),
            ServerMsg::Heartbeat { slot, timestamp_ms } => encode_heartbeat(*slot, *timestamp_ms),
            ServerMsg::PhysicsBuffer(floats) => encode_physics_buffer(floats),
            ServerMsg::Contact { body, force } => encode_contact(*body, *force),
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let (&first, payload) = data.split_first().ok_or(DecodeError::Empty)?;
        let tag = Tag::from_byte(first).ok_or(DecodeError::UnknownTag(first))?;

        match tag {
            Tag::Users => {
                if payload.len() % USER_RECORD_LEN != 0 {
                    return Err(length_error(tag, data.len(), USER_RECORD_LEN));
                }
                let users = payload
                    .chunks_exact(USER_RECORD_LEN)
                    .map(|chunk| {
                        let mut color = [0u8; COLOR_LEN];
                        color.copy_from_slice(&chunk[1..1 + COLOR_LEN]);
                        UserRecord {
                            slot: chunk[0],
                            color,
                            address: read_u32(&chunk[7..11]),
                            latency_ms: u16::from_be_bytes([chunk[11], chunk[12]]),
                        }
                    })
                    .collect();
                Ok(ServerMsg::Users(users))
            }
            Tag::Heartbeat => {
                if data.len() != HEARTBEAT_LEN {
                    return Err(length_error(tag, data.len(), HEARTBEAT_LEN));
                }
                Ok(ServerMsg::Heartbeat {
                    slot: data[1],
                    timestamp_ms: read_u64(&data[2..10]),
                })
            }
            Tag::PhysicsBuffer => {
                if payload.len() % 4 != 0 {
                    return Err(length_error(tag, data.len(), 4));
                }
                let floats = payload
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                Ok(ServerMsg::PhysicsBuffer(floats))
            }
            Tag::Contact => {
                if data.len() != CONTACT_LEN {
                    return Err(length_error(tag, data.len(), CONTACT_LEN));
                }
                Ok(ServerMsg::Contact {
                    body: data[1],
                    force: read_f32(&data[2..6]),
                })
            }
            Tag::Color | Tag::Pick | Tag::Motion => Err(DecodeError::WrongDirection(tag)),
        }
    }
}

pub fn encode_users(users: &[UserRecord]) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + USER_RECORD_LEN * users.len());
    data.push(Tag::Users as u8);
    for user in users {
        data.push(user.slot);
        data.extend_from_slice(&user.color);
        data.extend_from_slice(&user.address.to_be_bytes());
        data.extend_from_slice(&user.latency_ms.to_be_bytes());
    }
    data
}

pub fn encode_heartbeat(slot: u8, timestamp_ms: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(HEARTBEAT_LEN);
    data.push(Tag::Heartbeat as u8);
    data.push(slot);
    data.extend_from_slice(&timestamp_ms.to_be_bytes());
    data
}

/// Tag byte followed by the raw float buffer.
pub fn encode_physics_buffer(floats: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + floats.len() * 4);
    data.push(Tag::PhysicsBuffer as u8);
    for value in floats {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

pub fn encode_contact(body: u8, force: f32) -> Vec<u8> {
    let mut data = Vec::with_capacity(CONTACT_LEN);
    data.push(Tag::Contact as u8);
    data.push(body);
    data.extend_from_slice(&force.to_be_bytes());
    data
}

// === Client -> Server ===

/// Inbound frame. Decoding never fails: anything that is not a well-formed
/// client frame becomes [`ClientMsg::Unrecognized`] and is dropped by the relay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientMsg {
    /// Client echo of a server heartbeat.
    HeartbeatAck { slot: u8, timestamp_ms: u64 },
    Color { slot: u8, color: [u8; COLOR_LEN] },
    Pick { slot: u8, body: u8, point: [f32; 3] },
    Motion { slot: u8, pressed: bool, point: [f32; 3] },
    Unrecognized { tag: Option<u8> },
}

impl ClientMsg {
    pub fn decode(data: &[u8]) -> Self {
        let Some(&first) = data.first() else {
            return ClientMsg::Unrecognized { tag: None };
        };
        let unrecognized = ClientMsg::Unrecognized { tag: Some(first) };

        match Tag::from_byte(first) {
            Some(Tag::Heartbeat) if data.len() >= HEARTBEAT_LEN => ClientMsg::HeartbeatAck {
                slot: data[1],
                timestamp_ms: read_u64(&data[2..10]),
            },
            Some(Tag::Color) if data.len() >= 2 => ClientMsg::Color {
                slot: data[1],
                color: color_from_bytes(&data[2..]),
            },
            Some(Tag::Pick) if data.len() >= POINTER_FRAME_LEN => match read_point(&data[3..15]) {
                Some(point) => ClientMsg::Pick {
                    slot: data[1],
                    body: data[2],
                    point,
                },
                None => unrecognized,
            },
            Some(Tag::Motion) if data.len() >= POINTER_FRAME_LEN => match read_point(&data[3..15]) {
                Some(point) => ClientMsg::Motion {
                    slot: data[1],
                    pressed: data[2] != 0,
                    point,
                },
                None => unrecognized,
            },
            _ => unrecognized,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            ClientMsg::HeartbeatAck { slot, timestamp_ms } => encode_heartbeat(*slot, *timestamp_ms),
            ClientMsg::Color { slot, color } => {
                let mut data = Vec::with_capacity(COLOR_FRAME_LEN);
                data.push(Tag::Color as u8);
                data.push(*slot);
                data.extend_from_slice(color);
                data
            }
            ClientMsg::Pick { slot, body, point } => {
                encode_pointer_frame(Tag::Pick, *slot, *body, point)
            }
            ClientMsg::Motion {
                slot,
                pressed,
                point,
            } => encode_pointer_frame(Tag::Motion, *slot, u8::from(*pressed), point),
            ClientMsg::Unrecognized { tag } => tag.map(|t| vec![t]).unwrap_or_default(),
        }
    }
}

fn encode_pointer_frame(tag: Tag, slot: u8, arg: u8, point: &[f32; 3]) -> Vec<u8> {
    let mut data = Vec::with_capacity(POINTER_FRAME_LEN);
    data.push(tag as u8);
    data.push(slot);
    data.push(arg);
    for value in point {
        data.extend_from_slice(&value.to_be_bytes());
    }
    data
}

// === Field helpers ===

/// Truncate or NUL-pad raw color bytes to the fixed wire width.
pub fn color_from_bytes(bytes: &[u8]) -> [u8; COLOR_LEN] {
    let mut color = [0u8; COLOR_LEN];
    let n = bytes.len().min(COLOR_LEN);
    color[..n].copy_from_slice(&bytes[..n]);
    color
}

/// UTF-8 encode a color string into the fixed wire width.
pub fn color_from_str(text: &str) -> [u8; COLOR_LEN] {
    color_from_bytes(text.as_bytes())
}

/// IPv4 of a (possibly disambiguated) remote address as a big-endian integer.
///
/// Text after the first space (the `" (n)"` suffix) is ignored. Addresses
/// that are not IPv4 encode as 0.
pub fn address_to_u32(address: &str) -> u32 {
    let ip = address.split(' ').next().unwrap_or_default();
    ip.parse::<Ipv4Addr>().map(u32::from).unwrap_or(0)
}

fn length_error(tag: Tag, len: usize, expected: usize) -> DecodeError {
    DecodeError::Length { tag, len, expected }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_bits(read_u32(bytes))
}

fn read_point(bytes: &[u8]) -> Option<[f32; 3]> {
    let point = [
        read_f32(&bytes[0..4]),
        read_f32(&bytes[4..8]),
        read_f32(&bytes[8..12]),
    ];
    point.iter().all(|v| v.is_finite()).then_some(point)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_frame_layout() {
        let data = encode_users(&[
            UserRecord {
                slot: 3,
                color: color_from_str("ff00aa"),
                address: address_to_u32("10.0.0.7"),
                latency_ms: 42,
            },
            UserRecord {
                slot: 9,
                color: [0; COLOR_LEN],
                address: 0,
                latency_ms: 65535,
            },
        ]);
        assert_eq!(data.len(), 1 + 2 * USER_RECORD_LEN);
        assert_eq!(data[0], 0);
        assert_eq!(data[1], 3);
        assert_eq!(&data[2..8], b"ff00aa");
        assert_eq!(&data[8..12], &[10, 0, 0, 7]);
        assert_eq!(&data[12..14], &[0, 42]);
        assert_eq!(data[14], 9);
        assert_eq!(&data[25..27], &[0xff, 0xff]);
    }

    #[test]
    fn users_frame_decodes() {
        let record = UserRecord {
            slot: 254,
            color: color_from_str("abc"),
            address: 0x7f00_0001,
            latency_ms: 1200,
        };
        match ServerMsg::decode(&encode_users(&[record])).unwrap() {
            ServerMsg::Users(users) => assert_eq!(users, vec![record]),
            other => panic!("Expected Users, got {:?}", other),
        }
    }

    #[test]
    fn heartbeat_layout_is_big_endian() {
        let data = encode_heartbeat(5, 0x0102_0304_0506_0708);
        assert_eq!(data, vec![1, 5, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn heartbeat_echo_decodes_as_ack() {
        let data = encode_heartbeat(17, 1_700_000_000_123);
        assert_eq!(
            ClientMsg::decode(&data),
            ClientMsg::HeartbeatAck {
                slot: 17,
                timestamp_ms: 1_700_000_000_123
            }
        );
    }

    #[test]
    fn physics_buffer_is_little_endian_floats() {
        let data = encode_physics_buffer(&[1.0, -2.5]);
        assert_eq!(data[0], 2);
        assert_eq!(&data[1..5], &1.0f32.to_le_bytes());
        assert_eq!(&data[5..9], &(-2.5f32).to_le_bytes());
        assert_eq!(
            ServerMsg::decode(&data).unwrap(),
            ServerMsg::PhysicsBuffer(vec![1.0, -2.5])
        );
    }

    #[test]
    fn contact_layout() {
        let data = encode_contact(3, 0.75);
        assert_eq!(data.len(), 6);
        assert_eq!(&data[..2], &[3, 3]);
        assert_eq!(&data[2..6], &0.75f32.to_be_bytes());
    }

    #[test]
    fn pick_frame_decodes() {
        let msg = ClientMsg::Pick {
            slot: 1,
            body: 3,
            point: [0.0, 1.0, 0.0],
        };
        let data = msg.encode();
        assert_eq!(data.len(), 15);
        assert_eq!(ClientMsg::decode(&data), msg);
    }

    #[test]
    fn motion_pressed_flag_is_any_nonzero_byte() {
        let mut data = ClientMsg::Motion {
            slot: 0,
            pressed: true,
            point: [1.0, 2.0, 3.0],
        }
        .encode();
        data[2] = 7;
        match ClientMsg::decode(&data) {
            ClientMsg::Motion { pressed, point, .. } => {
                assert!(pressed);
                assert_eq!(point, [1.0, 2.0, 3.0]);
            }
            other => panic!("Expected Motion, got {:?}", other),
        }
    }

    #[test]
    fn short_and_unknown_frames_are_unrecognized() {
        assert_eq!(ClientMsg::decode(&[]), ClientMsg::Unrecognized { tag: None });
        assert_eq!(
            ClientMsg::decode(&[5, 0, 3]),
            ClientMsg::Unrecognized { tag: Some(5) }
        );
        assert_eq!(
            ClientMsg::decode(&[42, 1, 2, 3]),
            ClientMsg::Unrecognized { tag: Some(42) }
        );
        // Server-only tags are never accepted from a client.
        assert_eq!(
            ClientMsg::decode(&encode_contact(1, 1.0)),
            ClientMsg::Unrecognized { tag: Some(3) }
        );
    }

    #[test]
    fn non_finite_coordinates_are_unrecognized() {
        let data = ClientMsg::Motion {
            slot: 0,
            pressed: false,
            point: [f32::NAN, 0.0, 0.0],
        }
        .encode();
        assert_eq!(
            ClientMsg::decode(&data),
            ClientMsg::Unrecognized { tag: Some(6) }
        );
    }

    #[test]
    fn color_is_truncated_and_padded() {
        assert_eq!(color_from_str("ff00aa"), *b"ff00aa");
        assert_eq!(color_from_str(""), [0u8; 6]);
        assert_eq!(color_from_str("abcdefgh"), *b"abcdef");
    }

    #[test]
    fn color_frame_keeps_first_six_bytes() {
        let data = [4, 0, b'0', b'0', b'f', b'f', b'0', b'0', b'x'];
        assert_eq!(
            ClientMsg::decode(&data),
            ClientMsg::Color {
                slot: 0,
                color: *b"00ff00"
            }
        );
    }

    #[test]
    fn address_conversion_ignores_suffix() {
        assert_eq!(address_to_u32("192.168.1.20"), 0xc0a8_0114);
        assert_eq!(address_to_u32("192.168.1.20 (3)"), 0xc0a8_0114);
        assert_eq!(address_to_u32("::1"), 0);
    }

    #[test]
    fn decode_rejects_client_frames_and_bad_lengths() {
        assert_eq!(ServerMsg::decode(&[]), Err(DecodeError::Empty));
        assert_eq!(ServerMsg::decode(&[9]), Err(DecodeError::UnknownTag(9)));
        assert_eq!(
            ServerMsg::decode(&[6, 0]),
            Err(DecodeError::WrongDirection(Tag::Motion))
        );
        assert!(matches!(
            ServerMsg::decode(&[1, 0, 0]),
            Err(DecodeError::Length { .. })
        ));
    }
}
