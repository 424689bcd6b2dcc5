//! Wire codec: one exact byte layout per message variant.
//!
//! Every multi-byte integer and float is big-endian. Frames open with a
//! `[tag:1][payload_len:2]` header; decode is purely positional, reading
//! fields at increasing offsets and failing with a length error rather than
//! reading past the buffer.

use crate::protocol::{
    CommandMessage, GamepadMessage, Message, MsgType, PeerDiscoveryMessage, PeerType, RobotState,
    TelemetryMessage, GAMEPAD_VERSION, ROBOCOL_VERSION, SDK_BUILD_MONTH, SDK_BUILD_YEAR,
    SDK_VERSION_MAJOR, SDK_VERSION_MINOR,
};

/// Fixed size of a peer discovery frame. The declared payload length is 10,
/// and the final byte is always zero on the wire.
pub const PEER_DISCOVERY_FRAME_LEN: usize = 13;
/// Fixed size of a gamepad frame: 5-byte header plus a 60-byte payload, of
/// which the tail past the type byte is zero padding.
pub const GAMEPAD_FRAME_LEN: usize = 65;
const GAMEPAD_PAYLOAD_LEN: u16 = 60;
/// Command payload bytes before the name field: timestamp plus acknowledged flag.
const COMMAND_PAYLOAD_BASE: usize = 9;

/// Error decoding a datagram. Local to that datagram: the caller reports it
/// and carries on.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer too short: need {need} bytes, have {have}")]
    Short { need: usize, have: usize },
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),
    #[error("malformed payload: {0}")]
    Malformed(&'static str),
}

/// Error encoding a message. Surfaced to the caller; protocol data is never
/// silently truncated to fit a length prefix.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("{field} too long: {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// Positional reader over a datagram. All reads are bounds-checked.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(DecodeError::Short {
                need: end,
                have: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn f32(&mut self) -> Result<f32, DecodeError> {
        let b = self.take(4)?;
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, len: usize) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }
}

/// Encode a peer discovery frame. The sequence number is always written as
/// zero regardless of the value held by the message; the real value is only
/// meaningful on decode. The SDK version tuple is static.
pub fn encode_peer_discovery(msg: &PeerDiscoveryMessage) -> Vec<u8> {
    let mut buf = vec![0u8; PEER_DISCOVERY_FRAME_LEN];
    buf[0] = MsgType::PeerDiscovery as u8;
    buf[1..3].copy_from_slice(&10u16.to_be_bytes());
    buf[3] = ROBOCOL_VERSION;
    buf[4] = msg.peer_type as u8;
    buf[5..7].copy_from_slice(&0u16.to_be_bytes());
    buf[7] = SDK_BUILD_MONTH;
    buf[8..10].copy_from_slice(&SDK_BUILD_YEAR.to_be_bytes());
    buf[10] = SDK_VERSION_MAJOR;
    buf[11] = SDK_VERSION_MINOR;
    buf
}

/// Decode a peer discovery frame. The protocol version byte is checked
/// before anything is constructed.
pub fn decode_peer_discovery(buf: &[u8]) -> Result<PeerDiscoveryMessage, DecodeError> {
    let mut r = Reader::new(buf);
    r.skip(3)?; // tag + payload length
    let version = r.u8()?;
    if version != ROBOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let peer_type = PeerType::from_u8(r.u8()?);
    let seq_num = r.u16()?;
    Ok(PeerDiscoveryMessage { peer_type, seq_num })
}

/// Encode a command frame. The payload length is computed fresh on every
/// call. The extra length/bytes pair is omitted entirely once the command is
/// acknowledged; the sequence number is always written as zero.
pub fn encode_command(msg: &CommandMessage) -> Result<Vec<u8>, EncodeError> {
    let name = msg.name.as_bytes();
    let extra = msg.extra.as_bytes();
    if name.len() > u16::MAX as usize {
        return Err(EncodeError::FieldTooLong {
            field: "command name",
            len: name.len(),
            max: u16::MAX as usize,
        });
    }
    if extra.len() > u16::MAX as usize {
        return Err(EncodeError::FieldTooLong {
            field: "command extra",
            len: extra.len(),
            max: u16::MAX as usize,
        });
    }
    let mut payload_len = COMMAND_PAYLOAD_BASE + 2 + name.len();
    if !msg.acknowledged {
        payload_len += 2 + extra.len();
    }
    if payload_len > u16::MAX as usize {
        return Err(EncodeError::FieldTooLong {
            field: "command payload",
            len: payload_len,
            max: u16::MAX as usize,
        });
    }
    let mut buf = Vec::with_capacity(5 + payload_len);
    buf.push(MsgType::Command as u8);
    buf.extend_from_slice(&(payload_len as u16).to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&msg.timestamp.to_be_bytes());
    buf.push(msg.acknowledged as u8);
    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
    buf.extend_from_slice(name);
    if !msg.acknowledged {
        buf.extend_from_slice(&(extra.len() as u16).to_be_bytes());
        buf.extend_from_slice(extra);
    }
    Ok(buf)
}

/// Decode a command frame. An acknowledged frame carries no extra field and
/// the decoder must not read past the name.
pub fn decode_command(buf: &[u8]) -> Result<CommandMessage, DecodeError> {
    let mut r = Reader::new(buf);
    r.skip(3)?; // tag + payload length
    let seq_num = r.u16()?;
    let timestamp = r.u64()?;
    let acknowledged = r.u8()? != 0;
    let name_len = r.u16()? as usize;
    let name = r.string(name_len)?;
    let extra = if acknowledged {
        String::new()
    } else {
        let extra_len = r.u16()? as usize;
        r.string(extra_len)?
    };
    Ok(CommandMessage {
        name,
        seq_num,
        timestamp,
        acknowledged,
        extra,
    })
}

/// Bit index of each button in the packed field, in wire order. A pressed
/// button contributes `1 << index`. The order is fixed by the protocol and
/// is neither alphabetic nor grouped.
fn button_bits(msg: &GamepadMessage) -> u32 {
    let g = &msg.gamepad;
    let flags = [
        g.left_bumper,
        g.right_bumper,
        g.guide,
        g.back,
        g.start,
        g.y,
        g.x,
        g.b,
        g.a,
        g.dpad_right,
        g.dpad_left,
        g.dpad_down,
        g.dpad_up,
        g.right_stick_button,
        g.left_stick_button,
    ];
    flags
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, &pressed)| acc | ((pressed as u32) << i))
}

/// Encode a gamepad frame. Outbound only; there is no decoder for this
/// variant. Unlike the other variants the real sequence number goes on the
/// wire. Bytes past the type byte are zero padding inside the declared
/// payload.
pub fn encode_gamepad(msg: &GamepadMessage) -> Vec<u8> {
    let mut buf = vec![0u8; GAMEPAD_FRAME_LEN];
    buf[0] = MsgType::Gamepad as u8;
    buf[1..3].copy_from_slice(&GAMEPAD_PAYLOAD_LEN.to_be_bytes());
    buf[3..5].copy_from_slice(&msg.seq_num.to_be_bytes());
    buf[5] = GAMEPAD_VERSION;
    buf[6..10].copy_from_slice(&(msg.user as u32).to_be_bytes());
    buf[10..18].copy_from_slice(&msg.gamepad.updated_at.to_be_bytes());
    buf[18..22].copy_from_slice(&msg.gamepad.left_stick_x.to_be_bytes());
    buf[22..26].copy_from_slice(&msg.gamepad.left_stick_y.to_be_bytes());
    buf[26..30].copy_from_slice(&msg.gamepad.right_stick_x.to_be_bytes());
    buf[30..34].copy_from_slice(&msg.gamepad.right_stick_y.to_be_bytes());
    buf[34..38].copy_from_slice(&msg.gamepad.left_trigger.to_be_bytes());
    buf[38..42].copy_from_slice(&msg.gamepad.right_trigger.to_be_bytes());
    buf[42..46].copy_from_slice(&button_bits(msg).to_be_bytes());
    buf[46] = msg.user;
    buf[47] = 1; // legacy controller type
    buf[48] = 1; // controller type
    buf
}

/// Decode a telemetry frame: fixed fields, then length-prefixed string
/// entries, then numeric entries.
///
/// A string entry whose key opens with a 0x00 byte is reinterpreted before
/// it is accumulated: a single-byte key becomes the `("meta", "clear")`
/// marker and its value is discarded; a longer key is renamed to `"log"`
/// with the value kept. Numeric entries are never reinterpreted.
pub fn decode_telemetry(buf: &[u8]) -> Result<TelemetryMessage, DecodeError> {
    let mut r = Reader::new(buf);
    r.skip(3)?; // tag + payload length
    let seq_num = r.u16()?;
    let timestamp = r.u64()?;
    let is_sorted = r.u8()? != 0;
    let robot_state = RobotState::from_u8(r.u8()?);
    let tag_len = r.u8()? as usize;
    let tag = if tag_len == 0 {
        String::new()
    } else {
        r.string(tag_len)?
    };

    let num_strings = r.u8()?;
    let mut data_strings = Vec::with_capacity(num_strings as usize);
    for _ in 0..num_strings {
        let key_len = r.u16()? as usize;
        let key_bytes = r.take(key_len)?;
        let val_len = r.u16()? as usize;
        let value = r.string(val_len)?;
        let entry = match key_bytes.first() {
            Some(0x00) if key_len == 1 => ("meta".to_string(), "clear".to_string()),
            Some(0x00) => ("log".to_string(), value),
            _ => (String::from_utf8_lossy(key_bytes).into_owned(), value),
        };
        data_strings.push(entry);
    }

    let num_nums = r.u8()?;
    let mut data_nums = Vec::with_capacity(num_nums as usize);
    for _ in 0..num_nums {
        let key_len = r.u16()? as usize;
        let key = r.string(key_len)?;
        let value = r.f32()?;
        data_nums.push((key, value));
    }

    Ok(TelemetryMessage {
        timestamp,
        is_sorted,
        robot_state,
        tag,
        seq_num,
        data_strings,
        data_nums,
    })
}

/// Decode any inbound datagram by its leading type tag. Tags without a
/// registered decoder (reserved tags, the outbound-only gamepad tag, and
/// anything out of range) fail here; this is the single point where an
/// unrecognized datagram becomes a typed error instead of a silent no-op.
pub fn decode_any(buf: &[u8]) -> Result<Message, DecodeError> {
    let tag = *buf.first().ok_or(DecodeError::Malformed("empty datagram"))?;
    match MsgType::from_u8(tag) {
        Some(MsgType::PeerDiscovery) => Ok(Message::PeerDiscovery(decode_peer_discovery(buf)?)),
        Some(MsgType::Command) => Ok(Message::Command(decode_command(buf)?)),
        Some(MsgType::Telemetry) => Ok(Message::Telemetry(decode_telemetry(buf)?)),
        _ => Err(DecodeError::UnknownMessageType(tag)),
    }
}
