//! MSP V1 frame codec.
//!
//! ```text
//! [$] [M] [dir] [len] [code] [payload: len bytes] [checksum]
//! dir:      '<' request, '>' response, '!' error
//! checksum: len ^ code ^ payload[0] ^ ... ^ payload[len-1]
//! ```
//!
//! Pure functions over byte buffers; the client owns all I/O.

use crate::error::FrameError;
use crate::state::{Attitude, RcChannels, RC_CHANNEL_COUNT};

pub const MSP_PREAMBLE: [u8; 2] = [b'$', b'M'];
pub const MSP_DIR_REQUEST: u8 = b'<';
pub const MSP_DIR_RESPONSE: u8 = b'>';
pub const MSP_DIR_ERROR: u8 = b'!';

/// `$`, `M`, direction, length, code
pub const MSP_HEADER_LEN: usize = 5;
/// Header plus checksum
pub const MSP_OVERHEAD: usize = MSP_HEADER_LEN + 1;
pub const MSP_MAX_PAYLOAD: usize = 255;
pub const MAX_FRAME_LEN: usize = MSP_OVERHEAD + MSP_MAX_PAYLOAD;

/// First code that needs MSP V2 framing
pub const MSP_V2_MIN_CODE: u16 = 255;

// --- Message codes ---
pub const MSP_FC_VERSION: u8 = 3;
pub const MSP_RC: u8 = 105;
pub const MSP_ATTITUDE: u8 = 108;
pub const MSP_SET_RAW_RC: u8 = 200;

// --- Payload layouts ---
pub const ATTITUDE_PAYLOAD_LEN: usize = 6;
pub const RC_PAYLOAD_LEN: usize = RC_CHANNEL_COUNT * 2;

/// Readiness probe: payload byte 6 of the version response must hold this value.
pub const READY_SENTINEL_INDEX: usize = 6;
pub const READY_SENTINEL: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Sent by us, processed by the flight controller
    Request,
    /// Sent by the flight controller in answer to a request
    Response,
    /// Flight controller could not process the request
    Error,
}

impl Direction {
    pub const fn marker(self) -> u8 {
        match self {
            Direction::Request => MSP_DIR_REQUEST,
            Direction::Response => MSP_DIR_RESPONSE,
            Direction::Error => MSP_DIR_ERROR,
        }
    }

    pub const fn from_marker(b: u8) -> Option<Self> {
        match b {
            MSP_DIR_REQUEST => Some(Direction::Request),
            MSP_DIR_RESPONSE => Some(Direction::Response),
            MSP_DIR_ERROR => Some(Direction::Error),
            _ => None,
        }
    }
}

/// A decoded frame borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub direction: Direction,
    pub code: u8,
    pub payload: &'a [u8],
}

pub type FrameBuf = heapless::Vec<u8, MAX_FRAME_LEN>;

pub fn checksum(len: u8, code: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(len ^ code, |crc, &b| crc ^ b)
}

/// Build a V1 request frame: `$M<` + len + code + payload + checksum.
pub fn encode_request(code: u16, payload: &[u8]) -> Result<FrameBuf, FrameError> {
    if code >= MSP_V2_MIN_CODE {
        return Err(FrameError::UnsupportedVersion(code));
    }
    if payload.len() > MSP_MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLong(payload.len()));
    }

    let len = payload.len() as u8;
    let code = code as u8;

    let mut buf = FrameBuf::new();
    let header = [MSP_PREAMBLE[0], MSP_PREAMBLE[1], Direction::Request.marker(), len, code];
    buf.extend_from_slice(&header)
        .map_err(|_| FrameError::PayloadTooLong(payload.len()))?;
    buf.extend_from_slice(payload)
        .map_err(|_| FrameError::PayloadTooLong(payload.len()))?;
    buf.push(checksum(len, code, payload))
        .map_err(|_| FrameError::PayloadTooLong(payload.len()))?;

    Ok(buf)
}

/// Total frame length announced by a (possibly partial) buffer, once the
/// length byte has arrived.
pub fn expected_frame_len(buf: &[u8]) -> Option<usize> {
    buf.get(3).map(|&len| MSP_OVERHEAD + len as usize)
}

/// Structural decode of one frame at the start of `buf`, any direction.
///
/// Trailing bytes after the checksum are ignored.
pub fn decode_frame(buf: &[u8]) -> Result<Frame<'_>, FrameError> {
    if buf.len() < MSP_OVERHEAD {
        return Err(FrameError::Truncated { needed: MSP_OVERHEAD, got: buf.len() });
    }
    if buf[0..2] != MSP_PREAMBLE {
        return Err(FrameError::BadHeader);
    }
    let direction = Direction::from_marker(buf[2]).ok_or(FrameError::BadHeader)?;

    let len = buf[3];
    let code = buf[4];
    let total = MSP_OVERHEAD + len as usize;
    if buf.len() < total {
        return Err(FrameError::Truncated { needed: total, got: buf.len() });
    }

    let payload = &buf[MSP_HEADER_LEN..MSP_HEADER_LEN + len as usize];
    let expected = checksum(len, code, payload);
    let got = buf[total - 1];
    if expected != got {
        return Err(FrameError::ChecksumMismatch { expected, got });
    }

    Ok(Frame { direction, code, payload })
}

/// Decode a response frame that must carry at least `min_payload` bytes.
///
/// Header and direction are checked as soon as a frame's worth of bytes is
/// present, so a `$M!` rejection surfaces as `ErrorResponse` even though it
/// is shorter than any payload floor. Otherwise a buffer below the floor
/// (header + `min_payload` + checksum) is `Truncated` and the caller can
/// treat it as "no update this cycle".
pub fn decode_response(buf: &[u8], min_payload: usize) -> Result<Frame<'_>, FrameError> {
    if buf.len() >= MSP_OVERHEAD {
        if buf[0..2] != MSP_PREAMBLE {
            return Err(FrameError::BadHeader);
        }
        match Direction::from_marker(buf[2]) {
            Some(Direction::Response) => {}
            Some(Direction::Error) => return Err(FrameError::ErrorResponse(decode_frame(buf)?.code)),
            Some(Direction::Request) | None => return Err(FrameError::BadHeader),
        }
    }

    let needed = MSP_OVERHEAD + min_payload;
    if buf.len() < needed {
        return Err(FrameError::Truncated { needed, got: buf.len() });
    }

    let frame = decode_frame(buf)?;
    if frame.payload.len() < min_payload {
        return Err(FrameError::Truncated {
            needed,
            got: MSP_OVERHEAD + frame.payload.len(),
        });
    }

    Ok(frame)
}

fn le_i16(buf: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([buf[offset], buf[offset + 1]])
}

/// MSP_ATTITUDE payload: roll, pitch (0.1°) and yaw (1°) as little-endian i16.
pub fn decode_attitude(payload: &[u8]) -> Result<Attitude, FrameError> {
    if payload.len() < ATTITUDE_PAYLOAD_LEN {
        return Err(FrameError::Truncated { needed: ATTITUDE_PAYLOAD_LEN, got: payload.len() });
    }

    Ok(Attitude {
        roll_deg: le_i16(payload, 0) as f32 / 10.0,
        pitch_deg: le_i16(payload, 2) as f32 / 10.0,
        yaw_deg: le_i16(payload, 4) as f32,
    })
}

/// MSP_RC payload: 8 little-endian i16 channel values, in order.
pub fn decode_channels(payload: &[u8]) -> Result<RcChannels, FrameError> {
    if payload.len() < RC_PAYLOAD_LEN {
        return Err(FrameError::Truncated { needed: RC_PAYLOAD_LEN, got: payload.len() });
    }

    let mut ch = [0i16; RC_CHANNEL_COUNT];
    for (i, value) in ch.iter_mut().enumerate() {
        *value = le_i16(payload, i * 2);
    }
    Ok(RcChannels::new(ch))
}

/// MSP_SET_RAW_RC payload: low byte then high byte for each channel.
pub fn encode_channels(rc: &RcChannels) -> [u8; RC_PAYLOAD_LEN] {
    let mut buf = [0u8; RC_PAYLOAD_LEN];
    for (i, value) in rc.channels.iter().enumerate() {
        buf[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
    }
    buf
}

/// Readiness check on an MSP_FC_VERSION payload.
pub fn is_ready(payload: &[u8]) -> bool {
    payload.get(READY_SENTINEL_INDEX) == Some(&READY_SENTINEL)
}
