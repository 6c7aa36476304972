//! Error types for the codec, the protocol client and the vehicle lifecycle.

use core::fmt;

use crate::transport::TransportError;

/// Frame codec errors. The codec never touches the wire, so these are all
/// about the bytes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Message code needs MSP V2 framing, which is not implemented
    UnsupportedVersion(u16),
    /// Payload does not fit the one-byte V1 length field
    PayloadTooLong(usize),
    /// Fewer bytes than the frame (or the expected payload) needs
    Truncated { needed: usize, got: usize },
    /// Missing `$M` preamble or unknown direction byte
    BadHeader,
    /// Trailing checksum does not match the frame contents
    ChecksumMismatch { expected: u8, got: u8 },
    /// Controller answered with a different message than requested
    UnexpectedCode { expected: u8, got: u8 },
    /// Controller rejected the request with an `!` frame
    ErrorResponse(u8),
    /// RC command with a channel count other than 8
    InvalidChannelCount(usize),
}

impl FrameError {
    /// Short, allocation-free description usable from both defmt and `core::fmt`.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::UnsupportedVersion(_) => "unsupported MSP version",
            FrameError::PayloadTooLong(_) => "payload too long",
            FrameError::Truncated { .. } => "truncated frame",
            FrameError::BadHeader => "bad frame header",
            FrameError::ChecksumMismatch { .. } => "checksum mismatch",
            FrameError::UnexpectedCode { .. } => "unexpected message code",
            FrameError::ErrorResponse(_) => "error response",
            FrameError::InvalidChannelCount(_) => "invalid channel count",
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::UnsupportedVersion(code) => {
                write!(f, "MSP V2 code {} not supported", code)
            }
            FrameError::PayloadTooLong(len) => {
                write!(f, "payload of {} bytes exceeds 255", len)
            }
            FrameError::Truncated { needed, got } => {
                write!(f, "truncated frame: needed {} bytes, got {}", needed, got)
            }
            FrameError::BadHeader => write!(f, "bad MSP frame header"),
            FrameError::ChecksumMismatch { expected, got } => {
                write!(f, "checksum mismatch: expected {:#04x}, got {:#04x}", expected, got)
            }
            FrameError::UnexpectedCode { expected, got } => {
                write!(f, "expected response to code {}, got {}", expected, got)
            }
            FrameError::ErrorResponse(code) => {
                write!(f, "flight controller rejected code {}", code)
            }
            FrameError::InvalidChannelCount(n) => {
                write!(f, "expected 8 RC channels, got {}", n)
            }
        }
    }
}

/// Protocol client errors: either the bytes were wrong or the wire failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MspError<E> {
    Frame(FrameError),
    Transport(E),
}

impl<E: TransportError> MspError<E> {
    /// A fatal error means the link is gone and polling it again is pointless.
    ///
    /// Frame-level errors are always transient: the next exchange starts
    /// from a flushed input buffer.
    pub fn is_fatal(&self) -> bool {
        match self {
            MspError::Frame(_) => false,
            MspError::Transport(e) => e.is_fatal(),
        }
    }
}

impl<E> MspError<E> {
    pub fn kind(&self) -> &'static str {
        match self {
            MspError::Frame(e) => e.kind(),
            MspError::Transport(_) => "transport error",
        }
    }
}

impl<E> From<FrameError> for MspError<E> {
    fn from(e: FrameError) -> Self {
        MspError::Frame(e)
    }
}

impl<E: fmt::Debug> fmt::Display for MspError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MspError::Frame(e) => write!(f, "MSP frame error: {}", e),
            MspError::Transport(e) => write!(f, "MSP transport error: {:?}", e),
        }
    }
}

/// Poll loop lifecycle errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VehicleError {
    /// `start()` called while a loop is running or still stopping
    AlreadyRunning,
}

impl fmt::Display for VehicleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleError::AlreadyRunning => write!(f, "poll loop already running"),
        }
    }
}
