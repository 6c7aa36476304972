//! MSP (MultiWii Serial Protocol) V1 driver for talking to a flight controller
//! over a serial link.
//!
//! Layers, leaves first:
//! - [`drivers::msp`]: frame codec, pure byte-buffer encode/decode.
//! - [`drivers::msp_client`]: one request/response exchange per call, serialized
//!   by a lock that owns the [`Transport`].
//! - [`vehicle`]: last-known attitude and RC channels, refreshed by a
//!   cancellable poll loop.

#![cfg_attr(not(test), no_std)]

#[macro_use]
pub mod logging;

pub mod drivers;
pub mod error;
pub mod state;
pub mod transport;
pub mod vehicle;

#[cfg(test)]
mod mock;

pub use drivers::msp::{Direction, Frame};
pub use drivers::msp_client::MspClient;
pub use error::{FrameError, MspError, VehicleError};
pub use state::{Attitude, RcChannels, VehicleState, RC_CHANNEL_COUNT};
pub use transport::{Transport, TransportError};
pub use vehicle::{LoopExit, LoopPhase, Vehicle, VehicleConfig};
