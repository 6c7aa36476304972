/// Vehicle telemetry types shared between the MSP client, the poll loop and
/// whoever reads the vehicle state.
///
/// All types are `Copy` so a snapshot can be taken out of the state lock
/// without holding it.

/// Number of RC channels carried by MSP_RC / MSP_SET_RAW_RC.
pub const RC_CHANNEL_COUNT: usize = 8;

// ── Data types ────────────────────────────────────────────────────────────────

/// Vehicle orientation as reported by MSP_ATTITUDE.
///
/// Roll and pitch are in degrees with 0.1° resolution, yaw is whole degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Attitude {
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub yaw_deg: f32,
}

/// One full set of RC channel values (PWM µs, typically 1000-2000).
///
/// Used both for telemetry read back with MSP_RC and for commands sent with
/// MSP_SET_RAW_RC. Values are not range-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RcChannels {
    pub channels: [i16; RC_CHANNEL_COUNT],
}

impl Default for RcChannels {
    fn default() -> Self {
        Self { channels: [0i16; RC_CHANNEL_COUNT] }
    }
}

impl RcChannels {
    pub const fn new(channels: [i16; RC_CHANNEL_COUNT]) -> Self {
        Self { channels }
    }

    /// Builds a channel set from a caller-provided slice.
    ///
    /// Returns `None` unless exactly [`RC_CHANNEL_COUNT`] values are given.
    pub fn from_slice(values: &[i16]) -> Option<Self> {
        let channels: [i16; RC_CHANNEL_COUNT] = values.try_into().ok()?;
        Some(Self { channels })
    }
}

/// Last-known vehicle telemetry. Both fields stay `None` until the first
/// successful read of the matching message.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VehicleState {
    pub attitude: Option<Attitude>,
    pub channels: Option<RcChannels>,
}
