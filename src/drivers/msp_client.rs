use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

use crate::drivers::msp::{
    decode_attitude, decode_channels, decode_response, encode_channels, encode_request,
    expected_frame_len, is_ready, ATTITUDE_PAYLOAD_LEN, MAX_FRAME_LEN, MSP_ATTITUDE, MSP_FC_VERSION, MSP_RC,
    MSP_SET_RAW_RC, RC_PAYLOAD_LEN, READY_SENTINEL_INDEX,
};
use crate::error::{FrameError, MspError};
use crate::state::{Attitude, RcChannels};
use crate::transport::Transport;

/// MSP request/response client.
///
/// The transport lives inside the client's lock, so every wire exchange
/// (flush, write and, for queries, the response read) runs with exclusive
/// access no matter how many tasks share the client. The guard is dropped on
/// every return path, errors included.
pub struct MspClient<T: Transport> {
    port: Mutex<CriticalSectionRawMutex, T>,
}

impl<T: Transport> MspClient<T> {
    pub fn new(port: T) -> Self {
        Self { port: Mutex::new(port) }
    }

    /// Give the transport back, e.g. to close the port.
    pub fn into_inner(self) -> T {
        self.port.into_inner()
    }

    /// Flush stale input and write one request frame.
    ///
    /// Codes >= 255 fail with `UnsupportedVersion` before the wire is touched.
    pub async fn send_request(&self, code: u16, payload: &[u8]) -> Result<usize, MspError<T::Error>> {
        let mut port = self.port.lock().await;
        send_locked(&mut *port, code, payload).await
    }

    /// Query MSP_ATTITUDE. `Ok(None)` means the response was too short this time.
    pub async fn request_attitude(&self) -> Result<Option<Attitude>, MspError<T::Error>> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = self.exchange(MSP_ATTITUDE, &mut buf).await?;

        match response_payload(MSP_ATTITUDE, &buf[..n], ATTITUDE_PAYLOAD_LEN)? {
            Some(payload) => Ok(Some(decode_attitude(payload)?)),
            None => Ok(None),
        }
    }

    /// Query MSP_RC. `Ok(None)` means the response was too short this time.
    pub async fn request_channels(&self) -> Result<Option<RcChannels>, MspError<T::Error>> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = self.exchange(MSP_RC, &mut buf).await?;

        match response_payload(MSP_RC, &buf[..n], RC_PAYLOAD_LEN)? {
            Some(payload) => Ok(Some(decode_channels(payload)?)),
            None => Ok(None),
        }
    }

    /// Send MSP_SET_RAW_RC. Fire-and-forget: no response is read.
    ///
    /// Exactly 8 values are required; anything else is rejected with
    /// `InvalidChannelCount` rather than padded or cut.
    pub async fn send_channels(&self, values: &[i16]) -> Result<usize, MspError<T::Error>> {
        let rc = RcChannels::from_slice(values)
            .ok_or(FrameError::InvalidChannelCount(values.len()))?;
        self.send_rc(&rc).await
    }

    pub async fn send_rc(&self, rc: &RcChannels) -> Result<usize, MspError<T::Error>> {
        let payload = encode_channels(rc);
        self.send_request(MSP_SET_RAW_RC as u16, &payload).await
    }

    /// Best-effort readiness check via MSP_FC_VERSION.
    ///
    /// Ready only when payload byte 6 holds the expected sentinel. Any
    /// failure reads as "not ready"; there is no retry.
    pub async fn probe_ready(&self) -> bool {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = match self.exchange(MSP_FC_VERSION, &mut buf).await {
            Ok(n) => n,
            Err(e) => {
                log_warn!("msp: readiness probe failed ({})", e.kind());
                return false;
            }
        };

        match response_payload(MSP_FC_VERSION, &buf[..n], READY_SENTINEL_INDEX + 1) {
            Ok(Some(payload)) if is_ready(payload) => {
                log_info!("msp: flight controller ready");
                true
            }
            Ok(Some(payload)) => {
                log_warn!("msp: flight controller not ready ({})", payload[READY_SENTINEL_INDEX]);
                false
            }
            Ok(None) => {
                log_warn!("msp: readiness probe got no data");
                false
            }
            Err(e) => {
                log_warn!("msp: readiness probe failed ({})", e.kind());
                false
            }
        }
    }

    /// Send an empty query and read its response into `buf`, all under one lock.
    async fn exchange(&self, code: u8, buf: &mut [u8]) -> Result<usize, MspError<T::Error>> {
        let mut port = self.port.lock().await;
        send_locked(&mut *port, code as u16, &[]).await?;
        read_frame(&mut *port, buf).await
    }
}

async fn send_locked<T: Transport>(
    port: &mut T,
    code: u16,
    payload: &[u8],
) -> Result<usize, MspError<T::Error>> {
    let frame = encode_request(code, payload)?;
    port.flush().await.map_err(MspError::Transport)?;
    port.write(&frame).await.map_err(MspError::Transport)
}

/// Read until the announced frame is complete, the buffer is full, or the
/// transport returns nothing (timeout).
async fn read_frame<T: Transport>(port: &mut T, buf: &mut [u8]) -> Result<usize, MspError<T::Error>> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = port.read(&mut buf[filled..]).await.map_err(MspError::Transport)?;
        if n == 0 {
            break;
        }
        filled += n;

        if let Some(total) = expected_frame_len(&buf[..filled]) {
            if filled >= total {
                break;
            }
        }
    }
    Ok(filled)
}

/// Validate a response to `code` and hand back its payload.
///
/// A short read is `Ok(None)`: the controller missed a tick, not a fault.
fn response_payload(code: u8, data: &[u8], min_payload: usize) -> Result<Option<&[u8]>, FrameError> {
    match decode_response(data, min_payload) {
        Ok(frame) if frame.code != code => Err(FrameError::UnexpectedCode { expected: code, got: frame.code }),
        Ok(frame) => Ok(Some(frame.payload)),
        Err(FrameError::Truncated { needed, got }) => {
            log_debug!("msp: short response to {} ({}/{} bytes)", code, got, needed);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
