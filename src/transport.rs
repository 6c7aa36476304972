//! Byte transport the MSP client runs over.
//!
//! The client only needs a duplex byte stream. Opening the device, picking
//! the baud rate and similar concerns belong to the implementation.

/// Classification of transport errors for the poll loop.
pub trait TransportError: core::fmt::Debug {
    /// `true` when the link is unusable (port closed, device unplugged).
    ///
    /// Defaults to fatal; transports override it for errors a retry can
    /// recover from, such as UART framing or overrun errors.
    fn is_fatal(&self) -> bool {
        true
    }
}

/// Async duplex byte stream to the flight controller.
///
/// # Invariants
///
/// - A read that times out returns `Ok(0)` rather than an error
/// - `flush` discards unread input; it does not wait for output to drain
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Error: TransportError;

    /// Write `data`, returning the number of bytes written.
    async fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Read up to `buffer.len()` bytes, returning how many were read.
    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    /// Drop any stale input so the next read starts at a fresh response.
    async fn flush(&mut self) -> Result<(), Self::Error>;
}
