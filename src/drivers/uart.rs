//! STM32 USART as an MSP transport.
//!
//! Flight controller on USART3 (TX=PB10, RX=PB11), DMA1_CH3/DMA1_CH1.

use embassy_futures::select::{select, Either};
use embassy_stm32::peripherals::{DMA1_CH1, DMA1_CH3, USART3};
use embassy_stm32::usart::{Config as UsartConfig, Error as UsartError, Uart};
use embassy_time::{Duration, Timer};

use crate::transport::{Transport, TransportError};

pub type MspUart = Uart<'static, USART3, DMA1_CH3, DMA1_CH1>;

/// Quiet time that counts as "input drained" during flush.
const DRAIN_IDLE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baudrate: u32,
    /// A read that sees nothing for this long returns 0 bytes.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baudrate: 115_200,
            read_timeout: Duration::from_millis(50),
        }
    }
}

impl SerialConfig {
    pub fn usart_config(&self) -> UsartConfig {
        let mut config = UsartConfig::default();
        config.baudrate = self.baudrate;
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartFault(pub UsartError);

impl TransportError for UartFault {
    /// Line noise and overruns lose a frame, not the link.
    fn is_fatal(&self) -> bool {
        !matches!(
            self.0,
            UsartError::Framing | UsartError::Noise | UsartError::Overrun | UsartError::Parity
        )
    }
}

pub struct UartTransport {
    uart: MspUart,
    read_timeout: Duration,
}

impl UartTransport {
    pub fn new(uart: MspUart, config: &SerialConfig) -> Self {
        Self { uart, read_timeout: config.read_timeout }
    }
}

impl Transport for UartTransport {
    type Error = UartFault;

    async fn write(&mut self, data: &[u8]) -> Result<usize, UartFault> {
        self.uart.write(data).await.map_err(UartFault)?;
        Ok(data.len())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, UartFault> {
        match select(self.uart.read_until_idle(buffer), Timer::after(self.read_timeout)).await {
            Either::First(result) => result.map_err(UartFault),
            Either::Second(()) => Ok(0),
        }
    }

    async fn flush(&mut self) -> Result<(), UartFault> {
        let mut scratch = [0u8; 64];
        loop {
            match select(self.uart.read_until_idle(&mut scratch), Timer::after(DRAIN_IDLE)).await {
                Either::First(Ok(n)) if n > 0 => continue,
                // Errors while discarding stale input don't matter.
                _ => return Ok(()),
            }
        }
    }
}
