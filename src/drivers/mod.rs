pub mod msp;
pub mod msp_client;
#[cfg(feature = "stm32")]
pub mod uart;
