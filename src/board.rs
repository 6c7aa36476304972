use embassy_stm32::gpio::{AnyPin, Level, Output, Pin, Speed};
use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::usart::{ConfigError, Uart};
use embassy_stm32::{bind_interrupts, peripherals, usart, Config};

use msp_vehicle::drivers::uart::{MspUart, SerialConfig};

bind_interrupts!(struct Irqs {
    USART3 => usart::InterruptHandler<peripherals::USART3>;
});

/// Companion board: heartbeat LED plus the flight controller UART.
pub struct Board {
    pub led: Output<'static, AnyPin>,
    pub fc_uart: Result<MspUart, ConfigError>,
}

impl Board {
    pub fn init(serial: &SerialConfig) -> Self {
        let mut config = Config::default();
        config.rcc.hse = Some(Hse {
            freq: TimeHertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2), // 168 MHz
            divq: None,
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        let p = embassy_stm32::init(config);

        // PC13, active low
        let led = Output::new(p.PC13.degrade(), Level::High, Speed::Low);

        // USART3 (TX=PB10, RX=PB11)
        let fc_uart = Uart::new(
            p.USART3, p.PB11, p.PB10,
            Irqs,
            p.DMA1_CH3, p.DMA1_CH1,
            serial.usart_config(),
        );

        Self { led, fc_uart }
    }
}
