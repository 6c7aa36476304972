#![no_std]
#![no_main]

mod board;
mod tasks;

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use msp_vehicle::drivers::uart::{SerialConfig, UartTransport};
use msp_vehicle::{log_error, log_info, log_warn, LoopExit, LoopPhase, Vehicle, VehicleConfig};

use crate::board::Board;
use crate::tasks::poll_task::poll_task;

static VEHICLE: StaticCell<Vehicle<UartTransport>> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL) and FC UART @ 115200
    let serial = SerialConfig::default();
    let Board { mut led, fc_uart } = Board::init(&serial);

    let uart = match fc_uart {
        Ok(uart) => uart,
        Err(e) => {
            log_error!("failed to open flight controller UART: {}", e);
            // Solid LED, nothing else to do.
            led.set_low();
            loop {
                Timer::after(Duration::from_secs(1)).await;
            }
        }
    };

    // 2. Vehicle, 'static so the poll task can borrow it
    let vehicle: &'static Vehicle<UartTransport> =
        VEHICLE.init(Vehicle::new(UartTransport::new(uart, &serial), VehicleConfig::default()));

    // 3. Give the FC time to boot, then check it answers
    Timer::after(Duration::from_millis(500)).await;
    if !vehicle.check_ready().await {
        log_warn!("flight controller did not report ready, polling anyway");
    }

    // 4. Poll loop
    if vehicle.start().is_ok() {
        spawner.spawn(poll_task(vehicle)).unwrap();
    }

    // 5. Heartbeat @ 2 Hz, state dump each tick
    let mut reported_fault = false;
    loop {
        led.toggle();

        let state = vehicle.state();
        if let Some(att) = state.attitude {
            log_info!("attitude r={} p={} y={}", att.roll_deg, att.pitch_deg, att.yaw_deg);
        }
        if let Some(rc) = state.channels {
            log_info!(
                "rc {} {} {} {}",
                rc.channels[0], rc.channels[1], rc.channels[2], rc.channels[3]
            );
        }

        if vehicle.phase() == LoopPhase::Stopped
            && vehicle.last_exit() == Some(LoopExit::TransportFault)
            && !reported_fault
        {
            log_error!("vehicle stopped after transport fault");
            reported_fault = true;
        }

        Timer::after(Duration::from_millis(500)).await;
    }
}
