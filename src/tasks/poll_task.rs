use embassy_executor::task;

use msp_vehicle::drivers::uart::UartTransport;
use msp_vehicle::{log_error, log_info, Vehicle};

/// Runs the vehicle poll loop until `stop()` or a fatal UART error.
#[task]
pub async fn poll_task(vehicle: &'static Vehicle<UartTransport>) {
    match vehicle.poll_loop().await {
        Ok(()) => log_info!("poll task: finished"),
        Err(e) => log_error!("poll task: link lost ({})", e.kind()),
    }
}
