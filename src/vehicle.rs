//! Vehicle state holder and its poll loop.
//!
//! ```text
//!            start()             stop()
//! Stopped ──────────▶ Running ──────────▶ StopRequested
//!    ▲                   │                     │
//!    │   fatal transport │                     │ loop observes the signal
//!    └───────────────────┴─────────────────────┘
//! ```
//!
//! Embassy tasks cannot be generic, so `start()` only arms the state
//! machine; the owner spawns a task that awaits [`Vehicle::poll_loop`]
//! (or drives it with `join` on a host).

use core::cell::Cell;

use embassy_futures::select::{select, Either};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use crate::drivers::msp_client::MspClient;
use crate::error::{MspError, VehicleError};
use crate::state::{Attitude, RcChannels, VehicleState};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleConfig {
    /// Pause between poll cycles. Zero polls back-to-back, yielding once per cycle.
    pub poll_interval: Duration,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_ticks(0) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopPhase {
    Stopped,
    Running,
    StopRequested,
}

/// Why the last poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopExit {
    /// `stop()` was honoured
    Stopped,
    /// The transport reported a fatal error; the loop stopped on its own
    TransportFault,
}

pub struct Vehicle<T: Transport> {
    client: MspClient<T>,
    config: VehicleConfig,
    state: BlockingMutex<CriticalSectionRawMutex, Cell<VehicleState>>,
    phase: BlockingMutex<CriticalSectionRawMutex, Cell<LoopPhase>>,
    /// Set once a `poll_loop()` has picked up the current `start()`.
    loop_entered: BlockingMutex<CriticalSectionRawMutex, Cell<bool>>,
    last_exit: BlockingMutex<CriticalSectionRawMutex, Cell<Option<LoopExit>>>,
    stop_signal: Signal<CriticalSectionRawMutex, ()>,
    done_signal: Signal<CriticalSectionRawMutex, LoopExit>,
}

impl<T: Transport> Vehicle<T> {
    pub fn new(port: T, config: VehicleConfig) -> Self {
        Self {
            client: MspClient::new(port),
            config,
            state: BlockingMutex::new(Cell::new(VehicleState::default())),
            phase: BlockingMutex::new(Cell::new(LoopPhase::Stopped)),
            loop_entered: BlockingMutex::new(Cell::new(false)),
            last_exit: BlockingMutex::new(Cell::new(None)),
            stop_signal: Signal::new(),
            done_signal: Signal::new(),
        }
    }

    // ── State ───────────────────────────────────────────────────────────────

    pub fn state(&self) -> VehicleState {
        self.state.lock(|s| s.get())
    }

    pub fn attitude(&self) -> Option<Attitude> {
        self.state().attitude
    }

    pub fn channels(&self) -> Option<RcChannels> {
        self.state().channels
    }

    pub fn update_attitude(&self, attitude: Attitude) {
        self.state.lock(|s| {
            let mut state = s.get();
            state.attitude = Some(attitude);
            s.set(state);
        });
    }

    pub fn update_channels(&self, channels: RcChannels) {
        self.state.lock(|s| {
            let mut state = s.get();
            state.channels = Some(channels);
            s.set(state);
        });
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase.lock(|p| p.get())
    }

    pub fn last_exit(&self) -> Option<LoopExit> {
        self.last_exit.lock(|e| e.get())
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Arm the poll loop: Stopped → Running. Returns immediately.
    ///
    /// Nothing is polled until the owner drives [`Vehicle::poll_loop`].
    pub fn start(&self) -> Result<(), VehicleError> {
        self.phase.lock(|p| {
            if p.get() != LoopPhase::Stopped {
                return Err(VehicleError::AlreadyRunning);
            }
            self.stop_signal.reset();
            self.done_signal.reset();
            self.loop_entered.lock(|e| e.set(false));
            p.set(LoopPhase::Running);
            Ok(())
        })?;

        log_info!("vehicle: poll loop started");
        Ok(())
    }

    /// Request the loop to stop and wait until it has exited.
    ///
    /// The in-flight exchange, if any, completes first. Once this returns the
    /// loop performs no further transport access or state update. Only one
    /// caller may wait in `stop()` at a time.
    ///
    /// If no `poll_loop()` has picked up the last `start()` yet, the vehicle
    /// goes straight back to Stopped and a loop spawned later returns at once.
    pub async fn stop(&self) -> LoopExit {
        let finished = self.phase.lock(|p| match p.get() {
            LoopPhase::Stopped => Some(self.last_exit().unwrap_or(LoopExit::Stopped)),
            _ if !self.loop_entered.lock(|e| e.get()) => {
                self.last_exit.lock(|e| e.set(Some(LoopExit::Stopped)));
                p.set(LoopPhase::Stopped);
                Some(LoopExit::Stopped)
            }
            LoopPhase::Running => {
                p.set(LoopPhase::StopRequested);
                None
            }
            LoopPhase::StopRequested => None,
        });

        if let Some(exit) = finished {
            return exit;
        }

        log_info!("vehicle: stop requested");
        self.stop_signal.signal(());
        let exit = self.done_signal.wait().await;
        log_info!("vehicle: poll loop stopped");
        exit
    }

    /// Poll loop body. Spawn it after `start()`.
    ///
    /// Each cycle requests attitude then RC channels and stores whatever
    /// arrived. Transient errors are logged and the loop carries on; a fatal
    /// transport error ends the loop and is returned.
    pub async fn poll_loop(&self) -> Result<(), MspError<T::Error>> {
        let armed = self.phase.lock(|p| {
            if p.get() == LoopPhase::Stopped {
                return false;
            }
            self.loop_entered.lock(|e| e.set(true));
            true
        });
        if !armed {
            log_warn!("vehicle: poll loop spawned without start()");
            return Ok(());
        }

        let result = loop {
            if self.stop_signal.signaled() {
                break Ok(());
            }
            if let Err(e) = self.poll_once().await {
                log_error!("vehicle: {}, poll loop stopping", e.kind());
                break Err(e);
            }
            if self.pause().await {
                break Ok(());
            }
        };

        let exit = match result {
            Ok(()) => LoopExit::Stopped,
            Err(_) => LoopExit::TransportFault,
        };
        self.last_exit.lock(|e| e.set(Some(exit)));
        self.phase.lock(|p| p.set(LoopPhase::Stopped));
        self.done_signal.signal(exit);

        result
    }

    /// One poll cycle. Only fatal errors are returned.
    async fn poll_once(&self) -> Result<(), MspError<T::Error>> {
        match self.client.request_attitude().await {
            Ok(Some(att)) => {
                log_debug!("vehicle: attitude r={} p={} y={}", att.roll_deg, att.pitch_deg, att.yaw_deg);
                self.update_attitude(att);
            }
            Ok(None) => log_debug!("vehicle: no attitude update"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => log_warn!("vehicle: attitude read failed ({})", e.kind()),
        }

        match self.client.request_channels().await {
            Ok(Some(rc)) => self.update_channels(rc),
            Ok(None) => log_debug!("vehicle: no channel update"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => log_warn!("vehicle: channel read failed ({})", e.kind()),
        }

        Ok(())
    }

    /// Wait between cycles. Returns `true` if a stop arrived meanwhile.
    async fn pause(&self) -> bool {
        if self.config.poll_interval.as_ticks() == 0 {
            yield_now().await;
            return false;
        }

        match select(self.stop_signal.wait(), Timer::after(self.config.poll_interval)).await {
            Either::First(()) => true,
            Either::Second(()) => false,
        }
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Push 8 RC channel values (MSP_SET_RAW_RC). The flight controller must
    /// be in MSP override mode for them to take effect.
    pub async fn set_channels(&self, values: &[i16]) -> Result<usize, MspError<T::Error>> {
        log_debug!("vehicle: setting {} channels", values.len());
        self.client.send_channels(values).await
    }

    /// Readiness probe passthrough.
    pub async fn check_ready(&self) -> bool {
        self.client.probe_ready().await
    }

    /// Hand back the transport so the port can be closed.
    ///
    /// Consuming `self` means no poll task can still hold a reference.
    pub fn release(self) -> T {
        self.client.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::msp::{decode_frame, Direction, MSP_ATTITUDE, MSP_RC, MSP_SET_RAW_RC};
    use crate::mock::{attitude_payload, channels_payload, response_frame, MockError, MockTransport, WireEvent};
    use embassy_futures::block_on;
    use embassy_futures::join::join;

    const NEUTRAL: [i16; 8] = [1500, 1500, 1000, 1500, 1000, 1000, 1000, 1000];

    fn scripted_link() -> MockTransport {
        let link = MockTransport::new();
        link.respond_to(MSP_ATTITUDE, response_frame(MSP_ATTITUDE, &attitude_payload(100, -50, 45)));
        link.respond_to(MSP_RC, response_frame(MSP_RC, &channels_payload(NEUTRAL)));
        link
    }

    async fn settle(cycles: usize) {
        for _ in 0..cycles {
            yield_now().await;
        }
    }

    #[test]
    fn test_poll_loop_updates_state() {
        let link = scripted_link();
        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        assert_eq!(vehicle.state(), VehicleState::default());

        vehicle.start().unwrap();
        assert_eq!(vehicle.phase(), LoopPhase::Running);

        let (result, exit) = block_on(join(vehicle.poll_loop(), async {
            settle(50).await;
            vehicle.stop().await
        }));

        assert!(result.is_ok());
        assert_eq!(exit, LoopExit::Stopped);
        assert_eq!(vehicle.phase(), LoopPhase::Stopped);
        assert_eq!(
            vehicle.attitude(),
            Some(Attitude { roll_deg: 10.0, pitch_deg: -5.0, yaw_deg: 45.0 })
        );
        assert_eq!(vehicle.channels(), Some(RcChannels::new(NEUTRAL)));
    }

    #[test]
    fn test_truncated_responses_leave_state_unchanged() {
        let link = MockTransport::new();
        let mut att = response_frame(MSP_ATTITUDE, &attitude_payload(1, 2, 3));
        att.truncate(11);
        let mut rc = response_frame(MSP_RC, &channels_payload(NEUTRAL));
        rc.truncate(15);
        link.respond_to(MSP_ATTITUDE, att);
        link.respond_to(MSP_RC, rc);

        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        let previous = Attitude { roll_deg: 1.5, pitch_deg: 2.5, yaw_deg: 90.0 };
        vehicle.update_attitude(previous);

        vehicle.start().unwrap();
        let (result, _) = block_on(join(vehicle.poll_loop(), async {
            settle(30).await;
            vehicle.stop().await
        }));

        assert!(result.is_ok());
        assert_eq!(vehicle.attitude(), Some(previous));
        assert_eq!(vehicle.channels(), None);
    }

    #[test]
    fn test_transient_errors_keep_loop_running() {
        let link = scripted_link();
        link.fail_next_read(MockError::Overrun);
        link.respond_to(MSP_RC, response_frame(MSP_ATTITUDE, &channels_payload(NEUTRAL)));

        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        vehicle.start().unwrap();
        let (result, exit) = block_on(join(vehicle.poll_loop(), async {
            settle(50).await;
            assert_eq!(vehicle.phase(), LoopPhase::Running);
            vehicle.stop().await
        }));

        assert!(result.is_ok());
        assert_eq!(exit, LoopExit::Stopped);
        assert!(vehicle.attitude().is_some());
        assert_eq!(vehicle.channels(), None);
    }

    #[test]
    fn test_fatal_transport_error_stops_loop() {
        let link = scripted_link();
        link.fail_next_read(MockError::Unplugged);

        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        vehicle.start().unwrap();

        let result = block_on(vehicle.poll_loop());
        assert_eq!(result, Err(MspError::Transport(MockError::Unplugged)));
        assert_eq!(vehicle.phase(), LoopPhase::Stopped);
        assert_eq!(vehicle.last_exit(), Some(LoopExit::TransportFault));

        // Nothing left to wait for.
        assert_eq!(block_on(vehicle.stop()), LoopExit::TransportFault);
    }

    #[test]
    fn test_no_writes_after_stop_and_restart() {
        let link = scripted_link();
        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());

        for _ in 0..2 {
            vehicle.start().unwrap();
            let (result, writes_at_stop) = block_on(join(vehicle.poll_loop(), async {
                settle(20).await;
                vehicle.stop().await;
                link.write_count()
            }));

            assert!(result.is_ok());
            assert!(writes_at_stop > 0);
            assert_eq!(link.write_count(), writes_at_stop);
            assert_eq!(vehicle.phase(), LoopPhase::Stopped);
            assert_eq!(vehicle.last_exit(), Some(LoopExit::Stopped));
        }
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let vehicle = Vehicle::new(scripted_link(), VehicleConfig::default());
        vehicle.start().unwrap();
        assert_eq!(vehicle.start(), Err(VehicleError::AlreadyRunning));
    }

    #[test]
    fn test_poll_loop_without_start_returns() {
        let link = scripted_link();
        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        assert!(block_on(vehicle.poll_loop()).is_ok());
        assert_eq!(link.write_count(), 0);
    }

    #[test]
    fn test_stop_without_poll_loop_returns() {
        let link = scripted_link();
        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        vehicle.start().unwrap();

        // Nobody drives the loop; stop must not wait for it.
        assert_eq!(block_on(vehicle.stop()), LoopExit::Stopped);
        assert_eq!(vehicle.phase(), LoopPhase::Stopped);

        // A loop spawned late sees the stop and leaves the wire alone.
        assert!(block_on(vehicle.poll_loop()).is_ok());
        assert_eq!(link.write_count(), 0);

        vehicle.start().unwrap();
        let (result, exit) = block_on(join(vehicle.poll_loop(), async {
            settle(20).await;
            vehicle.stop().await
        }));
        assert!(result.is_ok());
        assert_eq!(exit, LoopExit::Stopped);
        assert!(link.write_count() > 0);
    }

    #[test]
    fn test_stop_before_first_cycle() {
        let link = scripted_link();
        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        vehicle.start().unwrap();

        let (exit, result) = block_on(join(vehicle.stop(), vehicle.poll_loop()));
        assert_eq!(exit, LoopExit::Stopped);
        assert!(result.is_ok());
        assert_eq!(link.write_count(), 0);
    }

    #[test]
    fn test_set_channels_while_polling_writes_whole_frames() {
        let link = scripted_link();
        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        vehicle.start().unwrap();

        let (result, sent) = block_on(join(vehicle.poll_loop(), async {
            let mut sent = 0;
            for i in 0..10i16 {
                let mut values = NEUTRAL;
                values[0] = 1000 + i * 100;
                vehicle.set_channels(&values).await.unwrap();
                sent += 1;
                yield_now().await;
            }
            vehicle.stop().await;
            sent
        }));
        assert!(result.is_ok());

        let events = link.events();
        let mut commands = 0;
        for (i, event) in events.iter().enumerate() {
            let WireEvent::Write(bytes) = event else { continue };
            let frame = decode_frame(bytes).unwrap();
            assert_eq!(frame.direction, Direction::Request);
            assert_eq!(bytes.len(), 6 + frame.payload.len());

            match frame.code {
                MSP_SET_RAW_RC => commands += 1,
                // A query's response read comes straight after its write.
                _ => assert!(matches!(events.get(i + 1), Some(WireEvent::Read(_)))),
            }
        }
        assert_eq!(commands, sent);
    }

    #[test]
    fn test_set_channels_rejects_partial_sets() {
        let link = scripted_link();
        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        assert!(block_on(vehicle.set_channels(&[1500, 1000])).is_err());
        assert_eq!(link.write_count(), 0);
    }

    #[test]
    fn test_poll_interval_stop_interrupts_wait() {
        let link = scripted_link();
        let config = VehicleConfig { poll_interval: Duration::from_secs(3600) };
        let vehicle = Vehicle::new(link.clone(), config);
        vehicle.start().unwrap();

        let (result, exit) = block_on(join(vehicle.poll_loop(), async {
            settle(20).await;
            vehicle.stop().await
        }));

        assert!(result.is_ok());
        assert_eq!(exit, LoopExit::Stopped);
        assert!(vehicle.attitude().is_some());
    }

    #[test]
    fn test_release_returns_transport() {
        let link = scripted_link();
        let vehicle = Vehicle::new(link.clone(), VehicleConfig::default());
        block_on(vehicle.set_channels(&NEUTRAL)).unwrap();

        let port = vehicle.release();
        assert_eq!(port.write_count(), 1);
    }
}
