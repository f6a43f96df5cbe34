//! Scan Lifecycle Module
//!
//! Switches the receiver on while the screen is on and off while it is
//! off. Transitions are applied through `&mut self`, so the owner
//! serializes them.

use crate::domain::models::{LifecycleEvent, ScanState};
use crate::infrastructure::bluetooth::scanner::{
    AdvertisementRadio, PowerMonitor, RadioAvailability,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Open exactly while the controller is `Scanning`. Frames still queued
/// after a stop are dropped against it.
#[derive(Debug, Clone, Default)]
pub struct ScanGate(Arc<AtomicBool>);

impl ScanGate {
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_open(&self, open: bool) {
        self.0.store(open, Ordering::SeqCst);
    }
}

pub struct ScanLifecycleController {
    radio: Box<dyn AdvertisementRadio>,
    power: Arc<dyn PowerMonitor>,
    state: ScanState,
    gate: ScanGate,
}

impl ScanLifecycleController {
    pub fn new(radio: Box<dyn AdvertisementRadio>, power: Arc<dyn PowerMonitor>) -> Self {
        Self {
            radio,
            power,
            state: ScanState::Idle,
            gate: ScanGate::default(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn gate(&self) -> ScanGate {
        self.gate.clone()
    }

    pub fn handle(&mut self, event: LifecycleEvent) -> ScanState {
        match event {
            LifecycleEvent::ScreenOn => self.start_if_needed(),
            LifecycleEvent::ScreenOff => self.stop_if_needed(),
            LifecycleEvent::RestartScan => {
                self.stop_if_needed();
                if self.power.is_interactive() {
                    self.start_if_needed();
                }
            }
            LifecycleEvent::RadioStopped => {
                if self.state == ScanState::Scanning {
                    warn!("Receiver stopped by the platform, waiting for the next event");
                }
                self.stop_if_needed();
            }
        }
        self.state
    }

    fn start_if_needed(&mut self) {
        if self.state == ScanState::Scanning {
            return;
        }

        match self.radio.availability() {
            RadioAvailability::Available => {}
            RadioAvailability::Disabled => {
                warn!("Bluetooth disabled, scan not started");
                return;
            }
            RadioAvailability::PermissionDenied => {
                warn!("Missing permissions for scan, scan not started");
                return;
            }
            RadioAvailability::Missing => {
                warn!("No Bluetooth adapter, scan not started");
                return;
            }
        }

        match self.radio.start() {
            Ok(()) => {
                self.state = ScanState::Scanning;
                self.gate.set_open(true);
                info!("Scan started");
            }
            Err(e) => {
                warn!("Failed to start scan: {}", e);
            }
        }
    }

    fn stop_if_needed(&mut self) {
        if self.state == ScanState::Idle {
            return;
        }

        self.gate.set_open(false);
        if let Err(e) = self.radio.stop() {
            warn!("Error while stopping scan: {}", e);
        }
        self.state = ScanState::Idle;
        info!("Scan stopped");
    }
}

impl Drop for ScanLifecycleController {
    fn drop(&mut self) {
        self.stop_if_needed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{BridgeError, BridgeResult};
    use crate::infrastructure::bluetooth::scanner::SessionPowerState;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RadioLog {
        starts: usize,
        stops: usize,
    }

    struct MockRadio {
        availability: Arc<Mutex<RadioAvailability>>,
        fail_start: Arc<Mutex<bool>>,
        log: Arc<Mutex<RadioLog>>,
    }

    impl AdvertisementRadio for MockRadio {
        fn availability(&self) -> RadioAvailability {
            *self.availability.lock().unwrap()
        }

        fn start(&mut self) -> BridgeResult<()> {
            if *self.fail_start.lock().unwrap() {
                return Err(BridgeError::Radio("boom".to_string()));
            }
            self.log.lock().unwrap().starts += 1;
            Ok(())
        }

        fn stop(&mut self) -> BridgeResult<()> {
            self.log.lock().unwrap().stops += 1;
            Ok(())
        }
    }

    struct Harness {
        controller: ScanLifecycleController,
        availability: Arc<Mutex<RadioAvailability>>,
        fail_start: Arc<Mutex<bool>>,
        log: Arc<Mutex<RadioLog>>,
        power: Arc<SessionPowerState>,
    }

    fn harness() -> Harness {
        let availability = Arc::new(Mutex::new(RadioAvailability::Available));
        let fail_start = Arc::new(Mutex::new(false));
        let log = Arc::new(Mutex::new(RadioLog::default()));
        let power = Arc::new(SessionPowerState::new(true));
        let radio = MockRadio {
            availability: availability.clone(),
            fail_start: fail_start.clone(),
            log: log.clone(),
        };
        Harness {
            controller: ScanLifecycleController::new(Box::new(radio), power.clone()),
            availability,
            fail_start,
            log,
            power,
        }
    }

    #[test]
    fn test_screen_on_off_cycle() {
        let mut h = harness();
        assert_eq!(h.controller.state(), ScanState::Idle);

        assert_eq!(h.controller.handle(LifecycleEvent::ScreenOn), ScanState::Scanning);
        assert_eq!(h.controller.handle(LifecycleEvent::ScreenOn), ScanState::Scanning);
        assert_eq!(h.log.lock().unwrap().starts, 1);

        assert_eq!(h.controller.handle(LifecycleEvent::ScreenOff), ScanState::Idle);
        assert_eq!(h.controller.handle(LifecycleEvent::ScreenOff), ScanState::Idle);
        assert_eq!(h.log.lock().unwrap().stops, 1);
    }

    #[test]
    fn test_unavailable_radio_stays_idle_until_next_event() {
        let mut h = harness();
        *h.availability.lock().unwrap() = RadioAvailability::Disabled;
        assert_eq!(h.controller.handle(LifecycleEvent::ScreenOn), ScanState::Idle);

        *h.availability.lock().unwrap() = RadioAvailability::PermissionDenied;
        assert_eq!(h.controller.handle(LifecycleEvent::ScreenOn), ScanState::Idle);
        assert_eq!(h.log.lock().unwrap().starts, 0);

        *h.availability.lock().unwrap() = RadioAvailability::Available;
        assert_eq!(h.controller.handle(LifecycleEvent::ScreenOn), ScanState::Scanning);
    }

    #[test]
    fn test_start_failure_is_not_retried() {
        let mut h = harness();
        *h.fail_start.lock().unwrap() = true;
        assert_eq!(h.controller.handle(LifecycleEvent::ScreenOn), ScanState::Idle);
        assert_eq!(h.log.lock().unwrap().starts, 0);

        *h.fail_start.lock().unwrap() = false;
        assert_eq!(h.controller.handle(LifecycleEvent::RestartScan), ScanState::Scanning);
    }

    #[test]
    fn test_restart_when_interactive() {
        let mut h = harness();
        h.controller.handle(LifecycleEvent::ScreenOn);
        assert_eq!(h.controller.handle(LifecycleEvent::RestartScan), ScanState::Scanning);

        let log = h.log.lock().unwrap();
        assert_eq!(log.starts, 2);
        assert_eq!(log.stops, 1);
    }

    #[test]
    fn test_restart_when_not_interactive_stops() {
        let mut h = harness();
        h.controller.handle(LifecycleEvent::ScreenOn);
        h.power.set_interactive(false);
        assert_eq!(h.controller.handle(LifecycleEvent::RestartScan), ScanState::Idle);
        assert_eq!(h.log.lock().unwrap().starts, 1);
    }

    #[test]
    fn test_gate_follows_state() {
        let mut h = harness();
        let gate = h.controller.gate();
        assert!(!gate.is_open());
        h.controller.handle(LifecycleEvent::ScreenOn);
        assert!(gate.is_open());
        h.controller.handle(LifecycleEvent::ScreenOff);
        assert!(!gate.is_open());
    }

    #[test]
    fn test_platform_stop_drops_to_idle() {
        let mut h = harness();
        h.controller.handle(LifecycleEvent::ScreenOn);
        assert_eq!(h.controller.handle(LifecycleEvent::RadioStopped), ScanState::Idle);
        assert!(!h.controller.gate().is_open());
        assert_eq!(h.log.lock().unwrap().stops, 1);

        // no automatic retry; the next screen event starts again
        assert_eq!(h.controller.handle(LifecycleEvent::RadioStopped), ScanState::Idle);
        assert_eq!(h.controller.handle(LifecycleEvent::ScreenOn), ScanState::Scanning);
    }

    #[test]
    fn test_restart_from_idle() {
        let mut h = harness();
        assert_eq!(h.controller.handle(LifecycleEvent::RestartScan), ScanState::Scanning);
        // stop was a no-op
        assert_eq!(h.log.lock().unwrap().stops, 0);
    }
}
