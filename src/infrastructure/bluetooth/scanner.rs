//! BLE Scanner Module
//!
//! Radio abstraction plus the Windows advertisement watcher behind it.
//! Frames are pushed into a bounded channel; when the consumer falls
//! behind, new frames are dropped like any other lost advertisement.
//! A watcher the system aborts is reported back as `RadioStopped`.

use crate::domain::error::BridgeResult;
use crate::domain::models::LifecycleEvent;
use crate::infrastructure::bluetooth::protocol::AdvertisementFrame;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Capacity of the frame channel between the radio callback and the pipeline.
pub const FRAME_CHANNEL_CAPACITY: usize = 64;

pub type FrameSender = mpsc::Sender<AdvertisementFrame>;

/// Notifications the radio raises on its own, outside any start/stop call.
pub type RadioEventSender = mpsc::UnboundedSender<LifecycleEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(windows), allow(dead_code))]
pub enum RadioAvailability {
    Available,
    Disabled,
    PermissionDenied,
    Missing,
}

/// Receiver hardware that can be switched on and off.
pub trait AdvertisementRadio: Send {
    fn availability(&self) -> RadioAvailability;

    /// Begin delivering every received frame, unfiltered.
    fn start(&mut self) -> BridgeResult<()>;

    /// Stop delivery and release the receiver handle.
    fn stop(&mut self) -> BridgeResult<()>;
}

/// Tells whether the user is currently interacting with the machine.
pub trait PowerMonitor: Send + Sync {
    fn is_interactive(&self) -> bool;
}

/// Power state fed by screen on/off notifications.
#[derive(Debug)]
pub struct SessionPowerState {
    interactive: AtomicBool,
}

impl SessionPowerState {
    pub fn new(interactive: bool) -> Self {
        Self {
            interactive: AtomicBool::new(interactive),
        }
    }

    pub fn set_interactive(&self, interactive: bool) {
        self.interactive.store(interactive, Ordering::Relaxed);
    }
}

impl PowerMonitor for SessionPowerState {
    fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::Relaxed)
    }
}

/// Formats a 48-bit Bluetooth address as `AA:BB:CC:DD:EE:FF`.
#[cfg(any(windows, test))]
pub fn format_address(address: u64) -> String {
    let bytes = address.to_be_bytes();
    bytes[2..]
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Creates the radio for the current platform.
pub fn platform_radio(
    frames: FrameSender,
    events: RadioEventSender,
) -> Box<dyn AdvertisementRadio> {
    #[cfg(windows)]
    {
        Box::new(windows_impl::BleScanner::new(frames, events))
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedRadio::new(frames, events))
    }
}

/// Stand-in for platforms without a supported BLE backend.
#[cfg(not(windows))]
pub struct UnsupportedRadio {
    _frames: FrameSender,
    _events: RadioEventSender,
}

#[cfg(not(windows))]
impl UnsupportedRadio {
    pub fn new(frames: FrameSender, events: RadioEventSender) -> Self {
        Self {
            _frames: frames,
            _events: events,
        }
    }
}

#[cfg(not(windows))]
impl AdvertisementRadio for UnsupportedRadio {
    fn availability(&self) -> RadioAvailability {
        RadioAvailability::Missing
    }

    fn start(&mut self) -> BridgeResult<()> {
        Err(crate::domain::error::BridgeError::Radio(
            "no BLE backend on this platform".to_string(),
        ))
    }

    fn stop(&mut self) -> BridgeResult<()> {
        Ok(())
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::{
        format_address, AdvertisementRadio, FrameSender, RadioAvailability, RadioEventSender,
    };
    use crate::domain::error::{BridgeError, BridgeResult};
    use crate::domain::models::LifecycleEvent;
    use crate::infrastructure::bluetooth::protocol::AdvertisementFrame;
    use tracing::{info, trace, warn};
    use windows::Devices::Bluetooth::Advertisement::{
        BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
        BluetoothLEAdvertisementWatcherStoppedEventArgs, BluetoothLEScanningMode,
    };
    use windows::Devices::Bluetooth::{BluetoothAdapter, BluetoothError};
    use windows::Devices::Radios::{Radio, RadioAccessStatus, RadioState};
    use windows::Foundation::TypedEventHandler;
    use windows::Storage::Streams::{DataReader, IBuffer};

    /// AD type for "Service Data - 128-bit UUID".
    const AD_SERVICE_DATA_128: u8 = 0x21;

    fn radio_err(e: windows::core::Error) -> BridgeError {
        BridgeError::Radio(e.message().to_string())
    }

    /// BLE advertisement watcher
    pub struct BleScanner {
        watcher: Option<BluetoothLEAdvertisementWatcher>,
        frames: FrameSender,
        events: RadioEventSender,
    }

    impl BleScanner {
        pub fn new(frames: FrameSender, events: RadioEventSender) -> Self {
            Self {
                watcher: None,
                frames,
                events,
            }
        }

        fn query_availability() -> windows::core::Result<RadioAvailability> {
            let adapter = BluetoothAdapter::GetDefaultAsync()?.get()?;
            if !adapter.IsLowEnergySupported()? {
                return Ok(RadioAvailability::Missing);
            }

            match Radio::RequestAccessAsync()?.get()? {
                RadioAccessStatus::DeniedByUser | RadioAccessStatus::DeniedBySystem => {
                    return Ok(RadioAvailability::PermissionDenied);
                }
                _ => {}
            }

            let radio = adapter.GetRadioAsync()?.get()?;
            Ok(match radio.State()? {
                RadioState::On => RadioAvailability::Available,
                _ => RadioAvailability::Disabled,
            })
        }
    }

    impl AdvertisementRadio for BleScanner {
        fn availability(&self) -> RadioAvailability {
            Self::query_availability().unwrap_or_else(|e| {
                warn!("No usable Bluetooth adapter: {}", e.message());
                RadioAvailability::Missing
            })
        }

        fn start(&mut self) -> BridgeResult<()> {
            self.stop()?;

            let watcher = BluetoothLEAdvertisementWatcher::new().map_err(radio_err)?;
            watcher
                .SetScanningMode(BluetoothLEScanningMode::Active)
                .map_err(radio_err)?;

            // No advertisement filter: 128-bit filtering is unreliable on some
            // adapters, so every frame is checked in software instead.
            let sender = self.frames.clone();
            let handler = TypedEventHandler::new(
                move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                      args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                    if let Some(args) = args.as_ref() {
                        let frame = read_frame(args)?;
                        if sender.try_send(frame).is_err() {
                            trace!("Frame channel full, dropping advertisement");
                        }
                    }
                    Ok(())
                },
            );

            // The watcher aborts asynchronously when the radio goes away;
            // our own Stop() reports Success and is ignored.
            let events = self.events.clone();
            let stopped = TypedEventHandler::new(
                move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                      args: windows::core::Ref<BluetoothLEAdvertisementWatcherStoppedEventArgs>| {
                    if let Some(args) = args.as_ref() {
                        let error = args.Error()?;
                        if error != BluetoothError::Success {
                            warn!("BLE watcher stopped by the system: {:?}", error);
                            let _ = events.send(LifecycleEvent::RadioStopped);
                        }
                    }
                    Ok(())
                },
            );

            watcher.Received(&handler).map_err(radio_err)?;
            watcher.Stopped(&stopped).map_err(radio_err)?;
            watcher.Start().map_err(radio_err)?;

            self.watcher = Some(watcher);
            Ok(())
        }

        fn stop(&mut self) -> BridgeResult<()> {
            if let Some(watcher) = self.watcher.take() {
                info!("Stopping BLE watcher...");
                watcher.Stop().map_err(radio_err)?;
            }
            Ok(())
        }
    }

    impl Drop for BleScanner {
        fn drop(&mut self) {
            let _ = self.stop();
        }
    }

    fn read_frame(
        args: &BluetoothLEAdvertisementReceivedEventArgs,
    ) -> windows::core::Result<AdvertisementFrame> {
        let adv = args.Advertisement()?;
        let mut frame = AdvertisementFrame {
            address: Some(format_address(args.BluetoothAddress()?)),
            rssi: args.RawSignalStrengthInDBm()?,
            ..Default::default()
        };

        let uuids = adv.ServiceUuids()?;
        for i in 0..uuids.Size()? {
            frame.service_uuids.push(uuids.GetAt(i)?.to_u128());
        }

        let mut raw = Vec::new();
        let sections = adv.DataSections()?;
        for i in 0..sections.Size()? {
            let section = sections.GetAt(i)?;
            let data_type = section.DataType()?;
            let data = read_buffer(&section.Data()?)?;

            raw.push((data.len() + 1) as u8);
            raw.push(data_type);
            raw.extend_from_slice(&data);

            if data_type == AD_SERVICE_DATA_128 && data.len() >= 16 {
                let mut uuid = [0u8; 16];
                uuid.copy_from_slice(&data[..16]);
                frame
                    .service_data
                    .push((u128::from_le_bytes(uuid), data[16..].to_vec()));
            }
        }
        frame.raw = Some(raw);

        let manufacturer = adv.ManufacturerData()?;
        for i in 0..manufacturer.Size()? {
            let entry = manufacturer.GetAt(i)?;
            frame
                .manufacturer_data
                .push((entry.CompanyId()?, read_buffer(&entry.Data()?)?));
        }

        Ok(frame)
    }

    fn read_buffer(buffer: &IBuffer) -> windows::core::Result<Vec<u8>> {
        let reader = DataReader::FromBuffer(buffer)?;
        let mut bytes = vec![0u8; reader.UnconsumedBufferLength()? as usize];
        reader.ReadBytes(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_address() {
        assert_eq!(format_address(0xAABB_CCDD_EEFF), "AA:BB:CC:DD:EE:FF");
        assert_eq!(format_address(0x01), "00:00:00:00:00:01");
    }

    #[test]
    fn test_session_power_state() {
        let power = SessionPowerState::new(true);
        assert!(power.is_interactive());
        power.set_interactive(false);
        assert!(!power.is_interactive());
    }
}
