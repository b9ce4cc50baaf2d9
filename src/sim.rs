//! In-memory backend for tests and hardware-free runs.
//!
//! [`SimBackend`] is a cheap clone around shared state, so a test can hand
//! one copy to a [`Registry`](crate::Registry) and keep another to attach or
//! detach devices and inspect the commands that reached the "hardware".

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::backend::{Command, DeviceBackend, DeviceInfo};
use crate::capability::{Capability, CapabilitySet};
use crate::error::{ObsbotError, Result};
use crate::settings::{AntiFlicker, Focus, FramingType, MediaMode, WhiteBalance};
use crate::status::{CameraStatus, ImageAdjustments, ReadValue};

/// A simulated camera.
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub info: DeviceInfo,
    pub capabilities: CapabilitySet,
    pub status: CameraStatus,
}

impl SimDevice {
    /// An initialized device implementing every capability.
    pub fn new(serial: &str, model_code: &str) -> Self {
        Self {
            info: DeviceInfo {
                serial: serial.to_string(),
                version: "1.0.0".to_string(),
                model_code: model_code.to_string(),
                initialized: true,
            },
            capabilities: CapabilitySet::all(),
            status: factory_status(),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.info.version = version.to_string();
        self
    }

    pub fn uninitialized(mut self) -> Self {
        self.info.initialized = false;
        self
    }

    /// Drop a capability, as a firmware or SDK build lacking that control would.
    pub fn without(mut self, capability: Capability) -> Self {
        self.capabilities.remove(capability);
        self
    }
}

/// Status a simulated camera reports after power-on or reset.
fn factory_status() -> CameraStatus {
    CameraStatus {
        media_mode: Some(ReadValue::Known(MediaMode::Normal)),
        framing: Some(ReadValue::Known(FramingType::Group)),
        hdr: Some(false),
        background_blur: Some(0),
        image: ImageAdjustments {
            brightness: Some(50),
            contrast: Some(50),
            saturation: Some(50),
            hue: Some(0),
            sharpness: Some(50),
        },
        white_balance: Some(WhiteBalance::Auto),
        zoom: Some(1.0),
        focus: Some(Focus::Auto),
        anti_flicker: Some(ReadValue::Known(AntiFlicker::Auto)),
    }
}

/// Oldest entries are dropped once the command log reaches this length.
pub const APPLIED_LOG_LIMIT: usize = 1024;

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<SimDevice>,
    applied: VecDeque<(String, Command)>,
    fail_next: Option<String>,
}

/// Shared-state simulated backend.
#[derive(Debug, Clone, Default)]
pub struct SimBackend {
    state: Arc<Mutex<SimState>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: impl IntoIterator<Item = SimDevice>) -> Self {
        let backend = Self::new();
        for device in devices {
            backend.attach(device);
        }
        backend
    }

    /// Plug a device in (visible after the next registry refresh).
    ///
    /// Attaching a serial that is already present replaces that device.
    pub fn attach(&self, device: SimDevice) {
        let mut state = self.state.lock();
        state.devices.retain(|d| d.info.serial != device.info.serial);
        debug!("sim: attach {}", device.info.serial);
        state.devices.push(device);
    }

    /// Unplug a device. Returns false if no device had that serial.
    pub fn detach(&self, serial: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.devices.len();
        state.devices.retain(|d| d.info.serial != serial);
        debug!("sim: detach {}", serial);
        state.devices.len() != before
    }

    /// Commands that reached a device, in order. Holds at most
    /// [`APPLIED_LOG_LIMIT`] entries.
    pub fn applied(&self) -> Vec<(String, Command)> {
        self.state.lock().applied.iter().cloned().collect()
    }

    /// Make the next `apply` fail with a backend error.
    pub fn fail_next(&self, message: &str) {
        self.state.lock().fail_next = Some(message.to_string());
    }

    /// Current simulated status of a device, bypassing any registry.
    pub fn device_status(&self, serial: &str) -> Option<CameraStatus> {
        let state = self.state.lock();
        state
            .devices
            .iter()
            .find(|d| d.info.serial == serial)
            .map(|d| d.status.clone())
    }
}

impl DeviceBackend for SimBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>> {
        let state = self.state.lock();
        Ok(state.devices.iter().map(|d| d.info.clone()).collect())
    }

    fn capabilities(&self, info: &DeviceInfo) -> CapabilitySet {
        let state = self.state.lock();
        state
            .devices
            .iter()
            .find(|d| d.info.serial == info.serial)
            .map(|d| d.capabilities)
            .unwrap_or_default()
    }

    fn read_status(&mut self, serial: &str) -> Result<CameraStatus> {
        self.device_status(serial).ok_or(ObsbotError::DeviceNotFound)
    }

    fn apply(&mut self, serial: &str, command: &Command) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next.take() {
            return Err(ObsbotError::Backend(message));
        }

        let device = state
            .devices
            .iter_mut()
            .find(|d| d.info.serial == serial)
            .ok_or(ObsbotError::DeviceNotFound)?;

        let capability = command.capability();
        if !device.capabilities.contains(capability) {
            return Err(ObsbotError::Unsupported {
                capability,
                model: device.info.model_code.clone(),
            });
        }

        match command {
            Command::ResetDefaults => device.status = factory_status(),
            other => device.status.apply(other),
        }
        if state.applied.len() == APPLIED_LOG_LIMIT {
            state.applied.pop_front();
        }
        state.applied.push_back((serial.to_string(), *command));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ImageControl;

    #[test]
    fn attach_detach_enumerate() {
        let mut sim = SimBackend::new();
        sim.attach(SimDevice::new("A", "OBSBOT Meet SE"));
        sim.attach(SimDevice::new("B", "OBSBOT Tiny 2"));
        assert_eq!(sim.enumerate().unwrap().len(), 2);

        assert!(sim.detach("A"));
        assert!(!sim.detach("A"));
        let serials: Vec<String> = sim.enumerate().unwrap().into_iter().map(|i| i.serial).collect();
        assert_eq!(serials, vec!["B".to_string()]);
    }

    #[test]
    fn apply_updates_status_and_logs() {
        let mut sim = SimBackend::with_devices([SimDevice::new("A", "OBSBOT Meet SE")]);
        sim.apply("A", &Command::SetHdr(true)).unwrap();
        assert_eq!(sim.device_status("A").unwrap().hdr, Some(true));
        assert_eq!(sim.applied(), vec![("A".to_string(), Command::SetHdr(true))]);
    }

    #[test]
    fn missing_capability_is_rejected() {
        let mut sim =
            SimBackend::with_devices([SimDevice::new("A", "OBSBOT Meet SE").without(Capability::Hdr)]);
        let err = sim.apply("A", &Command::SetHdr(true)).unwrap_err();
        assert!(err.is_unsupported());
        assert!(sim.applied().is_empty());
    }

    #[test]
    fn fail_next_fires_once() {
        let mut sim = SimBackend::with_devices([SimDevice::new("A", "OBSBOT Meet SE")]);
        sim.fail_next("cable yanked");
        assert!(matches!(
            sim.apply("A", &Command::SetZoom(2.0)),
            Err(ObsbotError::Backend(_))
        ));
        assert!(sim.apply("A", &Command::SetZoom(2.0)).is_ok());
    }

    #[test]
    fn reset_restores_factory_status() {
        let mut sim = SimBackend::with_devices([SimDevice::new("A", "OBSBOT Meet SE")]);
        sim.apply("A", &Command::SetMediaMode(MediaMode::Background)).unwrap();
        sim.apply("A", &Command::ResetDefaults).unwrap();
        assert_eq!(sim.device_status("A").unwrap(), factory_status());
    }

    #[test]
    fn command_log_keeps_only_recent_entries() {
        let mut sim = SimBackend::with_devices([SimDevice::new("A", "OBSBOT Meet SE")]);
        let brightness = |value: usize| Command::SetImage(ImageControl::Brightness, value as i32 % 100);
        for i in 0..APPLIED_LOG_LIMIT + 10 {
            sim.apply("A", &brightness(i)).unwrap();
        }
        let applied = sim.applied();
        assert_eq!(applied.len(), APPLIED_LOG_LIMIT);
        assert_eq!(applied[0], ("A".to_string(), brightness(10)));
        assert_eq!(applied.last(), Some(&("A".to_string(), brightness(APPLIED_LOG_LIMIT + 9))));
    }
}
