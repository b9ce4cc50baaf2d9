//! Typed per-device view over a registry record.
//!
//! A [`Device`] borrows the registry and carries one [`DeviceHandle`].  It
//! holds no state of its own, so a view over a stale handle is harmless:
//! accessors return empty values and every control returns
//! [`ObsbotError::InvalidHandle`].

use tracing::debug;

use crate::backend::Command;
use crate::capability::{Capability, CapabilitySet, ModelProfile};
use crate::error::{ObsbotError, Result};
use crate::registry::{DeviceHandle, DeviceRecord, Registry};
use crate::settings::{
    AntiFlicker, Focus, FramingType, ImageControl, MediaMode, PERCENT_RANGE, MIN_ZOOM,
    WhiteBalance,
};
use crate::status::{CameraStatus, ReadValue};

/// Borrowed view of one camera in a [`Registry`].
#[derive(Clone, Copy)]
pub struct Device<'r> {
    registry: &'r Registry,
    handle: DeviceHandle,
}

impl<'r> Device<'r> {
    pub(crate) fn new(registry: &'r Registry, handle: DeviceHandle) -> Self {
        Self { registry, handle }
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.registry.is_valid(self.handle)
    }

    // --- Info accessors ---

    /// Serial number, or "" when the handle is stale.
    pub fn serial(&self) -> String {
        self.read(|r| r.info.serial.clone()).unwrap_or_default()
    }

    /// Firmware version, or "" when the handle is stale.
    pub fn version(&self) -> String {
        self.read(|r| r.info.version.clone()).unwrap_or_default()
    }

    /// Model code (USB product string), or "" when the handle is stale.
    pub fn model(&self) -> String {
        self.read(|r| r.info.model_code.clone()).unwrap_or_default()
    }

    pub fn is_initialized(&self) -> bool {
        self.read(|r| r.info.initialized).unwrap_or(false)
    }

    /// Valid and initialized.
    pub fn is_connected(&self) -> bool {
        self.is_initialized()
    }

    /// Effective capabilities; empty when the handle is stale.
    pub fn capabilities(&self) -> CapabilitySet {
        self.read(|r| r.capabilities).unwrap_or_default()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }

    pub fn status(&self) -> Option<CameraStatus> {
        self.read(|r| r.status.clone())
    }

    pub fn profile(&self) -> Option<ModelProfile> {
        self.read(|r| r.profile)
    }

    // --- Getters ---

    pub fn media_mode(&self) -> Result<ReadValue<MediaMode>> {
        self.read_field(Capability::MediaMode, |s| s.media_mode)
    }

    pub fn auto_framing(&self) -> Result<ReadValue<FramingType>> {
        self.read_field(Capability::AutoFraming, |s| s.framing)
    }

    pub fn hdr(&self) -> Result<bool> {
        self.read_field(Capability::Hdr, |s| s.hdr)
    }

    // --- Meet controls ---

    pub fn set_media_mode(&self, mode: MediaMode) -> Result<()> {
        self.send(Command::SetMediaMode(mode))
    }

    pub fn set_auto_framing(&self, framing: FramingType) -> Result<()> {
        self.send(Command::SetAutoFraming(framing))
    }

    pub fn set_hdr(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetHdr(enabled))
    }

    /// Blur strength in percent. Only valid in [`MediaMode::Background`].
    pub fn set_background_blur(&self, level: i32) -> Result<()> {
        self.require(Capability::BackgroundBlur)?;
        let level = check_percent("background blur", level)?;
        let mode = self.read(|r| r.status.media_mode).ok_or(ObsbotError::InvalidHandle)?;
        if mode != Some(ReadValue::Known(MediaMode::Background)) {
            return Err(ObsbotError::ModeMismatch {
                required: MediaMode::Background,
                current: mode.map_or_else(|| "unknown".to_string(), |m| m.to_string()),
            });
        }
        self.registry.execute(self.handle, Command::SetBackgroundBlur(level))
    }

    // --- Image adjustments ---

    pub fn set_image(&self, control: ImageControl, value: i32) -> Result<()> {
        self.require(control.capability())?;
        let value = control.validate(value)?;
        self.registry.execute(self.handle, Command::SetImage(control, value))
    }

    pub fn set_brightness(&self, value: i32) -> Result<()> {
        self.set_image(ImageControl::Brightness, value)
    }

    pub fn set_contrast(&self, value: i32) -> Result<()> {
        self.set_image(ImageControl::Contrast, value)
    }

    pub fn set_saturation(&self, value: i32) -> Result<()> {
        self.set_image(ImageControl::Saturation, value)
    }

    pub fn set_hue(&self, value: i32) -> Result<()> {
        self.set_image(ImageControl::Hue, value)
    }

    pub fn set_sharpness(&self, value: i32) -> Result<()> {
        self.set_image(ImageControl::Sharpness, value)
    }

    pub fn set_white_balance(&self, white_balance: WhiteBalance) -> Result<()> {
        self.require(Capability::WhiteBalance)?;
        if let WhiteBalance::Manual { kelvin } = white_balance {
            WhiteBalance::from_parts(false, kelvin.try_into().unwrap_or(i32::MAX))?;
        }
        self.registry.execute(self.handle, Command::SetWhiteBalance(white_balance))
    }

    /// Digital zoom ratio, from 1.0 up to the model's maximum.
    pub fn set_zoom(&self, ratio: f32) -> Result<()> {
        self.require(Capability::Zoom)?;
        let max = self.read(|r| r.profile.max_zoom).ok_or(ObsbotError::InvalidHandle)?;
        if !ratio.is_finite() || !(MIN_ZOOM..=max).contains(&ratio) {
            return Err(ObsbotError::InvalidArgument {
                arg: "zoom",
                value: ratio.to_string(),
                valid: format!("{:.1}..={:.1}", MIN_ZOOM, max),
            });
        }
        self.registry.execute(self.handle, Command::SetZoom(ratio))
    }

    pub fn set_focus(&self, focus: Focus) -> Result<()> {
        self.require(Capability::Focus)?;
        if let Focus::Manual(value) = focus {
            check_percent("focus", value as i32)?;
        }
        self.registry.execute(self.handle, Command::SetFocus(focus))
    }

    pub fn set_anti_flicker(&self, mode: AntiFlicker) -> Result<()> {
        self.send(Command::SetAntiFlicker(mode))
    }

    /// Restore factory defaults for every control the device supports.
    pub fn reset_to_defaults(&self) -> Result<()> {
        self.send(Command::ResetDefaults)
    }

    // --- Internals ---

    fn read<R>(&self, f: impl FnOnce(&DeviceRecord) -> R) -> Option<R> {
        self.registry.with_record(self.handle, f)
    }

    fn read_field<T>(
        &self,
        capability: Capability,
        field: impl FnOnce(&CameraStatus) -> Option<T>,
    ) -> Result<T> {
        self.require(capability)?;
        self.read(|r| field(&r.status))
            .ok_or(ObsbotError::InvalidHandle)?
            .ok_or_else(|| ObsbotError::Backend(format!("{} is not readable", capability)))
    }

    /// Handle validity first, then the capability.
    fn require(&self, capability: Capability) -> Result<()> {
        let (supported, model) = self
            .read(|r| (r.capabilities.contains(capability), r.info.model_code.clone()))
            .ok_or(ObsbotError::InvalidHandle)?;
        if supported {
            Ok(())
        } else {
            debug!("{} rejected on {}: unsupported", capability, model);
            Err(ObsbotError::Unsupported { capability, model })
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.require(command.capability())?;
        self.registry.execute(self.handle, command)
    }
}

fn check_percent(arg: &'static str, value: i32) -> Result<u8> {
    if PERCENT_RANGE.contains(&value) {
        Ok(value as u8)
    } else {
        Err(ObsbotError::InvalidArgument {
            arg,
            value: value.to_string(),
            valid: "0..=100".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBackend, SimDevice};

    fn single(device: SimDevice) -> (Registry, SimBackend, DeviceHandle) {
        let sim = SimBackend::with_devices([device]);
        let registry = Registry::new(sim.clone());
        registry.refresh().unwrap();
        let handle = registry.get(0).unwrap();
        (registry, sim, handle)
    }

    #[test]
    fn accessors_report_record_info() {
        let (registry, _, handle) = single(SimDevice::new("ABC123", "OBSBOT Meet 2").version("2.1.4"));
        let dev = registry.device(handle);
        assert_eq!(dev.serial(), "ABC123");
        assert_eq!(dev.version(), "2.1.4");
        assert_eq!(dev.model(), "OBSBOT Meet 2");
        assert!(dev.is_initialized());
        assert!(dev.is_connected());
        assert!(dev.supports(Capability::Hdr));
    }

    #[test]
    fn uninitialized_device_is_not_connected() {
        let (registry, _, handle) = single(SimDevice::new("A", "OBSBOT Meet SE").uninitialized());
        let dev = registry.device(handle);
        assert!(dev.is_valid());
        assert!(!dev.is_connected());
    }

    #[test]
    fn unsupported_hdr_leaves_state_unchanged() {
        let (registry, sim, handle) =
            single(SimDevice::new("A", "OBSBOT Meet SE").without(Capability::Hdr));
        let dev = registry.device(handle);
        let before = dev.status();

        let err = dev.set_hdr(true).unwrap_err();
        assert!(err.is_unsupported());
        assert!(dev.hdr().unwrap_err().is_unsupported());
        assert_eq!(dev.status(), before);
        assert!(sim.applied().is_empty());
    }

    #[test]
    fn stale_handle_is_empty_and_rejects_commands() {
        let (registry, sim, handle) = single(SimDevice::new("A", "OBSBOT Meet SE"));
        sim.detach("A");
        registry.refresh().unwrap();

        let dev = registry.device(handle);
        assert_eq!(dev.serial(), "");
        assert_eq!(dev.model(), "");
        assert!(!dev.is_connected());
        assert!(dev.capabilities().is_empty());
        assert!(dev.status().is_none());
        assert!(matches!(dev.set_brightness(50), Err(ObsbotError::InvalidHandle)));
        assert!(matches!(dev.media_mode(), Err(ObsbotError::InvalidHandle)));
        assert!(matches!(dev.set_background_blur(500), Err(ObsbotError::InvalidHandle)));
    }

    #[test]
    fn range_checks_run_before_the_backend() {
        let (registry, sim, handle) = single(SimDevice::new("A", "OBSBOT Meet SE"));
        let dev = registry.device(handle);
        assert!(matches!(dev.set_brightness(101), Err(ObsbotError::InvalidArgument { .. })));
        assert!(matches!(dev.set_hue(-181), Err(ObsbotError::InvalidArgument { .. })));
        assert!(matches!(
            dev.set_white_balance(WhiteBalance::Manual { kelvin: 1500 }),
            Err(ObsbotError::InvalidArgument { .. })
        ));
        assert!(matches!(dev.set_zoom(0.5), Err(ObsbotError::InvalidArgument { .. })));
        assert!(matches!(dev.set_zoom(4.5), Err(ObsbotError::InvalidArgument { .. })));
        assert!(matches!(dev.set_zoom(f32::NAN), Err(ObsbotError::InvalidArgument { .. })));
        assert!(matches!(dev.set_focus(Focus::Manual(120)), Err(ObsbotError::InvalidArgument { .. })));
        assert!(sim.applied().is_empty());
    }

    #[test]
    fn unsupported_wins_over_bad_argument() {
        let (registry, _, handle) = single(SimDevice::new("A", "OBSBOT Meet SE"));
        // Meet SE has no focus motor
        let err = registry.device(handle).set_focus(Focus::Manual(200)).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn successful_set_updates_snapshot() {
        let (registry, _, handle) = single(SimDevice::new("A", "OBSBOT Meet 2"));
        let dev = registry.device(handle);
        dev.set_media_mode(MediaMode::AutoFrame).unwrap();
        dev.set_auto_framing(FramingType::Single).unwrap();
        dev.set_hdr(true).unwrap();
        dev.set_contrast(70).unwrap();
        dev.set_zoom(2.5).unwrap();

        assert_eq!(dev.media_mode().unwrap().known(), Some(MediaMode::AutoFrame));
        assert_eq!(dev.auto_framing().unwrap().known(), Some(FramingType::Single));
        assert!(dev.hdr().unwrap());
        let status = dev.status().unwrap();
        assert_eq!(status.image.contrast, Some(70));
        assert_eq!(status.zoom, Some(2.5));
    }

    #[test]
    fn background_blur_requires_background_mode() {
        let (registry, sim, handle) = single(SimDevice::new("A", "OBSBOT Meet SE"));
        let dev = registry.device(handle);

        let err = dev.set_background_blur(40).unwrap_err();
        assert!(matches!(
            err,
            ObsbotError::ModeMismatch { required: MediaMode::Background, .. }
        ));
        // range is checked before mode
        assert!(matches!(dev.set_background_blur(101), Err(ObsbotError::InvalidArgument { .. })));

        dev.set_media_mode(MediaMode::Background).unwrap();
        dev.set_background_blur(40).unwrap();
        assert_eq!(dev.status().unwrap().background_blur, Some(40));
        assert_eq!(sim.device_status("A").unwrap().background_blur, Some(40));
    }

    #[test]
    fn backend_failure_keeps_previous_value() {
        let (registry, sim, handle) = single(SimDevice::new("A", "OBSBOT Meet SE"));
        let dev = registry.device(handle);
        dev.set_saturation(30).unwrap();

        sim.fail_next("pipe error");
        let err = dev.set_saturation(90).unwrap_err();
        assert_eq!(err.status_code(), crate::error::STATUS_TRANSPORT);
        assert_eq!(dev.status().unwrap().image.saturation, Some(30));
    }

    #[test]
    fn reset_rereads_factory_state() {
        let (registry, _, handle) = single(SimDevice::new("A", "OBSBOT Meet SE"));
        let dev = registry.device(handle);
        dev.set_media_mode(MediaMode::Background).unwrap();
        dev.set_brightness(10).unwrap();

        dev.reset_to_defaults().unwrap();
        let status = dev.status().unwrap();
        assert_eq!(status.media_mode, Some(ReadValue::Known(MediaMode::Normal)));
        assert_eq!(status.image.brightness, Some(50));
    }
}
