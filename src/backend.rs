//! The seam between the registry and whatever actually talks to cameras.
//!
//! A [`DeviceBackend`] enumerates attached devices, reports which controls it
//! can drive for each one, reads status snapshots, and applies typed
//! [`Command`]s.  [`UsbBackend`](crate::UsbBackend) talks standard UVC over
//! libusb; [`SimBackend`](crate::SimBackend) keeps everything in memory.

use crate::capability::{Capability, CapabilitySet};
use crate::error::Result;
use crate::settings::{AntiFlicker, Focus, FramingType, ImageControl, MediaMode, WhiteBalance};
use crate::status::CameraStatus;

/// Identity of one enumerated device, as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Serial number; unique key within a registry.
    pub serial: String,
    /// Firmware version string.
    pub version: String,
    /// Model code (USB product string).
    pub model_code: String,
    /// Whether the device finished initializing and accepts commands.
    pub initialized: bool,
}

/// A typed control write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetMediaMode(MediaMode),
    SetAutoFraming(FramingType),
    SetHdr(bool),
    SetImage(ImageControl, i32),
    SetWhiteBalance(WhiteBalance),
    SetZoom(f32),
    SetFocus(Focus),
    SetAntiFlicker(AntiFlicker),
    SetBackgroundBlur(u8),
    ResetDefaults,
}

impl Command {
    /// The capability a device needs for this command.
    pub fn capability(&self) -> Capability {
        match self {
            Self::SetMediaMode(_) => Capability::MediaMode,
            Self::SetAutoFraming(_) => Capability::AutoFraming,
            Self::SetHdr(_) => Capability::Hdr,
            Self::SetImage(control, _) => control.capability(),
            Self::SetWhiteBalance(_) => Capability::WhiteBalance,
            Self::SetZoom(_) => Capability::Zoom,
            Self::SetFocus(_) => Capability::Focus,
            Self::SetAntiFlicker(_) => Capability::AntiFlicker,
            Self::SetBackgroundBlur(_) => Capability::BackgroundBlur,
            Self::ResetDefaults => Capability::FactoryReset,
        }
    }
}

/// Device discovery and control transport.
///
/// Backends are driven by one registry and are never called concurrently;
/// the registry serializes access behind a mutex.
pub trait DeviceBackend: Send {
    /// Short name for logs ("usb", "simulated").
    fn name(&self) -> &'static str;

    /// List the devices currently attached.
    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>>;

    /// Controls this backend can drive on the given device.
    fn capabilities(&self, info: &DeviceInfo) -> CapabilitySet;

    /// Read the current status of a device.
    fn read_status(&mut self, serial: &str) -> Result<CameraStatus>;

    /// Apply a command to a device.
    fn apply(&mut self, serial: &str, command: &Command) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_capabilities() {
        assert_eq!(Command::SetHdr(true).capability(), Capability::Hdr);
        assert_eq!(
            Command::SetImage(ImageControl::Hue, 10).capability(),
            Capability::Hue
        );
        assert_eq!(Command::ResetDefaults.capability(), Capability::FactoryReset);
    }
}
