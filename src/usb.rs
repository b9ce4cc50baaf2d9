//! USB discovery and the libusb-backed [`DeviceBackend`].
//!
//! [`UsbBackend::enumerate`] scans the bus for OBSBOT vendor IDs, reads the
//! serial and product strings, and parses each camera's UVC topology.  Every
//! command opens a short-lived [`UvcSession`], which claims the VideoControl
//! interface and gives it back on drop.
//!
//! Only standard UVC controls are driven.  Media mode, auto framing, HDR and
//! background blur live behind OBSBOT's vendor extension unit, which this
//! backend does not speak; they report unsupported.

use std::collections::HashMap;
use std::time::Duration;

use rusb::{Context, Device, UsbContext};
use tracing::{debug, info, warn};

use crate::backend::{Command, DeviceBackend, DeviceInfo};
use crate::capability::{Capability, CapabilitySet, ModelProfile};
use crate::error::{ObsbotError, Result};
use crate::protocol::*;
use crate::settings::{AntiFlicker, Focus, ImageControl, WhiteBalance};
use crate::status::{CameraStatus, ReadValue};
use crate::uvc::{self, UvcControl, UvcSession, UvcTopology};

/// What enumeration learned about one camera.
#[derive(Debug, Clone)]
struct KnownDevice {
    info: DeviceInfo,
    topology: Option<UvcTopology>,
    profile: ModelProfile,
}

/// Backend driving OBSBOT cameras through libusb.
pub struct UsbBackend {
    context: Context,
    timeout: Duration,
    detach_kernel_driver: bool,
    known: HashMap<String, KnownDevice>,
}

/// An open session plus what enumeration learned about its device.
struct Target {
    session: UvcSession,
    topology: UvcTopology,
    profile: ModelProfile,
    model: String,
}

impl Target {
    fn require(&self, control: &UvcControl, capability: Capability) -> Result<()> {
        require_control(&self.topology, control, capability, &self.model)
    }
}

/// Fails with `Unsupported` when the device does not advertise `control`.
fn require_control(
    topology: &UvcTopology,
    control: &UvcControl,
    capability: Capability,
    model: &str,
) -> Result<()> {
    if topology.supports(control) {
        Ok(())
    } else {
        debug!("{} does not advertise the {} control", model, control.name);
        Err(ObsbotError::Unsupported {
            capability,
            model: model.to_string(),
        })
    }
}

pub fn is_obsbot_vendor(vendor_id: u16) -> bool {
    VENDOR_IDS.iter().any(|&(vid, _)| vid == vendor_id)
}

fn format_version(version: rusb::Version) -> String {
    format!("{}.{}.{}", version.major(), version.minor(), version.sub_minor())
}

fn image_control(control: ImageControl) -> UvcControl {
    match control {
        ImageControl::Brightness => uvc::BRIGHTNESS,
        ImageControl::Contrast => uvc::CONTRAST,
        ImageControl::Saturation => uvc::SATURATION,
        ImageControl::Hue => uvc::HUE,
        ImageControl::Sharpness => uvc::SHARPNESS,
    }
}

impl UsbBackend {
    pub fn new() -> Result<Self> {
        Ok(Self {
            context: Context::new()?,
            timeout: USB_TIMEOUT,
            detach_kernel_driver: true,
            known: HashMap::new(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether to detach `uvcvideo` while a control transfer is in flight.
    pub fn with_detach_kernel_driver(mut self, detach: bool) -> Self {
        self.detach_kernel_driver = detach;
        self
    }

    fn probe(&self, device: &Device<Context>) -> Result<Option<KnownDevice>> {
        let desc = device.device_descriptor()?;
        if !is_obsbot_vendor(desc.vendor_id()) {
            return Ok(None);
        }

        let ids = format!("{:04x}:{:04x}", desc.vendor_id(), desc.product_id());
        let handle = device.open()?;

        let serial = match handle.read_serial_number_string_ascii(&desc) {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                warn!("Skipping {}: no serial number descriptor", ids);
                return Ok(None);
            }
        };
        let model_code = handle
            .read_product_string_ascii(&desc)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| ids.clone());

        let topology = match uvc::read_topology(device) {
            Ok(t) => t,
            Err(e) => {
                warn!("Failed to read UVC topology of {} ({}): {}", serial, ids, e);
                None
            }
        };

        debug!("Found {} ({}) serial {}", model_code, ids, serial);
        let profile = ModelProfile::for_model(&model_code);
        Ok(Some(KnownDevice {
            info: DeviceInfo {
                serial,
                version: format_version(desc.device_version()),
                model_code,
                initialized: topology.is_some(),
            },
            topology,
            profile,
        }))
    }

    fn find_device(&self, serial: &str) -> Result<Device<Context>> {
        for device in self.context.devices()?.iter() {
            let desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if !is_obsbot_vendor(desc.vendor_id()) {
                continue;
            }
            let Ok(handle) = device.open() else { continue };
            if handle
                .read_serial_number_string_ascii(&desc)
                .is_ok_and(|s| s.trim() == serial)
            {
                return Ok(device);
            }
        }
        Err(ObsbotError::DeviceNotFound)
    }

    fn open_session(&self, serial: &str) -> Result<Target> {
        let known = self.known.get(serial).ok_or(ObsbotError::DeviceNotFound)?;
        let topology = known.topology.ok_or_else(|| {
            ObsbotError::Backend(format!("{} has no UVC VideoControl interface", serial))
        })?;
        let device = self.find_device(serial)?;
        let session = UvcSession::open(&device, topology, self.detach_kernel_driver, self.timeout)?;
        Ok(Target {
            session,
            topology,
            profile: known.profile,
            model: known.info.model_code.clone(),
        })
    }

    /// Vendor extension-unit controls are not spoken by this backend.
    fn vendor_unsupported(&self, serial: &str, command: &Command) -> ObsbotError {
        let model = self
            .known
            .get(serial)
            .map(|k| k.info.model_code.clone())
            .unwrap_or_else(|| serial.to_string());
        ObsbotError::Unsupported {
            capability: command.capability(),
            model,
        }
    }

    fn write_image(target: &Target, control: ImageControl, value: i32) -> Result<()> {
        let uvc_control = image_control(control);
        target.require(&uvc_control, control.capability())?;
        let session = &target.session;
        match control {
            // UVC hue is in hundredths of a degree
            ImageControl::Hue => {
                let (min, max) = session.range(&uvc_control)?;
                session.set_cur(&uvc_control, (value * 100).clamp(min, max))
            }
            _ => session.write_percent(&uvc_control, value),
        }
    }

    fn read_image(session: &UvcSession, control: ImageControl) -> Result<i32> {
        let uvc_control = image_control(control);
        match control {
            ImageControl::Hue => Ok(session.get_cur(&uvc_control)? / 100),
            _ => session.read_percent(&uvc_control),
        }
    }

    fn write_white_balance(target: &Target, wb: WhiteBalance) -> Result<()> {
        let session = &target.session;
        let has_auto = session.supports(&uvc::WHITE_BALANCE_AUTO);
        match wb {
            WhiteBalance::Auto => {
                target.require(&uvc::WHITE_BALANCE_AUTO, Capability::WhiteBalance)?;
                session.set_cur(&uvc::WHITE_BALANCE_AUTO, 1)
            }
            WhiteBalance::Manual { kelvin } => {
                target.require(&uvc::WHITE_BALANCE_TEMPERATURE, Capability::WhiteBalance)?;
                if has_auto {
                    session.set_cur(&uvc::WHITE_BALANCE_AUTO, 0)?;
                }
                let (min, max) = session.range(&uvc::WHITE_BALANCE_TEMPERATURE)?;
                session.set_cur(&uvc::WHITE_BALANCE_TEMPERATURE, (kelvin as i32).clamp(min, max))
            }
        }
    }

    fn write_focus(target: &Target, focus: Focus) -> Result<()> {
        let session = &target.session;
        match focus {
            Focus::Auto => {
                target.require(&uvc::FOCUS_AUTO, Capability::Focus)?;
                session.set_cur(&uvc::FOCUS_AUTO, 1)
            }
            Focus::Manual(percent) => {
                target.require(&uvc::FOCUS_ABSOLUTE, Capability::Focus)?;
                if session.supports(&uvc::FOCUS_AUTO) {
                    session.set_cur(&uvc::FOCUS_AUTO, 0)?;
                }
                session.write_percent(&uvc::FOCUS_ABSOLUTE, percent as i32)
            }
        }
    }

    fn reset(session: &UvcSession) -> Result<()> {
        let mut restored = 0;
        for control in uvc::RESETTABLE {
            if !session.supports(control) {
                continue;
            }
            session.restore_default(control)?;
            restored += 1;
        }
        info!("Restored {} controls to their defaults", restored);
        Ok(())
    }

    fn read_all(session: &UvcSession, profile: &ModelProfile) -> CameraStatus {
        let mut status = CameraStatus::default();

        for control in ImageControl::ALL {
            if !session.supports(&image_control(control)) {
                continue;
            }
            match Self::read_image(session, control) {
                Ok(v) => status.image.set(control, v),
                Err(e) => debug!("Could not read {}: {}", control, e),
            }
        }

        if session.supports(&uvc::WHITE_BALANCE_TEMPERATURE) {
            let auto = session.supports(&uvc::WHITE_BALANCE_AUTO)
                && session.get_cur(&uvc::WHITE_BALANCE_AUTO).is_ok_and(|v| v != 0);
            status.white_balance = if auto {
                Some(WhiteBalance::Auto)
            } else {
                session
                    .get_cur(&uvc::WHITE_BALANCE_TEMPERATURE)
                    .ok()
                    .map(|k| WhiteBalance::Manual { kelvin: k.max(0) as u32 })
            };
        }

        if session.supports(&uvc::FOCUS_ABSOLUTE) {
            let auto = session.supports(&uvc::FOCUS_AUTO)
                && session.get_cur(&uvc::FOCUS_AUTO).is_ok_and(|v| v != 0);
            status.focus = if auto {
                Some(Focus::Auto)
            } else {
                session
                    .read_percent(&uvc::FOCUS_ABSOLUTE)
                    .ok()
                    .map(|p| Focus::Manual(p as u8))
            };
        }

        if session.supports(&uvc::ZOOM_ABSOLUTE) {
            status.zoom = session.range(&uvc::ZOOM_ABSOLUTE).ok().and_then(|(min, max)| {
                let raw = session.get_cur(&uvc::ZOOM_ABSOLUTE).ok()?;
                Some(uvc::raw_to_zoom(raw, profile.max_zoom, min, max))
            });
        }

        if session.supports(&uvc::POWER_LINE_FREQUENCY) {
            status.anti_flicker = session.get_cur(&uvc::POWER_LINE_FREQUENCY).ok().map(|raw| {
                AntiFlicker::from_raw(raw).map_or(ReadValue::Unknown(raw), ReadValue::Known)
            });
        }

        status
    }
}

impl DeviceBackend for UsbBackend {
    fn name(&self) -> &'static str {
        "usb"
    }

    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>> {
        let mut found = Vec::new();
        let mut known = HashMap::new();

        for device in self.context.devices()?.iter() {
            match self.probe(&device) {
                Ok(Some(dev)) => {
                    found.push(dev.info.clone());
                    known.insert(dev.info.serial.clone(), dev);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "Skipping USB device on bus {} address {}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }

        self.known = known;
        Ok(found)
    }

    fn capabilities(&self, info: &DeviceInfo) -> CapabilitySet {
        self.known
            .get(&info.serial)
            .and_then(|k| k.topology)
            .map(|t| t.capabilities())
            .unwrap_or_default()
    }

    fn read_status(&mut self, serial: &str) -> Result<CameraStatus> {
        let target = self.open_session(serial)?;
        Ok(Self::read_all(&target.session, &target.profile))
    }

    fn apply(&mut self, serial: &str, command: &Command) -> Result<()> {
        let target = match command {
            Command::SetMediaMode(_)
            | Command::SetAutoFraming(_)
            | Command::SetHdr(_)
            | Command::SetBackgroundBlur(_) => return Err(self.vendor_unsupported(serial, command)),
            _ => self.open_session(serial)?,
        };

        let session = &target.session;
        match *command {
            Command::SetImage(control, value) => Self::write_image(&target, control, value),
            Command::SetWhiteBalance(wb) => Self::write_white_balance(&target, wb),
            Command::SetZoom(ratio) => {
                target.require(&uvc::ZOOM_ABSOLUTE, Capability::Zoom)?;
                let (min, max) = session.range(&uvc::ZOOM_ABSOLUTE)?;
                let raw = uvc::zoom_to_raw(ratio, target.profile.max_zoom, min, max);
                session.set_cur(&uvc::ZOOM_ABSOLUTE, raw)
            }
            Command::SetFocus(focus) => Self::write_focus(&target, focus),
            Command::SetAntiFlicker(mode) => {
                target.require(&uvc::POWER_LINE_FREQUENCY, Capability::AntiFlicker)?;
                session.set_cur(&uvc::POWER_LINE_FREQUENCY, mode.raw())
            }
            Command::ResetDefaults => Self::reset(session),
            Command::SetMediaMode(_)
            | Command::SetAutoFraming(_)
            | Command::SetHdr(_)
            | Command::SetBackgroundBlur(_) => Err(self.vendor_unsupported(serial, command)),
        }
    }
}
