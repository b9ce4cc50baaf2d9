//! Standard UVC control transport.
//!
//! OBSBOT cameras expose the usual Processing Unit and Camera Terminal
//! controls on their VideoControl interface.  Entity IDs differ between
//! models, so they are read from the class-specific descriptors instead of
//! being hardcoded:
//!
//!   1. find the interface with class 0x0e / subclass 0x01 (VideoControl)
//!   2. walk its `extra` bytes for `CS_INTERFACE` descriptors
//!   3. take the camera input terminal and processing unit IDs plus their
//!      `bmControls` bitmaps
//!
//! Every control is then a plain SET_CUR / GET_CUR / GET_MIN / GET_MAX /
//! GET_DEF on `wValue = selector << 8`, `wIndex = entity << 8 | interface`.

use std::time::Duration;

use rusb::{Context, Device, DeviceHandle};
use tracing::{debug, warn};

use crate::capability::{Capability, CapabilitySet};
use crate::error::{ObsbotError, Result};
use crate::protocol::*;

/// Which UVC entity a control lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    CameraTerminal,
    ProcessingUnit,
}

/// One entity found in the VideoControl descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entity {
    pub id: u8,
    /// `bmControls` bitmap, little-endian, truncated to 32 bits.
    pub controls: u32,
}

/// Where the standard controls of one camera live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UvcTopology {
    pub interface: u8,
    pub camera_terminal: Option<Entity>,
    pub processing_unit: Option<Entity>,
}

/// A standard UVC control: entity, selector and wire size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UvcControl {
    pub name: &'static str,
    pub unit: Unit,
    pub selector: u8,
    pub size: usize,
    pub signed: bool,
    /// Bit in the entity's `bmControls` advertising this control.
    pub bit: u32,
}

pub const BRIGHTNESS: UvcControl = UvcControl {
    name: "brightness",
    unit: Unit::ProcessingUnit,
    selector: PU_BRIGHTNESS_CONTROL,
    size: 2,
    signed: true,
    bit: PU_BIT_BRIGHTNESS,
};

pub const CONTRAST: UvcControl = UvcControl {
    name: "contrast",
    unit: Unit::ProcessingUnit,
    selector: PU_CONTRAST_CONTROL,
    size: 2,
    signed: false,
    bit: PU_BIT_CONTRAST,
};

pub const HUE: UvcControl = UvcControl {
    name: "hue",
    unit: Unit::ProcessingUnit,
    selector: PU_HUE_CONTROL,
    size: 2,
    signed: true,
    bit: PU_BIT_HUE,
};

pub const SATURATION: UvcControl = UvcControl {
    name: "saturation",
    unit: Unit::ProcessingUnit,
    selector: PU_SATURATION_CONTROL,
    size: 2,
    signed: false,
    bit: PU_BIT_SATURATION,
};

pub const SHARPNESS: UvcControl = UvcControl {
    name: "sharpness",
    unit: Unit::ProcessingUnit,
    selector: PU_SHARPNESS_CONTROL,
    size: 2,
    signed: false,
    bit: PU_BIT_SHARPNESS,
};

pub const WHITE_BALANCE_TEMPERATURE: UvcControl = UvcControl {
    name: "white balance temperature",
    unit: Unit::ProcessingUnit,
    selector: PU_WHITE_BALANCE_TEMPERATURE_CONTROL,
    size: 2,
    signed: false,
    bit: PU_BIT_WHITE_BALANCE_TEMPERATURE,
};

pub const WHITE_BALANCE_AUTO: UvcControl = UvcControl {
    name: "white balance auto",
    unit: Unit::ProcessingUnit,
    selector: PU_WHITE_BALANCE_TEMPERATURE_AUTO_CONTROL,
    size: 1,
    signed: false,
    bit: PU_BIT_WHITE_BALANCE_TEMPERATURE_AUTO,
};

pub const POWER_LINE_FREQUENCY: UvcControl = UvcControl {
    name: "power line frequency",
    unit: Unit::ProcessingUnit,
    selector: PU_POWER_LINE_FREQUENCY_CONTROL,
    size: 1,
    signed: false,
    bit: PU_BIT_POWER_LINE_FREQUENCY,
};

pub const FOCUS_ABSOLUTE: UvcControl = UvcControl {
    name: "focus",
    unit: Unit::CameraTerminal,
    selector: CT_FOCUS_ABSOLUTE_CONTROL,
    size: 2,
    signed: false,
    bit: CT_BIT_FOCUS_ABSOLUTE,
};

pub const FOCUS_AUTO: UvcControl = UvcControl {
    name: "focus auto",
    unit: Unit::CameraTerminal,
    selector: CT_FOCUS_AUTO_CONTROL,
    size: 1,
    signed: false,
    bit: CT_BIT_FOCUS_AUTO,
};

pub const ZOOM_ABSOLUTE: UvcControl = UvcControl {
    name: "zoom",
    unit: Unit::CameraTerminal,
    selector: CT_ZOOM_ABSOLUTE_CONTROL,
    size: 2,
    signed: false,
    bit: CT_BIT_ZOOM_ABSOLUTE,
};

/// Controls restored by a defaults reset. Auto modes come first so the
/// manual values written afterwards are not rejected by the device.
pub const RESETTABLE: &[UvcControl] = &[
    WHITE_BALANCE_AUTO,
    FOCUS_AUTO,
    BRIGHTNESS,
    CONTRAST,
    HUE,
    SATURATION,
    SHARPNESS,
    POWER_LINE_FREQUENCY,
    ZOOM_ABSOLUTE,
];

// ---------------------------------------------------------------------------
// Descriptor parsing
// ---------------------------------------------------------------------------

fn bitmap(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .enumerate()
        .fold(0u32, |acc, (i, &b)| acc | (b as u32) << (8 * i))
}

/// Parse the class-specific VideoControl descriptors.
///
/// Returns `(camera_terminal, processing_unit)`; the first of each wins.
/// Malformed trailing bytes end the walk instead of failing it.
pub fn parse_video_control(extra: &[u8]) -> (Option<Entity>, Option<Entity>) {
    let mut camera = None;
    let mut processing = None;
    let mut i = 0;

    while i + 3 <= extra.len() {
        let len = extra[i] as usize;
        if len < 3 || i + len > extra.len() {
            break;
        }
        let desc = &extra[i..i + len];
        i += len;

        if desc[1] != CS_INTERFACE {
            continue;
        }

        match desc[2] {
            VC_INPUT_TERMINAL if camera.is_none() && len >= 15 => {
                let terminal_type = u16::from_le_bytes([desc[4], desc[5]]);
                if terminal_type != ITT_CAMERA {
                    continue;
                }
                let size = desc[14] as usize;
                let end = (15 + size).min(len);
                camera = Some(Entity {
                    id: desc[3],
                    controls: bitmap(&desc[15..end]),
                });
            }
            VC_PROCESSING_UNIT if processing.is_none() && len >= 8 => {
                let size = desc[7] as usize;
                let end = (8 + size).min(len);
                processing = Some(Entity {
                    id: desc[3],
                    controls: bitmap(&desc[8..end]),
                });
            }
            _ => {}
        }
    }

    (camera, processing)
}

/// Locate the VideoControl interface of a device and parse its topology.
///
/// Returns `Ok(None)` for devices without a VideoControl interface.
pub fn read_topology(device: &Device<Context>) -> Result<Option<UvcTopology>> {
    let config = device.active_config_descriptor()?;

    for interface in config.interfaces() {
        for desc in interface.descriptors() {
            if desc.class_code() != CC_VIDEO || desc.sub_class_code() != SC_VIDEOCONTROL {
                continue;
            }
            let (camera_terminal, processing_unit) = parse_video_control(desc.extra());
            debug!(
                "VideoControl interface {}: CT {:?}, PU {:?}",
                desc.interface_number(),
                camera_terminal,
                processing_unit
            );
            return Ok(Some(UvcTopology {
                interface: desc.interface_number(),
                camera_terminal,
                processing_unit,
            }));
        }
    }

    Ok(None)
}

impl UvcTopology {
    fn entity(&self, unit: Unit) -> Option<Entity> {
        match unit {
            Unit::CameraTerminal => self.camera_terminal,
            Unit::ProcessingUnit => self.processing_unit,
        }
    }

    /// Whether the device advertises a control in its `bmControls`.
    pub fn supports(&self, control: &UvcControl) -> bool {
        self.entity(control.unit)
            .is_some_and(|e| e.controls & control.bit != 0)
    }

    /// Capabilities reachable through standard UVC controls.
    pub fn capabilities(&self) -> CapabilitySet {
        let mut caps = CapabilitySet::empty();
        let pairs = [
            (BRIGHTNESS, Capability::Brightness),
            (CONTRAST, Capability::Contrast),
            (SATURATION, Capability::Saturation),
            (HUE, Capability::Hue),
            (SHARPNESS, Capability::Sharpness),
            (WHITE_BALANCE_TEMPERATURE, Capability::WhiteBalance),
            (POWER_LINE_FREQUENCY, Capability::AntiFlicker),
            (ZOOM_ABSOLUTE, Capability::Zoom),
            (FOCUS_ABSOLUTE, Capability::Focus),
        ];
        for (control, capability) in pairs {
            if self.supports(&control) {
                caps.insert(capability);
            }
        }
        if RESETTABLE.iter().any(|c| self.supports(c)) {
            caps.insert(Capability::FactoryReset);
        }
        caps
    }
}

// ---------------------------------------------------------------------------
// Value encoding and scaling
// ---------------------------------------------------------------------------

/// Encode a control value little-endian in `size` bytes.
pub fn encode_value(value: i32, size: usize) -> Vec<u8> {
    value.to_le_bytes()[..size.min(4)].to_vec()
}

/// Decode a little-endian control value, sign-extending when `signed`.
pub fn decode_value(bytes: &[u8], signed: bool) -> i32 {
    match (bytes.len(), signed) {
        (1, false) => bytes[0] as i32,
        (1, true) => bytes[0] as i8 as i32,
        (2, false) => u16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        (2, true) => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        (n, _) if n >= 4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => 0,
    }
}

/// Map a 0..=100 percentage onto a device range.
pub fn percent_to_raw(percent: i32, min: i32, max: i32) -> i32 {
    if max <= min {
        return min;
    }
    let span = (max - min) as f64;
    min + (span * percent.clamp(0, 100) as f64 / 100.0).round() as i32
}

/// Map a device value back onto 0..=100.
pub fn raw_to_percent(raw: i32, min: i32, max: i32) -> i32 {
    if max <= min {
        return 0;
    }
    let fraction = (raw - min) as f64 / (max - min) as f64;
    ((fraction * 100.0).round() as i32).clamp(0, 100)
}

/// Map a zoom ratio in `1.0..=max_ratio` onto a device range.
pub fn zoom_to_raw(ratio: f32, max_ratio: f32, min: i32, max: i32) -> i32 {
    if max_ratio <= 1.0 || max <= min {
        return min;
    }
    let fraction = ((ratio - 1.0) / (max_ratio - 1.0)).clamp(0.0, 1.0) as f64;
    min + (fraction * (max - min) as f64).round() as i32
}

/// Map a device zoom value back to a ratio.
pub fn raw_to_zoom(raw: i32, max_ratio: f32, min: i32, max: i32) -> f32 {
    if max_ratio <= 1.0 || max <= min {
        return 1.0;
    }
    let fraction = ((raw - min) as f32 / (max - min) as f32).clamp(0.0, 1.0);
    1.0 + fraction * (max_ratio - 1.0)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An opened camera with its VideoControl interface claimed.
///
/// Dropping the session releases the interface and re-attaches the kernel
/// driver if one had to be detached.
pub struct UvcSession {
    handle: DeviceHandle<Context>,
    topology: UvcTopology,
    timeout: Duration,
    reattach: bool,
}

impl UvcSession {
    pub fn open(
        device: &Device<Context>,
        topology: UvcTopology,
        detach_kernel_driver: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let handle = device.open()?;
        let interface = topology.interface;

        let mut reattach = false;
        if detach_kernel_driver && handle.kernel_driver_active(interface).unwrap_or(false) {
            handle.detach_kernel_driver(interface)?;
            debug!("Temporarily detached kernel driver from interface {}", interface);
            reattach = true;
        }

        handle.claim_interface(interface)?;
        debug!("Claimed VideoControl interface {}", interface);

        Ok(Self {
            handle,
            topology,
            timeout,
            reattach,
        })
    }

    pub fn supports(&self, control: &UvcControl) -> bool {
        self.topology.supports(control)
    }

    fn index(&self, control: &UvcControl) -> Result<u16> {
        let entity = self.topology.entity(control.unit).ok_or_else(|| {
            ObsbotError::UvcTransfer(format!("no entity for {} control", control.name))
        })?;
        Ok(((entity.id as u16) << 8) | self.topology.interface as u16)
    }

    /// Issue a GET_* request and decode the result.
    pub fn get(&self, request: u8, control: &UvcControl) -> Result<i32> {
        let w_value = (control.selector as u16) << 8;
        let w_index = self.index(control)?;
        let mut buf = vec![0u8; control.size];

        let len = self
            .handle
            .read_control(UVC_REQUEST_TYPE_IN, request, w_value, w_index, &mut buf, self.timeout)
            .map_err(|e| {
                ObsbotError::UvcTransfer(format!("GET 0x{:02x} {} failed: {}", request, control.name, e))
            })?;

        if len != control.size {
            return Err(ObsbotError::UvcTransfer(format!(
                "{} returned {} bytes, expected {}",
                control.name, len, control.size
            )));
        }
        Ok(decode_value(&buf, control.signed))
    }

    pub fn set_cur(&self, control: &UvcControl, value: i32) -> Result<()> {
        let w_value = (control.selector as u16) << 8;
        let w_index = self.index(control)?;
        let data = encode_value(value, control.size);

        debug!("SET_CUR {} = {} ({:02x?})", control.name, value, data);
        self.handle
            .write_control(UVC_REQUEST_TYPE_OUT, UVC_SET_CUR, w_value, w_index, &data, self.timeout)
            .map_err(|e| ObsbotError::UvcTransfer(format!("SET_CUR {} failed: {}", control.name, e)))?;
        Ok(())
    }

    pub fn get_cur(&self, control: &UvcControl) -> Result<i32> {
        self.get(UVC_GET_CUR, control)
    }

    pub fn range(&self, control: &UvcControl) -> Result<(i32, i32)> {
        Ok((self.get(UVC_GET_MIN, control)?, self.get(UVC_GET_MAX, control)?))
    }

    /// Write a 0..=100 percentage scaled onto the device's range.
    pub fn write_percent(&self, control: &UvcControl, percent: i32) -> Result<()> {
        let (min, max) = self.range(control)?;
        self.set_cur(control, percent_to_raw(percent, min, max))
    }

    pub fn read_percent(&self, control: &UvcControl) -> Result<i32> {
        let (min, max) = self.range(control)?;
        Ok(raw_to_percent(self.get_cur(control)?, min, max))
    }

    /// Write GET_DEF back as the current value.
    pub fn restore_default(&self, control: &UvcControl) -> Result<()> {
        let default = self.get(UVC_GET_DEF, control)?;
        self.set_cur(control, default)
    }
}

impl Drop for UvcSession {
    fn drop(&mut self) {
        let interface = self.topology.interface;
        if let Err(e) = self.handle.release_interface(interface) {
            warn!("Failed to release interface {}: {}", interface, e);
        }
        if self.reattach {
            if let Err(e) = self.handle.attach_kernel_driver(interface) {
                warn!("Failed to re-attach kernel driver on interface {}: {}", interface, e);
            }
        }
    }
}
