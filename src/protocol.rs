//! Protocol constants for OBSBOT cameras over standard UVC.
//!
//! All USB identifiers, UVC request codes, descriptor subtypes and control
//! selectors are defined here so the rest of the codebase references named
//! constants instead of raw hex.  Values come from the USB Video Class 1.5
//! specification (Appendix A).

// ---------------------------------------------------------------------------
// USB device identifiers
// ---------------------------------------------------------------------------

/// Vendor IDs used by OBSBOT (Remo Tech) cameras.
pub const VENDOR_IDS: &[(u16, &str)] = &[
    (0x3564, "Remo Tech"),
    (0x6e30, "Remo Tech (legacy)"),
];

// ---------------------------------------------------------------------------
// Interface classification
// ---------------------------------------------------------------------------

/// USB interface class: Video.
pub const CC_VIDEO: u8 = 0x0e;
/// Video interface subclass: VideoControl.
pub const SC_VIDEOCONTROL: u8 = 0x01;
/// Class-specific interface descriptor type.
pub const CS_INTERFACE: u8 = 0x24;
/// VideoControl descriptor subtype: input terminal.
pub const VC_INPUT_TERMINAL: u8 = 0x02;
/// VideoControl descriptor subtype: processing unit.
pub const VC_PROCESSING_UNIT: u8 = 0x05;
/// Input terminal type: camera sensor.
pub const ITT_CAMERA: u16 = 0x0201;

// ---------------------------------------------------------------------------
// UVC class requests
// ---------------------------------------------------------------------------

/// bmRequestType for UVC class request (host-to-device, interface).
pub const UVC_REQUEST_TYPE_OUT: u8 = 0x21;
/// bmRequestType for UVC class request (device-to-host, interface).
pub const UVC_REQUEST_TYPE_IN: u8 = 0xA1;
/// SET_CUR bRequest.
pub const UVC_SET_CUR: u8 = 0x01;
/// GET_CUR bRequest.
pub const UVC_GET_CUR: u8 = 0x81;
/// GET_MIN bRequest.
pub const UVC_GET_MIN: u8 = 0x82;
/// GET_MAX bRequest.
pub const UVC_GET_MAX: u8 = 0x83;
/// GET_DEF bRequest.
pub const UVC_GET_DEF: u8 = 0x87;

// ---------------------------------------------------------------------------
// Processing unit control selectors and bmControls bits
// ---------------------------------------------------------------------------

pub const PU_BRIGHTNESS_CONTROL: u8 = 0x02;
pub const PU_CONTRAST_CONTROL: u8 = 0x03;
pub const PU_POWER_LINE_FREQUENCY_CONTROL: u8 = 0x05;
pub const PU_HUE_CONTROL: u8 = 0x06;
pub const PU_SATURATION_CONTROL: u8 = 0x07;
pub const PU_SHARPNESS_CONTROL: u8 = 0x08;
pub const PU_WHITE_BALANCE_TEMPERATURE_CONTROL: u8 = 0x0a;
pub const PU_WHITE_BALANCE_TEMPERATURE_AUTO_CONTROL: u8 = 0x0b;

pub const PU_BIT_BRIGHTNESS: u32 = 1 << 0;
pub const PU_BIT_CONTRAST: u32 = 1 << 1;
pub const PU_BIT_HUE: u32 = 1 << 2;
pub const PU_BIT_SATURATION: u32 = 1 << 3;
pub const PU_BIT_SHARPNESS: u32 = 1 << 4;
pub const PU_BIT_WHITE_BALANCE_TEMPERATURE: u32 = 1 << 6;
pub const PU_BIT_POWER_LINE_FREQUENCY: u32 = 1 << 10;
pub const PU_BIT_WHITE_BALANCE_TEMPERATURE_AUTO: u32 = 1 << 12;

// ---------------------------------------------------------------------------
// Camera terminal control selectors and bmControls bits
// ---------------------------------------------------------------------------

pub const CT_FOCUS_ABSOLUTE_CONTROL: u8 = 0x06;
pub const CT_FOCUS_AUTO_CONTROL: u8 = 0x08;
pub const CT_ZOOM_ABSOLUTE_CONTROL: u8 = 0x0b;

pub const CT_BIT_FOCUS_ABSOLUTE: u32 = 1 << 5;
pub const CT_BIT_ZOOM_ABSOLUTE: u32 = 1 << 9;
pub const CT_BIT_FOCUS_AUTO: u32 = 1 << 17;

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// Default USB control transfer timeout.
pub const USB_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);
