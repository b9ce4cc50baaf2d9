//! Camera status snapshot kept per device record.
//!
//! Every field is optional: `None` means the backend cannot read that value
//! for this device (for example vendor-only Meet controls over plain UVC).
//! The registry refreshes the snapshot on enumeration and patches it after
//! each successful command via [`CameraStatus::apply`].

use std::fmt;

use crate::backend::Command;
use crate::settings::{AntiFlicker, Focus, FramingType, ImageControl, MediaMode, WhiteBalance};

/// A value read from the device that may be a known enum variant or an
/// unrecognized raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadValue<T> {
    /// A recognized, strongly-typed value.
    Known(T),
    /// An unrecognized value reported by the device.
    Unknown(i32),
}

impl<T: fmt::Display> fmt::Display for ReadValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => write!(f, "{}", v),
            Self::Unknown(raw) => write!(f, "Unknown ({})", raw),
        }
    }
}

impl<T: Copy> ReadValue<T> {
    pub fn known(&self) -> Option<T> {
        match self {
            Self::Known(v) => Some(*v),
            Self::Unknown(_) => None,
        }
    }
}

/// Brightness, contrast, saturation, hue and sharpness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageAdjustments {
    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    pub saturation: Option<i32>,
    pub hue: Option<i32>,
    pub sharpness: Option<i32>,
}

impl ImageAdjustments {
    pub fn get(&self, control: ImageControl) -> Option<i32> {
        match control {
            ImageControl::Brightness => self.brightness,
            ImageControl::Contrast => self.contrast,
            ImageControl::Saturation => self.saturation,
            ImageControl::Hue => self.hue,
            ImageControl::Sharpness => self.sharpness,
        }
    }

    pub fn set(&mut self, control: ImageControl, value: i32) {
        let slot = match control {
            ImageControl::Brightness => &mut self.brightness,
            ImageControl::Contrast => &mut self.contrast,
            ImageControl::Saturation => &mut self.saturation,
            ImageControl::Hue => &mut self.hue,
            ImageControl::Sharpness => &mut self.sharpness,
        };
        *slot = Some(value);
    }
}

/// Snapshot of one camera's readable state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraStatus {
    pub media_mode: Option<ReadValue<MediaMode>>,
    pub framing: Option<ReadValue<FramingType>>,
    pub hdr: Option<bool>,
    pub background_blur: Option<u8>,
    pub image: ImageAdjustments,
    pub white_balance: Option<WhiteBalance>,
    pub zoom: Option<f32>,
    pub focus: Option<Focus>,
    pub anti_flicker: Option<ReadValue<AntiFlicker>>,
}

impl CameraStatus {
    /// Record the effect of a command that the backend accepted.
    ///
    /// `ResetDefaults` clears the snapshot; the registry re-reads it from the
    /// backend afterwards.
    pub fn apply(&mut self, command: &Command) {
        match *command {
            Command::SetMediaMode(mode) => self.media_mode = Some(ReadValue::Known(mode)),
            Command::SetAutoFraming(framing) => self.framing = Some(ReadValue::Known(framing)),
            Command::SetHdr(on) => self.hdr = Some(on),
            Command::SetImage(control, value) => self.image.set(control, value),
            Command::SetWhiteBalance(wb) => self.white_balance = Some(wb),
            Command::SetZoom(ratio) => self.zoom = Some(ratio),
            Command::SetFocus(focus) => self.focus = Some(focus),
            Command::SetAntiFlicker(mode) => self.anti_flicker = Some(ReadValue::Known(mode)),
            Command::SetBackgroundBlur(level) => self.background_blur = Some(level),
            Command::ResetDefaults => *self = Self::default(),
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v) = &self.media_mode {
            writeln!(f, "Media mode: {}", v)?;
        }
        if let Some(v) = &self.framing {
            writeln!(f, "Framing: {}", v)?;
        }
        if let Some(v) = self.hdr {
            writeln!(f, "HDR: {}", if v { "On" } else { "Off" })?;
        }
        if let Some(v) = self.background_blur {
            writeln!(f, "Background blur: {}", v)?;
        }
        for control in ImageControl::ALL {
            if let Some(v) = self.image.get(control) {
                writeln!(f, "{}: {}", capitalize(control.name()), v)?;
            }
        }
        if let Some(v) = &self.white_balance {
            writeln!(f, "White balance: {}", v)?;
        }
        if let Some(v) = self.zoom {
            writeln!(f, "Zoom: {:.1}x", v)?;
        }
        if let Some(v) = &self.focus {
            writeln!(f, "Focus: {}", v)?;
        }
        if let Some(v) = &self.anti_flicker {
            writeln!(f, "Anti-flicker: {}", v)?;
        }
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_value_display_known() {
        let v: ReadValue<MediaMode> = ReadValue::Known(MediaMode::Background);
        assert_eq!(v.to_string(), "Background");
        assert_eq!(v.known(), Some(MediaMode::Background));
    }

    #[test]
    fn read_value_display_unknown() {
        let v: ReadValue<AntiFlicker> = ReadValue::Unknown(7);
        assert_eq!(v.to_string(), "Unknown (7)");
        assert_eq!(v.known(), None);
    }

    #[test]
    fn apply_updates_only_the_touched_field() {
        let mut status = CameraStatus::default();
        status.apply(&Command::SetImage(ImageControl::Contrast, 70));
        assert_eq!(status.image.contrast, Some(70));
        assert_eq!(status.image.brightness, None);
        assert_eq!(status.hdr, None);

        status.apply(&Command::SetHdr(true));
        assert_eq!(status.hdr, Some(true));
    }

    #[test]
    fn reset_clears_snapshot() {
        let mut status = CameraStatus::default();
        status.apply(&Command::SetZoom(2.0));
        status.apply(&Command::ResetDefaults);
        assert_eq!(status, CameraStatus::default());
    }

    #[test]
    fn display_skips_unreadable_fields() {
        let mut status = CameraStatus::default();
        status.apply(&Command::SetMediaMode(MediaMode::AutoFrame));
        status.apply(&Command::SetImage(ImageControl::Brightness, 55));
        let text = status.to_string();
        assert!(text.contains("Media mode: AutoFrame"));
        assert!(text.contains("Brightness: 55"));
        assert!(!text.contains("HDR"));
    }
}
