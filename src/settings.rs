use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::capability::Capability;
use crate::error::ObsbotError;

/// Accepted range for percent-valued controls (brightness, contrast, ...).
pub const PERCENT_RANGE: RangeInclusive<i32> = 0..=100;
/// Accepted hue range in degrees.
pub const HUE_RANGE: RangeInclusive<i32> = -180..=180;
/// Accepted manual white balance range in Kelvin.
pub const WHITE_BALANCE_RANGE: RangeInclusive<u32> = 2000..=10000;
/// Smallest zoom ratio (no zoom).
pub const MIN_ZOOM: f32 = 1.0;

/// Meet-series media mode.
///
/// The raw values match the C ABI: 0 normal, 1 background, 2 auto frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaMode {
    Normal,
    Background,
    AutoFrame,
}

/// Auto framing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramingType {
    Group,
    Single,
}

/// Power line frequency compensation.
///
/// Raw values follow UVC `PU_POWER_LINE_FREQUENCY_CONTROL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AntiFlicker {
    Off,
    Hz50,
    Hz60,
    Auto,
}

/// White balance: automatic, or a fixed color temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteBalance {
    Auto,
    Manual { kelvin: u32 },
}

/// Focus: automatic, or a fixed position in percent (0 = nearest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Auto,
    Manual(u8),
}

/// On/off switch used for boolean controls such as HDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

/// Integer image adjustments sharing one range-checked setter path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageControl {
    Brightness,
    Contrast,
    Saturation,
    Hue,
    Sharpness,
}

fn invalid(arg: &'static str, value: &str, valid: &str) -> ObsbotError {
    ObsbotError::InvalidArgument {
        arg,
        value: value.to_string(),
        valid: valid.to_string(),
    }
}

// --- Media mode ---

impl MediaMode {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Normal),
            1 => Some(Self::Background),
            2 => Some(Self::AutoFrame),
            _ => None,
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::Background => 1,
            Self::AutoFrame => 2,
        }
    }
}

impl FromStr for MediaMode {
    type Err = ObsbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" | "0" => Ok(Self::Normal),
            "background" | "bg" | "1" => Ok(Self::Background),
            "autoframe" | "auto-frame" | "2" => Ok(Self::AutoFrame),
            _ => Err(invalid("media mode", s, "normal, background, autoframe")),
        }
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Background => write!(f, "Background"),
            Self::AutoFrame => write!(f, "AutoFrame"),
        }
    }
}

// --- Framing ---

impl FramingType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Group),
            1 => Some(Self::Single),
            _ => None,
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::Group => 0,
            Self::Single => 1,
        }
    }
}

impl FromStr for FramingType {
    type Err = ObsbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "group" | "0" => Ok(Self::Group),
            "single" | "1" => Ok(Self::Single),
            _ => Err(invalid("framing type", s, "group, single")),
        }
    }
}

impl fmt::Display for FramingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group => write!(f, "Group"),
            Self::Single => write!(f, "Single"),
        }
    }
}

// --- Anti-flicker ---

impl AntiFlicker {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Off),
            1 => Some(Self::Hz50),
            2 => Some(Self::Hz60),
            3 => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::Off => 0,
            Self::Hz50 => 1,
            Self::Hz60 => 2,
            Self::Auto => 3,
        }
    }
}

impl FromStr for AntiFlicker {
    type Err = ObsbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "disabled" | "0" => Ok(Self::Off),
            "50hz" | "50" => Ok(Self::Hz50),
            "60hz" | "60" => Ok(Self::Hz60),
            "auto" => Ok(Self::Auto),
            _ => Err(invalid("anti-flicker", s, "off, 50hz, 60hz, auto")),
        }
    }
}

impl fmt::Display for AntiFlicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "Off"),
            Self::Hz50 => write!(f, "50 Hz"),
            Self::Hz60 => write!(f, "60 Hz"),
            Self::Auto => write!(f, "Auto"),
        }
    }
}

// --- White balance ---

impl WhiteBalance {
    /// Build from the C ABI pair `(auto, kelvin)`; `kelvin` is ignored in auto mode.
    pub fn from_parts(auto: bool, kelvin: i32) -> Result<Self, ObsbotError> {
        if auto {
            return Ok(Self::Auto);
        }
        match u32::try_from(kelvin) {
            Ok(k) if WHITE_BALANCE_RANGE.contains(&k) => Ok(Self::Manual { kelvin: k }),
            _ => Err(invalid("white balance", &kelvin.to_string(), "2000..=10000 K")),
        }
    }
}

impl FromStr for WhiteBalance {
    type Err = ObsbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if lower == "auto" {
            return Ok(Self::Auto);
        }
        let digits = lower.trim_end_matches('k');
        match digits.parse::<i32>() {
            Ok(kelvin) => Self::from_parts(false, kelvin),
            Err(_) => Err(invalid("white balance", s, "auto, 2000..=10000 (Kelvin)")),
        }
    }
}

impl fmt::Display for WhiteBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Manual { kelvin } => write!(f, "{} K", kelvin),
        }
    }
}

// --- Focus ---

impl Focus {
    /// Build from the C ABI pair `(auto, value)`; `value` is ignored in auto mode.
    pub fn from_parts(auto: bool, value: i32) -> Result<Self, ObsbotError> {
        if auto {
            return Ok(Self::Auto);
        }
        if PERCENT_RANGE.contains(&value) {
            Ok(Self::Manual(value as u8))
        } else {
            Err(invalid("focus", &value.to_string(), "0..=100"))
        }
    }
}

impl FromStr for Focus {
    type Err = ObsbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        match s.parse::<i32>() {
            Ok(v) => Self::from_parts(false, v),
            Err(_) => Err(invalid("focus", s, "auto, 0..=100")),
        }
    }
}

impl fmt::Display for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Manual(v) => write!(f, "Manual ({})", v),
        }
    }
}

// --- Switch ---

impl FromStr for Switch {
    type Err = ObsbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" | "true" | "1" => Ok(Self::On),
            "off" | "false" | "0" => Ok(Self::Off),
            _ => Err(invalid("switch", s, "on, off")),
        }
    }
}

impl From<Switch> for bool {
    fn from(s: Switch) -> bool {
        matches!(s, Switch::On)
    }
}

// --- Image controls ---

impl ImageControl {
    pub const ALL: [ImageControl; 5] = [
        Self::Brightness,
        Self::Contrast,
        Self::Saturation,
        Self::Hue,
        Self::Sharpness,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Saturation => "saturation",
            Self::Hue => "hue",
            Self::Sharpness => "sharpness",
        }
    }

    pub fn capability(self) -> Capability {
        match self {
            Self::Brightness => Capability::Brightness,
            Self::Contrast => Capability::Contrast,
            Self::Saturation => Capability::Saturation,
            Self::Hue => Capability::Hue,
            Self::Sharpness => Capability::Sharpness,
        }
    }

    /// Accepted input range (percent, or degrees for hue).
    pub fn range(self) -> RangeInclusive<i32> {
        match self {
            Self::Hue => HUE_RANGE,
            _ => PERCENT_RANGE,
        }
    }

    pub fn validate(self, value: i32) -> Result<i32, ObsbotError> {
        let range = self.range();
        if range.contains(&value) {
            Ok(value)
        } else {
            Err(invalid(
                self.name(),
                &value.to_string(),
                &format!("{}..={}", range.start(), range.end()),
            ))
        }
    }
}

impl fmt::Display for ImageControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_mode_raw_values() {
        for mode in [MediaMode::Normal, MediaMode::Background, MediaMode::AutoFrame] {
            assert_eq!(MediaMode::from_raw(mode.raw()), Some(mode));
        }
        assert_eq!(MediaMode::from_raw(3), None);
        assert_eq!(MediaMode::from_raw(-1), None);
    }

    #[test]
    fn media_mode_parses_cli_names() {
        assert_eq!("AutoFrame".parse::<MediaMode>().ok(), Some(MediaMode::AutoFrame));
        assert_eq!("bg".parse::<MediaMode>().ok(), Some(MediaMode::Background));
        assert!("portrait".parse::<MediaMode>().is_err());
    }

    #[test]
    fn anti_flicker_matches_uvc_values() {
        assert_eq!(AntiFlicker::from_raw(0), Some(AntiFlicker::Off));
        assert_eq!(AntiFlicker::from_raw(3), Some(AntiFlicker::Auto));
        assert_eq!(AntiFlicker::from_raw(4), None);
        assert_eq!("50hz".parse::<AntiFlicker>().ok(), Some(AntiFlicker::Hz50));
    }

    #[test]
    fn white_balance_parsing() {
        assert_eq!("auto".parse::<WhiteBalance>().ok(), Some(WhiteBalance::Auto));
        assert_eq!(
            "4500K".parse::<WhiteBalance>().ok(),
            Some(WhiteBalance::Manual { kelvin: 4500 })
        );
        assert!("1500".parse::<WhiteBalance>().is_err());
        assert!("warm".parse::<WhiteBalance>().is_err());
        // kelvin is ignored when auto is set
        assert_eq!(WhiteBalance::from_parts(true, -5).ok(), Some(WhiteBalance::Auto));
    }

    #[test]
    fn focus_parsing() {
        assert_eq!("AUTO".parse::<Focus>().ok(), Some(Focus::Auto));
        assert_eq!("42".parse::<Focus>().ok(), Some(Focus::Manual(42)));
        assert!("101".parse::<Focus>().is_err());
    }

    #[test]
    fn image_control_ranges() {
        assert!(ImageControl::Brightness.validate(100).is_ok());
        assert!(ImageControl::Brightness.validate(-1).is_err());
        assert!(ImageControl::Hue.validate(-180).is_ok());
        assert!(ImageControl::Hue.validate(181).is_err());
    }

    #[test]
    fn switch_into_bool() {
        assert!(bool::from("on".parse::<Switch>().unwrap()));
        assert!(!bool::from("0".parse::<Switch>().unwrap()));
    }
}
