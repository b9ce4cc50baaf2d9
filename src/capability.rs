//! Per-device capability sets and the model-family profile table.
//!
//! A device's effective capabilities are the intersection of what its model
//! family implements ([`ModelProfile::capabilities`]) and what the active
//! backend can actually drive.  Controls outside that set fail with
//! [`ObsbotError::Unsupported`](crate::ObsbotError::Unsupported) instead of
//! silently doing nothing.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ObsbotError;

/// A named device control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    MediaMode,
    AutoFraming,
    Hdr,
    Brightness,
    Contrast,
    Saturation,
    Hue,
    Sharpness,
    WhiteBalance,
    Zoom,
    Focus,
    AntiFlicker,
    BackgroundBlur,
    FactoryReset,
}

impl Capability {
    pub const ALL: [Capability; 14] = [
        Self::MediaMode,
        Self::AutoFraming,
        Self::Hdr,
        Self::Brightness,
        Self::Contrast,
        Self::Saturation,
        Self::Hue,
        Self::Sharpness,
        Self::WhiteBalance,
        Self::Zoom,
        Self::Focus,
        Self::AntiFlicker,
        Self::BackgroundBlur,
        Self::FactoryReset,
    ];

    /// Stable numeric id used by `obsbot_dev_has_capability`.
    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    fn bit(self) -> u32 {
        1 << self.id()
    }

    /// Kebab-case name, as used in configuration files.
    pub fn key(self) -> &'static str {
        match self {
            Self::MediaMode => "media-mode",
            Self::AutoFraming => "auto-framing",
            Self::Hdr => "hdr",
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Saturation => "saturation",
            Self::Hue => "hue",
            Self::Sharpness => "sharpness",
            Self::WhiteBalance => "white-balance",
            Self::Zoom => "zoom",
            Self::Focus => "focus",
            Self::AntiFlicker => "anti-flicker",
            Self::BackgroundBlur => "background-blur",
            Self::FactoryReset => "factory-reset",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MediaMode => "Media mode",
            Self::AutoFraming => "Auto framing",
            Self::Hdr => "HDR",
            Self::Brightness => "Brightness",
            Self::Contrast => "Contrast",
            Self::Saturation => "Saturation",
            Self::Hue => "Hue",
            Self::Sharpness => "Sharpness",
            Self::WhiteBalance => "White balance",
            Self::Zoom => "Zoom",
            Self::Focus => "Focus",
            Self::AntiFlicker => "Anti-flicker",
            Self::BackgroundBlur => "Background blur",
            Self::FactoryReset => "Factory reset",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for Capability {
    type Err = ObsbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|c| c.key() == wanted)
            .ok_or_else(|| ObsbotError::InvalidArgument {
                arg: "capability",
                value: s.to_string(),
                valid: Self::ALL.map(Capability::key).join(", "),
            })
    }
}

/// A set of [`Capability`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn insert(&mut self, cap: Capability) {
        self.0 |= cap.bit();
    }

    pub fn remove(&mut self, cap: Capability) {
        self.0 &= !cap.bit();
    }

    pub fn with(mut self, cap: Capability) -> Self {
        self.insert(cap);
        self
    }

    pub fn without(mut self, cap: Capability) -> Self {
        self.remove(cap);
        self
    }

    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate in [`Capability::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::empty();
        for cap in iter {
            set.insert(cap);
        }
        set
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Capability::key).collect();
        if names.is_empty() {
            write!(f, "(none)")
        } else {
            write!(f, "{}", names.join(", "))
        }
    }
}

// ---------------------------------------------------------------------------
// Model profiles
// ---------------------------------------------------------------------------

/// OBSBOT product family, derived from the USB product string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    MeetSe,
    Meet2,
    Meet,
    Tiny2,
    Tiny,
    Tail,
    Unknown,
}

/// Static description of what a model family implements.
#[derive(Debug, Clone, Copy)]
pub struct ModelProfile {
    pub family: ModelFamily,
    pub display_name: &'static str,
    pub capabilities: CapabilitySet,
    /// Largest digital zoom ratio accepted by `set_zoom`.
    pub max_zoom: f32,
}

/// Standard UVC image controls every family exposes.
fn uvc_image_controls() -> CapabilitySet {
    [
        Capability::Brightness,
        Capability::Contrast,
        Capability::Saturation,
        Capability::Hue,
        Capability::Sharpness,
        Capability::WhiteBalance,
        Capability::AntiFlicker,
        Capability::FactoryReset,
    ]
    .into_iter()
    .collect()
}

fn meet_family() -> CapabilitySet {
    uvc_image_controls()
        .with(Capability::MediaMode)
        .with(Capability::AutoFraming)
        .with(Capability::Hdr)
        .with(Capability::BackgroundBlur)
        .with(Capability::Zoom)
        .with(Capability::Focus)
}

fn ptz_family() -> CapabilitySet {
    uvc_image_controls()
        .with(Capability::Hdr)
        .with(Capability::Zoom)
        .with(Capability::Focus)
}

impl ModelProfile {
    /// Resolve the profile for a model code (USB product string).
    ///
    /// Matching is by substring so both "OBSBOT Meet SE" and "Meet SE" work;
    /// the more specific names are tested first.
    pub fn for_model(model_code: &str) -> Self {
        let lower = model_code.to_lowercase();
        let family = if lower.contains("meet se") {
            ModelFamily::MeetSe
        } else if lower.contains("meet 2") || lower.contains("meet2") {
            ModelFamily::Meet2
        } else if lower.contains("meet") {
            ModelFamily::Meet
        } else if lower.contains("tiny 2") || lower.contains("tiny2") {
            ModelFamily::Tiny2
        } else if lower.contains("tiny") {
            ModelFamily::Tiny
        } else if lower.contains("tail") {
            ModelFamily::Tail
        } else {
            ModelFamily::Unknown
        };
        Self::for_family(family)
    }

    pub fn for_family(family: ModelFamily) -> Self {
        match family {
            ModelFamily::MeetSe => Self {
                family,
                display_name: "OBSBOT Meet SE",
                capabilities: meet_family().without(Capability::Focus),
                max_zoom: 4.0,
            },
            ModelFamily::Meet2 => Self {
                family,
                display_name: "OBSBOT Meet 2",
                capabilities: meet_family(),
                max_zoom: 4.0,
            },
            ModelFamily::Meet => Self {
                family,
                display_name: "OBSBOT Meet",
                capabilities: meet_family(),
                max_zoom: 4.0,
            },
            ModelFamily::Tiny2 => Self {
                family,
                display_name: "OBSBOT Tiny 2",
                capabilities: ptz_family(),
                max_zoom: 4.0,
            },
            ModelFamily::Tiny => Self {
                family,
                display_name: "OBSBOT Tiny",
                capabilities: ptz_family(),
                max_zoom: 2.0,
            },
            ModelFamily::Tail => Self {
                family,
                display_name: "OBSBOT Tail",
                capabilities: ptz_family().with(Capability::AutoFraming),
                max_zoom: 4.0,
            },
            ModelFamily::Unknown => Self {
                family,
                display_name: "Unknown OBSBOT camera",
                capabilities: uvc_image_controls(),
                max_zoom: 1.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_operations() {
        let set = CapabilitySet::empty()
            .with(Capability::Hdr)
            .with(Capability::Zoom);
        assert!(set.contains(Capability::Hdr));
        assert!(!set.contains(Capability::Focus));
        assert_eq!(set.len(), 2);

        let other = CapabilitySet::empty().with(Capability::Zoom);
        assert_eq!(set.intersection(other), other);
        assert!(set.without(Capability::Hdr).without(Capability::Zoom).is_empty());
    }

    #[test]
    fn ids_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(Capability::from_id(cap.id()), Some(cap));
        }
        assert_eq!(Capability::from_id(99), None);
    }

    #[test]
    fn parse_capability_names() {
        assert_eq!("background-blur".parse::<Capability>().ok(), Some(Capability::BackgroundBlur));
        assert_eq!("white_balance".parse::<Capability>().ok(), Some(Capability::WhiteBalance));
        assert!("teleport".parse::<Capability>().is_err());
    }

    #[test]
    fn meet_se_profile() {
        let profile = ModelProfile::for_model("OBSBOT Meet SE");
        assert_eq!(profile.family, ModelFamily::MeetSe);
        assert!(profile.capabilities.contains(Capability::MediaMode));
        assert!(profile.capabilities.contains(Capability::BackgroundBlur));
    }

    #[test]
    fn specific_names_win_over_generic() {
        assert_eq!(ModelProfile::for_model("OBSBOT Meet 2").family, ModelFamily::Meet2);
        assert_eq!(ModelProfile::for_model("OBSBOT Tiny 2 Lite").family, ModelFamily::Tiny2);
        assert_eq!(ModelProfile::for_model("OBSBOT Tiny 4K").family, ModelFamily::Tiny);
    }

    #[test]
    fn non_meet_families_lack_meet_controls() {
        let tiny = ModelProfile::for_model("OBSBOT Tiny 2");
        assert!(!tiny.capabilities.contains(Capability::MediaMode));
        assert!(!tiny.capabilities.contains(Capability::BackgroundBlur));

        let unknown = ModelProfile::for_model("Webcam");
        assert_eq!(unknown.family, ModelFamily::Unknown);
        assert!(!unknown.capabilities.contains(Capability::Hdr));
        assert!(unknown.capabilities.contains(Capability::Brightness));
    }

    #[test]
    fn display_lists_keys() {
        let set = CapabilitySet::empty().with(Capability::Zoom).with(Capability::Hdr);
        assert_eq!(set.to_string(), "hdr, zoom");
        assert_eq!(CapabilitySet::empty().to_string(), "(none)");
    }
}
