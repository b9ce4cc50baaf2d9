//! Error types for the obsbot-ctl library, C ABI and CLI.
//!
//! Every failure is a local return: callers can tell a stale handle apart
//! from a control the device model does not implement, a rejected argument,
//! or a USB transport failure.  [`ObsbotError::status_code`] flattens the
//! variants into the negative integers used across the C boundary.

use thiserror::Error;

use crate::capability::Capability;
use crate::settings::MediaMode;

/// Status code returned across the C ABI on success.
pub const STATUS_OK: i32 = 0;
/// The device handle has no backing record (disconnected or never valid).
pub const STATUS_INVALID_HANDLE: i32 = -1;
/// The device model or backend does not implement the control.
pub const STATUS_UNSUPPORTED: i32 = -2;
/// The value is outside the accepted range.
pub const STATUS_INVALID_ARGUMENT: i32 = -3;
/// The control requires a different media mode.
pub const STATUS_MODE_MISMATCH: i32 = -4;
/// USB transfer or backend failure.
pub const STATUS_TRANSPORT: i32 = -5;
/// No device matched the lookup.
pub const STATUS_NOT_FOUND: i32 = -6;

/// Top-level error type for all obsbot-ctl operations.
#[derive(Debug, Error)]
pub enum ObsbotError {
    /// No OBSBOT device matched the request.
    #[error("No OBSBOT device found. Make sure the camera is connected.")]
    DeviceNotFound,

    /// The handle refers to a record that is no longer in the registry.
    #[error("Device handle is no longer valid (device disconnected?)")]
    InvalidHandle,

    /// The requested control is not implemented for this device.
    #[error("{capability} is not supported on {model}")]
    Unsupported {
        capability: Capability,
        model: String,
    },

    /// A control value is outside its accepted range.
    #[error("Invalid value '{value}' for {arg}.\nValid values: {valid}")]
    InvalidArgument {
        arg: &'static str,
        value: String,
        valid: String,
    },

    /// The control only applies in a specific media mode.
    #[error("This control requires media mode {required}, device is in {current}")]
    ModeMismatch {
        required: MediaMode,
        current: String,
    },

    /// A USB/libusb transport error occurred.
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// A UVC control transfer failed.
    #[error("UVC transfer failed: {0}")]
    UvcTransfer(String),

    /// A backend-level failure that is not a USB error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ObsbotError {
    /// Negative status code used by the C ABI for this error.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::DeviceNotFound => STATUS_NOT_FOUND,
            Self::InvalidHandle => STATUS_INVALID_HANDLE,
            Self::Unsupported { .. } => STATUS_UNSUPPORTED,
            Self::InvalidArgument { .. } => STATUS_INVALID_ARGUMENT,
            Self::ModeMismatch { .. } => STATUS_MODE_MISMATCH,
            Self::Usb(_) | Self::UvcTransfer(_) | Self::Backend(_) | Self::Config(_) => {
                STATUS_TRANSPORT
            }
        }
    }

    /// True for the capability-unsupported condition.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ObsbotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_distinct_and_negative() {
        let errors = [
            ObsbotError::InvalidHandle,
            ObsbotError::Unsupported {
                capability: Capability::Hdr,
                model: "Meet SE".into(),
            },
            ObsbotError::InvalidArgument {
                arg: "brightness",
                value: "101".into(),
                valid: "0..=100".into(),
            },
            ObsbotError::ModeMismatch {
                required: MediaMode::Background,
                current: "Normal".into(),
            },
            ObsbotError::Backend("boom".into()),
            ObsbotError::DeviceNotFound,
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.status_code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn unsupported_message_names_capability_and_model() {
        let err = ObsbotError::Unsupported {
            capability: Capability::Hdr,
            model: "OBSBOT Meet SE".into(),
        };
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "HDR is not supported on OBSBOT Meet SE");
    }

    #[test]
    fn usb_errors_map_to_transport() {
        let err = ObsbotError::from(rusb::Error::Timeout);
        assert_eq!(err.status_code(), STATUS_TRANSPORT);
        assert!(!err.is_unsupported());
    }
}
