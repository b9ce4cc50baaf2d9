//! OBSBOT webcam controller library.
//!
//! Keeps a registry of attached OBSBOT cameras (Meet, Tiny and Tail
//! families), hands out generation-checked handles, and drives each camera's
//! controls through a pluggable backend: standard UVC over libusb, or an
//! in-memory simulation.  The same registry is exported to C through
//! [`ffi`] (see `include/obsbot.h`).
//!
//! # Quick Start
//!
//! ```no_run
//! use obsbot_ctl::{MediaMode, Registry, UsbBackend};
//!
//! let registry = Registry::new(UsbBackend::new()?);
//! registry.refresh()?;
//!
//! if let Some(handle) = registry.get_by_serial("ABC123") {
//!     let camera = registry.device(handle);
//!     camera.set_media_mode(MediaMode::Background)?;
//!     camera.set_background_blur(60)?;
//! }
//! # Ok::<(), obsbot_ctl::ObsbotError>(())
//! ```
//!
//! Controls a model does not implement fail with
//! [`ObsbotError::Unsupported`]; handles to unplugged cameras fail with
//! [`ObsbotError::InvalidHandle`].

mod backend;
mod capability;
mod config;
mod device;
mod error;
pub mod ffi;
mod protocol;
pub mod registry;
mod settings;
mod sim;
mod status;
mod usb;
mod uvc;

pub use backend::{Command, DeviceBackend, DeviceInfo};
pub use capability::{Capability, CapabilitySet, ModelFamily, ModelProfile};
pub use config::{BackendKind, BackendSettings, Config, LoggingSettings, SimulatedDevice};
pub use device::Device;
pub use error::{
    ObsbotError, Result, STATUS_INVALID_ARGUMENT, STATUS_INVALID_HANDLE, STATUS_MODE_MISMATCH,
    STATUS_NOT_FOUND, STATUS_OK, STATUS_TRANSPORT, STATUS_UNSUPPORTED,
};
pub use registry::{DeviceHandle, DeviceRecord, RefreshSummary, Registry};
pub use settings::{
    AntiFlicker, Focus, FramingType, ImageControl, MediaMode, Switch, WhiteBalance,
};
pub use sim::{SimBackend, SimDevice};
pub use status::{CameraStatus, ImageAdjustments, ReadValue};
pub use usb::UsbBackend;
