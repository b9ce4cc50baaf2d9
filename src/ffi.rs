//! C ABI over the process-wide registry.
//!
//! Registries and devices cross the boundary as plain `u64` tokens, never as
//! pointers.  A registry token is the registry's instance id; a device token
//! is a packed [`DeviceHandle`].  Tokens from a torn-down registry, or for
//! an unplugged device, are rejected with `OBSBOT_ERR_INVALID_HANDLE`.
//!
//! Controls return `0` on success or a negative status code (see
//! [`crate::error`]).  Getters return the value when it is `>= 0`.

use std::ffi::CStr;
use std::sync::Arc;

use libc::{c_char, c_int, size_t};
use tracing::warn;

use crate::capability::Capability;
use crate::device::Device;
use crate::error::{
    ObsbotError, STATUS_INVALID_ARGUMENT, STATUS_INVALID_HANDLE, STATUS_OK, STATUS_TRANSPORT,
    STATUS_UNSUPPORTED,
};
use crate::registry::{self, DeviceHandle, Registry};
use crate::settings::{AntiFlicker, Focus, FramingType, MediaMode, WhiteBalance};
use crate::status::ReadValue;

fn status(result: Result<(), ObsbotError>) -> c_int {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => e.status_code(),
    }
}

/// The live registry, if `ctx` names it.
fn registry_for(ctx: u64) -> Option<Arc<Registry>> {
    registry::current().filter(|r| r.id() == ctx)
}

/// Run `f` against the device behind `dev`, or return `fallback` when the
/// token cannot be decoded or no registry exists.
fn with_device<R>(dev: u64, fallback: R, f: impl FnOnce(Device<'_>) -> R) -> R {
    let Some(handle) = DeviceHandle::from_raw(dev) else {
        return fallback;
    };
    match registry::current() {
        Some(registry) => f(registry.device(handle)),
        None => fallback,
    }
}

/// Status for a raw enum value that failed to decode, keeping the
/// handle-then-capability precedence.
fn bad_raw(device: &Device<'_>, capability: Capability) -> c_int {
    if !device.is_valid() {
        STATUS_INVALID_HANDLE
    } else if !device.supports(capability) {
        STATUS_UNSUPPORTED
    } else {
        STATUS_INVALID_ARGUMENT
    }
}

fn read_raw<T>(value: Result<ReadValue<T>, ObsbotError>, raw: impl FnOnce(T) -> i32) -> c_int {
    match value {
        Ok(ReadValue::Known(v)) => raw(v),
        Ok(ReadValue::Unknown(v)) if v >= 0 => v,
        Ok(ReadValue::Unknown(_)) => STATUS_TRANSPORT,
        Err(e) => e.status_code(),
    }
}

/// Copy `value` into a caller buffer, truncating to `len - 1` bytes and
/// NUL-terminating. Returns the number of bytes written, excluding the NUL.
///
/// # Safety
/// `buf` must be valid for writes of `len` bytes.
unsafe fn copy_out(value: &str, buf: *mut c_char, len: size_t) -> c_int {
    if buf.is_null() || len == 0 {
        return -1;
    }
    let n = value.len().min(len - 1).min(c_int::MAX as usize);
    unsafe {
        std::ptr::copy_nonoverlapping(value.as_ptr(), buf.cast::<u8>(), n);
        *buf.add(n) = 0;
    }
    n as c_int
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Token of the process-wide registry, creating it on first use. Never 0.
#[unsafe(no_mangle)]
pub extern "C" fn obsbot_devices_get_instance() -> u64 {
    registry::global().id()
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_devices_refresh(ctx: u64) -> c_int {
    match registry_for(ctx) {
        Some(registry) => status(registry.refresh().map(|_| ())),
        None => STATUS_INVALID_HANDLE,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_devices_get_dev_num(ctx: u64) -> c_int {
    registry_for(ctx).map_or(0, |r| r.count().min(c_int::MAX as usize) as c_int)
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_devices_get_dev_by_index(ctx: u64, index: c_int) -> u64 {
    let Ok(index) = usize::try_from(index) else {
        return 0;
    };
    registry_for(ctx)
        .and_then(|r| r.get(index))
        .map_or(0, DeviceHandle::to_raw)
}

/// # Safety
/// `sn` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn obsbot_devices_get_dev_by_sn(ctx: u64, sn: *const c_char) -> u64 {
    if sn.is_null() {
        return 0;
    }
    let serial = unsafe { CStr::from_ptr(sn) };
    let Ok(serial) = serial.to_str() else {
        warn!("Serial lookup with non-UTF-8 string");
        return 0;
    };
    registry_for(ctx)
        .and_then(|r| r.get_by_serial(serial))
        .map_or(0, DeviceHandle::to_raw)
}

/// Tear down the process-wide registry. Outstanding tokens become invalid.
#[unsafe(no_mangle)]
pub extern "C" fn obsbot_devices_shutdown() {
    registry::shutdown();
}

// ---------------------------------------------------------------------------
// Device info
// ---------------------------------------------------------------------------

/// # Safety
/// `buf` must be null or valid for writes of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn obsbot_dev_get_sn(dev: u64, buf: *mut c_char, len: size_t) -> c_int {
    let value = with_device(dev, String::new(), |d| d.serial());
    unsafe { copy_out(&value, buf, len) }
}

/// # Safety
/// `buf` must be null or valid for writes of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn obsbot_dev_get_version(dev: u64, buf: *mut c_char, len: size_t) -> c_int {
    let value = with_device(dev, String::new(), |d| d.version());
    unsafe { copy_out(&value, buf, len) }
}

/// # Safety
/// `buf` must be null or valid for writes of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn obsbot_dev_get_model(dev: u64, buf: *mut c_char, len: size_t) -> c_int {
    let value = with_device(dev, String::new(), |d| d.model());
    unsafe { copy_out(&value, buf, len) }
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_is_inited(dev: u64) -> bool {
    with_device(dev, false, |d| d.is_initialized())
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_is_connected(dev: u64) -> bool {
    with_device(dev, false, |d| d.is_connected())
}

/// `cap` is a [`Capability::id`].
#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_has_capability(dev: u64, cap: u32) -> bool {
    match Capability::from_id(cap) {
        Some(capability) => with_device(dev, false, |d| d.supports(capability)),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Meet controls
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_meet_get_media_mode(dev: u64) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| read_raw(d.media_mode(), MediaMode::raw))
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_meet_set_media_mode(dev: u64, mode: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| match MediaMode::from_raw(mode) {
        Some(mode) => status(d.set_media_mode(mode)),
        None => bad_raw(&d, Capability::MediaMode),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_meet_get_auto_framing_type(dev: u64) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| read_raw(d.auto_framing(), FramingType::raw))
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_meet_set_auto_framing_type(dev: u64, framing: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| match FramingType::from_raw(framing) {
        Some(framing) => status(d.set_auto_framing(framing)),
        None => bad_raw(&d, Capability::AutoFraming),
    })
}

/// 1 when HDR is on, 0 when off, negative status otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn obsbot_meet_get_hdr(dev: u64) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| match d.hdr() {
        Ok(on) => on as c_int,
        Err(e) => e.status_code(),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_meet_set_hdr(dev: u64, enabled: bool) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| status(d.set_hdr(enabled)))
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_meet_set_background_blur(dev: u64, level: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| status(d.set_background_blur(level)))
}

// ---------------------------------------------------------------------------
// Image controls
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_set_brightness(dev: u64, value: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| status(d.set_brightness(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_set_contrast(dev: u64, value: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| status(d.set_contrast(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_set_saturation(dev: u64, value: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| status(d.set_saturation(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_set_hue(dev: u64, value: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| status(d.set_hue(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_set_sharpness(dev: u64, value: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| status(d.set_sharpness(value)))
}

/// `kelvin` is ignored when `auto` is set.
#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_set_white_balance(dev: u64, auto: bool, kelvin: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| match WhiteBalance::from_parts(auto, kelvin) {
        Ok(wb) => status(d.set_white_balance(wb)),
        Err(_) => bad_raw(&d, Capability::WhiteBalance),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_set_zoom(dev: u64, ratio: f32) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| status(d.set_zoom(ratio)))
}

/// `value` is ignored when `auto` is set.
#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_set_focus(dev: u64, auto: bool, value: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| match Focus::from_parts(auto, value) {
        Ok(focus) => status(d.set_focus(focus)),
        Err(_) => bad_raw(&d, Capability::Focus),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_set_anti_flicker(dev: u64, mode: c_int) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| match AntiFlicker::from_raw(mode) {
        Some(mode) => status(d.set_anti_flicker(mode)),
        None => bad_raw(&d, Capability::AntiFlicker),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn obsbot_dev_reset_factory(dev: u64) -> c_int {
    with_device(dev, STATUS_INVALID_HANDLE, |d| status(d.reset_to_defaults()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::STATUS_MODE_MISMATCH;
    use crate::sim::{SimBackend, SimDevice};
    use parking_lot::Mutex;
    use std::ffi::CString;

    // the process-wide registry is shared between these tests
    static LOCK: Mutex<()> = parking_lot::const_mutex(());

    fn install(devices: Vec<SimDevice>) -> (u64, SimBackend) {
        let sim = SimBackend::with_devices(devices);
        let registry = Registry::new(sim.clone());
        registry.refresh().unwrap();
        let installed = registry::install(registry);
        (installed.id(), sim)
    }

    fn serial_of(dev: u64) -> (c_int, String) {
        let mut buf = [0 as c_char; 32];
        let n = unsafe { obsbot_dev_get_sn(dev, buf.as_mut_ptr(), buf.len()) };
        let s = unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned();
        (n, s)
    }

    #[test]
    fn lookup_by_index_and_serial() {
        let _guard = LOCK.lock();
        let (ctx, _) = install(vec![SimDevice::new("ABC123", "OBSBOT Meet SE")]);

        assert_eq!(obsbot_devices_get_dev_num(ctx), 1);
        let by_index = obsbot_devices_get_dev_by_index(ctx, 0);
        let sn = CString::new("ABC123").unwrap();
        let by_sn = unsafe { obsbot_devices_get_dev_by_sn(ctx, sn.as_ptr()) };
        assert_ne!(by_index, 0);
        assert_eq!(by_index, by_sn);

        assert_eq!(obsbot_devices_get_dev_by_index(ctx, 1), 0);
        assert_eq!(obsbot_devices_get_dev_by_index(ctx, -1), 0);
        let missing = CString::new("XYZ").unwrap();
        assert_eq!(unsafe { obsbot_devices_get_dev_by_sn(ctx, missing.as_ptr()) }, 0);
        assert_eq!(unsafe { obsbot_devices_get_dev_by_sn(ctx, std::ptr::null()) }, 0);

        assert_eq!(serial_of(by_index), (6, "ABC123".to_string()));
        registry::shutdown();
    }

    #[test]
    fn string_getters_truncate_and_terminate() {
        let _guard = LOCK.lock();
        let (ctx, _) = install(vec![SimDevice::new("ABC123", "OBSBOT Meet SE")]);
        let dev = obsbot_devices_get_dev_by_index(ctx, 0);

        let mut small = [0x7f as c_char; 4];
        let n = unsafe { obsbot_dev_get_model(dev, small.as_mut_ptr(), small.len()) };
        assert_eq!(n, 3);
        assert_eq!(unsafe { CStr::from_ptr(small.as_ptr()) }.to_bytes(), b"OBS");

        let mut one = [0x7f as c_char; 1];
        assert_eq!(unsafe { obsbot_dev_get_version(dev, one.as_mut_ptr(), 1) }, 0);
        assert_eq!(one[0], 0);

        assert_eq!(unsafe { obsbot_dev_get_sn(dev, std::ptr::null_mut(), 16) }, -1);
        assert_eq!(unsafe { obsbot_dev_get_sn(dev, small.as_mut_ptr(), 0) }, -1);
        registry::shutdown();
    }

    #[test]
    fn controls_report_status_codes() {
        let _guard = LOCK.lock();
        let (ctx, sim) = install(vec![
            SimDevice::new("A", "OBSBOT Meet SE").without(Capability::Hdr),
        ]);
        let dev = obsbot_devices_get_dev_by_index(ctx, 0);

        assert_eq!(obsbot_meet_set_hdr(dev, true), STATUS_UNSUPPORTED);
        assert_eq!(obsbot_meet_get_hdr(dev), STATUS_UNSUPPORTED);
        assert_eq!(obsbot_dev_set_brightness(dev, 101), STATUS_INVALID_ARGUMENT);
        assert_eq!(obsbot_meet_set_media_mode(dev, 7), STATUS_INVALID_ARGUMENT);
        assert_eq!(obsbot_meet_set_background_blur(dev, 30), STATUS_MODE_MISMATCH);
        assert_eq!(obsbot_dev_set_focus(dev, false, 20), STATUS_UNSUPPORTED);
        assert_eq!(obsbot_dev_set_white_balance(dev, false, 100), STATUS_INVALID_ARGUMENT);

        assert_eq!(obsbot_meet_set_media_mode(dev, 1), STATUS_OK);
        assert_eq!(obsbot_meet_get_media_mode(dev), 1);
        assert_eq!(obsbot_meet_set_background_blur(dev, 30), STATUS_OK);
        assert_eq!(obsbot_meet_set_auto_framing_type(dev, 1), STATUS_OK);
        assert_eq!(obsbot_meet_get_auto_framing_type(dev), 1);
        assert_eq!(obsbot_dev_set_white_balance(dev, true, -1), STATUS_OK);
        assert_eq!(obsbot_dev_set_anti_flicker(dev, 1), STATUS_OK);
        assert_eq!(obsbot_dev_set_zoom(dev, 2.0), STATUS_OK);

        sim.fail_next("stall");
        assert_eq!(obsbot_dev_set_contrast(dev, 10), STATUS_TRANSPORT);
        assert_eq!(obsbot_dev_reset_factory(dev), STATUS_OK);
        assert_eq!(obsbot_meet_get_media_mode(dev), 0);
        registry::shutdown();
    }

    #[test]
    fn tokens_die_with_their_registry() {
        let _guard = LOCK.lock();
        let (ctx, sim) = install(vec![SimDevice::new("A", "OBSBOT Meet SE")]);
        let dev = obsbot_devices_get_dev_by_index(ctx, 0);
        assert!(obsbot_dev_is_connected(dev));
        assert!(obsbot_dev_has_capability(dev, Capability::MediaMode.id()));
        assert!(!obsbot_dev_has_capability(dev, 99));

        sim.detach("A");
        assert_eq!(obsbot_devices_refresh(ctx), STATUS_OK);
        assert!(!obsbot_dev_is_connected(dev));
        assert!(!obsbot_dev_is_inited(dev));
        assert_eq!(serial_of(dev), (0, String::new()));
        assert_eq!(obsbot_dev_set_sharpness(dev, 50), STATUS_INVALID_HANDLE);
        assert_eq!(obsbot_meet_set_media_mode(dev, 9), STATUS_INVALID_HANDLE);

        registry::shutdown();
        assert_eq!(obsbot_devices_get_dev_num(ctx), 0);
        assert_eq!(obsbot_devices_refresh(ctx), STATUS_INVALID_HANDLE);

        // a fresh registry does not accept old tokens
        let (new_ctx, _) = install(vec![SimDevice::new("A", "OBSBOT Meet SE")]);
        assert_ne!(new_ctx, ctx);
        assert_eq!(obsbot_devices_get_dev_num(ctx), 0);
        assert_eq!(obsbot_dev_set_hue(dev, 0), STATUS_INVALID_HANDLE);
        registry::shutdown();
    }

    #[test]
    fn zero_token_is_rejected() {
        let _guard = LOCK.lock();
        assert_eq!(obsbot_dev_set_brightness(0, 50), STATUS_INVALID_HANDLE);
        assert!(!obsbot_dev_is_inited(0));
        assert_eq!(obsbot_devices_get_dev_num(0), 0);
    }

    #[test]
    fn process_wide_instance_comes_from_config() {
        use crate::config::CONFIG_ENV;

        let _guard = LOCK.lock();
        registry::shutdown();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[backend]\nkind = \"simulated\"\n\n[[simulated]]\nserial = \"ABC123\"\n",
        )
        .unwrap();
        unsafe { std::env::set_var(CONFIG_ENV, &path) };

        let ctx = obsbot_devices_get_instance();
        assert_ne!(ctx, 0);
        assert_eq!(obsbot_devices_get_instance(), ctx);
        assert_eq!(obsbot_devices_get_dev_num(ctx), 1);
        let dev = obsbot_devices_get_dev_by_index(ctx, 0);
        assert_eq!(serial_of(dev), (6, "ABC123".to_string()));

        // a config that fails to parse still yields a usable, empty registry
        registry::shutdown();
        std::fs::write(&path, "[backend]\nkind = \"bluetooth\"\n").unwrap();
        let fallback = obsbot_devices_get_instance();
        assert_ne!(fallback, 0);
        assert_ne!(fallback, ctx);
        assert_eq!(obsbot_devices_get_instance(), fallback);
        assert_eq!(obsbot_devices_get_dev_num(fallback), 0);
        assert_eq!(obsbot_devices_get_dev_num(ctx), 0);
        assert_eq!(obsbot_devices_get_dev_by_index(fallback, 0), 0);

        unsafe { std::env::remove_var(CONFIG_ENV) };
        registry::shutdown();
    }
}
