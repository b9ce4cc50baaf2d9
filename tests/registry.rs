//! Registry behavior against the simulated backend.
//!
//! No camera is needed; every test builds its own registry over a
//! [`SimBackend`] and plugs devices in and out of it.

use obsbot_ctl::{
    Capability, MediaMode, ObsbotError, Registry, SimBackend, SimDevice, STATUS_INVALID_HANDLE,
};

fn registry(devices: impl IntoIterator<Item = SimDevice>) -> (Registry, SimBackend) {
    let sim = SimBackend::with_devices(devices);
    let registry = Registry::new(sim.clone());
    registry.refresh().unwrap();
    (registry, sim)
}

// ── Lookup ────────────────────────────────────────────────────────────

#[test]
fn single_device_lookup() {
    let (registry, _) = registry([SimDevice::new("ABC123", "OBSBOT Meet SE")]);

    assert_eq!(registry.count(), 1);
    assert_eq!(registry.get(0), registry.get_by_serial("ABC123"));
    assert!(registry.get(0).is_some());
    assert_eq!(registry.get(1), None);
    assert_eq!(registry.get_by_serial("XYZ"), None);
}

#[test]
fn every_index_in_range_is_valid() {
    let serials = ["A1", "B2", "C3", "D4", "E5"];
    let (registry, _) = registry(serials.iter().map(|s| SimDevice::new(s, "OBSBOT Tiny 2")));

    for i in 0..registry.count() {
        let handle = registry.get(i).unwrap();
        assert!(registry.is_valid(handle));
    }
    assert_eq!(registry.get(registry.count()), None);
    assert_eq!(registry.handles().len(), serials.len());
}

#[test]
fn serial_lookup_round_trips() {
    let (registry, _) = registry([
        SimDevice::new("A1", "OBSBOT Meet"),
        SimDevice::new("B2", "OBSBOT Meet 2"),
        SimDevice::new("C3", "OBSBOT Tail"),
    ]);
    for serial in ["A1", "B2", "C3"] {
        let handle = registry.get_by_serial(serial).unwrap();
        assert_eq!(registry.device(handle).serial(), serial);
    }
}

#[test]
fn empty_backend_has_no_devices() {
    let (registry, _) = registry([]);
    assert_eq!(registry.count(), 0);
    assert_eq!(registry.get(0), None);
    assert!(registry.handles().is_empty());
}

// ── Capabilities ──────────────────────────────────────────────────────

#[test]
fn unsupported_hdr_is_explicit_and_harmless() {
    let (registry, sim) =
        registry([SimDevice::new("ABC123", "OBSBOT Meet SE").without(Capability::Hdr)]);
    let device = registry.device(registry.get(0).unwrap());
    let before = device.status();

    for _ in 0..3 {
        let err = device.set_hdr(true).unwrap_err();
        assert!(matches!(err, ObsbotError::Unsupported { capability: Capability::Hdr, .. }));
    }
    assert_eq!(device.status(), before);
    assert_eq!(sim.device_status("ABC123").unwrap().hdr, Some(false));
}

#[test]
fn model_profile_limits_controls() {
    let (registry, _) = registry([SimDevice::new("T2", "OBSBOT Tiny 2")]);
    let device = registry.device(registry.get(0).unwrap());
    assert!(device.set_media_mode(MediaMode::Background).unwrap_err().is_unsupported());
    assert!(device.set_zoom(3.0).is_ok());
    assert_eq!(device.profile().unwrap().display_name, "OBSBOT Tiny 2");
}

// ── Disconnect ────────────────────────────────────────────────────────

#[test]
fn disconnected_handle_fails_cleanly() {
    let (registry, sim) = registry([SimDevice::new("ABC123", "OBSBOT Meet SE")]);
    let handle = registry.get(0).unwrap();

    sim.detach("ABC123");
    let summary = registry.refresh().unwrap();
    assert_eq!(summary.removed, vec!["ABC123".to_string()]);
    assert_eq!(registry.count(), 0);

    let device = registry.device(handle);
    assert_eq!(device.serial(), "");
    assert_eq!(device.version(), "");
    assert!(!device.is_initialized());
    assert!(!device.is_connected());
    assert!(device.profile().is_none());

    let err = device.set_media_mode(MediaMode::AutoFrame).unwrap_err();
    assert_eq!(err.status_code(), STATUS_INVALID_HANDLE);
    assert!(matches!(device.reset_to_defaults(), Err(ObsbotError::InvalidHandle)));
}

#[test]
fn handles_are_stable_until_detach() {
    let (registry, sim) = registry([
        SimDevice::new("A", "OBSBOT Meet SE"),
        SimDevice::new("B", "OBSBOT Meet SE"),
    ]);
    let a = registry.get_by_serial("A").unwrap();
    let b = registry.get_by_serial("B").unwrap();

    sim.attach(SimDevice::new("C", "OBSBOT Meet SE"));
    let summary = registry.refresh().unwrap();
    assert_eq!(summary.added, vec!["C".to_string()]);
    assert_eq!(summary.retained, 2);
    assert_eq!(registry.get_by_serial("A"), Some(a));
    assert_eq!(registry.get_by_serial("B"), Some(b));

    sim.detach("A");
    sim.attach(SimDevice::new("A", "OBSBOT Meet SE"));
    // same serial, but never seen missing: the handle survives
    registry.refresh().unwrap();
    assert_eq!(registry.get_by_serial("A"), Some(a));

    sim.detach("A");
    registry.refresh().unwrap();
    sim.attach(SimDevice::new("A", "OBSBOT Meet SE"));
    registry.refresh().unwrap();
    let fresh = registry.get_by_serial("A").unwrap();
    assert_ne!(fresh, a);
    assert!(!registry.is_valid(a));
    // re-attached devices go to the end
    assert_eq!(registry.get(2), Some(fresh));
}

#[test]
fn refresh_picks_up_firmware_changes() {
    let (registry, sim) = registry([SimDevice::new("A", "OBSBOT Meet 2").version("1.0.0")]);
    let handle = registry.get(0).unwrap();

    sim.attach(SimDevice::new("A", "OBSBOT Meet 2").version("1.2.0"));
    registry.refresh().unwrap();
    assert_eq!(registry.device(handle).version(), "1.2.0");
}

#[test]
fn raw_tokens_round_trip() {
    let (registry, _) = registry([SimDevice::new("A", "OBSBOT Meet SE")]);
    let handle = registry.get(0).unwrap();
    let raw = handle.to_raw();
    assert_ne!(raw, 0);
    assert_eq!(obsbot_ctl::DeviceHandle::from_raw(raw), Some(handle));
}

#[test]
fn concurrent_readers_and_writers() {
    let (registry, sim) = registry([SimDevice::new("A", "OBSBOT Meet SE")]);
    let handle = registry.get(0).unwrap();

    std::thread::scope(|s| {
        for value in [10, 20, 30, 40] {
            let registry = &registry;
            s.spawn(move || {
                for _ in 0..50 {
                    let _ = registry.device(handle).set_brightness(value);
                    let _ = registry.device(handle).serial();
                }
            });
        }
        s.spawn(|| {
            for _ in 0..20 {
                registry.refresh().unwrap();
            }
        });
    });

    let brightness = registry.device(handle).status().unwrap().image.brightness;
    assert!(matches!(brightness, Some(10 | 20 | 30 | 40)));
    assert_eq!(brightness, sim.device_status("A").unwrap().image.brightness);
    assert_eq!(sim.applied().len(), 200);
}
