//! Device registry with generation-checked handles.
//!
//! The registry owns one [`DeviceRecord`] per attached camera in a slot
//! table.  A [`DeviceHandle`] is a `(slot, generation)` pair; generations are
//! drawn from a single process-wide counter, so a handle whose device was
//! unplugged, or whose registry was torn down, never matches a record again
//! even after its slot is reused.
//!
//! Enumeration order is insertion order: the order in which serials were first
//! seen.  Devices that stay attached across [`Registry::refresh`] keep both
//! their position and their handle.
//!
//! Locking: the table sits behind an `RwLock`, the backend behind a `Mutex`.
//! Locks are always taken backend first, then table.  Backend I/O never runs
//! with the table lock held, but the backend guard is kept until the result
//! is written to the table, so snapshots are updated in the order the device
//! saw the writes.  The generation is re-checked before that write.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::backend::{Command, DeviceBackend, DeviceInfo};
use crate::capability::{CapabilitySet, ModelProfile};
use crate::config::Config;
use crate::device::Device;
use crate::error::{ObsbotError, Result};
use crate::sim::SimBackend;
use crate::status::CameraStatus;

static NEXT_GENERATION: AtomicU32 = AtomicU32::new(1);
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u32 {
    loop {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        // 0 is reserved so that a raw handle is never 0
        if generation != 0 {
            return generation;
        }
    }
}

/// Opaque reference to one device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    slot: u32,
    generation: u32,
}

impl DeviceHandle {
    /// Pack into the integer token used across the C ABI. Never 0.
    pub fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.slot as u64
    }

    /// Unpack a C ABI token; 0 (the "empty" token) yields `None`.
    pub fn from_raw(raw: u64) -> Option<Self> {
        let generation = (raw >> 32) as u32;
        if generation == 0 {
            return None;
        }
        Some(Self {
            slot: raw as u32,
            generation,
        })
    }
}

/// Everything the registry knows about one attached device.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub info: DeviceInfo,
    pub profile: ModelProfile,
    /// Model capabilities intersected with what the backend can drive.
    pub capabilities: CapabilitySet,
    pub status: CameraStatus,
}

struct Slot {
    generation: u32,
    record: Option<DeviceRecord>,
}

#[derive(Default)]
struct Table {
    slots: Vec<Slot>,
    /// Occupied slot indices in enumeration order.
    order: Vec<u32>,
    free: Vec<u32>,
}

impl Table {
    fn record(&self, handle: DeviceHandle) -> Option<&DeviceRecord> {
        let slot = self.slots.get(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_ref()
    }

    fn record_mut(&mut self, handle: DeviceHandle) -> Option<&mut DeviceRecord> {
        let slot = self.slots.get_mut(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_mut()
    }

    fn handle_at(&self, slot: u32) -> DeviceHandle {
        DeviceHandle {
            slot,
            generation: self.slots[slot as usize].generation,
        }
    }

    fn find_serial(&self, serial: &str) -> Option<u32> {
        self.order.iter().copied().find(|&slot| {
            self.slots[slot as usize]
                .record
                .as_ref()
                .is_some_and(|r| r.info.serial == serial)
        })
    }

    fn insert(&mut self, record: DeviceRecord) -> DeviceHandle {
        let generation = next_generation();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Slot {
                    generation,
                    record: Some(record),
                };
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation,
                    record: Some(record),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.order.push(slot);
        DeviceHandle { slot, generation }
    }

    fn remove(&mut self, slot: u32) -> Option<DeviceRecord> {
        let entry = self.slots.get_mut(slot as usize)?;
        let record = entry.record.take()?;
        // the stored generation stays behind; the next insert replaces it
        entry.generation = 0;
        self.order.retain(|&s| s != slot);
        self.free.push(slot);
        Some(record)
    }
}

/// What changed during a [`Registry::refresh`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub retained: usize,
}

/// Registry of attached cameras.
pub struct Registry {
    id: u64,
    backend: Mutex<Box<dyn DeviceBackend>>,
    table: RwLock<Table>,
}

impl Registry {
    /// Create an empty registry over a backend. Call [`refresh`](Self::refresh)
    /// to enumerate.
    pub fn new(backend: impl DeviceBackend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn DeviceBackend>) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            backend: Mutex::new(backend),
            table: RwLock::new(Table::default()),
        }
    }

    /// Build the configured backend and run a first enumeration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Self::from_boxed(config.build_backend()?);
        registry.refresh()?;
        Ok(registry)
    }

    /// Process-unique id of this registry instance; never 0.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.lock().name()
    }

    /// Re-enumerate through the backend and reconcile the record table.
    pub fn refresh(&self) -> Result<RefreshSummary> {
        let mut backend = self.backend.lock();
        let backend_name = backend.name();
        let infos = backend.enumerate()?;
        let fresh: Vec<(DeviceRecord, bool)> = infos
            .into_iter()
            .map(|info| {
                let profile = ModelProfile::for_model(&info.model_code);
                let capabilities = profile.capabilities.intersection(backend.capabilities(&info));
                let (status, readable) = match backend.read_status(&info.serial) {
                    Ok(status) => (status, true),
                    Err(e) => {
                        debug!("Status of {} unreadable: {}", info.serial, e);
                        (CameraStatus::default(), false)
                    }
                };
                (
                    DeviceRecord {
                        info,
                        profile,
                        capabilities,
                        status,
                    },
                    readable,
                )
            })
            .collect();

        let mut table = self.table.write();
        drop(backend);
        let mut summary = RefreshSummary::default();

        let present: Vec<&str> = fresh.iter().map(|(r, _)| r.info.serial.as_str()).collect();
        let gone: Vec<u32> = table
            .order
            .iter()
            .copied()
            .filter(|&slot| {
                table.slots[slot as usize]
                    .record
                    .as_ref()
                    .is_some_and(|r| !present.contains(&r.info.serial.as_str()))
            })
            .collect();
        for slot in gone {
            if let Some(record) = table.remove(slot) {
                info!("Device {} ({}) detached", record.info.serial, record.info.model_code);
                summary.removed.push(record.info.serial);
            }
        }

        for (record, readable) in fresh {
            match table.find_serial(&record.info.serial) {
                Some(slot) => {
                    let handle = table.handle_at(slot);
                    if let Some(existing) = table.record_mut(handle) {
                        existing.info = record.info;
                        existing.profile = record.profile;
                        existing.capabilities = record.capabilities;
                        if readable {
                            existing.status = record.status;
                        }
                    }
                    summary.retained += 1;
                }
                None => {
                    info!(
                        "Device {} ({}, firmware {}) attached",
                        record.info.serial, record.info.model_code, record.info.version
                    );
                    summary.added.push(record.info.serial.clone());
                    table.insert(record);
                }
            }
        }

        debug!(
            "Refresh via {}: {} added, {} removed, {} retained",
            backend_name,
            summary.added.len(),
            summary.removed.len(),
            summary.retained
        );
        Ok(summary)
    }

    /// Number of records in the current snapshot.
    pub fn count(&self) -> usize {
        self.table.read().order.len()
    }

    /// Handle at `index` in enumeration order, `None` when out of range.
    pub fn get(&self, index: usize) -> Option<DeviceHandle> {
        let table = self.table.read();
        table.order.get(index).map(|&slot| table.handle_at(slot))
    }

    /// Handle of the record with this serial number.
    pub fn get_by_serial(&self, serial: &str) -> Option<DeviceHandle> {
        let table = self.table.read();
        table.find_serial(serial).map(|slot| table.handle_at(slot))
    }

    /// All handles in enumeration order.
    pub fn handles(&self) -> Vec<DeviceHandle> {
        let table = self.table.read();
        table.order.iter().map(|&slot| table.handle_at(slot)).collect()
    }

    pub fn is_valid(&self, handle: DeviceHandle) -> bool {
        self.table.read().record(handle).is_some()
    }

    /// Typed view for issuing getters/setters against a handle.
    pub fn device(&self, handle: DeviceHandle) -> Device<'_> {
        Device::new(self, handle)
    }

    /// Copy of the record behind a handle.
    pub fn record(&self, handle: DeviceHandle) -> Option<DeviceRecord> {
        self.table.read().record(handle).cloned()
    }

    pub(crate) fn with_record<R>(
        &self,
        handle: DeviceHandle,
        f: impl FnOnce(&DeviceRecord) -> R,
    ) -> Option<R> {
        self.table.read().record(handle).map(f)
    }

    /// Send a command after the handle and capability checks pass, then
    /// fold the result into the status snapshot.
    pub(crate) fn execute(&self, handle: DeviceHandle, command: Command) -> Result<()> {
        let serial = {
            let table = self.table.read();
            let record = table.record(handle).ok_or_else(|| {
                warn!("Command {:?} on stale handle {:#x}", command, handle.to_raw());
                ObsbotError::InvalidHandle
            })?;
            let capability = command.capability();
            if !record.capabilities.contains(capability) {
                return Err(ObsbotError::Unsupported {
                    capability,
                    model: record.info.model_code.clone(),
                });
            }
            record.info.serial.clone()
        };

        let mut backend = self.backend.lock();
        backend.apply(&serial, &command)?;
        let refreshed = match command {
            Command::ResetDefaults => backend.read_status(&serial).ok(),
            _ => None,
        };

        let mut table = self.table.write();
        drop(backend);
        match table.record_mut(handle) {
            Some(record) => {
                record.status.apply(&command);
                if let Some(status) = refreshed {
                    record.status = status;
                }
                debug!("{}: applied {:?}", serial, command);
                Ok(())
            }
            None => {
                warn!("{} detached while {:?} was in flight", serial, command);
                Err(ObsbotError::InvalidHandle)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Process-wide instance
// ---------------------------------------------------------------------------

static GLOBAL: Mutex<Option<Arc<Registry>>> = parking_lot::const_mutex(None);

/// The process-wide registry, created on first use.
///
/// Initialization loads the configuration and enumerates once.  It never
/// fails: if the configured backend cannot start, an empty simulated backend
/// is installed and the problem is logged.
pub fn global() -> Arc<Registry> {
    let mut guard = GLOBAL.lock();
    if let Some(registry) = guard.as_ref() {
        return Arc::clone(registry);
    }

    let config = Config::load_or_default();
    let registry = match config.build_backend() {
        Ok(backend) => Registry::from_boxed(backend),
        Err(e) => {
            warn!("Failed to start {} backend: {}; no devices will be listed", config.backend.kind, e);
            Registry::new(SimBackend::new())
        }
    };
    if let Err(e) = registry.refresh() {
        warn!("Initial enumeration failed: {}", e);
    }

    let registry = Arc::new(registry);
    *guard = Some(Arc::clone(&registry));
    registry
}

/// The process-wide registry if one exists, without creating it.
pub fn current() -> Option<Arc<Registry>> {
    GLOBAL.lock().clone()
}

/// Replace the process-wide registry, returning the new shared instance.
pub fn install(registry: Registry) -> Arc<Registry> {
    let registry = Arc::new(registry);
    *GLOBAL.lock() = Some(Arc::clone(&registry));
    registry
}

/// Tear down the process-wide registry. Returns false if none existed.
///
/// Handles issued by it fail cleanly afterwards, even once a new registry is
/// created.
pub fn shutdown() -> bool {
    GLOBAL.lock().take().is_some()
}
