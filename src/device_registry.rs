//! Authoritative serial→[`DeviceConfig`] mapping (§3, §5).
//!
//! Guarded by a writer lock (`parking_lot::RwLock`, matching the rest of
//! the pack's preference for `parking_lot` over the stdlib mutex);
//! readers snapshot a generation counter to detect mid-read churn, per
//! §5's "shared state policy".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::data_model::{Band, Serial};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub serial: Serial,
    #[serde(default)]
    pub enable_rrm: bool,
    pub zone: String,
    #[serde(default)]
    pub allowed_channels: HashMap<Band, Vec<u32>>,
    #[serde(default)]
    pub allowed_tx_powers: HashMap<Band, Vec<i32>>,
    /// Free-form per-algorithm overrides, e.g. `tpc.coverageThreshold`.
    #[serde(default)]
    pub algorithm_overrides: HashMap<String, String>,
}

impl DeviceConfig {
    pub fn allowed_tx_powers_for(&self, band: &str) -> Option<&Vec<i32>> {
        self.allowed_tx_powers.get(band)
    }

    pub fn allowed_channels_for(&self, band: &str) -> Option<&Vec<u32>> {
        self.allowed_channels.get(band)
    }
}

#[derive(Debug, Default)]
struct Inner {
    devices: HashMap<Serial, DeviceConfig>,
}

/// Shared, clonable handle to the registry; clones share the same lock
/// and generation counter.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    inner: Arc<RwLock<Inner>>,
    generation: Arc<AtomicU64>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn upsert(&self, config: DeviceConfig) {
        let mut inner = self.inner.write();
        inner.devices.insert(config.serial.clone(), config);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn remove(&self, serial: &str) {
        let mut inner = self.inner.write();
        if inner.devices.remove(serial).is_some() {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn get(&self, serial: &str) -> Option<DeviceConfig> {
        self.inner.read().devices.get(serial).cloned()
    }

    pub fn is_rrm_enabled(&self, serial: &str) -> bool {
        self.inner
            .read()
            .devices
            .get(serial)
            .map(|d| d.enable_rrm)
            .unwrap_or(false)
    }

    /// Serials belonging to `zone` with RRM enabled.
    pub fn zone_serials(&self, zone: &str) -> Vec<Serial> {
        self.inner
            .read()
            .devices
            .values()
            .filter(|d| d.enable_rrm && d.zone == zone)
            .map(|d| d.serial.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<DeviceConfig> {
        self.inner.read().devices.values().cloned().collect()
    }

    /// Reassign `serial`'s zone, e.g. from a `PUT /api/v1/topology`
    /// update. Returns `false` without effect if `serial` is unknown.
    pub fn set_zone(&self, serial: &str, zone: String) -> bool {
        let mut inner = self.inner.write();
        let found = if let Some(device) = inner.devices.get_mut(serial) {
            device.zone = zone;
            true
        } else {
            false
        };
        drop(inner);
        if found {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        found
    }

    /// Replace the whole registry contents, e.g. from a provisioning
    /// reconcile pass. Bumps the generation exactly once.
    pub fn replace_all(&self, configs: impl IntoIterator<Item = DeviceConfig>) {
        let mut inner = self.inner.write();
        inner.devices = configs.into_iter().map(|c| (c.serial.clone(), c)).collect();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(serial: &str, zone: &str, enabled: bool) -> DeviceConfig {
        DeviceConfig {
            serial: serial.to_string(),
            enable_rrm: enabled,
            zone: zone.to_string(),
            allowed_channels: HashMap::new(),
            allowed_tx_powers: HashMap::new(),
            algorithm_overrides: HashMap::new(),
        }
    }

    #[test]
    fn zone_serials_filters_disabled_and_other_zones() {
        let reg = DeviceRegistry::new();
        reg.upsert(cfg("a", "zone-1", true));
        reg.upsert(cfg("b", "zone-1", false));
        reg.upsert(cfg("c", "zone-2", true));
        let mut serials = reg.zone_serials("zone-1");
        serials.sort();
        assert_eq!(serials, vec!["a".to_string()]);
    }

    #[test]
    fn generation_bumps_on_mutation() {
        let reg = DeviceRegistry::new();
        let g0 = reg.generation();
        reg.upsert(cfg("a", "zone-1", true));
        assert!(reg.generation() > g0);
    }

    #[test]
    fn set_zone_moves_known_serial_and_rejects_unknown() {
        let reg = DeviceRegistry::new();
        reg.upsert(cfg("a", "zone-1", true));
        assert!(reg.set_zone("a", "zone-2".to_string()));
        assert_eq!(reg.get("a").unwrap().zone, "zone-2");
        assert!(!reg.set_zone("missing", "zone-2".to_string()));
    }
}
