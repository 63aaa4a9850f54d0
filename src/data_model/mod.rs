//! The rolling per-device view of the RF environment (§3).
//!
//! [`DataModel`] is mutated exclusively by the [`crate::modeler`] worker.
//! Algorithms read a [`DataModel::snapshot`] — a structural deep copy —
//! so that ingest and computation never contend (§5 "snapshot
//! discipline").

mod buffer;
pub mod types;

pub use buffer::BoundedFifo;
pub use types::*;

use std::collections::HashMap;

/// The live, mutable rolling model. Not `Clone`; use [`DataModel::snapshot`]
/// to hand a copy to an algorithm.
#[derive(Debug, Default)]
pub struct DataModel {
    state_buffer_size: usize,
    wifi_scan_buffer_size: usize,
    latest_states: HashMap<Serial, BoundedFifo<State>>,
    latest_wifi_scans: HashMap<Serial, BoundedFifo<Vec<WifiScanEntry>>>,
    latest_capabilities: HashMap<Serial, HashMap<Band, Phy>>,
    latest_status_radios: HashMap<Serial, Vec<Radio>>,
}

impl DataModel {
    pub fn new(state_buffer_size: usize, wifi_scan_buffer_size: usize) -> Self {
        Self {
            state_buffer_size,
            wifi_scan_buffer_size,
            ..Default::default()
        }
    }

    pub fn push_state(&mut self, serial: &Serial, state: State) {
        self.latest_states
            .entry(serial.clone())
            .or_insert_with(|| BoundedFifo::new(self.state_buffer_size))
            .push(state);
    }

    pub fn push_wifi_scan(&mut self, serial: &Serial, entries: Vec<WifiScanEntry>) {
        self.latest_wifi_scans
            .entry(serial.clone())
            .or_insert_with(|| BoundedFifo::new(self.wifi_scan_buffer_size))
            .push(entries);
    }

    pub fn set_capabilities(&mut self, serial: &Serial, band: Band, phy: Phy) {
        self.latest_capabilities
            .entry(serial.clone())
            .or_default()
            .insert(band, phy);
    }

    pub fn set_status_radios(&mut self, serial: &Serial, radios: Vec<Radio>) {
        self.latest_status_radios.insert(serial.clone(), radios);
    }

    pub fn latest_states(&self) -> &HashMap<Serial, BoundedFifo<State>> {
        &self.latest_states
    }

    pub fn latest_wifi_scans(&self) -> &HashMap<Serial, BoundedFifo<Vec<WifiScanEntry>>> {
        &self.latest_wifi_scans
    }

    pub fn capabilities(&self) -> &HashMap<Serial, HashMap<Band, Phy>> {
        &self.latest_capabilities
    }

    pub fn status_radios(&self) -> &HashMap<Serial, Vec<Radio>> {
        &self.latest_status_radios
    }

    pub fn latest_state(&self, serial: &str) -> Option<&State> {
        self.latest_states.get(serial)?.latest()
    }

    /// Purge entries for serials that are not in `rrm_enabled` — §3
    /// invariant 1: every serial present in any sub-map must be or
    /// recently have been RRM-enabled.
    pub fn revalidate(&mut self, rrm_enabled: &dyn Fn(&str) -> bool) {
        self.latest_states.retain(|serial, _| rrm_enabled(serial));
        self.latest_wifi_scans
            .retain(|serial, _| rrm_enabled(serial));
        self.latest_capabilities
            .retain(|serial, _| rrm_enabled(serial));
        self.latest_status_radios
            .retain(|serial, _| rrm_enabled(serial));
    }

    /// A structural deep copy. All buffers are `Clone`, so this is a
    /// plain field-by-field clone — the type itself documents the
    /// "snapshot" contract algorithms rely on.
    pub fn snapshot(&self) -> DataModelSnapshot {
        DataModelSnapshot {
            latest_states: self.latest_states.clone(),
            latest_wifi_scans: self.latest_wifi_scans.clone(),
            latest_capabilities: self.latest_capabilities.clone(),
            latest_status_radios: self.latest_status_radios.clone(),
        }
    }
}

/// An immutable, independently owned copy of [`DataModel`]'s contents at
/// one instant. This is what every algorithm actually sees.
#[derive(Debug, Clone, Default)]
pub struct DataModelSnapshot {
    pub latest_states: HashMap<Serial, BoundedFifo<State>>,
    pub latest_wifi_scans: HashMap<Serial, BoundedFifo<Vec<WifiScanEntry>>>,
    pub latest_capabilities: HashMap<Serial, HashMap<Band, Phy>>,
    pub latest_status_radios: HashMap<Serial, Vec<Radio>>,
}

impl DataModelSnapshot {
    pub fn latest_state(&self, serial: &str) -> Option<&State> {
        self.latest_states.get(serial)?.latest()
    }

    pub fn latest_wifi_scan(&self, serial: &str) -> Option<&Vec<WifiScanEntry>> {
        self.latest_wifi_scans.get(serial)?.latest()
    }

    pub fn phy_for(&self, serial: &str, band: &str) -> Option<&Phy> {
        self.latest_capabilities.get(serial)?.get(band)
    }

    /// The device's last-known configured radios (§4.7), sourced from
    /// ingested STATE records and the startup backfill rather than a
    /// live gateway call.
    pub fn status_radios_for(&self, serial: &str) -> Option<&Vec<Radio>> {
        self.latest_status_radios.get(serial)
    }

    /// Resolve the band a radio operates on by finding which of the
    /// device's capability bands lists `channel` (§4.3: "determine its
    /// band via capabilities"). `None` if capabilities haven't been
    /// fetched yet for this serial.
    pub fn band_for_channel(&self, serial: &str, channel: u32) -> Option<Band> {
        for band in [BAND_2G, BAND_5G, BAND_6G] {
            if let Some(phy) = self.phy_for(serial, band) {
                if phy.channels.contains(&channel) {
                    return Some(band.to_string());
                }
            }
        }
        None
    }

    /// Every distinct serial with at least one recorded state — the
    /// universe of devices an algorithm pass iterates over.
    pub fn serials(&self) -> impl Iterator<Item = &Serial> {
        self.latest_states.keys()
    }

    /// The set of BSSIDs broadcast by any managed device's latest state
    /// (§4.3 `managedBSSIDs`).
    pub fn managed_bssids(&self) -> std::collections::HashSet<String> {
        self.latest_states
            .values()
            .filter_map(|fifo| fifo.latest())
            .flat_map(|state| state.ssids_with_radio().map(|(ssid, _)| ssid.bssid.clone()))
            .collect()
    }
}
