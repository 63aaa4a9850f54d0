//! Measurement-based AP-AP transmit-power control (§4.3).

use std::collections::HashMap;

use tracing::warn;

use super::{parse_arg_or_default, AlgorithmArgs, TpcAlgorithm, TxPowerMap};
use crate::data_model::{Band, DataModelSnapshot};
use crate::device_registry::DeviceRegistry;

const DEFAULT_COVERAGE_THRESHOLD_DBM: i32 = -70;
const DEFAULT_NTH_SMALLEST_RSSI: usize = 0;
const DEFAULT_TX_POWER_CHOICES: &[i32] = &[6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30];

pub struct MeasurementBasedApApTpc {
    coverage_threshold_dbm: i32,
    nth_smallest_rssi: usize,
}

impl MeasurementBasedApApTpc {
    pub fn from_args(args: &AlgorithmArgs) -> Self {
        let mut coverage_threshold_dbm =
            parse_arg_or_default(args, "coverageThreshold", DEFAULT_COVERAGE_THRESHOLD_DBM);
        if coverage_threshold_dbm > 30 {
            warn!(
                coverage_threshold_dbm,
                "coverageThreshold > 30dBm rejected, using default"
            );
            coverage_threshold_dbm = DEFAULT_COVERAGE_THRESHOLD_DBM;
        }
        let nth_smallest_rssi =
            parse_arg_or_default(args, "nthSmallestRssi", DEFAULT_NTH_SMALLEST_RSSI);
        Self {
            coverage_threshold_dbm,
            nth_smallest_rssi,
        }
    }

    /// Pure computation shared by the algorithm body and unit tests
    /// (§8 property 4, "TPC equivalence").
    pub fn compute_tx_power(
        current_tx_power: i32,
        sorted_rssi: &[i32],
        coverage_threshold_dbm: i32,
        nth_smallest_rssi: usize,
        choices: &[i32],
    ) -> i32 {
        let max_tx = *choices.iter().max().unwrap();
        let min_tx = *choices.iter().min().unwrap();

        let new_tx = if sorted_rssi.is_empty() {
            max_tx
        } else {
            let i = nth_smallest_rssi.min(sorted_rssi.len() - 1);
            let target = sorted_rssi[i];
            let delta = max_tx - current_tx_power;
            let estimated = target + delta;
            max_tx + coverage_threshold_dbm - estimated
        };

        let clamped = new_tx.clamp(min_tx, max_tx);
        snap_to_nearest(clamped, choices)
    }
}

/// Snap to the nearest value present in `choices`; ties resolve to the
/// first-encountered choice (in iteration order), matching §4.3's
/// corrected (non-buggy) semantics.
fn snap_to_nearest(value: i32, choices: &[i32]) -> i32 {
    let mut best = choices[0];
    let mut best_dist = (choices[0] - value).abs();
    for &choice in &choices[1..] {
        let dist = (choice - value).abs();
        if dist < best_dist {
            best = choice;
            best_dist = dist;
        }
    }
    best
}

impl TpcAlgorithm for MeasurementBasedApApTpc {
    fn compute_tx_power_map(
        &self,
        snapshot: &DataModelSnapshot,
        zone: &str,
        registry: &DeviceRegistry,
    ) -> TxPowerMap {
        let mut out = TxPowerMap::new();
        let zone_serials: std::collections::HashSet<_> =
            registry.zone_serials(zone).into_iter().collect();
        if zone_serials.is_empty() {
            return out;
        }

        // managedBSSIDs: every BSSID in the latest state of any device in
        // the snapshot (§4.3 step 1, snapshot-wide, not zone-scoped).
        let managed_bssids = snapshot.managed_bssids();

        // Per-band sorted RSSI-by-BSSID observed by *other* APs' scans.
        // Scoped to the same snapshot-wide universe as managedBSSIDs
        // above (§4.3 step 2) — a BSSID seen only by an out-of-zone
        // neighbor AP must still contribute its RSSI, or that device
        // reads as having no neighbors and gets driven to max power.
        let mut rssi_by_bssid: HashMap<String, Vec<i32>> = HashMap::new();
        for scans in snapshot.latest_wifi_scans.values() {
            if let Some(latest) = scans.latest() {
                for entry in latest {
                    if managed_bssids.contains(&entry.bssid) {
                        rssi_by_bssid.entry(entry.bssid.clone()).or_default().push(entry.signal);
                    }
                }
            }
        }
        for list in rssi_by_bssid.values_mut() {
            list.sort_unstable();
        }

        for serial in &zone_serials {
            let Some(state) = snapshot.latest_state(serial) else {
                continue;
            };
            let device = registry.get(serial);
            for (ssid, radio) in state.ssids_with_radio() {
                // Determine the radio's band via capabilities (§4.3 step
                // "per-device, per-band, per-SSID"); fall back to the
                // reported band if capabilities haven't been fetched yet.
                let band: Band = snapshot
                    .band_for_channel(serial, radio.channel)
                    .unwrap_or_else(|| radio.band.clone());
                let current_tx_power = radio.tx_power;
                let choices: Vec<i32> = device
                    .as_ref()
                    .and_then(|d| d.allowed_tx_powers_for(&band))
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_TX_POWER_CHOICES.to_vec());
                if choices.is_empty() {
                    continue;
                }
                let rssi_list = rssi_by_bssid.get(&ssid.bssid).cloned().unwrap_or_default();
                let new_tx = Self::compute_tx_power(
                    current_tx_power,
                    &rssi_list,
                    self.coverage_threshold_dbm,
                    self.nth_smallest_rssi,
                    &choices,
                );
                out.entry(serial.clone()).or_default().insert(band, new_tx);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHOICES_6_30: [i32; 13] = [6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30];

    fn choices_0_30() -> Vec<i32> {
        (0..=30).collect()
    }

    #[test]
    fn s1_empty_neighbors_maximizes_power() {
        let new_tx =
            MeasurementBasedApApTpc::compute_tx_power(20, &[], -70, 0, &CHOICES_6_30);
        assert_eq!(new_tx, 30);
    }

    #[test]
    fn s2_typical_nth_zero() {
        let rssi = [-80, -75, -65];
        let new_tx = MeasurementBasedApApTpc::compute_tx_power(20, &rssi, -70, 0, &choices_0_30());
        assert_eq!(new_tx, 30);
    }

    #[test]
    fn s3_nth_one() {
        let rssi = [-80, -75, -65];
        let new_tx = MeasurementBasedApApTpc::compute_tx_power(20, &rssi, -70, 1, &choices_0_30());
        assert_eq!(new_tx, 25);
    }

    #[test]
    fn tpc_equivalence_matches_closed_form_when_nonempty() {
        let rssi = [-90, -70, -60, -50];
        let current_tx = 18;
        let threshold = -65;
        let choices = choices_0_30();
        for n in 0..rssi.len() {
            let expected_raw = (threshold - rssi[n.min(rssi.len() - 1)]) + current_tx;
            let expected = expected_raw.clamp(
                *choices.iter().min().unwrap(),
                *choices.iter().max().unwrap(),
            );
            let expected_snapped = snap_to_nearest(expected, &choices);
            let actual =
                MeasurementBasedApApTpc::compute_tx_power(current_tx, &rssi, threshold, n, &choices);
            assert_eq!(actual, expected_snapped, "mismatch at n={n}");
        }
    }

    #[test]
    fn tpc_monotonic_in_coverage_threshold() {
        let rssi = [-85, -72, -60];
        let choices = choices_0_30();
        let mut prev = i32::MIN;
        for threshold in (-90..=-50).step_by(5) {
            let tx =
                MeasurementBasedApApTpc::compute_tx_power(20, &rssi, threshold, 0, &choices);
            assert!(tx >= prev, "non-monotonic at threshold={threshold}");
            prev = tx;
        }
    }

    #[test]
    fn snap_to_nearest_ties_resolve_to_first_encountered() {
        // 5 is equidistant from 4 and 6 in this choice set; 4 appears first.
        let choices = [4, 6];
        assert_eq!(snap_to_nearest(5, &choices), 4);
    }

    #[test]
    fn coverage_threshold_above_30_rejected_to_default() {
        let tpc = MeasurementBasedApApTpc::from_args(&AlgorithmArgs::from([(
            "coverageThreshold".to_string(),
            "40".to_string(),
        )]));
        assert_eq!(tpc.coverage_threshold_dbm, DEFAULT_COVERAGE_THRESHOLD_DBM);
    }

    fn state_with_radio(channel: u32, band: &str, tx_power: i32) -> crate::data_model::State {
        crate::data_model::State {
            radios: vec![crate::data_model::Radio {
                channel,
                tx_power,
                band: band.to_string(),
                phy: None,
            }],
            interfaces: Some(vec![crate::data_model::Interface {
                ssids: vec![crate::data_model::Ssid {
                    bssid: "aa:bb".to_string(),
                    radio_ref: Some(serde_json::json!(0)),
                    associations: vec![],
                }],
            }]),
        }
    }

    #[test]
    fn compute_tx_power_map_resolves_band_via_capabilities_not_reported_band() {
        use crate::data_model::{Phy, BAND_5G};
        use crate::device_registry::DeviceConfig;

        let reg = DeviceRegistry::new();
        reg.upsert(DeviceConfig {
            serial: "a".to_string(),
            enable_rrm: true,
            zone: "z1".to_string(),
            allowed_channels: HashMap::new(),
            allowed_tx_powers: HashMap::new(),
            algorithm_overrides: HashMap::new(),
        });

        let mut dm = crate::data_model::DataModel::new(5, 5);
        // The radio reports "2G" but channel 36 is only listed under the
        // "5G" capability — capabilities must win.
        dm.push_state(&"a".to_string(), state_with_radio(36, "2G", 20));
        dm.set_capabilities(
            &"a".to_string(),
            BAND_5G.to_string(),
            Phy {
                channels: vec![36, 40],
                tx_power_min: 0,
                tx_power_max: 30,
                allowed_widths: vec![],
            },
        );
        let snapshot = dm.snapshot();

        let tpc = MeasurementBasedApApTpc::from_args(&AlgorithmArgs::new());
        let map = tpc.compute_tx_power_map(&snapshot, "z1", &reg);
        assert!(map["a"].contains_key(BAND_5G));
        assert!(!map["a"].contains_key("2G"));
    }

    #[test]
    fn compute_tx_power_map_falls_back_to_reported_band_without_capabilities() {
        use crate::data_model::BAND_5G;
        use crate::device_registry::DeviceConfig;

        let reg = DeviceRegistry::new();
        reg.upsert(DeviceConfig {
            serial: "a".to_string(),
            enable_rrm: true,
            zone: "z1".to_string(),
            allowed_channels: HashMap::new(),
            allowed_tx_powers: HashMap::new(),
            algorithm_overrides: HashMap::new(),
        });
        let mut dm = crate::data_model::DataModel::new(5, 5);
        dm.push_state(&"a".to_string(), state_with_radio(36, BAND_5G, 20));
        let snapshot = dm.snapshot();

        let tpc = MeasurementBasedApApTpc::from_args(&AlgorithmArgs::new());
        let map = tpc.compute_tx_power_map(&snapshot, "z1", &reg);
        assert!(map["a"].contains_key(BAND_5G));
    }
}
