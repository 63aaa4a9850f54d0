//! Telemetry and capability types ingested by the [`crate::modeler`] and
//! read by the optimization algorithms. Mirrors the device-gateway's
//! wire shapes closely enough to `serde_json::from_value` directly.

use serde::{Deserialize, Serialize};

pub type Serial = String;
pub type Band = String;

pub const BAND_2G: &str = "2G";
pub const BAND_5G: &str = "5G";
pub const BAND_6G: &str = "6G";

/// Derive the band for a channel frequency in MHz. Unknown frequencies
/// fall back to `5G` as the reference implementation's catch-all.
pub fn band_from_frequency_mhz(freq_mhz: u32) -> Band {
    match freq_mhz {
        2400..=2500 => BAND_2G.to_string(),
        5925..=7125 => BAND_6G.to_string(),
        _ => BAND_5G.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Radio {
    pub channel: u32,
    #[serde(rename = "tx-power")]
    pub tx_power: i32,
    pub band: Band,
    #[serde(default)]
    pub phy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub station: String,
    pub rssi: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ssid {
    pub bssid: String,
    /// Raw `$ref`-style radio index as received; parsed into an integer
    /// by [`Ssid::radio_index`]. Invalid refs are never fatal — the SSID
    /// is skipped by the caller (§3 invariant 4).
    #[serde(rename = "radio", default)]
    pub radio_ref: Option<serde_json::Value>,
    #[serde(default)]
    pub associations: Vec<Association>,
}

impl Ssid {
    /// Resolve the `$ref`-style radio pointer to an index into
    /// `state.radios`. Accepts either a bare integer or a string of
    /// digits (both shapes are observed on the wire).
    pub fn radio_index(&self) -> Option<usize> {
        match self.radio_ref.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64().map(|v| v as usize),
            serde_json::Value::String(s) => s.trim().parse::<usize>().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    #[serde(default)]
    pub ssids: Vec<Ssid>,
}

/// One telemetry snapshot for a device, immutable once inserted into
/// the [`crate::data_model::DataModel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub radios: Vec<Radio>,
    #[serde(default)]
    pub interfaces: Option<Vec<Interface>>,
}

impl State {
    /// Iterate over every `(interface-index, ssid, resolved radio)`
    /// triple, skipping SSIDs whose radio reference is missing or
    /// out-of-range rather than failing the whole device (§3 inv. 4).
    pub fn ssids_with_radio(&self) -> impl Iterator<Item = (&Ssid, &Radio)> {
        self.interfaces
            .iter()
            .flatten()
            .flat_map(|iface| iface.ssids.iter())
            .filter_map(|ssid| {
                let idx = ssid.radio_index()?;
                let radio = self.radios.get(idx)?;
                Some((ssid, radio))
            })
    }
}

/// One observation of a neighbor broadcast, either managed or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiScanEntry {
    pub bssid: String,
    /// Observed carrier frequency in MHz.
    pub frequency: u32,
    /// Received signal strength in dBm, typically negative.
    pub signal: i32,
    #[serde(default)]
    pub ht_operation: Option<serde_json::Value>,
    #[serde(default)]
    pub vht_operation: Option<serde_json::Value>,
    /// Ingest timestamp stamped by the Modeler, not part of the wire
    /// payload (§4.1: "tagged with the record's ingest timestamp").
    #[serde(default)]
    pub observed_at_ms: i64,
}

impl WifiScanEntry {
    pub fn band(&self) -> Band {
        band_from_frequency_mhz(self.frequency)
    }
}

/// Per-band radio/PHY capability description (§3 Capabilities.Phy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phy {
    pub channels: Vec<u32>,
    pub tx_power_min: i32,
    pub tx_power_max: i32,
    #[serde(default)]
    pub allowed_widths: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_from_frequency_maps_known_ranges() {
        assert_eq!(band_from_frequency_mhz(2437), BAND_2G);
        assert_eq!(band_from_frequency_mhz(5180), BAND_5G);
        assert_eq!(band_from_frequency_mhz(6115), BAND_6G);
    }

    #[test]
    fn ssid_radio_index_accepts_number_or_string() {
        let by_num = Ssid {
            bssid: "aa".into(),
            radio_ref: Some(serde_json::json!(1)),
            associations: vec![],
        };
        let by_str = Ssid {
            bssid: "bb".into(),
            radio_ref: Some(serde_json::json!("2")),
            associations: vec![],
        };
        let missing = Ssid {
            bssid: "cc".into(),
            radio_ref: None,
            associations: vec![],
        };
        assert_eq!(by_num.radio_index(), Some(1));
        assert_eq!(by_str.radio_index(), Some(2));
        assert_eq!(missing.radio_index(), None);
    }

    #[test]
    fn ssids_with_radio_skips_out_of_range_ref() {
        let state = State {
            radios: vec![Radio {
                channel: 36,
                tx_power: 20,
                band: BAND_5G.to_string(),
                phy: None,
            }],
            interfaces: Some(vec![Interface {
                ssids: vec![
                    Ssid {
                        bssid: "ok".into(),
                        radio_ref: Some(serde_json::json!(0)),
                        associations: vec![],
                    },
                    Ssid {
                        bssid: "oob".into(),
                        radio_ref: Some(serde_json::json!(5)),
                        associations: vec![],
                    },
                ],
            }]),
        };
        let resolved: Vec<_> = state.ssids_with_radio().collect();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0.bssid, "ok");
    }

    #[test]
    fn state_with_null_interfaces_yields_no_ssids() {
        let state = State {
            radios: vec![],
            interfaces: None,
        };
        assert_eq!(state.ssids_with_radio().count(), 0);
    }
}
