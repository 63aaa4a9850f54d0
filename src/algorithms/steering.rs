//! Client band-steering (§4.5) and its per-(AP,client) back-off tracker
//! (§3 `ClientSteeringState`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::{parse_arg_or_default, AlgorithmArgs, ClientActionMap, ClientSteeringAlgorithm};
use crate::data_model::{DataModelSnapshot, BAND_2G};
use crate::device_registry::DeviceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SteeringAction {
    Deauthenticate,
    SteerUp,
    SteerDown,
}

const DEFAULT_MIN_RSSI_2G: i32 = -87;
const DEFAULT_MAX_RSSI_2G: i32 = -67;
const DEFAULT_MIN_RSSI_NON_2G: i32 = -82;
const DEFAULT_BACKOFF_SECS: u64 = 300;

/// Per-(AP-serial, client-MAC) last-action timestamp, using a monotonic
/// clock so wall-clock adjustments never cause spurious early/late
/// unblocking. Compare-and-set per key (§5 "shared state policy").
#[derive(Clone, Default)]
pub struct ClientSteeringState {
    last_action: Arc<DashMap<(String, String), std::time::Instant>>,
}

impl ClientSteeringState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action for `(ap, client)` at `now` if the elapsed
    /// time since the last recorded action exceeds `backoff`. Returns
    /// whether the action would be emitted. In `dry_run` mode, the
    /// query never mutates the map (§4.5, §8 property 6).
    pub fn register_if_backoff_expired(
        &self,
        ap: &str,
        client: &str,
        now: std::time::Instant,
        backoff: Duration,
        dry_run: bool,
    ) -> bool {
        let key = (ap.to_string(), client.to_string());
        let expired = match self.last_action.get(&key) {
            None => true,
            Some(last) => now.duration_since(*last) > backoff,
        };
        if expired && !dry_run {
            self.last_action.insert(key, now);
        }
        expired
    }
}

pub struct SingleApClientSteering {
    min_rssi_2g: i32,
    max_rssi_2g: i32,
    min_rssi_non_2g: i32,
    backoff: Duration,
}

impl SingleApClientSteering {
    pub fn from_args(args: &AlgorithmArgs) -> Self {
        let backoff_secs: u64 = parse_arg_or_default(args, "backoffTimeNs", DEFAULT_BACKOFF_SECS * 1_000_000_000) / 1_000_000_000;
        Self {
            min_rssi_2g: parse_arg_or_default(args, "minRssi2G", DEFAULT_MIN_RSSI_2G),
            max_rssi_2g: parse_arg_or_default(args, "maxRssi2G", DEFAULT_MAX_RSSI_2G),
            min_rssi_non_2g: parse_arg_or_default(args, "minRssiNon2G", DEFAULT_MIN_RSSI_NON_2G),
            backoff: Duration::from_secs(backoff_secs),
        }
    }
}

impl ClientSteeringAlgorithm for SingleApClientSteering {
    fn compute_client_action_map(
        &self,
        snapshot: &DataModelSnapshot,
        zone: &str,
        registry: &DeviceRegistry,
        steering_state: &ClientSteeringState,
        dry_run: bool,
    ) -> ClientActionMap {
        let mut out: HashMap<String, HashMap<String, SteeringAction>> = HashMap::new();
        let now = std::time::Instant::now();

        for serial in registry.zone_serials(zone) {
            let Some(state) = snapshot.latest_state(&serial) else {
                continue;
            };
            for (ssid, radio) in state.ssids_with_radio() {
                for assoc in &ssid.associations {
                    let action = if radio.band == BAND_2G {
                        if assoc.rssi < self.min_rssi_2g {
                            Some(SteeringAction::Deauthenticate)
                        } else if assoc.rssi > self.max_rssi_2g {
                            Some(SteeringAction::SteerUp)
                        } else {
                            None
                        }
                    } else if assoc.rssi < self.min_rssi_non_2g {
                        Some(SteeringAction::SteerDown)
                    } else {
                        None
                    };

                    let Some(action) = action else { continue };

                    let emit = steering_state.register_if_backoff_expired(
                        &serial,
                        &assoc.station,
                        now,
                        self.backoff,
                        dry_run,
                    );
                    if emit {
                        out.entry(serial.clone())
                            .or_default()
                            .insert(assoc.station.clone(), action);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::{Association, DataModel, Interface, Radio, Ssid, State, BAND_2G, BAND_5G};
    use crate::device_registry::DeviceConfig;
    use std::collections::HashMap as Map;
    use std::time::{Duration, Instant};

    fn registry(serial: &str, zone: &str) -> DeviceRegistry {
        let reg = DeviceRegistry::new();
        reg.upsert(DeviceConfig {
            serial: serial.to_string(),
            enable_rrm: true,
            zone: zone.to_string(),
            allowed_channels: Map::new(),
            allowed_tx_powers: Map::new(),
            algorithm_overrides: Map::new(),
        });
        reg
    }

    fn state_with_association(band: &str, rssi: i32) -> State {
        State {
            radios: vec![Radio {
                channel: 1,
                tx_power: 20,
                band: band.to_string(),
                phy: None,
            }],
            interfaces: Some(vec![Interface {
                ssids: vec![Ssid {
                    bssid: "bb:bb".to_string(),
                    radio_ref: Some(serde_json::json!(0)),
                    associations: vec![Association {
                        station: "cc:cc".to_string(),
                        rssi,
                    }],
                }],
            }]),
        }
    }

    #[test]
    fn s4_2g_deauth_emitted_then_suppressed_by_backoff() {
        let reg = registry("ap1", "z1");
        let mut dm = DataModel::new(5, 5);
        dm.push_state(&"ap1".to_string(), state_with_association(BAND_2G, -90));
        let snapshot = dm.snapshot();

        let algo = SingleApClientSteering::from_args(&AlgorithmArgs::new());
        let steering_state = ClientSteeringState::new();

        let map = algo.compute_client_action_map(&snapshot, "z1", &reg, &steering_state, false);
        assert_eq!(map["ap1"]["cc:cc"], SteeringAction::Deauthenticate);

        // A second identical call (no real time has passed) must not emit.
        let map2 = algo.compute_client_action_map(&snapshot, "z1", &reg, &steering_state, false);
        assert!(map2.get("ap1").is_none());
    }

    #[test]
    fn non_2g_low_rssi_steers_down() {
        let reg = registry("ap1", "z1");
        let mut dm = DataModel::new(5, 5);
        dm.push_state(&"ap1".to_string(), state_with_association(BAND_5G, -90));
        let snapshot = dm.snapshot();
        let algo = SingleApClientSteering::from_args(&AlgorithmArgs::new());
        let steering_state = ClientSteeringState::new();
        let map = algo.compute_client_action_map(&snapshot, "z1", &reg, &steering_state, false);
        assert_eq!(map["ap1"]["cc:cc"], SteeringAction::SteerDown);
    }

    #[test]
    fn dry_run_never_mutates_backoff_state() {
        let state = ClientSteeringState::new();
        let now = Instant::now();
        let backoff = Duration::from_secs(60);

        let emitted = state.register_if_backoff_expired("ap1", "cc:cc", now, backoff, true);
        assert!(emitted);
        // Because dry_run=true, a subsequent non-dry-run call right after
        // must still see no prior recorded action.
        let emitted_again = state.register_if_backoff_expired("ap1", "cc:cc", now, backoff, false);
        assert!(emitted_again);
    }

    #[test]
    fn backoff_blocks_until_elapsed() {
        let state = ClientSteeringState::new();
        let t0 = Instant::now();
        let backoff = Duration::from_secs(60);
        assert!(state.register_if_backoff_expired("ap1", "cc:cc", t0, backoff, false));
        let t1 = t0 + Duration::from_secs(30);
        assert!(!state.register_if_backoff_expired("ap1", "cc:cc", t1, backoff, false));
        let t2 = t0 + Duration::from_secs(61);
        assert!(state.register_if_backoff_expired("ap1", "cc:cc", t2, backoff, false));
    }

    #[test]
    fn backoff_time_ns_parsed_as_u64_nanoseconds() {
        let algo = SingleApClientSteering::from_args(&AlgorithmArgs::from([(
            "backoffTimeNs".to_string(),
            "600000000000".to_string(), // 600s in ns
        )]));
        assert_eq!(algo.backoff, Duration::from_secs(600));
    }
}
