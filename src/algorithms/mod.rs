//! Algorithm contract and registry (§4.2, Design Notes).
//!
//! Each category is modeled as a trait with one `compute*` operation;
//! concrete algorithms are registered by stable string ID in a table
//! keyed by `(category, id) -> factory`, replacing the reference
//! implementation's deep-inheritance/reflection approach with an
//! explicit literal registry.

pub mod channel;
pub mod steering;
pub mod tpc;

use std::collections::HashMap;

use crate::data_model::{Band, DataModelSnapshot, Serial};
use crate::device_registry::DeviceRegistry;

pub use steering::{ClientSteeringState, SteeringAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AlgorithmCategory {
    Tpc,
    Channel,
    ClientSteering,
}

pub type TxPowerMap = HashMap<Serial, HashMap<Band, i32>>;
pub type ChannelMap = HashMap<Serial, HashMap<Band, u32>>;
pub type ClientActionMap = HashMap<Serial, HashMap<String, SteeringAction>>;

/// Parsed, validated key-value args for one algorithm invocation.
/// Unknown keys are ignored by each algorithm's parser; malformed
/// values log and fall back to the algorithm's own default (§4.2, §7).
pub type AlgorithmArgs = HashMap<String, String>;

pub trait TpcAlgorithm: Send + Sync {
    fn compute_tx_power_map(
        &self,
        snapshot: &DataModelSnapshot,
        zone: &str,
        registry: &DeviceRegistry,
    ) -> TxPowerMap;
}

pub trait ChannelAlgorithm: Send + Sync {
    fn compute_channel_map(
        &self,
        snapshot: &DataModelSnapshot,
        zone: &str,
        registry: &DeviceRegistry,
    ) -> ChannelMap;
}

pub trait ClientSteeringAlgorithm: Send + Sync {
    fn compute_client_action_map(
        &self,
        snapshot: &DataModelSnapshot,
        zone: &str,
        registry: &DeviceRegistry,
        steering_state: &ClientSteeringState,
        dry_run: bool,
    ) -> ClientActionMap;
}

/// A computed action map, shaped by the algorithm's category (§4.2).
pub enum ActionMap {
    Tpc(TxPowerMap),
    Channel(ChannelMap),
    ClientSteering(ClientActionMap),
}

/// Name→factory table. Unknown IDs are a [`crate::error::SchedulerError::
/// UnknownAlgorithm`]; this is the one place algorithm identity is
/// resolved, so the scheduler and the REST `algorithms` listing both go
/// through it.
pub struct AlgorithmRegistry {
    tpc: HashMap<&'static str, fn(&AlgorithmArgs) -> Box<dyn TpcAlgorithm>>,
    channel: HashMap<&'static str, fn(&AlgorithmArgs) -> Box<dyn ChannelAlgorithm>>,
    steering: HashMap<&'static str, fn(&AlgorithmArgs) -> Box<dyn ClientSteeringAlgorithm>>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        let mut reg = Self {
            tpc: HashMap::new(),
            channel: HashMap::new(),
            steering: HashMap::new(),
        };
        reg.tpc
            .insert("measurement_based_ap_ap_tpc", |args| {
                Box::new(tpc::MeasurementBasedApApTpc::from_args(args))
            });
        reg.channel
            .insert("random_channel", |args| Box::new(channel::RandomChannel::from_args(args)));
        reg.channel
            .insert("least_used_channel", |args| {
                Box::new(channel::LeastUsedChannel::from_args(args))
            });
        reg.channel
            .insert("unmanaged_ap_aware_channel", |args| {
                Box::new(channel::UnmanagedApAwareChannel::from_args(args))
            });
        reg.steering
            .insert("single_ap_client_steering", |args| {
                Box::new(steering::SingleApClientSteering::from_args(args))
            });
        reg
    }
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_tpc(&self, id: &str, args: &AlgorithmArgs) -> Option<Box<dyn TpcAlgorithm>> {
        self.tpc.get(id).map(|f| f(args))
    }

    pub fn make_channel(&self, id: &str, args: &AlgorithmArgs) -> Option<Box<dyn ChannelAlgorithm>> {
        self.channel.get(id).map(|f| f(args))
    }

    pub fn make_steering(
        &self,
        id: &str,
        args: &AlgorithmArgs,
    ) -> Option<Box<dyn ClientSteeringAlgorithm>> {
        self.steering.get(id).map(|f| f(args))
    }

    /// Listing for `GET /api/v1/algorithms` (§6).
    pub fn listing(&self) -> Vec<AlgorithmDescriptor> {
        let mut out = Vec::new();
        for id in self.tpc.keys() {
            out.push(AlgorithmDescriptor {
                id: id.to_string(),
                category: AlgorithmCategory::Tpc,
            });
        }
        for id in self.channel.keys() {
            out.push(AlgorithmDescriptor {
                id: id.to_string(),
                category: AlgorithmCategory::Channel,
            });
        }
        for id in self.steering.keys() {
            out.push(AlgorithmDescriptor {
                id: id.to_string(),
                category: AlgorithmCategory::ClientSteering,
            });
        }
        out
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AlgorithmDescriptor {
    pub id: String,
    pub category: AlgorithmCategory,
}

/// Parse a numeric arg, falling back to `default` and logging on parse
/// failure (§7 "config violation").
pub(crate) fn parse_arg_or_default<T: std::str::FromStr>(
    args: &AlgorithmArgs,
    key: &str,
    default: T,
) -> T {
    match args.get(key) {
        None => default,
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "malformed algorithm arg, using default");
            default
        }),
    }
}
