//! Per-zone cron-driven execution with single-flight dedup (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::algorithms::{
    ActionMap, AlgorithmArgs, AlgorithmCategory, AlgorithmRegistry, ClientSteeringState,
};
use crate::config::{RrmConfig, ZoneConfig};
use crate::config_applier::ConfigApplier;
use crate::device_registry::DeviceRegistry;
use crate::error::SchedulerError;
use crate::modeler::Modeler;

/// Single-flight lock keyed by `(zone, category)`. A `true` value means
/// a run is currently in flight.
#[derive(Default, Clone)]
struct SingleFlight {
    in_flight: Arc<DashMap<(String, AlgorithmCategory), bool>>,
}

impl SingleFlight {
    /// Attempt to acquire the lock for `key`; returns `false` (and logs
    /// a warning) if a run is already in progress (§8 property 7).
    fn try_acquire(&self, zone: &str, category: AlgorithmCategory) -> bool {
        let key = (zone.to_string(), category);
        let mut acquired = false;
        self.in_flight
            .entry(key)
            .and_modify(|running| {
                if !*running {
                    *running = true;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                true
            });
        acquired
    }

    fn release(&self, zone: &str, category: AlgorithmCategory) {
        if let Some(mut entry) = self.in_flight.get_mut(&(zone.to_string(), category)) {
            *entry = false;
        }
    }
}

pub struct RRMScheduler {
    modeler: Modeler,
    registry: DeviceRegistry,
    algorithms: Arc<AlgorithmRegistry>,
    config_applier: Arc<ConfigApplier>,
    steering_state: ClientSteeringState,
    single_flight: SingleFlight,
    zones: HashMap<String, ZoneConfig>,
}

impl RRMScheduler {
    pub fn new(
        modeler: Modeler,
        registry: DeviceRegistry,
        algorithms: Arc<AlgorithmRegistry>,
        config_applier: Arc<ConfigApplier>,
        config: &RrmConfig,
    ) -> Self {
        Self {
            modeler,
            registry,
            algorithms,
            config_applier,
            steering_state: ClientSteeringState::new(),
            single_flight: SingleFlight::default(),
            zones: config.zones.clone(),
        }
    }

    /// Run a single category for `zone`, applying the single-flight
    /// lock. Shared by cron fires and manual (operator API) triggers
    /// (§4.6, §8 property 7). `dry_run=true` skips the hand-off to
    /// [`ConfigApplier`] and never mutates steering back-off state.
    pub async fn trigger(
        &self,
        zone: &str,
        category: AlgorithmCategory,
        dry_run: bool,
    ) -> Result<ActionMap, SchedulerError> {
        self.trigger_with_algorithm(zone, category, None, dry_run).await
    }

    /// Like [`Self::trigger`] but overrides the zone's configured
    /// algorithm ID for `category` — used by the CLI's `--run-once`
    /// single-shot mode (§6 "CLI surface").
    pub async fn trigger_with_algorithm(
        &self,
        zone: &str,
        category: AlgorithmCategory,
        algorithm_id_override: Option<&str>,
        dry_run: bool,
    ) -> Result<ActionMap, SchedulerError> {
        if !self.single_flight.try_acquire(zone, category) {
            warn!(zone, ?category, "run already in flight, dropping trigger");
            return Err(SchedulerError::AlreadyRunning {
                zone: zone.to_string(),
                category,
            });
        }
        let result = self
            .run_once(zone, category, algorithm_id_override, dry_run)
            .await;
        self.single_flight.release(zone, category);
        result
    }

    async fn run_once(
        &self,
        zone: &str,
        category: AlgorithmCategory,
        algorithm_id_override: Option<&str>,
        dry_run: bool,
    ) -> Result<ActionMap, SchedulerError> {
        let zone_config = self.zones.get(zone);
        let args: AlgorithmArgs = zone_config
            .map(|z| z.algorithm_args.clone())
            .unwrap_or_default();
        let snapshot = self.modeler.data_model_copy();

        let action_map = match category {
            AlgorithmCategory::Tpc => {
                let id = algorithm_id_override
                    .map(str::to_string)
                    .or_else(|| zone_config.and_then(|z| z.tpc_algorithm.clone()))
                    .ok_or_else(|| SchedulerError::UnknownAlgorithm("<unset tpc algorithm>".into()))?;
                let algo = self
                    .algorithms
                    .make_tpc(&id, &args)
                    .ok_or_else(|| SchedulerError::UnknownAlgorithm(id.clone()))?;
                ActionMap::Tpc(algo.compute_tx_power_map(&snapshot, zone, &self.registry))
            }
            AlgorithmCategory::Channel => {
                let id = algorithm_id_override
                    .map(str::to_string)
                    .or_else(|| zone_config.and_then(|z| z.channel_algorithm.clone()))
                    .ok_or_else(|| SchedulerError::UnknownAlgorithm("<unset channel algorithm>".into()))?;
                let algo = self
                    .algorithms
                    .make_channel(&id, &args)
                    .ok_or_else(|| SchedulerError::UnknownAlgorithm(id.clone()))?;
                ActionMap::Channel(algo.compute_channel_map(&snapshot, zone, &self.registry))
            }
            AlgorithmCategory::ClientSteering => {
                let id = algorithm_id_override
                    .map(str::to_string)
                    .or_else(|| zone_config.and_then(|z| z.steering_algorithm.clone()))
                    .ok_or_else(|| SchedulerError::UnknownAlgorithm("<unset steering algorithm>".into()))?;
                let algo = self
                    .algorithms
                    .make_steering(&id, &args)
                    .ok_or_else(|| SchedulerError::UnknownAlgorithm(id.clone()))?;
                ActionMap::ClientSteering(algo.compute_client_action_map(
                    &snapshot,
                    zone,
                    &self.registry,
                    &self.steering_state,
                    dry_run,
                ))
            }
        };

        if !dry_run {
            self.config_applier.apply(&action_map).await;
        }
        info!(zone, ?category, dry_run, "algorithm run complete");
        Ok(action_map)
    }

    /// Run every category for `zone` — backs `POST /api/v1/runRRM`.
    pub async fn trigger_all(&self, zone: &str, dry_run: bool) -> Vec<Result<ActionMap, SchedulerError>> {
        let mut results = Vec::new();
        for category in [
            AlgorithmCategory::Tpc,
            AlgorithmCategory::Channel,
            AlgorithmCategory::ClientSteering,
        ] {
            results.push(self.trigger(zone, category, dry_run).await);
        }
        results
    }

    pub fn zone_names(&self) -> Vec<String> {
        self.zones.keys().cloned().collect()
    }

    /// Build the `tokio-cron-scheduler` job set: one job per
    /// (zone, category) per §4.6's "per-zone cron jobs". Each fire goes
    /// through the same [`Self::trigger`] single-flight path manual
    /// triggers use.
    pub async fn build_cron_scheduler(
        self: &Arc<Self>,
    ) -> Result<tokio_cron_scheduler::JobScheduler, SchedulerError> {
        let mut sched = tokio_cron_scheduler::JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        for (zone, zone_config) in &self.zones {
            for (category, cron_expr) in [
                (AlgorithmCategory::Tpc, &zone_config.tpc_cron),
                (AlgorithmCategory::Channel, &zone_config.channel_cron),
                (AlgorithmCategory::ClientSteering, &zone_config.steering_cron),
            ] {
                let this = Arc::clone(self);
                let zone = zone.clone();
                let job = tokio_cron_scheduler::Job::new_async(cron_expr.as_str(), move |_uuid, _l| {
                    let this = Arc::clone(&this);
                    let zone = zone.clone();
                    Box::pin(async move {
                        let _ = this.trigger(&zone, category, false).await;
                    })
                })
                .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;
                sched
                    .add(job)
                    .await
                    .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;
            }
        }
        Ok(sched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flight_rejects_concurrent_same_key() {
        let sf = SingleFlight::default();
        assert!(sf.try_acquire("z1", AlgorithmCategory::Tpc));
        assert!(!sf.try_acquire("z1", AlgorithmCategory::Tpc));
        sf.release("z1", AlgorithmCategory::Tpc);
        assert!(sf.try_acquire("z1", AlgorithmCategory::Tpc));
    }

    #[test]
    fn single_flight_is_independent_per_category_and_zone() {
        let sf = SingleFlight::default();
        assert!(sf.try_acquire("z1", AlgorithmCategory::Tpc));
        assert!(sf.try_acquire("z1", AlgorithmCategory::Channel));
        assert!(sf.try_acquire("z2", AlgorithmCategory::Tpc));
    }
}
