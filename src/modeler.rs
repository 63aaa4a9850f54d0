//! Single-writer ingest loop (§4.1). One dedicated worker drains an
//! unbounded queue fed by the Kafka listener; it is the only task that
//! ever mutates [`DataModel`].

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::data_model::{DataModel, DataModelSnapshot, Serial, State, WifiScanEntry};
use crate::device_registry::DeviceRegistry;
use crate::error::ModelerError;
use crate::gateway::GatewayClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    State,
    WifiScan,
    ServiceEvent,
}

impl RecordKind {
    pub fn from_topic(topic: &str) -> Self {
        if topic.contains("wifiscan") {
            RecordKind::WifiScan
        } else if topic.contains("service_events") {
            RecordKind::ServiceEvent
        } else {
            RecordKind::State
        }
    }
}

#[derive(Debug)]
pub struct IngestRecord {
    pub kind: RecordKind,
    pub serial: Serial,
    pub timestamp_ms: i64,
    pub payload: Value,
}

/// Owns the live [`DataModel`] behind a lock so `getDataModel`-style
/// live access and `getDataModelCopy`-style snapshotting can share one
/// handle. Only [`Modeler::run`] ever calls a mutating method.
#[derive(Clone)]
pub struct Modeler {
    data_model: Arc<RwLock<DataModel>>,
    registry: DeviceRegistry,
}

impl Modeler {
    pub fn new(state_buffer_size: usize, wifi_scan_buffer_size: usize, registry: DeviceRegistry) -> Self {
        Self {
            data_model: Arc::new(RwLock::new(DataModel::new(
                state_buffer_size,
                wifi_scan_buffer_size,
            ))),
            registry,
        }
    }

    /// A deep structural snapshot. All algorithms must use this, never
    /// the live reference (§4.1).
    pub fn data_model_copy(&self) -> DataModelSnapshot {
        self.data_model.read().snapshot()
    }

    /// Seed `latestStates` with one entry per RRM-enabled device by
    /// fetching its latest statistics from the gateway. Run once at
    /// startup, after the gateway reports ready (§4.1).
    pub async fn backfill(&self, gateway: &dyn GatewayClient) -> Result<(), ModelerError> {
        while !gateway.ready().await {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
        let devices = gateway.devices().await?;
        for device in devices {
            if !self.registry.is_rrm_enabled(&device.serial) {
                continue;
            }
            match gateway.latest_statistics(&device.serial).await {
                Ok(state) => {
                    let mut dm = self.data_model.write();
                    dm.set_status_radios(&device.serial, state.radios.clone());
                    dm.push_state(&device.serial, state);
                }
                Err(e) => warn!(serial = %device.serial, error = %e, "backfill statistics fetch failed"),
            }
        }
        Ok(())
    }

    /// Fetch and store each RRM-enabled device's Capabilities.Phy map
    /// (§3: "mutated only by a capabilities refresh"). Run once at
    /// startup alongside [`Self::backfill`]; §4.3's TPC band lookup
    /// depends on this having run.
    pub async fn refresh_capabilities(&self, gateway: &dyn GatewayClient) -> Result<(), ModelerError> {
        let devices = gateway.devices().await?;
        for device in devices {
            if !self.registry.is_rrm_enabled(&device.serial) {
                continue;
            }
            match gateway.capabilities(&device.serial).await {
                Ok(by_band) => {
                    let mut dm = self.data_model.write();
                    for (band, phy) in by_band {
                        dm.set_capabilities(&device.serial, band, phy);
                    }
                }
                Err(e) => warn!(serial = %device.serial, error = %e, "capabilities refresh failed"),
            }
        }
        Ok(())
    }

    /// Drain `rx` until the channel closes or `shutdown` fires, applying
    /// each record. On a shutdown signal the in-flight record is finished
    /// before exiting (§5 "Cancellation"), matching
    /// [`crate::kafka::KafkaIngest::run`] and
    /// [`crate::prov_monitor::ProvMonitor::run`]'s shape. Records for
    /// non-RRM-enabled devices are filtered before processing (§4.1);
    /// malformed payloads are logged and dropped per-record, never
    /// crashing the worker (§7).
    pub async fn run(self, mut rx: Receiver<IngestRecord>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("modeler ingest worker started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("modeler ingest worker observed shutdown signal, exiting");
                        return;
                    }
                }
                record = rx.recv() => {
                    let Some(record) = record else {
                        info!("modeler ingest worker exiting: channel closed");
                        return;
                    };
                    if record.kind == RecordKind::ServiceEvent {
                        continue;
                    }
                    if !self.registry.is_rrm_enabled(&record.serial) {
                        continue;
                    }
                    if let Err(e) = self.apply(record) {
                        debug!(error = %e, "dropped malformed ingest record");
                    }
                }
            }
        }
    }

    fn apply(&self, record: IngestRecord) -> Result<(), ModelerError> {
        match record.kind {
            RecordKind::State => {
                let state: State = serde_json::from_value(record.payload).map_err(|e| {
                    ModelerError::MalformedPayload {
                        serial: record.serial.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let mut dm = self.data_model.write();
                dm.set_status_radios(&record.serial, state.radios.clone());
                dm.push_state(&record.serial, state);
                Ok(())
            }
            RecordKind::WifiScan => {
                let mut entries: Vec<WifiScanEntry> =
                    serde_json::from_value(record.payload).map_err(|e| {
                        ModelerError::MalformedPayload {
                            serial: record.serial.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                for entry in &mut entries {
                    entry.observed_at_ms = record.timestamp_ms;
                }
                self.data_model
                    .write()
                    .push_wifi_scan(&record.serial, entries);
                Ok(())
            }
            RecordKind::ServiceEvent => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_registry::DeviceConfig;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    fn enabled_registry(serial: &str) -> DeviceRegistry {
        let reg = DeviceRegistry::new();
        reg.upsert(DeviceConfig {
            serial: serial.to_string(),
            enable_rrm: true,
            zone: "z1".to_string(),
            allowed_channels: HashMap::new(),
            allowed_tx_powers: HashMap::new(),
            algorithm_overrides: HashMap::new(),
        });
        reg
    }

    #[tokio::test]
    async fn ingest_purity_filters_disabled_devices() {
        let registry = DeviceRegistry::new();
        registry.upsert(DeviceConfig {
            serial: "disabled".to_string(),
            enable_rrm: false,
            zone: "z1".to_string(),
            allowed_channels: HashMap::new(),
            allowed_tx_powers: HashMap::new(),
            algorithm_overrides: HashMap::new(),
        });
        let modeler = Modeler::new(10, 10, registry);
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(modeler.clone().run(rx, shutdown_rx));
        tx.send(IngestRecord {
            kind: RecordKind::State,
            serial: "disabled".to_string(),
            timestamp_ms: 0,
            payload: serde_json::json!({ "radios": [] }),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();
        assert!(modeler.data_model_copy().latest_state("disabled").is_none());
    }

    #[tokio::test]
    async fn state_eviction_keeps_last_n_in_order() {
        let registry = enabled_registry("s1");
        let modeler = Modeler::new(3, 3, registry);
        let (tx, rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(modeler.clone().run(rx, shutdown_rx));
        for i in 0..5u32 {
            tx.send(IngestRecord {
                kind: RecordKind::State,
                serial: "s1".to_string(),
                timestamp_ms: 0,
                payload: serde_json::json!({ "radios": [{ "channel": i, "tx-power": 20, "band": "5G" }] }),
            })
            .await
            .unwrap();
        }
        drop(tx);
        handle.await.unwrap();
        let snap = modeler.data_model_copy();
        let fifo = &snap.latest_states["s1"];
        assert_eq!(fifo.len(), 3);
        let channels: Vec<u32> = fifo.iter().map(|s| s.radios[0].channel).collect();
        assert_eq!(channels, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_not_fatal() {
        let registry = enabled_registry("s1");
        let modeler = Modeler::new(3, 3, registry);
        let (tx, rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(modeler.clone().run(rx, shutdown_rx));
        tx.send(IngestRecord {
            kind: RecordKind::State,
            serial: "s1".to_string(),
            timestamp_ms: 0,
            payload: serde_json::json!("not an object"),
        })
        .await
        .unwrap();
        tx.send(IngestRecord {
            kind: RecordKind::State,
            serial: "s1".to_string(),
            timestamp_ms: 0,
            payload: serde_json::json!({ "radios": [] }),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();
        assert_eq!(modeler.data_model_copy().latest_states["s1"].len(), 1);
    }
}
