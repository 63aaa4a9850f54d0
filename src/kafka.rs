//! Northbound Kafka consumer shim (§5, §6). Runs on its own task and
//! only *enqueues* onto the [`crate::modeler::Modeler`]'s channel — it
//! never touches the [`crate::data_model::DataModel`] directly, which
//! decouples ingest latency from parse/apply cost.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, warn};

use crate::config::KafkaConfig;
use crate::modeler::IngestRecord;

pub struct KafkaIngest {
    consumer: StreamConsumer,
}

impl KafkaIngest {
    pub fn new(config: &KafkaConfig) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .create()?;
        consumer.subscribe(&[
            config.state_topic.as_str(),
            config.wifiscan_topic.as_str(),
            config.service_events_topic.as_str(),
        ])?;
        Ok(Self { consumer })
    }

    /// Drain the topic stream until `shutdown` fires, pushing parsed
    /// [`IngestRecord`]s onto `tx`. A malformed record is logged and
    /// dropped per-record (§7) — it never stops the loop.
    pub async fn run(self, tx: Sender<IngestRecord>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("kafka ingest observed shutdown signal, exiting");
                        return;
                    }
                }
                msg = self.consumer.recv() => {
                    match msg {
                        Ok(borrowed) => {
                            let topic = borrowed.topic().to_string();
                            let payload = match borrowed.payload() {
                                Some(p) => p,
                                None => continue,
                            };
                            match serde_json::from_slice::<RawRecord>(payload) {
                                Ok(raw) => {
                                    let record = raw.into_ingest_record(&topic);
                                    if tx.send(record).await.is_err() {
                                        warn!("modeler ingest channel closed, stopping kafka consumer");
                                        return;
                                    }
                                }
                                Err(e) => {
                                    debug!(%topic, error = %e, "dropped malformed kafka record");
                                }
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "kafka poll error, retrying");
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawRecord {
    #[serde(rename = "serialNumber")]
    serial_number: String,
    #[serde(rename = "timestampMs")]
    timestamp_ms: i64,
    payload: serde_json::Value,
}

impl RawRecord {
    fn into_ingest_record(self, topic: &str) -> IngestRecord {
        IngestRecord {
            kind: crate::modeler::RecordKind::from_topic(topic),
            serial: self.serial_number,
            timestamp_ms: self.timestamp_ms,
            payload: self.payload,
        }
    }
}
