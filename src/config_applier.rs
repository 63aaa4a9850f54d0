//! Translates computed action maps into device-gateway configuration
//! requests (§4.7). One device's failure never aborts the batch.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::algorithms::ActionMap;
use crate::gateway::GatewayClient;
use crate::modeler::Modeler;

pub struct ConfigApplier {
    gateway: Arc<dyn GatewayClient>,
    modeler: Modeler,
}

impl ConfigApplier {
    pub fn new(gateway: Arc<dyn GatewayClient>, modeler: Modeler) -> Self {
        Self { gateway, modeler }
    }

    pub async fn apply(&self, action_map: &ActionMap) {
        match action_map {
            ActionMap::Tpc(map) => {
                for (serial, by_band) in map {
                    for (band, tx_power) in by_band {
                        self.apply_band_field(serial, band, "tx-power", Value::from(*tx_power))
                            .await;
                    }
                }
            }
            ActionMap::Channel(map) => {
                for (serial, by_band) in map {
                    for (band, channel) in by_band {
                        self.apply_band_field(serial, band, "channel", Value::from(*channel))
                            .await;
                    }
                }
            }
            ActionMap::ClientSteering(map) => {
                for (serial, by_client) in map {
                    for (client_mac, action) in by_client {
                        let action_name = match action {
                            crate::algorithms::SteeringAction::Deauthenticate => "deauthenticate",
                            crate::algorithms::SteeringAction::SteerUp => "steer_up",
                            crate::algorithms::SteeringAction::SteerDown => "steer_down",
                        };
                        if let Err(e) = self
                            .gateway
                            .client_action(serial, client_mac, action_name)
                            .await
                        {
                            warn!(serial, client_mac, error = %e, "client-steering RPC failed");
                        }
                    }
                }
            }
        }
    }

    /// Read the device's current configured radios from the ingested
    /// DataModel, mutate only the targeted band's field, and POST the
    /// result (§4.7). `device/{s}/capabilities` reports Capabilities.Phy,
    /// not configured radios, so this does not call the gateway.
    async fn apply_band_field(&self, serial: &str, band: &str, field: &str, value: Value) {
        let snapshot = self.modeler.data_model_copy();
        let Some(radios) = snapshot.status_radios_for(serial) else {
            warn!(serial, "no known configured radios yet, skipping device");
            return;
        };

        let mut payload_radios = Vec::new();
        for radio in radios {
            let mut radio_json = serde_json::to_value(radio).unwrap_or(Value::Null);
            if radio.band == band {
                if let Some(obj) = radio_json.as_object_mut() {
                    obj.insert(field.to_string(), value.clone());
                }
            }
            payload_radios.push(radio_json);
        }

        let payload = serde_json::json!({ "radios": payload_radios });
        if let Err(e) = self.gateway.configure(serial, payload).await {
            warn!(serial, error = %e, "configure RPC failed, device skipped");
        }
    }
}
