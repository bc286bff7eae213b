// ── Update pipeline ──
//
// A `DeviceProbe` performs the individual fetch-and-publish steps for one
// device; `run_pipeline` strings them together in a fixed order for each
// tick. The registry only ever talks to devices through these traits.

use std::future::Future;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::debug;

use shelly_api::{RpcClient, TransportConfig};

use crate::device::{DeviceConfig, DeviceIdentity};
use crate::error::CoreError;
use crate::metrics::MetricsHub;

/// Per-device fetch-and-publish operations.
///
/// Each step receives the device as registered so implementations can
/// label what they publish.
pub trait DeviceProbe: Send + Sync + 'static {
    /// Fetch device identity, publishing info metrics on the way.
    fn update_device_info(
        &self,
        device: &DeviceConfig,
    ) -> impl Future<Output = Result<DeviceIdentity, CoreError>> + Send;

    /// Top-level keys of the aggregate status payload.
    fn status_keys(&self) -> impl Future<Output = Result<Vec<String>, CoreError>> + Send;

    fn update_status(
        &self,
        device: &DeviceConfig,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn update_config(
        &self,
        device: &DeviceConfig,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn update_switch_status(
        &self,
        device: &DeviceConfig,
        id: u32,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn update_switch_config(
        &self,
        device: &DeviceConfig,
        id: u32,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn update_cover_status(
        &self,
        device: &DeviceConfig,
        id: u32,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn update_wifi_status(
        &self,
        device: &DeviceConfig,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Builds one probe per registered device.
pub trait DeviceConnector: Send + Sync + 'static {
    type Probe: DeviceProbe;

    /// Prepare a probe for `device`. Must not perform network I/O.
    fn connect(&self, device: &DeviceConfig) -> Result<Self::Probe, CoreError>;
}

/// Run one tick: every step in order, stopping at the first failure.
pub async fn run_pipeline<P: DeviceProbe>(probe: &P, device: &DeviceConfig) -> Result<(), CoreError> {
    debug!(host = %device.host, device_type = %device.device_type, "fetching and updating metrics");

    probe
        .update_device_info(device)
        .await
        .map_err(|e| e.in_step("device info update"))?;
    probe
        .update_status(device)
        .await
        .map_err(|e| e.in_step("status update"))?;
    probe
        .update_config(device)
        .await
        .map_err(|e| e.in_step("config update"))?;

    for &id in &device.switch_ids {
        probe
            .update_switch_status(device, id)
            .await
            .map_err(|e| e.in_step(format!("switch {id} status update")))?;
        probe
            .update_switch_config(device, id)
            .await
            .map_err(|e| e.in_step(format!("switch {id} config update")))?;
    }

    for &id in &device.cover_ids {
        probe
            .update_cover_status(device, id)
            .await
            .map_err(|e| e.in_step(format!("cover {id} status update")))?;
    }

    probe
        .update_wifi_status(device)
        .await
        .map_err(|e| e.in_step("wifi update"))?;

    debug!(host = %device.host, "successfully updated metrics");
    Ok(())
}

// ── Shelly implementation ────────────────────────────────────────────

/// Probe backed by a device's RPC interface, publishing into a `MetricsHub`.
pub struct ShellyProbe {
    client: RpcClient,
    metrics: Arc<MetricsHub>,
}

impl ShellyProbe {
    pub fn new(client: RpcClient, metrics: Arc<MetricsHub>) -> Self {
        Self { client, metrics }
    }
}

impl DeviceProbe for ShellyProbe {
    async fn update_device_info(&self, device: &DeviceConfig) -> Result<DeviceIdentity, CoreError> {
        let info = self.client.get_device_info().await?;
        self.metrics.observe_device_info(&device.host, &info);
        Ok(DeviceIdentity {
            device_type: info.app,
            mac: info.mac,
            profile: info.profile.unwrap_or_default(),
        })
    }

    async fn status_keys(&self) -> Result<Vec<String>, CoreError> {
        let raw = self.client.get_status_raw().await?;
        Ok(raw.into_iter().map(|(key, _)| key).collect())
    }

    async fn update_status(&self, device: &DeviceConfig) -> Result<(), CoreError> {
        let status = self.client.get_status().await?;
        self.metrics
            .observe_status(&device.host, &device.mac, &status);
        Ok(())
    }

    async fn update_config(&self, device: &DeviceConfig) -> Result<(), CoreError> {
        let config = self.client.get_config().await?;
        self.metrics
            .observe_config(&device.host, &device.mac, &config);
        Ok(())
    }

    async fn update_switch_status(&self, device: &DeviceConfig, id: u32) -> Result<(), CoreError> {
        let status = self.client.get_switch_status(id).await?;
        self.metrics
            .observe_switch_status(&device.host, &device.mac, &status);
        Ok(())
    }

    async fn update_switch_config(&self, device: &DeviceConfig, id: u32) -> Result<(), CoreError> {
        let config = self.client.get_switch_config(id).await?;
        self.metrics
            .observe_switch_config(&device.host, &device.mac, &config);
        Ok(())
    }

    async fn update_cover_status(&self, device: &DeviceConfig, id: u32) -> Result<(), CoreError> {
        let status = self.client.get_cover_status(id).await?;
        self.metrics
            .observe_cover_status(&device.host, &device.mac, &status);
        Ok(())
    }

    async fn update_wifi_status(&self, device: &DeviceConfig) -> Result<(), CoreError> {
        let wifi = self.client.get_wifi_status().await?;
        self.metrics
            .observe_wifi_status(&device.host, &device.mac, &wifi);
        Ok(())
    }
}

/// Builds a `ShellyProbe` with its own HTTP client for each device.
pub struct ShellyConnector {
    transport: TransportConfig,
    metrics: Arc<MetricsHub>,
}

impl ShellyConnector {
    pub fn new(transport: TransportConfig, metrics: Arc<MetricsHub>) -> Self {
        Self { transport, metrics }
    }
}

impl DeviceConnector for ShellyConnector {
    type Probe = ShellyProbe;

    fn connect(&self, device: &DeviceConfig) -> Result<ShellyProbe, CoreError> {
        let mut client = RpcClient::new(&device.host, &self.transport)?;
        if let Some(username) = &device.username {
            let password = device
                .password
                .clone()
                .unwrap_or_else(|| SecretString::from(String::new()));
            client = client.with_credentials(username.clone(), password);
        }
        Ok(ShellyProbe::new(client, Arc::clone(&self.metrics)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount(server: &MockServer, rpc: &str, id: Option<&str>, body: serde_json::Value) {
        let mut mock = Mock::given(method("GET")).and(path(format!("/rpc/{rpc}")));
        if let Some(id) = id {
            mock = mock.and(query_param("id", id));
        }
        mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn probe_for(server: &MockServer) -> (ShellyProbe, Arc<MetricsHub>, DeviceConfig) {
        let metrics = Arc::new(MetricsHub::new().unwrap());
        let connector = ShellyConnector::new(TransportConfig::default(), Arc::clone(&metrics));
        let device = DeviceConfig::new(server.uri());
        let probe = connector.connect(&device).unwrap();
        (probe, metrics, device)
    }

    #[tokio::test]
    async fn full_tick_against_a_plus_2pm() {
        let server = MockServer::start().await;
        mount(&server, "Shelly.GetDeviceInfo", None, json!({
            "id": "shellyplus2pm-1", "mac": "A8032ABE54DC", "model": "SNSW-102P16EU",
            "gen": 2, "app": "Plus2PM", "ver": "1.0.8", "profile": "switch"
        }))
        .await;
        mount(&server, "Shelly.GetStatus", None, json!({
            "sys": { "uptime": 99 }, "wifi": {}, "switch:0": {}, "switch:1": {}
        }))
        .await;
        mount(&server, "Shelly.GetConfig", None, json!({
            "sys": { "device": { "eco_mode": true } }, "ble": { "enable": false }
        }))
        .await;
        for id in ["0", "1"] {
            mount(&server, "Switch.GetStatus", Some(id), json!({ "id": id.parse::<u32>().unwrap(), "output": true })).await;
            mount(&server, "Switch.GetConfig", Some(id), json!({ "id": id.parse::<u32>().unwrap(), "auto_off": true, "auto_off_delay": 60.0 })).await;
        }
        mount(&server, "WiFi.GetStatus", None, json!({ "status": "got ip", "rssi": -61, "ssid": "iot" })).await;

        let (probe, metrics, mut device) = probe_for(&server);
        let identity = probe.update_device_info(&device).await.unwrap();
        device.apply_identity(identity);
        let components = crate::discovery::discover_components(&probe).await.unwrap();
        device.switch_ids = components.switch_ids;

        assert_eq!(device.device_type, "Plus2PM");
        assert_eq!(device.profile, "switch");
        assert_eq!(device.switch_ids, vec![0, 1]);

        run_pipeline(&probe, &device).await.unwrap();

        let text = metrics.encode_text().unwrap();
        assert!(text.contains(r#"shelly_switch_auto_off_delay_seconds{"#));
        assert!(text.contains(r#"id="1",mac="A8032ABE54DC"} 1"#));
        assert!(text.contains(r#"shelly_config_eco_mode_enabled{"#));
        assert!(text.contains(r#"shelly_wifi_rssi_dbm{"#));
    }

    #[tokio::test]
    async fn failing_step_names_the_component() {
        let server = MockServer::start().await;
        mount(&server, "Shelly.GetDeviceInfo", None, json!({ "mac": "M" })).await;
        mount(&server, "Shelly.GetStatus", None, json!({})).await;
        mount(&server, "Shelly.GetConfig", None, json!({})).await;
        Mock::given(method("GET"))
            .and(path("/rpc/Cover.GetStatus"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "code": -105, "message": "Argument 'id', value 4 not found!"
            })))
            .mount(&server)
            .await;

        let (probe, _metrics, mut device) = probe_for(&server);
        device.cover_ids = vec![4];

        let err = run_pipeline(&probe, &device).await.unwrap_err();
        assert!(err.to_string().starts_with("cover 4 status update failed"), "got: {err}");
        assert!(matches!(err.root_cause(), CoreError::Api { .. }));
    }
}
