// Component RPC methods
//
// Per-component status and configuration for switches and covers, plus
// the WiFi station status.

use tracing::debug;

use crate::error::Error;
use crate::rpc::client::RpcClient;
use crate::rpc::models::{CoverStatus, SwitchConfig, SwitchStatus, WifiStatus};

impl RpcClient {
    /// `GET /rpc/Switch.GetStatus?id={id}`
    pub async fn get_switch_status(&self, id: u32) -> Result<SwitchStatus, Error> {
        debug!(id, "fetching switch status");
        self.call("Switch.GetStatus", Some(id)).await
    }

    /// `GET /rpc/Switch.GetConfig?id={id}`
    pub async fn get_switch_config(&self, id: u32) -> Result<SwitchConfig, Error> {
        debug!(id, "fetching switch config");
        self.call("Switch.GetConfig", Some(id)).await
    }

    /// `GET /rpc/Cover.GetStatus?id={id}`
    pub async fn get_cover_status(&self, id: u32) -> Result<CoverStatus, Error> {
        debug!(id, "fetching cover status");
        self.call("Cover.GetStatus", Some(id)).await
    }

    /// `GET /rpc/WiFi.GetStatus`
    pub async fn get_wifi_status(&self) -> Result<WifiStatus, Error> {
        debug!("fetching wifi status");
        self.call("WiFi.GetStatus", None).await
    }
}
