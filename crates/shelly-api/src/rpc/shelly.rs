// Device-level RPC methods
//
// Identity, aggregate status and aggregate configuration.

use tracing::debug;

use crate::error::Error;
use crate::rpc::client::RpcClient;
use crate::rpc::models::{DeviceConfiguration, DeviceInfo, DeviceStatus};

impl RpcClient {
    /// `GET /rpc/Shelly.GetDeviceInfo`
    pub async fn get_device_info(&self) -> Result<DeviceInfo, Error> {
        debug!("fetching device info");
        self.call("Shelly.GetDeviceInfo", None).await
    }

    /// `GET /rpc/Shelly.GetStatus`
    pub async fn get_status(&self) -> Result<DeviceStatus, Error> {
        debug!("fetching device status");
        self.call("Shelly.GetStatus", None).await
    }

    /// `GET /rpc/Shelly.GetStatus`, loosely typed.
    ///
    /// Used for component discovery, where only the top-level keys matter.
    pub async fn get_status_raw(&self) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
        debug!("fetching raw device status");
        self.call("Shelly.GetStatus", None).await
    }

    /// `GET /rpc/Shelly.GetConfig`
    pub async fn get_config(&self) -> Result<DeviceConfiguration, Error> {
        debug!("fetching device config");
        self.call("Shelly.GetConfig", None).await
    }
}
