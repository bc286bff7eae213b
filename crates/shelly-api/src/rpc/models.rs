// RPC response types
//
// Models for the Shelly Gen2+ RPC methods the exporter reads. Field sets
// differ between device families and firmware versions, so almost every
// field is optional or defaulted.

use serde::{Deserialize, Serialize};

// ── Shelly.GetDeviceInfo ─────────────────────────────────────────────

/// Identity of a device, from `Shelly.GetDeviceInfo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub model: String,
    /// API generation (2, 3, ...).
    #[serde(default, rename = "gen")]
    pub generation: u32,
    #[serde(default)]
    pub fw_id: String,
    #[serde(default)]
    pub ver: String,
    /// Application name, e.g. `Plus1PM`. Used as the device type.
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub auth_en: bool,
    #[serde(default)]
    pub auth_domain: Option<String>,
    /// Only present on multi-profile devices (`switch` / `cover`).
    #[serde(default)]
    pub profile: Option<String>,
}

// ── Shelly.GetStatus ─────────────────────────────────────────────────

/// Aggregate device status from `Shelly.GetStatus`.
///
/// Component entries (`switch:0`, `cover:1`, `input:0`, ...) land in
/// `components`; the registry uses their keys for discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(default)]
    pub sys: Option<SysStatus>,
    #[serde(default)]
    pub cloud: Option<ConnectionStatus>,
    #[serde(default)]
    pub mqtt: Option<ConnectionStatus>,
    #[serde(flatten)]
    pub components: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SysStatus {
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub restart_required: bool,
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub ram_size: Option<u64>,
    #[serde(default)]
    pub ram_free: Option<u64>,
    #[serde(default)]
    pub fs_size: Option<u64>,
    #[serde(default)]
    pub fs_free: Option<u64>,
    /// Keyed by channel (`stable`, `beta`); empty when up to date.
    #[serde(default)]
    pub available_updates: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    #[serde(default)]
    pub connected: bool,
}

// ── Shelly.GetConfig ─────────────────────────────────────────────────

/// Aggregate device configuration from `Shelly.GetConfig`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    #[serde(default)]
    pub sys: Option<SysConfig>,
    #[serde(default)]
    pub cloud: Option<EnableConfig>,
    #[serde(default)]
    pub mqtt: Option<EnableConfig>,
    #[serde(default)]
    pub ble: Option<EnableConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SysConfig {
    #[serde(default)]
    pub device: Option<SysDeviceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SysDeviceConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub eco_mode: bool,
    #[serde(default)]
    pub discoverable: bool,
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EnableConfig {
    #[serde(default)]
    pub enable: bool,
}

// ── Shared component fields ──────────────────────────────────────────

/// Active energy counter (`aenergy`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnergyCounter {
    /// Watt-hours since the counter was last reset.
    #[serde(default)]
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Temperature {
    #[serde(default, rename = "tC")]
    pub celsius: Option<f64>,
    #[serde(default, rename = "tF")]
    pub fahrenheit: Option<f64>,
}

// ── Switch ───────────────────────────────────────────────────────────

/// `Switch.GetStatus?id=N`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchStatus {
    pub id: u32,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub output: bool,
    #[serde(default)]
    pub apower: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub freq: Option<f64>,
    #[serde(default)]
    pub aenergy: Option<EnergyCounter>,
    #[serde(default)]
    pub temperature: Option<Temperature>,
}

/// `Switch.GetConfig?id=N`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub initial_state: Option<String>,
    #[serde(default)]
    pub auto_on: bool,
    #[serde(default)]
    pub auto_on_delay: f64,
    #[serde(default)]
    pub auto_off: bool,
    #[serde(default)]
    pub auto_off_delay: f64,
    #[serde(default)]
    pub power_limit: Option<f64>,
    #[serde(default)]
    pub voltage_limit: Option<f64>,
    #[serde(default)]
    pub current_limit: Option<f64>,
}

// ── Cover ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverState {
    Open,
    Closed,
    Opening,
    Closing,
    Stopped,
    Calibrating,
    #[default]
    #[serde(other)]
    Unknown,
}

impl CoverState {
    pub fn is_moving(self) -> bool {
        matches!(self, Self::Opening | Self::Closing | Self::Calibrating)
    }
}

/// `Cover.GetStatus?id=N`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverStatus {
    pub id: u32,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub state: CoverState,
    #[serde(default)]
    pub apower: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub pf: Option<f64>,
    #[serde(default)]
    pub freq: Option<f64>,
    #[serde(default)]
    pub aenergy: Option<EnergyCounter>,
    #[serde(default)]
    pub temperature: Option<Temperature>,
    /// Whether the cover is calibrated and supports positioning.
    #[serde(default)]
    pub pos_control: bool,
    /// 0 (closed) .. 100 (open); absent until calibrated.
    #[serde(default)]
    pub current_pos: Option<f64>,
    #[serde(default)]
    pub target_pos: Option<f64>,
}

// ── WiFi ─────────────────────────────────────────────────────────────

/// `WiFi.GetStatus`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WifiStatus {
    #[serde(default)]
    pub sta_ip: Option<String>,
    /// `disconnected`, `connecting`, `connected` or `got ip`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub rssi: Option<f64>,
}

impl WifiStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self.status.as_str(), "connected" | "got ip")
    }
}
