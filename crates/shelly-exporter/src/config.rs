//! Exporter configuration: TOML file, `SHELLY_` environment and CLI flags.
//!
//! Layering is defaults → config file → environment → flags. The merged
//! [`Config`] is validated and resolved into [`Settings`], which is what
//! the server runs on.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use shelly_core::DeviceConfig;

use crate::cli::GlobalOpts;
use crate::error::ExporterError;

const REDACTED: &str = "********";
const DEFAULT_USERNAME: &str = "admin";

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Address of the metrics endpoint.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Seconds between refreshes of each device.
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            update_interval: default_update_interval(),
            timeout: default_timeout(),
            devices: Vec::new(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9123))
}
fn default_update_interval() -> u64 {
    30
}
fn default_timeout() -> u64 {
    10
}

/// One `[[devices]]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Plaintext password; prefer `password_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl DeviceEntry {
    fn from_host(host: String) -> Self {
        Self {
            host,
            username: None,
            password: None,
            password_env: None,
        }
    }

    /// Resolve the password: `password_env` first, then plaintext.
    fn resolve_password(&self) -> Result<Option<SecretString>, ExporterError> {
        if let Some(ref var) = self.password_env {
            return std::env::var(var)
                .map(|pw| Some(SecretString::from(pw)))
                .map_err(|_| ExporterError::MissingPasswordEnv {
                    host: self.host.clone(),
                    var: var.clone(),
                });
        }
        Ok(self.password.clone().map(SecretString::from))
    }

    /// A password without a username authenticates as `admin`, the only
    /// user Gen2+ devices have.
    fn to_device_config(&self) -> Result<DeviceConfig, ExporterError> {
        let device = DeviceConfig::new(self.host.clone());
        let device = match (self.username.as_deref(), self.resolve_password()?) {
            (Some(username), password) => device.with_credentials(
                username,
                password.unwrap_or_else(|| SecretString::from(String::new())),
            ),
            (None, Some(password)) => device.with_credentials(DEFAULT_USERNAME, password),
            (None, None) => device,
        };
        Ok(device)
    }
}

// ── Resolved settings ───────────────────────────────────────────────

/// Validated configuration the server runs on.
#[derive(Debug)]
pub struct Settings {
    pub listen: SocketAddr,
    pub update_interval: Duration,
    pub timeout: Duration,
    pub devices: Vec<DeviceConfig>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the default config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "shelly", "shelly-exporter").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("shelly-exporter");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the merged config for this invocation.
///
/// An explicit `--config` path must exist; the default path is optional.
pub fn load(global: &GlobalOpts) -> Result<(Config, PathBuf), ExporterError> {
    let path = match global.config {
        Some(ref path) => {
            if !path.is_file() {
                return Err(ExporterError::ConfigNotFound {
                    path: path.display().to_string(),
                });
            }
            path.clone()
        }
        None => config_path(),
    };

    let mut config = load_file(&path)?;
    config.apply_overrides(global);
    Ok((config, path))
}

/// Load config from `path` (skipped if missing) and the environment.
pub fn load_file(path: &Path) -> Result<Config, ExporterError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SHELLY_").only(&["listen", "update_interval", "timeout"]));

    Ok(figment.extract()?)
}

impl Config {
    /// Apply CLI flag overrides. `--device` hosts already in the file are
    /// not added twice.
    pub fn apply_overrides(&mut self, global: &GlobalOpts) {
        if let Some(listen) = global.listen {
            self.listen = listen;
        }
        if let Some(interval) = global.interval {
            self.update_interval = interval;
        }
        if let Some(timeout) = global.timeout {
            self.timeout = timeout;
        }
        for host in &global.devices {
            if self.devices.iter().any(|d| &d.host == host) {
                continue;
            }
            self.devices.push(DeviceEntry::from_host(host.clone()));
        }
    }

    /// Validate and resolve credentials. `path` is only used in messages.
    pub fn resolve(&self, path: &Path) -> Result<Settings, ExporterError> {
        if self.update_interval == 0 {
            return Err(ExporterError::Validation {
                field: "update_interval".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.timeout == 0 {
            return Err(ExporterError::Validation {
                field: "timeout".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.devices.is_empty() {
            return Err(ExporterError::NoDevices {
                path: path.display().to_string(),
            });
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.host.trim().is_empty() {
                return Err(ExporterError::Validation {
                    field: "devices.host".into(),
                    reason: "must not be empty".into(),
                });
            }
            if !seen.insert(device.host.as_str()) {
                return Err(ExporterError::Validation {
                    field: "devices.host".into(),
                    reason: format!("'{}' is listed more than once", device.host),
                });
            }
        }

        let devices = self
            .devices
            .iter()
            .map(DeviceEntry::to_device_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Settings {
            listen: self.listen,
            update_interval: Duration::from_secs(self.update_interval),
            timeout: Duration::from_secs(self.timeout),
            devices,
        })
    }

    /// Copy of this config with every plaintext password masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for device in &mut config.devices {
            if device.password.is_some() {
                device.password = Some(REDACTED.into());
            }
        }
        config
    }

    /// Render as TOML with passwords masked.
    pub fn render(&self) -> Result<String, ExporterError> {
        Ok(toml::to_string_pretty(&self.redacted())?)
    }
}
