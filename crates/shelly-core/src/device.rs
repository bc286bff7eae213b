// ── Device configuration ──
//
// One entry per monitored device. The operator supplies host and
// credentials; the registry fills in identity and components once, at
// registration, and never changes them afterwards.

use secrecy::SecretString;

/// A statically configured device plus what registration learned about it.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Network address; unique key within the registry.
    pub host: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Application name reported by the device (e.g. `Plus1PM`).
    pub device_type: String,
    pub mac: String,
    /// Active profile on multi-profile devices, otherwise empty.
    pub profile: String,
    /// Ascending, duplicate-free switch component ids.
    pub switch_ids: Vec<u32>,
    /// Ascending, duplicate-free cover component ids.
    pub cover_ids: Vec<u32>,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.username = Some(username.into());
        self.password = Some(password);
        self
    }

    pub(crate) fn apply_identity(&mut self, identity: DeviceIdentity) {
        self.device_type = identity.device_type;
        self.mac = identity.mac;
        self.profile = identity.profile;
    }
}

/// Capability metadata read from the device-info endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_type: String,
    pub mac: String,
    pub profile: String,
}
