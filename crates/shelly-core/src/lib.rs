//! Device registry, polling scheduler and metric mapping for `shelly-exporter`.
//!
//! - **[`DeviceRegistry`]**: Owns the set of monitored devices. Registering
//!   a device runs discovery once, then spawns a periodic refresh task for
//!   it; deregistering cancels that task. Safe to share across tasks.
//!
//! - **[`DeviceProbe`] / [`DeviceConnector`]**: The seam between the
//!   scheduler and the device. [`ShellyConnector`] builds probes backed by
//!   the device RPC interface; tests substitute fakes.
//!
//! - **[`run_pipeline`]**: One refresh tick: device info, status, config,
//!   each switch, each cover, then Wi-Fi, stopping at the first failure.
//!
//! - **[`MetricsHub`]**: Prometheus registry holding every exported gauge
//!   and counter, rendered in text exposition format.

pub mod device;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod registry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use device::{DeviceConfig, DeviceIdentity};
pub use discovery::{ComponentKind, Components, discover, discover_components};
pub use error::CoreError;
pub use metrics::MetricsHub;
pub use probe::{DeviceConnector, DeviceProbe, ShellyConnector, ShellyProbe, run_pipeline};
pub use registry::{DeviceRegistry, Registration};
