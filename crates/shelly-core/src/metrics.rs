// ── Prometheus metrics ──
//
// One `MetricsHub` per process. Probes push decoded payloads into it; the
// exporter binary renders it on `/metrics`. Every device series carries
// `host` and `mac`, component series add `id`. Energy totals are the
// device's own counters, which reset on reboot, so they are exported as
// gauges without the `_total` suffix.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use shelly_api::models::{
    CoverStatus, DeviceConfiguration, DeviceInfo, DeviceStatus, SwitchConfig, SwitchStatus,
    WifiStatus,
};

use tracing::debug;

use crate::error::CoreError;

const DEVICE: &[&str] = &["host", "mac"];
const COMPONENT: &[&str] = &["host", "mac", "id"];
const DEVICE_INFO: &[&str] = &[
    "host", "mac", "name", "model", "gen", "fw_id", "ver", "app", "profile",
];
const WIFI_INFO: &[&str] = &["host", "mac", "ssid", "sta_ip"];

fn gauge(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec, CoreError> {
    let vec = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, CoreError> {
    let vec = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn count(value: u64) -> f64 {
    value as f64
}

/// Set `vec[labels]` when the payload carried the value.
fn set_opt(vec: &GaugeVec, labels: &[&str], value: Option<f64>) {
    if let Some(v) = value {
        vec.with_label_values(labels).set(v);
    }
}

/// Info-style gauge holding one series per host, always 1.
///
/// Label values such as IP or firmware version change over a device's
/// lifetime; the previous series is dropped so only the current one exists.
struct InfoGauge {
    vec: GaugeVec,
    current: Mutex<HashMap<String, Vec<String>>>,
}

impl InfoGauge {
    fn new(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<Self, CoreError> {
        Ok(Self {
            vec: gauge(registry, name, help, labels)?,
            current: Mutex::new(HashMap::new()),
        })
    }

    fn set(&self, host: &str, labels: &[&str]) {
        let next: Vec<String> = labels.iter().map(|l| (*l).to_owned()).collect();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.get(host).filter(|p| **p != next) {
            let previous: Vec<&str> = previous.iter().map(String::as_str).collect();
            if let Err(e) = self.vec.remove_label_values(&previous) {
                debug!(host, error = %e, "stale info series already gone");
            }
        }
        self.vec.with_label_values(labels).set(1.0);
        current.insert(host.to_owned(), next);
    }
}

struct DeviceGauges {
    info: InfoGauge,
    auth_enabled: GaugeVec,
}

struct SysGauges {
    uptime: GaugeVec,
    ram_size: GaugeVec,
    ram_free: GaugeVec,
    fs_size: GaugeVec,
    fs_free: GaugeVec,
    restart_required: GaugeVec,
    update_available: GaugeVec,
    cloud_connected: GaugeVec,
    mqtt_connected: GaugeVec,
}

struct ConfigGauges {
    eco_mode: GaugeVec,
    discoverable: GaugeVec,
    cloud_enabled: GaugeVec,
    mqtt_enabled: GaugeVec,
    ble_enabled: GaugeVec,
}

struct SwitchGauges {
    output: GaugeVec,
    power: GaugeVec,
    voltage: GaugeVec,
    current: GaugeVec,
    frequency: GaugeVec,
    energy: GaugeVec,
    temperature: GaugeVec,
    auto_on: GaugeVec,
    auto_on_delay: GaugeVec,
    auto_off: GaugeVec,
    auto_off_delay: GaugeVec,
    power_limit: GaugeVec,
    voltage_limit: GaugeVec,
    current_limit: GaugeVec,
}

struct CoverGauges {
    position: GaugeVec,
    moving: GaugeVec,
    calibrated: GaugeVec,
    power: GaugeVec,
    voltage: GaugeVec,
    current: GaugeVec,
    power_factor: GaugeVec,
    energy: GaugeVec,
    temperature: GaugeVec,
}

struct WifiGauges {
    connected: GaugeVec,
    rssi: GaugeVec,
    info: InfoGauge,
}

struct ExporterMetrics {
    refreshes: IntCounterVec,
    refresh_errors: IntCounterVec,
    last_refresh: GaugeVec,
    devices_registered: IntGauge,
}

/// Process-wide metric registry with typed update helpers.
pub struct MetricsHub {
    registry: Registry,
    device: DeviceGauges,
    sys: SysGauges,
    config: ConfigGauges,
    switch: SwitchGauges,
    cover: CoverGauges,
    wifi: WifiGauges,
    exporter: ExporterMetrics,
}

impl MetricsHub {
    #[allow(clippy::too_many_lines)]
    pub fn new() -> Result<Self, CoreError> {
        let r = Registry::new();

        let device = DeviceGauges {
            info: InfoGauge::new(&r, "shelly_device_info", "Device identity, always 1", DEVICE_INFO)?,
            auth_enabled: gauge(&r, "shelly_device_auth_enabled", "Whether device authentication is enabled", DEVICE)?,
        };

        let sys = SysGauges {
            uptime: gauge(&r, "shelly_sys_uptime_seconds", "Seconds since last device boot", DEVICE)?,
            ram_size: gauge(&r, "shelly_sys_ram_size_bytes", "Total RAM", DEVICE)?,
            ram_free: gauge(&r, "shelly_sys_ram_free_bytes", "Free RAM", DEVICE)?,
            fs_size: gauge(&r, "shelly_sys_fs_size_bytes", "Total filesystem size", DEVICE)?,
            fs_free: gauge(&r, "shelly_sys_fs_free_bytes", "Free filesystem space", DEVICE)?,
            restart_required: gauge(&r, "shelly_sys_restart_required", "Whether a restart is pending to apply configuration", DEVICE)?,
            update_available: gauge(&r, "shelly_sys_update_available", "Whether a firmware update is offered", DEVICE)?,
            cloud_connected: gauge(&r, "shelly_cloud_connected", "Whether the device is connected to Shelly Cloud", DEVICE)?,
            mqtt_connected: gauge(&r, "shelly_mqtt_connected", "Whether the device is connected to its MQTT broker", DEVICE)?,
        };

        let config = ConfigGauges {
            eco_mode: gauge(&r, "shelly_config_eco_mode_enabled", "Whether eco mode is enabled", DEVICE)?,
            discoverable: gauge(&r, "shelly_config_discoverable", "Whether the device is discoverable", DEVICE)?,
            cloud_enabled: gauge(&r, "shelly_config_cloud_enabled", "Whether the cloud connection is enabled", DEVICE)?,
            mqtt_enabled: gauge(&r, "shelly_config_mqtt_enabled", "Whether MQTT is enabled", DEVICE)?,
            ble_enabled: gauge(&r, "shelly_config_ble_enabled", "Whether Bluetooth is enabled", DEVICE)?,
        };

        let switch = SwitchGauges {
            output: gauge(&r, "shelly_switch_output", "Switch output state (1 = on)", COMPONENT)?,
            power: gauge(&r, "shelly_switch_power_watts", "Active power drawn through the switch", COMPONENT)?,
            voltage: gauge(&r, "shelly_switch_voltage_volts", "Supply voltage", COMPONENT)?,
            current: gauge(&r, "shelly_switch_current_amperes", "Current through the switch", COMPONENT)?,
            frequency: gauge(&r, "shelly_switch_frequency_hertz", "Network frequency", COMPONENT)?,
            energy: gauge(&r, "shelly_switch_energy_watt_hours", "Active energy consumed since device boot", COMPONENT)?,
            temperature: gauge(&r, "shelly_switch_temperature_celsius", "Switch internal temperature", COMPONENT)?,
            auto_on: gauge(&r, "shelly_switch_auto_on_enabled", "Whether auto-on is configured", COMPONENT)?,
            auto_on_delay: gauge(&r, "shelly_switch_auto_on_delay_seconds", "Auto-on delay", COMPONENT)?,
            auto_off: gauge(&r, "shelly_switch_auto_off_enabled", "Whether auto-off is configured", COMPONENT)?,
            auto_off_delay: gauge(&r, "shelly_switch_auto_off_delay_seconds", "Auto-off delay", COMPONENT)?,
            power_limit: gauge(&r, "shelly_switch_power_limit_watts", "Configured overpower limit", COMPONENT)?,
            voltage_limit: gauge(&r, "shelly_switch_voltage_limit_volts", "Configured overvoltage limit", COMPONENT)?,
            current_limit: gauge(&r, "shelly_switch_current_limit_amperes", "Configured overcurrent limit", COMPONENT)?,
        };

        let cover = CoverGauges {
            position: gauge(&r, "shelly_cover_position_percent", "Cover position, 0 closed to 100 open", COMPONENT)?,
            moving: gauge(&r, "shelly_cover_moving", "Whether the cover is currently moving", COMPONENT)?,
            calibrated: gauge(&r, "shelly_cover_calibrated", "Whether position control is available", COMPONENT)?,
            power: gauge(&r, "shelly_cover_power_watts", "Active power drawn by the motor", COMPONENT)?,
            voltage: gauge(&r, "shelly_cover_voltage_volts", "Supply voltage", COMPONENT)?,
            current: gauge(&r, "shelly_cover_current_amperes", "Motor current", COMPONENT)?,
            power_factor: gauge(&r, "shelly_cover_power_factor", "Power factor", COMPONENT)?,
            energy: gauge(&r, "shelly_cover_energy_watt_hours", "Active energy consumed since device boot", COMPONENT)?,
            temperature: gauge(&r, "shelly_cover_temperature_celsius", "Cover internal temperature", COMPONENT)?,
        };

        let wifi = WifiGauges {
            connected: gauge(&r, "shelly_wifi_connected", "Whether the WiFi station is connected", DEVICE)?,
            rssi: gauge(&r, "shelly_wifi_rssi_dbm", "WiFi signal strength", DEVICE)?,
            info: InfoGauge::new(&r, "shelly_wifi_info", "WiFi station details, always 1", WIFI_INFO)?,
        };

        let devices_registered = IntGauge::new(
            "shelly_exporter_devices_registered",
            "Devices currently monitored",
        )?;
        r.register(Box::new(devices_registered.clone()))?;
        let exporter = ExporterMetrics {
            refreshes: counter(&r, "shelly_exporter_refresh_total", "Completed refresh ticks", &["host"])?,
            refresh_errors: counter(&r, "shelly_exporter_refresh_errors_total", "Refresh ticks aborted by an error", &["host"])?,
            last_refresh: gauge(&r, "shelly_exporter_last_refresh_timestamp_seconds", "Unix time of the last successful refresh", &["host"])?,
            devices_registered,
        };

        Ok(Self {
            registry: r,
            device,
            sys,
            config,
            switch,
            cover,
            wifi,
            exporter,
        })
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, CoreError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| CoreError::Config {
            message: format!("metrics output is not UTF-8: {e}"),
        })
    }

    /// Content type to serve `encode_text` output with.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_owned()
    }

    // ── Device-level payloads ────────────────────────────────────────

    pub fn observe_device_info(&self, host: &str, info: &DeviceInfo) {
        let generation = info.generation.to_string();
        self.device.info.set(
            host,
            &[
                host,
                &info.mac,
                info.name.as_deref().unwrap_or(""),
                &info.model,
                &generation,
                &info.fw_id,
                &info.ver,
                &info.app,
                info.profile.as_deref().unwrap_or(""),
            ],
        );
        self.device
            .auth_enabled
            .with_label_values(&[host, &info.mac])
            .set(flag(info.auth_en));
    }

    pub fn observe_status(&self, host: &str, mac: &str, status: &DeviceStatus) {
        let labels = [host, mac];
        if let Some(sys) = &status.sys {
            set_opt(&self.sys.uptime, &labels, sys.uptime.map(count));
            set_opt(&self.sys.ram_size, &labels, sys.ram_size.map(count));
            set_opt(&self.sys.ram_free, &labels, sys.ram_free.map(count));
            set_opt(&self.sys.fs_size, &labels, sys.fs_size.map(count));
            set_opt(&self.sys.fs_free, &labels, sys.fs_free.map(count));
            self.sys
                .restart_required
                .with_label_values(&labels)
                .set(flag(sys.restart_required));
            self.sys
                .update_available
                .with_label_values(&labels)
                .set(flag(!sys.available_updates.is_empty()));
        }
        if let Some(cloud) = status.cloud {
            self.sys
                .cloud_connected
                .with_label_values(&labels)
                .set(flag(cloud.connected));
        }
        if let Some(mqtt) = status.mqtt {
            self.sys
                .mqtt_connected
                .with_label_values(&labels)
                .set(flag(mqtt.connected));
        }
    }

    pub fn observe_config(&self, host: &str, mac: &str, config: &DeviceConfiguration) {
        let labels = [host, mac];
        if let Some(device) = config.sys.as_ref().and_then(|s| s.device.as_ref()) {
            self.config
                .eco_mode
                .with_label_values(&labels)
                .set(flag(device.eco_mode));
            self.config
                .discoverable
                .with_label_values(&labels)
                .set(flag(device.discoverable));
        }
        let enabled = [
            (&self.config.cloud_enabled, config.cloud),
            (&self.config.mqtt_enabled, config.mqtt),
            (&self.config.ble_enabled, config.ble),
        ];
        for (vec, section) in enabled {
            if let Some(section) = section {
                vec.with_label_values(&labels).set(flag(section.enable));
            }
        }
    }

    // ── Component payloads ───────────────────────────────────────────

    pub fn observe_switch_status(&self, host: &str, mac: &str, status: &SwitchStatus) {
        let id = status.id.to_string();
        let labels = [host, mac, id.as_str()];
        let s = &self.switch;
        s.output.with_label_values(&labels).set(flag(status.output));
        set_opt(&s.power, &labels, status.apower);
        set_opt(&s.voltage, &labels, status.voltage);
        set_opt(&s.current, &labels, status.current);
        set_opt(&s.frequency, &labels, status.freq);
        set_opt(&s.energy, &labels, status.aenergy.as_ref().map(|e| e.total));
        set_opt(
            &s.temperature,
            &labels,
            status.temperature.and_then(|t| t.celsius),
        );
    }

    pub fn observe_switch_config(&self, host: &str, mac: &str, config: &SwitchConfig) {
        let id = config.id.to_string();
        let labels = [host, mac, id.as_str()];
        let s = &self.switch;
        s.auto_on.with_label_values(&labels).set(flag(config.auto_on));
        s.auto_on_delay
            .with_label_values(&labels)
            .set(config.auto_on_delay);
        s.auto_off.with_label_values(&labels).set(flag(config.auto_off));
        s.auto_off_delay
            .with_label_values(&labels)
            .set(config.auto_off_delay);
        set_opt(&s.power_limit, &labels, config.power_limit);
        set_opt(&s.voltage_limit, &labels, config.voltage_limit);
        set_opt(&s.current_limit, &labels, config.current_limit);
    }

    pub fn observe_cover_status(&self, host: &str, mac: &str, status: &CoverStatus) {
        let id = status.id.to_string();
        let labels = [host, mac, id.as_str()];
        let c = &self.cover;
        set_opt(&c.position, &labels, status.current_pos);
        c.moving
            .with_label_values(&labels)
            .set(flag(status.state.is_moving()));
        c.calibrated
            .with_label_values(&labels)
            .set(flag(status.pos_control));
        set_opt(&c.power, &labels, status.apower);
        set_opt(&c.voltage, &labels, status.voltage);
        set_opt(&c.current, &labels, status.current);
        set_opt(&c.power_factor, &labels, status.pf);
        set_opt(&c.energy, &labels, status.aenergy.as_ref().map(|e| e.total));
        set_opt(
            &c.temperature,
            &labels,
            status.temperature.and_then(|t| t.celsius),
        );
    }

    pub fn observe_wifi_status(&self, host: &str, mac: &str, wifi: &WifiStatus) {
        let labels = [host, mac];
        self.wifi
            .connected
            .with_label_values(&labels)
            .set(flag(wifi.is_connected()));
        set_opt(&self.wifi.rssi, &labels, wifi.rssi);
        self.wifi.info.set(
            host,
            &[
                host,
                mac,
                wifi.ssid.as_deref().unwrap_or(""),
                wifi.sta_ip.as_deref().unwrap_or(""),
            ],
        );
    }

    // ── Exporter self-metrics ────────────────────────────────────────

    /// Count one finished tick for `host`.
    pub fn record_refresh(&self, host: &str, succeeded: bool) {
        self.exporter.refreshes.with_label_values(&[host]).inc();
        if succeeded {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            let now = Utc::now().timestamp_millis() as f64 / 1000.0;
            self.exporter.last_refresh.with_label_values(&[host]).set(now);
        } else {
            self.exporter.refresh_errors.with_label_values(&[host]).inc();
        }
    }

    pub fn set_devices_registered(&self, count: usize) {
        self.exporter
            .devices_registered
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}
