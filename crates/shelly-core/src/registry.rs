// ── Device registry ──
//
// Owns the set of monitored devices and one polling task per device.
// The host → cancellation token map is the only shared mutable state; its
// mutex is held for map mutations only, never across device I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::device::DeviceConfig;
use crate::discovery::discover_components;
use crate::error::CoreError;
use crate::metrics::MetricsHub;
use crate::probe::{DeviceConnector, DeviceProbe, run_pipeline};

/// Outcome of [`DeviceRegistry::register`].
#[derive(Debug, Clone)]
pub enum Registration {
    /// Polling started; carries the device as discovered.
    Started(DeviceConfig),
    /// The host was already registered; nothing changed.
    AlreadyRegistered,
}

/// Registry of monitored devices.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct DeviceRegistry<C: DeviceConnector> {
    connector: C,
    metrics: Arc<MetricsHub>,
    devices: Mutex<HashMap<String, CancellationToken>>,
    tracker: TaskTracker,
}

impl<C: DeviceConnector> DeviceRegistry<C> {
    pub fn new(connector: C, metrics: Arc<MetricsHub>) -> Self {
        Self {
            connector,
            metrics,
            devices: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Start monitoring `device`, refreshing every `interval`.
    ///
    /// Discovery runs once, here, before the polling task starts. Its
    /// failures are logged and the device is polled anyway with whatever
    /// was learned. A host that is already registered is left alone.
    pub async fn register(
        &self,
        mut device: DeviceConfig,
        interval: Duration,
    ) -> Result<Registration, CoreError> {
        if interval.is_zero() {
            return Err(CoreError::Validation {
                field: "update interval".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let probe = self.connector.connect(&device)?;

        // Reserve the host before discovery so a concurrent registration
        // of the same host cannot start a second poller.
        let cancel = {
            let mut devices = self.devices.lock().await;
            if devices.contains_key(&device.host) {
                warn!(host = %device.host, "device already registered");
                return Ok(Registration::AlreadyRegistered);
            }
            info!(host = %device.host, "registering new device");
            let token = CancellationToken::new();
            devices.insert(device.host.clone(), token.clone());
            self.metrics.set_devices_registered(devices.len());
            token
        };

        discover(&probe, &mut device).await;

        let snapshot = device.clone();
        let metrics = Arc::clone(&self.metrics);
        self.tracker
            .spawn(poll_task(probe, device, interval, cancel, metrics));
        Ok(Registration::Started(snapshot))
    }

    /// Stop monitoring `host`. Unknown hosts are ignored.
    pub async fn deregister(&self, host: &str) {
        let mut devices = self.devices.lock().await;
        let Some(cancel) = devices.remove(host) else {
            warn!(host, "device not found");
            return;
        };
        cancel.cancel();
        self.metrics.set_devices_registered(devices.len());
        info!(host, "device deregistered");
    }

    /// Stop monitoring every device and clear the registry.
    pub async fn deregister_all(&self) {
        let mut devices = self.devices.lock().await;
        for (host, cancel) in devices.drain() {
            info!(host = %host, "deregistering device");
            cancel.cancel();
        }
        self.metrics.set_devices_registered(0);
        info!("all devices deregistered");
    }

    /// Deregister everything and wait for every polling task to exit.
    pub async fn shutdown(&self) {
        self.deregister_all().await;
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub async fn is_registered(&self, host: &str) -> bool {
        self.devices.lock().await.contains_key(host)
    }

    /// Registered hosts, sorted.
    pub async fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.devices.lock().await.keys().cloned().collect();
        hosts.sort_unstable();
        hosts
    }

    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.lock().await.is_empty()
    }

    /// Number of polling tasks that have not exited yet.
    pub fn running_tasks(&self) -> usize {
        self.tracker.len()
    }
}

/// One-time capability discovery. Never fails; problems are logged.
async fn discover<P: DeviceProbe>(probe: &P, device: &mut DeviceConfig) {
    match probe.update_device_info(device).await {
        Ok(identity) => device.apply_identity(identity),
        Err(e) => {
            error!(host = %device.host, error = %e, "failed to fetch device info");
        }
    }

    match discover_components(probe).await {
        Ok(components) => {
            device.switch_ids = components.switch_ids;
            device.cover_ids = components.cover_ids;
        }
        Err(e) => {
            error!(host = %device.host, error = %e, "failed to discover components");
        }
    }
}

/// Periodic refresh loop for one device.
///
/// Cancellation is checked before each tick; a tick already running is
/// allowed to finish.
async fn poll_task<P: DeviceProbe>(
    probe: P,
    device: DeviceConfig,
    period: Duration,
    cancel: CancellationToken,
    metrics: Arc<MetricsHub>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(host = %device.host, "stopping metrics update loop");
                break;
            }
            _ = interval.tick() => {
                match run_pipeline(&probe, &device).await {
                    Ok(()) => metrics.record_refresh(&device.host, true),
                    Err(e) => {
                        metrics.record_refresh(&device.host, false);
                        error!(host = %device.host, error = %e, "error fetching metrics");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use tracing::subscriber::DefaultGuard;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use crate::device::DeviceIdentity;

    const PERIOD: Duration = Duration::from_secs(10);

    /// Shared script and call log for the fake probes of one test.
    #[derive(Default)]
    struct Script {
        calls: StdMutex<Vec<String>>,
        fail_device_info: bool,
        fail_status_keys: bool,
        /// Steps that fail, by label (e.g. `switch_config:3`).
        failing: Vec<String>,
        keys: Vec<String>,
    }

    impl Script {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_for(&self, host: &str) -> Vec<String> {
            let prefix = format!("{host} ");
            self.calls()
                .into_iter()
                .filter_map(|c| c.strip_prefix(&prefix).map(str::to_owned))
                .collect()
        }

        fn step(&self, host: &str, label: String) -> Result<(), CoreError> {
            self.calls.lock().unwrap().push(format!("{host} {label}"));
            if self.failing.contains(&label) {
                Err(CoreError::Timeout)
            } else {
                Ok(())
            }
        }
    }

    struct FakeProbe {
        host: String,
        script: Arc<Script>,
    }

    impl DeviceProbe for FakeProbe {
        async fn update_device_info(&self, _device: &DeviceConfig) -> Result<DeviceIdentity, CoreError> {
            self.script.step(&self.host, "device_info".into())?;
            if self.script.fail_device_info {
                return Err(CoreError::Timeout);
            }
            Ok(DeviceIdentity {
                device_type: "Plus2PM".into(),
                mac: "A8032ABE54DC".into(),
                profile: "switch".into(),
            })
        }

        async fn status_keys(&self) -> Result<Vec<String>, CoreError> {
            self.script.step(&self.host, "status_keys".into())?;
            if self.script.fail_status_keys {
                return Err(CoreError::Timeout);
            }
            Ok(self.script.keys.clone())
        }

        async fn update_status(&self, _device: &DeviceConfig) -> Result<(), CoreError> {
            self.script.step(&self.host, "status".into())
        }

        async fn update_config(&self, _device: &DeviceConfig) -> Result<(), CoreError> {
            self.script.step(&self.host, "config".into())
        }

        async fn update_switch_status(&self, _device: &DeviceConfig, id: u32) -> Result<(), CoreError> {
            self.script.step(&self.host, format!("switch_status:{id}"))
        }

        async fn update_switch_config(&self, _device: &DeviceConfig, id: u32) -> Result<(), CoreError> {
            self.script.step(&self.host, format!("switch_config:{id}"))
        }

        async fn update_cover_status(&self, _device: &DeviceConfig, id: u32) -> Result<(), CoreError> {
            self.script.step(&self.host, format!("cover_status:{id}"))
        }

        async fn update_wifi_status(&self, _device: &DeviceConfig) -> Result<(), CoreError> {
            self.script.step(&self.host, "wifi".into())
        }
    }

    struct FakeConnector {
        script: Arc<Script>,
    }

    impl DeviceConnector for FakeConnector {
        type Probe = FakeProbe;

        fn connect(&self, device: &DeviceConfig) -> Result<FakeProbe, CoreError> {
            Ok(FakeProbe {
                host: device.host.clone(),
                script: Arc::clone(&self.script),
            })
        }
    }

    fn registry(script: Script) -> (DeviceRegistry<FakeConnector>, Arc<Script>) {
        let script = Arc::new(script);
        let connector = FakeConnector {
            script: Arc::clone(&script),
        };
        let metrics = Arc::new(MetricsHub::new().unwrap());
        (DeviceRegistry::new(connector, metrics), script)
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| (*k).to_owned()).collect()
    }

    /// Counts WARN events emitted on the current thread.
    #[derive(Clone, Default)]
    struct WarnCounter(Arc<AtomicUsize>);

    impl WarnCounter {
        fn install(&self) -> DefaultGuard {
            tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
        }

        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Let spawned tasks run up to (and including) `periods` ticks.
    async fn advance(periods: u32) {
        for _ in 0..periods {
            tokio::time::sleep(PERIOD).await;
        }
        // A few extra scheduler turns so ticks that just fired complete.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn register_discovers_and_runs_pipeline_in_order() {
        let (registry, script) = registry(Script {
            keys: keys(&["sys", "switch:1", "cover:0", "switch:0"]),
            ..Script::default()
        });

        let Registration::Started(device) = registry
            .register(DeviceConfig::new("10.0.0.1"), PERIOD)
            .await
            .unwrap()
        else {
            panic!("expected registration to start");
        };

        assert_eq!(device.device_type, "Plus2PM");
        assert_eq!(device.mac, "A8032ABE54DC");
        assert_eq!(device.switch_ids, vec![0, 1]);
        assert_eq!(device.cover_ids, vec![0]);
        assert!(registry.is_registered("10.0.0.1").await);

        advance(1).await;

        assert_eq!(
            script.calls_for("10.0.0.1"),
            vec![
                "device_info",
                "status_keys",
                "device_info",
                "status",
                "config",
                "switch_status:0",
                "switch_config:0",
                "switch_status:1",
                "switch_config:1",
                "cover_status:0",
                "wifi",
            ]
        );
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_before_first_period() {
        let (registry, script) = registry(Script::default());
        registry
            .register(DeviceConfig::new("h"), PERIOD)
            .await
            .unwrap();

        tokio::time::sleep(PERIOD / 2).await;
        tokio::task::yield_now().await;

        assert_eq!(script.calls_for("h"), vec!["device_info", "status_keys"]);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_registration_is_a_no_op() {
        let (registry, script) = registry(Script::default());
        let warnings = WarnCounter::default();
        let _guard = warnings.install();

        let first = registry.register(DeviceConfig::new("h"), PERIOD).await.unwrap();
        assert_eq!(warnings.count(), 0);
        let second = registry.register(DeviceConfig::new("h"), PERIOD).await.unwrap();

        assert!(matches!(first, Registration::Started(_)));
        assert!(matches!(second, Registration::AlreadyRegistered));
        assert_eq!(warnings.count(), 1);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.running_tasks(), 1);

        advance(1).await;

        // One discovery, one tick: no duplicate poller.
        let wifi_updates = script.calls_for("h").iter().filter(|c| *c == "wifi").count();
        assert_eq!(wifi_updates, 1);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deregister_unknown_host_is_a_no_op() {
        let (registry, _script) = registry(Script::default());
        let warnings = WarnCounter::default();
        let _guard = warnings.install();
        registry.register(DeviceConfig::new("a"), PERIOD).await.unwrap();

        registry.deregister("nope").await;
        assert_eq!(warnings.count(), 1);

        assert_eq!(registry.hosts().await, vec!["a".to_owned()]);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deregister_stops_the_task_within_one_period() {
        let (registry, script) = registry(Script::default());
        registry.register(DeviceConfig::new("h"), PERIOD).await.unwrap();
        advance(1).await;

        registry.deregister("h").await;
        assert!(!registry.is_registered("h").await);

        advance(1).await;
        assert_eq!(registry.running_tasks(), 0);

        let calls_after_stop = script.calls_for("h").len();
        advance(3).await;
        assert_eq!(script.calls_for("h").len(), calls_after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn deregister_all_handles_empty_single_and_many() {
        let (registry, _script) = registry(Script::default());

        registry.deregister_all().await;
        assert!(registry.is_empty().await);

        registry.register(DeviceConfig::new("one"), PERIOD).await.unwrap();
        registry.deregister_all().await;
        assert!(registry.is_empty().await);

        for i in 0..8 {
            registry
                .register(DeviceConfig::new(format!("10.0.0.{i}")), PERIOD)
                .await
                .unwrap();
        }
        assert_eq!(registry.len().await, 8);
        registry.deregister_all().await;
        assert!(registry.is_empty().await);

        advance(1).await;
        assert_eq!(registry.running_tasks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_and_deregister_all_keep_map_consistent() {
        let (registry, _script) = registry(Script::default());
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for i in 0..32 {
            let registering = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                // Every host is registered twice to race the duplicate check.
                let host = format!("10.1.0.{}", i % 16);
                registering
                    .register(DeviceConfig::new(host), Duration::from_secs(3600))
                    .await
                    .unwrap();
            }));
            if i % 8 == 0 {
                let clearing = Arc::clone(&registry);
                handles.push(tokio::spawn(async move {
                    clearing.deregister_all().await;
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let hosts = registry.hosts().await;
        assert_eq!(hosts.len(), registry.len().await);
        assert!(hosts.len() <= 16);

        registry.shutdown().await;
        assert!(registry.is_empty().await);
        assert_eq!(registry.running_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_device_info_still_registers() {
        let (registry, script) = registry(Script {
            fail_device_info: true,
            fail_status_keys: true,
            ..Script::default()
        });

        let Registration::Started(device) = registry
            .register(DeviceConfig::new("flaky"), PERIOD)
            .await
            .unwrap()
        else {
            panic!("expected registration to start");
        };

        assert_eq!(device.device_type, "");
        assert_eq!(device.mac, "");
        assert_eq!(device.profile, "");
        assert!(device.switch_ids.is_empty());
        assert!(registry.is_registered("flaky").await);

        // Still polled on schedule; discovery is not retried.
        advance(2).await;
        let calls = script.calls_for("flaky");
        assert_eq!(calls.iter().filter(|c| *c == "status_keys").count(), 1);
        assert_eq!(calls.iter().filter(|c| *c == "device_info").count(), 3);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_step_aborts_tick_but_not_schedule() {
        let (registry, script) = registry(Script {
            keys: keys(&["switch:3", "switch:5"]),
            failing: vec!["switch_config:3".into()],
            ..Script::default()
        });
        registry.register(DeviceConfig::new("h"), PERIOD).await.unwrap();

        advance(1).await;
        let first_tick = script.calls_for("h");
        assert_eq!(first_tick.last().map(String::as_str), Some("switch_config:3"));
        assert!(!first_tick.iter().any(|c| c == "wifi" || c == "switch_status:5"));

        advance(1).await;
        let ticks = script
            .calls_for("h")
            .iter()
            .filter(|c| *c == "switch_config:3")
            .count();
        assert_eq!(ticks, 2);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (registry, script) = registry(Script::default());

        let result = registry.register(DeviceConfig::new("h"), Duration::ZERO).await;

        assert!(matches!(result, Err(CoreError::Validation { .. })));
        assert!(registry.is_empty().await);
        assert!(script.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn devices_poll_independently() {
        let (registry, script) = registry(Script {
            failing: vec!["config".into()],
            ..Script::default()
        });
        registry.register(DeviceConfig::new("a"), PERIOD).await.unwrap();
        registry
            .register(DeviceConfig::new("b"), PERIOD * 2)
            .await
            .unwrap();

        advance(2).await;

        let ticks = |host: &str| {
            script
                .calls_for(host)
                .iter()
                .filter(|c| *c == "status")
                .count()
        };
        assert_eq!(ticks("a"), 2);
        assert_eq!(ticks("b"), 1);
        registry.shutdown().await;
    }
}
