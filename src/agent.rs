//! Per-disk health agent.
//!
//! A [`DiskAgent`] owns a device path, never a device handle: every refresh
//! and every export opens the device, reads it and drops the handle again.

use crate::config::{Config, StateConfig};
use crate::device::{DeviceOpener, DeviceReader, SizeUnit};
use crate::diskstats::{DiskLister, IoCounters, IoDelta};
use crate::error::Result;
use crate::state::{CurrentState, State, StateTable};
use crate::template;
use crate::temperature::TempUnit;
use crate::types::{Agent, Properties};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Icon name exported by every disk agent.
pub const DISK_ICON: &str = "drive-harddisk";

/// Construction options for a [`DiskAgent`].
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Agent name; defaults to the device basename.
    pub name: Option<String>,
    /// Agent label; defaults to "Hard disk <name>".
    pub label: Option<String>,
    /// Enables I/O accounting in this unit.
    pub io_unit: Option<SizeUnit>,
    /// Skip status reads while the disk sleeps.
    pub skip_sleeping: bool,
    /// Declared states.
    pub states: Vec<StateConfig>,
    /// Unit of the exported temperature.
    pub temp_unit: TempUnit,
    /// Refresh interval hint.
    pub interval: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            name: None,
            label: None,
            io_unit: None,
            skip_sleeping: false,
            states: Vec::new(),
            temp_unit: TempUnit::default(),
            interval: Duration::from_secs(60),
        }
    }
}

impl AgentOptions {
    /// Options taken from the `global` and `disk` sections.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.disk.name.clone(),
            label: config.disk.label.clone(),
            io_unit: config.disk.io_unit(),
            skip_sleeping: config.disk.skip_sleeping,
            states: config.disk.states.clone(),
            temp_unit: config.global.temp_scale,
            interval: config.update_interval(),
        }
    }
}

#[derive(Debug)]
struct IoAccounting {
    unit: SizeUnit,
    kernel_name: String,
    baseline: Option<IoCounters>,
    last: Option<IoDelta>,
}

/// Health agent for one whole disk.
pub struct DiskAgent {
    name: String,
    device: PathBuf,
    label: String,
    summary: String,
    temp_unit: TempUnit,
    skip_sleeping: bool,
    interval: Duration,
    opener: Arc<dyn DeviceOpener>,
    lister: Arc<dyn DiskLister>,
    states: StateTable,
    current: CurrentState,
    value: Option<u16>,
    io: Option<IoAccounting>,
}

impl std::fmt::Debug for DiskAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskAgent")
            .field("name", &self.name)
            .field("device", &self.device)
            .field("current", &self.current)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn resolver(name: &str) -> impl FnMut(&str) -> Option<String> + '_ {
    move |key| (key == "name").then(|| name.to_string())
}

impl DiskAgent {
    /// Creates the agent for `device`.
    ///
    /// Reads the identify block for the summary and takes the first I/O
    /// baseline; failures there are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SmartError::ConfigInvalid`] if two declared states
    /// share a value.
    pub fn new(
        device: impl Into<PathBuf>,
        options: &AgentOptions,
        opener: Arc<dyn DeviceOpener>,
        lister: Arc<dyn DiskLister>,
    ) -> Result<Self> {
        let device = device.into();
        let name = options.name.clone().unwrap_or_else(|| basename(&device));
        let label = options.label.clone().unwrap_or_else(|| format!("Hard disk {name}"));

        let mut states = StateTable::new();
        for declared in &options.states {
            states.declare(State {
                value: declared.value.value(),
                name: declared.name.clone(),
                level: declared.level,
                summary: template::expand(&declared.summary, resolver(&name)),
                body: template::expand(&declared.body, resolver(&name)),
            })?;
        }

        let io = options.io_unit.map(|unit| {
            let kernel_name = std::fs::canonicalize(&device)
                .map_or_else(|_| basename(&device), |p| basename(&p));
            IoAccounting { unit, kernel_name, baseline: None, last: None }
        });

        let mut agent = Self {
            name,
            device,
            label,
            summary: String::new(),
            temp_unit: options.temp_unit,
            skip_sleeping: options.skip_sleeping,
            interval: options.interval,
            opener,
            lister,
            states,
            current: CurrentState::Pending,
            value: None,
            io,
        };
        agent.summary = agent.describe();
        agent.refresh_counters();

        log::info!("created disk agent '{}' for {}", agent.name, agent.device.display());
        Ok(agent)
    }

    /// "<model> (<size>)", or empty if the device cannot tell.
    fn describe(&self) -> String {
        let result = DeviceReader::open(self.opener.as_ref(), &self.device).and_then(|mut r| {
            r.read()?;
            Ok(format!("{} ({})", r.identify()?.model, r.formatted_size()?))
        });
        result.unwrap_or_else(|e| {
            log::error!("can't describe {}: {e}", self.device.display());
            String::new()
        })
    }

    /// Agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device path.
    #[must_use]
    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Display label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replaces the display label.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Model and size summary.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Icon name.
    #[must_use]
    pub fn icon(&self) -> &'static str {
        DISK_ICON
    }

    /// Last successfully read status code.
    #[must_use]
    pub fn value(&self) -> Option<u16> {
        self.value
    }

    /// States known to this agent so far.
    #[must_use]
    pub fn states(&self) -> &StateTable {
        &self.states
    }

    /// I/O activity between the last two refreshes.
    #[must_use]
    pub fn io_delta(&self) -> Option<IoDelta> {
        self.io.as_ref().and_then(|io| io.last)
    }

    /// Resolves a status code against this agent's states.
    pub fn compute_state(&mut self, value: u16) -> Arc<State> {
        self.states.compute(value, resolver(&self.name))
    }

    fn open_reader(&self) -> Result<Option<DeviceReader>> {
        let mut reader = DeviceReader::open(self.opener.as_ref(), &self.device)?;
        if self.skip_sleeping {
            match reader.is_awake() {
                Ok(false) => return Ok(None),
                Ok(true) => {}
                Err(e) => log::debug!("{}: power mode unknown: {e}", self.name),
            }
        }
        reader.read()?;
        Ok(Some(reader))
    }

    fn refresh_status(&mut self) {
        match self.open_reader().and_then(|r| r.map(|r| r.overall()).transpose()) {
            Ok(Some(value)) => {
                let state = self.compute_state(value);
                log::debug!("{}: status {value} -> {}", self.name, state.name);
                self.value = Some(value);
                self.current = CurrentState::Active(state);
            }
            Ok(None) => log::debug!("{} is asleep, keeping previous state", self.name),
            Err(e) => {
                log::warn!("{}: refresh failed: {e}", self.name);
                self.current = CurrentState::failed(&e);
            }
        }
    }

    fn refresh_counters(&mut self) {
        let Some(io) = self.io.as_mut() else {
            return;
        };
        match self.lister.counters(&io.kernel_name) {
            Ok(live) => {
                io.last = io.baseline.map(|base| live.delta(&base));
                io.baseline = Some(live);
            }
            Err(e) => log::warn!("{}: can't read I/O counters: {e}", self.name),
        }
    }

    fn device_properties(&self, props: &mut Properties) {
        let reader = match self.open_reader() {
            Ok(Some(reader)) => reader,
            Ok(None) => {
                log::debug!("{} is asleep, skipping device properties", self.name);
                insert_identify(props, None);
                return;
            }
            Err(e) => {
                log::warn!("{}: {e}", self.name);
                insert_identify(props, None);
                return;
            }
        };

        match reader.temperature() {
            Ok(t) => props.insert("temperature", t.to(self.temp_unit).to_string()),
            Err(e) => log::warn!("{e}"),
        }
        match reader.formatted_size() {
            Ok(size) => props.insert("size", size),
            Err(e) => log::warn!("{e}"),
        }
        match reader.identify() {
            Ok(id) => insert_identify(props, Some(id)),
            Err(e) => {
                log::warn!("{e}");
                insert_identify(props, None);
            }
        }
        match reader.bad_sectors() {
            Ok(n) => props.insert("badsectors", n),
            Err(e) => log::warn!("{e}"),
        }
        match reader.power_cycles() {
            Ok(n) => props.insert("powercycle", n),
            Err(e) => log::warn!("{e}"),
        }
        match reader.power_on_time() {
            Ok(d) => props.insert("poweron", d.as_secs() / 3600),
            Err(e) => log::warn!("{e}"),
        }
    }
}

fn insert_identify(props: &mut Properties, id: Option<crate::device::Identify>) {
    let id = id.unwrap_or_default();
    props.insert("model", id.model);
    props.insert("serial", id.serial);
    props.insert("firmware", id.firmware);
}

impl Agent for DiskAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn refresh(&mut self) {
        self.refresh_status();
        self.refresh_counters();
    }

    fn current_state(&self) -> &CurrentState {
        &self.current
    }

    fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("name", self.name.as_str());
        props.insert("label", self.label.as_str());
        props.insert("summary", self.summary.as_str());
        props.insert("icon", DISK_ICON);
        props.insert("device", self.device.display().to_string());
        props.insert("state", self.current.name());
        props.insert("level", self.current.level().as_str());
        props.insert("message", self.current.message());
        if let Some(value) = self.value {
            props.insert("value", value);
        }

        self.device_properties(&mut props);

        if let Some(io) = &self.io {
            props.insert("io_unit", io.unit.label());
            if let Some(delta) = io.last {
                props.insert("read", delta.read_in(io.unit));
                props.insert("write", delta.write_in(io.unit));
                props.insert("read_rate", delta.read_rate(io.unit));
                props.insert("write_rate", delta.write_rate(io.unit));
            }
        }
        props
    }

    fn interval_hint(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Identify, OverallStatus, SmartDevice};
    use crate::diskstats::BlockDevice;
    use crate::error::SmartError;
    use crate::state::Level;
    use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

    #[derive(Default)]
    struct Shared {
        overall: AtomicU16,
        fail_read: std::sync::atomic::AtomicBool,
    }

    struct FakeDevice {
        path: PathBuf,
        shared: Arc<Shared>,
    }

    impl SmartDevice for FakeDevice {
        fn path(&self) -> &Path {
            &self.path
        }
        fn read_data(&mut self) -> Result<()> {
            if self.shared.fail_read.load(Ordering::SeqCst) {
                return Err(SmartError::SmartRead {
                    path: self.path.display().to_string(),
                    errno: libc::EIO,
                    message: "I/O error".to_string(),
                });
            }
            Ok(())
        }
        fn overall(&self) -> Result<u16> {
            Ok(self.shared.overall.load(Ordering::SeqCst))
        }
        fn identify_supported(&self) -> bool {
            true
        }
        fn identify(&self) -> Result<Identify> {
            Ok(Identify { model: "FAKE-1000".into(), serial: "S1".into(), firmware: "F1".into() })
        }
        fn size(&self) -> Result<u64> {
            Ok(2_000_000_000)
        }
        fn bad_sectors(&self) -> Result<u64> {
            Ok(0)
        }
        fn power_on_ms(&self) -> Result<u64> {
            Ok(7_200_000)
        }
        fn power_cycles(&self) -> Result<u64> {
            Ok(3)
        }
        fn temperature_mkelvin(&self) -> Result<u64> {
            Ok(313_150)
        }
        fn is_awake(&self) -> Result<bool> {
            Ok(true)
        }
    }

    struct FakeOpener(Arc<Shared>);

    impl DeviceOpener for FakeOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn SmartDevice>> {
            Ok(Box::new(FakeDevice { path: path.to_path_buf(), shared: Arc::clone(&self.0) }))
        }
    }

    #[derive(Default)]
    struct FakeLister {
        read: AtomicU64,
    }

    impl DiskLister for FakeLister {
        fn list(&self) -> Result<Vec<BlockDevice>> {
            Ok(vec![BlockDevice::new(8, 0, "sda")])
        }
        fn counters(&self, _name: &str) -> Result<IoCounters> {
            Ok(IoCounters::new(self.read.load(Ordering::SeqCst), 50))
        }
    }

    fn agent(options: &AgentOptions) -> (DiskAgent, Arc<Shared>, Arc<FakeLister>) {
        let shared = Arc::new(Shared::default());
        let lister = Arc::new(FakeLister::default());
        let agent = DiskAgent::new(
            "/dev/sda",
            options,
            Arc::new(FakeOpener(Arc::clone(&shared))),
            Arc::clone(&lister) as Arc<dyn DiskLister>,
        )
        .unwrap();
        (agent, shared, lister)
    }

    #[test]
    fn test_metadata_at_construction() {
        let (agent, _, _) = agent(&AgentOptions::default());

        assert_eq!(agent.name(), "sda");
        assert_eq!(agent.label(), "Hard disk sda");
        assert_eq!(agent.summary(), "FAKE-1000 (2 GB)");
        assert_eq!(agent.icon(), "drive-harddisk");
        assert_eq!(agent.value(), None);
        assert_eq!(agent.current_state(), &CurrentState::Pending);
    }

    #[test]
    fn test_refresh_adopts_state() {
        let (mut agent, shared, _) = agent(&AgentOptions::default());
        shared.overall.store(OverallStatus::BadSector.value(), Ordering::SeqCst);

        agent.refresh();

        assert_eq!(agent.value(), Some(2));
        assert_eq!(agent.current_state().name(), "badsector");
        assert_eq!(agent.level(), Level::Warning);
        assert_eq!(agent.current_state().message(), "Bad sector on sda");
    }

    #[test]
    fn test_failed_refresh_keeps_value() {
        let (mut agent, shared, _) = agent(&AgentOptions::default());
        agent.refresh();
        assert_eq!(agent.value(), Some(0));

        shared.fail_read.store(true, Ordering::SeqCst);
        agent.refresh();

        assert!(agent.current_state().is_failed());
        assert_eq!(agent.level(), Level::Critical);
        assert_eq!(agent.value(), Some(0));
    }

    #[test]
    fn test_declared_states_are_rendered() {
        let options = AgentOptions {
            name: Some("system".to_string()),
            states: vec![StateConfig {
                value: OverallStatus::Good,
                name: "fine".to_string(),
                level: Level::Ready,
                summary: "${name} is fine".to_string(),
                body: String::new(),
            }],
            ..AgentOptions::default()
        };
        let (mut agent, _, _) = agent(&options);
        agent.refresh();

        assert_eq!(agent.name(), "system");
        assert_eq!(agent.current_state().name(), "fine");
        assert_eq!(agent.current_state().message(), "system is fine");
    }

    #[test]
    fn test_properties_export() {
        let options = AgentOptions { temp_unit: TempUnit::Celsius, ..AgentOptions::default() };
        let (mut agent, _, _) = agent(&options);
        agent.refresh();
        let props = agent.properties();

        assert_eq!(props.get_text("device"), Some("/dev/sda"));
        assert_eq!(props.get_text("state"), Some("good"));
        assert_eq!(props.get_text("level"), Some("ready"));
        assert_eq!(props.get_unsigned("value"), Some(0));
        assert_eq!(props.get_text("temperature"), Some("40.0 °C"));
        assert_eq!(props.get_text("size"), Some("2 GB"));
        assert_eq!(props.get_text("model"), Some("FAKE-1000"));
        assert_eq!(props.get_unsigned("poweron"), Some(2));
        assert_eq!(props.get_unsigned("powercycle"), Some(3));
        assert!(!props.contains("io_unit"));
    }

    #[test]
    fn test_io_accounting() {
        let options = AgentOptions { io_unit: Some(SizeUnit::Bytes), ..AgentOptions::default() };
        let (mut agent, _, lister) = agent(&options);
        assert!(!agent.properties().contains("read"), "no delta before the first refresh");

        lister.read.store(80, Ordering::SeqCst);
        agent.refresh();
        let props = agent.properties();

        assert_eq!(props.get_text("io_unit"), Some("B"));
        assert_eq!(props.get_unsigned("read"), Some(80 * 512));
        assert_eq!(props.get_unsigned("write"), Some(0));
        assert!(props.contains("read_rate"));
    }
}
