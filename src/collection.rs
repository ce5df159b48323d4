//! The set of disk agents on this host.

use crate::agent::{AgentOptions, DiskAgent};
use crate::config::Config;
use crate::device::DeviceOpener;
use crate::diskstats::{whole_disks, DiskLister};
use crate::error::Result;
use crate::state::{CurrentState, Level};
use crate::types::{Agent, Properties};
use serde::Serialize;
use std::sync::Arc;

/// One line of [`DiskCollection::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskSummary {
    /// Agent name.
    pub name: String,
    /// Device path.
    pub device: String,
    /// Model and size.
    pub summary: String,
    /// State identifier.
    pub state: String,
    /// Severity.
    pub level: Level,
    /// State message.
    pub message: String,
}

impl DiskSummary {
    fn of(agent: &DiskAgent) -> Self {
        let current = agent.current_state();
        Self {
            name: agent.name().to_string(),
            device: agent.device().display().to_string(),
            summary: agent.summary().to_string(),
            state: current.name().to_string(),
            level: current.level(),
            message: current.message().to_string(),
        }
    }
}

/// Disk agents, one per whole disk or a single configured device.
#[derive(Debug, Default)]
pub struct DiskCollection {
    agents: Vec<DiskAgent>,
    current: CurrentState,
}

impl DiskCollection {
    /// Builds the agents described by `config`.
    ///
    /// With `disk.device-name` set, enumeration is skipped and exactly one
    /// agent is created. Otherwise every whole disk listed by `lister` gets
    /// an agent at `/dev/<name>`; `disk.name` and `disk.label` only apply in
    /// single-device mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the disks cannot be listed or an agent rejects
    /// its options.
    pub fn discover(
        config: &Config,
        opener: Arc<dyn DeviceOpener>,
        lister: Arc<dyn DiskLister>,
    ) -> Result<Self> {
        let options = AgentOptions::from_config(config);

        if let Some(device) = &config.disk.device_name {
            log::debug!("single device mode: {}", device.display());
            let agent = DiskAgent::new(device.clone(), &options, opener, lister)?;
            return Ok(Self::from_agents(vec![agent]));
        }

        let options = AgentOptions { name: None, label: None, ..options };
        let agents = whole_disks(lister.list()?)
            .into_iter()
            .map(|disk| {
                let path = disk.device_path();
                DiskAgent::new(path, &options, Arc::clone(&opener), Arc::clone(&lister))
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!("monitoring {} disk(s)", agents.len());
        Ok(Self::from_agents(agents))
    }

    /// Wraps already built agents.
    #[must_use]
    pub fn from_agents(agents: Vec<DiskAgent>) -> Self {
        Self { agents, current: CurrentState::Pending }
    }

    /// Child agents in enumeration order.
    #[must_use]
    pub fn agents(&self) -> &[DiskAgent] {
        &self.agents
    }

    /// Finds a child by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DiskAgent> {
        self.agents.iter().find(|a| a.name() == name)
    }

    /// Number of child agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Returns true without child agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Refreshes every child, then summarizes them.
    pub fn status(&mut self) -> Vec<DiskSummary> {
        self.refresh();
        self.agents.iter().map(DiskSummary::of).collect()
    }

    /// Exported properties of every child.
    #[must_use]
    pub fn child_properties(&self) -> Vec<Properties> {
        self.agents.iter().map(|a| a.properties()).collect()
    }
}

impl Agent for DiskCollection {
    fn name(&self) -> &str {
        "disks"
    }

    /// Refreshes every child; the collection adopts the most severe child state.
    fn refresh(&mut self) {
        for agent in &mut self.agents {
            agent.refresh();
        }
        self.current = self
            .agents
            .iter()
            .map(|a| a.current_state())
            .max_by_key(|s| s.level())
            .cloned()
            .unwrap_or_default();
    }

    fn current_state(&self) -> &CurrentState {
        &self.current
    }

    fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("name", "disks");
        props.insert("icon", crate::agent::DISK_ICON);
        props.insert("count", self.agents.len() as u64);
        props.insert("state", self.current.name());
        props.insert("level", self.current.level().as_str());
        props.insert("message", self.current.message());
        props
    }

    fn interval_hint(&self) -> std::time::Duration {
        self.agents
            .iter()
            .map(|a| a.interval_hint())
            .min()
            .unwrap_or_else(|| std::time::Duration::from_secs(60))
    }
}
