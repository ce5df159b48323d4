//! Health state engine.
//!
//! Maps an overall status code to a rendered [`State`]. Lookup order:
//!
//! 1. states already in the agent's [`StateTable`] (declared ones first)
//! 2. the process-wide [`BUILTIN_STATES`], rendered and memoized on first hit
//! 3. a generic [`State::unknown`]
//!
//! Memoization means a built-in state is rendered once per agent; later
//! changes to the attributes it was rendered against are not picked up.

use crate::device::OverallStatus;
use crate::error::{Result, SmartError};
use crate::template;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Severity of a state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Nothing known yet.
    #[default]
    Unknown,
    /// Healthy.
    Ready,
    /// Degraded, needs attention.
    Warning,
    /// Failing.
    Error,
    /// Monitoring itself failed.
    Critical,
}

impl Level {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ready => "ready",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "ready" => Ok(Self::Ready),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown level '{other}'")),
        }
    }
}

/// A rendered state descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct State {
    /// Status code this state describes.
    pub value: u16,
    /// Short identifier.
    pub name: String,
    /// Severity.
    pub level: Level,
    /// One line message.
    pub summary: String,
    /// Longer description, possibly empty.
    pub body: String,
}

impl State {
    /// Fallback for codes with no declared or built-in state.
    #[must_use]
    pub fn unknown(value: u16) -> Self {
        Self {
            value,
            name: "unknown".to_string(),
            level: Level::Unknown,
            summary: format!("Unknown health status {value}"),
            body: String::new(),
        }
    }
}

/// An unrendered built-in state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinState {
    /// Status code.
    pub status: OverallStatus,
    /// Short identifier.
    pub name: &'static str,
    /// Severity.
    pub level: Level,
    /// Summary template.
    pub summary: &'static str,
    /// Body template.
    pub body: &'static str,
}

impl BuiltinState {
    /// Renders the templates with `resolve`.
    pub fn render<F>(&self, mut resolve: F) -> State
    where
        F: FnMut(&str) -> Option<String>,
    {
        State {
            value: self.status.value(),
            name: self.name.to_string(),
            level: self.level,
            summary: template::expand(self.summary, &mut resolve),
            body: template::expand(self.body, &mut resolve),
        }
    }
}

/// States known for every disk, one per [`OverallStatus`].
pub static BUILTIN_STATES: [BuiltinState; 6] = [
    BuiltinState {
        status: OverallStatus::Good,
        name: "good",
        level: Level::Ready,
        summary: "${name} Health is Good",
        body: "",
    },
    BuiltinState {
        status: OverallStatus::BadAttributeInThePast,
        name: "badonthepast",
        level: Level::Ready,
        summary: "Pre fail in the past on ${name}",
        body: "At least one pre-fail attribute exceeded its threshold in the past on ${name}",
    },
    BuiltinState {
        status: OverallStatus::BadSector,
        name: "badsector",
        level: Level::Warning,
        summary: "Bad sector on ${name}",
        body: "At least one bad sector on ${name}",
    },
    BuiltinState {
        status: OverallStatus::BadAttributeNow,
        name: "badattribute",
        level: Level::Error,
        summary: "Pre fail exceeded on ${name}",
        body: "At least one pre-fail attribute is exceeding its threshold now on ${name}",
    },
    BuiltinState {
        status: OverallStatus::BadSectorMany,
        name: "manybad",
        level: Level::Error,
        summary: "Too many bad sectors on ${name}",
        body: "",
    },
    BuiltinState {
        status: OverallStatus::BadStatus,
        name: "badstatus",
        level: Level::Error,
        summary: "Smart Self Assessment negative on ${name}",
        body: "",
    },
];

/// Looks up the built-in state for `value`.
#[must_use]
pub fn builtin(value: u16) -> Option<&'static BuiltinState> {
    BUILTIN_STATES.iter().find(|s| s.status.value() == value)
}

/// Per-agent ordered set of states, unique by value.
#[derive(Debug, Clone, Default)]
pub struct StateTable {
    states: Vec<Arc<State>>,
}

impl StateTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a declared state.
    ///
    /// # Errors
    ///
    /// Returns [`SmartError::ConfigInvalid`] if a state with the same value
    /// is already present.
    pub fn declare(&mut self, state: State) -> Result<()> {
        if self.find(state.value).is_some() {
            return Err(SmartError::ConfigInvalid {
                key: "states".to_string(),
                message: format!("duplicate state for value {}", state.value),
            });
        }
        self.states.push(Arc::new(state));
        Ok(())
    }

    /// Finds the state for `value`, in table order.
    #[must_use]
    pub fn find(&self, value: u16) -> Option<&Arc<State>> {
        self.states.iter().find(|s| s.value == value)
    }

    /// Resolves `value` to a state. Never fails.
    ///
    /// A built-in hit is rendered with `resolve` and kept, so the next call
    /// for the same value returns the same rendered state.
    pub fn compute<F>(&mut self, value: u16, resolve: F) -> Arc<State>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(state) = self.find(value) {
            return Arc::clone(state);
        }

        let Some(builtin) = builtin(value) else {
            log::debug!("no state for status {value}, using fallback");
            return Arc::new(State::unknown(value));
        };

        let state = Arc::new(builtin.render(resolve));
        log::debug!("materialized built-in state '{}' for status {value}", state.name);
        self.states.push(Arc::clone(&state));
        state
    }

    /// Number of states in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if the table holds no state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterates over states in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<State>> {
        self.states.iter()
    }
}

/// State currently adopted by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CurrentState {
    /// No refresh has completed yet.
    #[default]
    Pending,
    /// Last refresh produced a status.
    Active(Arc<State>),
    /// Last refresh failed.
    Failed {
        /// Failure message.
        message: String,
        /// errno-equivalent code, when known.
        errno: Option<i32>,
    },
}

impl CurrentState {
    /// Builds a failed state from an error.
    #[must_use]
    pub fn failed(err: &SmartError) -> Self {
        Self::Failed { message: err.to_string(), errno: err.errno() }
    }

    /// State identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Pending => "unknown",
            Self::Active(state) => &state.name,
            Self::Failed { .. } => "failed",
        }
    }

    /// Severity.
    #[must_use]
    pub fn level(&self) -> Level {
        match self {
            Self::Pending => Level::Unknown,
            Self::Active(state) => state.level,
            Self::Failed { .. } => Level::Critical,
        }
    }

    /// One line message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Pending => "",
            Self::Active(state) => &state.summary,
            Self::Failed { message, .. } => message,
        }
    }

    /// Returns true after a failed refresh.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &'static str) -> impl FnMut(&str) -> Option<String> {
        move |key| (key == "name").then(|| name.to_string())
    }

    #[test]
    fn test_builtin_table_covers_every_status() {
        for status in OverallStatus::ALL {
            let b = builtin(status.value()).unwrap();
            assert_eq!(b.status, status);
        }
        assert!(builtin(6).is_none());
    }

    #[test]
    fn test_compute_renders_builtins() {
        let mut table = StateTable::new();

        let good = table.compute(OverallStatus::Good.value(), named("sda"));
        assert_eq!(good.name, "good");
        assert_eq!(good.level, Level::Ready);
        assert_eq!(good.summary, "sda Health is Good");
        assert_eq!(good.body, "");

        let bad = table.compute(OverallStatus::BadSector.value(), named("sda"));
        assert_eq!(bad.level, Level::Warning);
        assert_eq!(bad.summary, "Bad sector on sda");
        assert_eq!(bad.body, "At least one bad sector on sda");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_compute_memoizes() {
        let mut table = StateTable::new();

        let first = table.compute(OverallStatus::BadStatus.value(), named("sda"));
        let second = table.compute(OverallStatus::BadStatus.value(), named("renamed"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.summary, "Smart Self Assessment negative on sda");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_declared_overrides_builtin() {
        let mut table = StateTable::new();
        table
            .declare(State {
                value: 0,
                name: "fine".to_string(),
                level: Level::Ready,
                summary: "all fine".to_string(),
                body: String::new(),
            })
            .unwrap();

        let state = table.compute(0, named("sda"));
        assert_eq!(state.name, "fine");
        assert_eq!(state.summary, "all fine");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_declare_rejects_duplicates() {
        let mut table = StateTable::new();
        table.declare(State::unknown(3)).unwrap();
        let err = table.declare(State::unknown(3)).unwrap_err();
        assert!(matches!(err, SmartError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_unknown_code_falls_back() {
        let mut table = StateTable::new();
        let state = table.compute(42, named("sda"));

        assert_eq!(state.level, Level::Unknown);
        assert_eq!(state.value, 42);
        assert!(table.is_empty(), "fallback states are not memoized");
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Unknown < Level::Ready);
        assert!(Level::Ready < Level::Warning);
        assert!(Level::Warning < Level::Error);
        assert!(Level::Error < Level::Critical);
        assert_eq!("Warning".parse::<Level>(), Ok(Level::Warning));
        assert!("fatal".parse::<Level>().is_err());
    }

    #[test]
    fn test_current_state_views() {
        assert_eq!(CurrentState::default().level(), Level::Unknown);

        let err = SmartError::SmartRead {
            path: "/dev/sda".to_string(),
            errno: libc::EIO,
            message: "I/O error".to_string(),
        };
        let failed = CurrentState::failed(&err);
        assert!(failed.is_failed());
        assert_eq!(failed.name(), "failed");
        assert_eq!(failed.level(), Level::Critical);
        assert!(failed.message().contains("/dev/sda"));

        let active = CurrentState::Active(Arc::new(State::unknown(9)));
        assert_eq!(active.name(), "unknown");
        assert_eq!(active.message(), "Unknown health status 9");
    }
}
