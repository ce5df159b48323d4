//! Core types shared by agents.
//!
//! - [`Value`]: a single exported property value
//! - [`Properties`]: the named values an agent exports
//! - [`Agent`]: trait implemented by every monitored object

use crate::state::{CurrentState, Level};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A single exported property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Text (names, formatted quantities).
    Text(String),
    /// Unsigned integer (counts, codes).
    Unsigned(u64),
    /// Floating point (rates).
    Float(f64),
    /// Boolean flag.
    Bool(bool),
}

impl Value {
    /// Returns the value as text, if it is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer, if it is one.
    #[must_use]
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a float, if it is one.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => f.write_str(v),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.2}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Unsigned(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Self::Unsigned(u64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Named values exported by an agent, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Properties {
    values: BTreeMap<String, Value>,
}

impl Properties {
    /// Creates an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Gets a property by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Gets a text property by key.
    #[must_use]
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }

    /// Gets an unsigned property by key.
    #[must_use]
    pub fn get_unsigned(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_unsigned)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// A monitored object with a health state.
///
/// Agents are refreshed serially by their owner; a refresh never panics and
/// records failures in the agent's [`CurrentState`].
pub trait Agent: Send {
    /// Stable identifier, unique among siblings.
    fn name(&self) -> &str;

    /// Re-reads the underlying source and recomputes the state.
    fn refresh(&mut self);

    /// Current state.
    fn current_state(&self) -> &CurrentState;

    /// Exported properties, read fresh where the source allows it.
    fn properties(&self) -> Properties;

    /// Severity of the current state.
    fn level(&self) -> Level {
        self.current_state().level()
    }

    /// Suggested refresh interval.
    fn interval_hint(&self) -> Duration {
        Duration::from_secs(60)
    }
}
