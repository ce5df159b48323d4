//! Disk temperature value with unit conversions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Temperature unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempUnit {
    /// Celsius (default for display).
    #[default]
    Celsius,
    /// Fahrenheit.
    Fahrenheit,
    /// Kelvin, the unit the native S.M.A.R.T. layer reports in.
    Kelvin,
}

impl TempUnit {
    /// Returns the unit suffix.
    #[must_use]
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kelvin => "K",
        }
    }
}

impl FromStr for TempUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "celsius" => Ok(Self::Celsius),
            "f" | "fahrenheit" => Ok(Self::Fahrenheit),
            "k" | "kelvin" => Ok(Self::Kelvin),
            other => Err(format!("unknown temperature unit '{other}'")),
        }
    }
}

/// An immutable temperature reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    value: f64,
    unit: TempUnit,
}

impl Temperature {
    /// Creates a temperature in the given unit.
    #[must_use]
    pub const fn new(value: f64, unit: TempUnit) -> Self {
        Self { value, unit }
    }

    /// Builds a temperature from the milli-Kelvin value reported by the device layer.
    #[must_use]
    pub fn from_millikelvin(mkelvin: u64) -> Self {
        Self::new(mkelvin as f64 / 1000.0, TempUnit::Kelvin)
    }

    /// Raw value in [`Self::unit`].
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Unit of [`Self::value`].
    #[must_use]
    pub fn unit(&self) -> TempUnit {
        self.unit
    }

    /// Value in degrees Celsius.
    #[must_use]
    pub fn as_celsius(&self) -> f64 {
        match self.unit {
            TempUnit::Celsius => self.value,
            TempUnit::Kelvin => self.value - 273.15,
            TempUnit::Fahrenheit => (self.value - 32.0) / 1.8,
        }
    }

    /// Value in Kelvin.
    #[must_use]
    pub fn as_kelvin(&self) -> f64 {
        match self.unit {
            TempUnit::Kelvin => self.value,
            TempUnit::Celsius => self.value + 273.15,
            TempUnit::Fahrenheit => (self.value + 459.67) * 5.0 / 9.0,
        }
    }

    /// Value in degrees Fahrenheit.
    #[must_use]
    pub fn as_fahrenheit(&self) -> f64 {
        match self.unit {
            TempUnit::Fahrenheit => self.value,
            TempUnit::Celsius => self.value * 1.8 + 32.0,
            TempUnit::Kelvin => self.value * 9.0 / 5.0 - 459.67,
        }
    }

    /// Returns the same temperature expressed in `unit`.
    #[must_use]
    pub fn to(&self, unit: TempUnit) -> Self {
        let value = match unit {
            TempUnit::Celsius => self.as_celsius(),
            TempUnit::Kelvin => self.as_kelvin(),
            TempUnit::Fahrenheit => self.as_fahrenheit(),
        };
        Self::new(value, unit)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} {}", self.value, self.unit.suffix())
    }
}
