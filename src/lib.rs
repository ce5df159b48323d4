//! # smart-monitor
//!
//! Disk health monitoring from S.M.A.R.T. data.
//!
//! One [`DiskAgent`] per whole disk re-reads the drive's overall status on
//! every refresh and maps it to a health [`State`] with a severity
//! [`Level`]. States come from configuration first, then from a built-in
//! table; unknown codes fall back to a generic state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smart_monitor::{Config, DiskCollection, ProcDiskstats};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let mut disks = DiskCollection::discover(
//!     &config,
//!     Arc::new(config.smartctl()),
//!     Arc::new(ProcDiskstats::new()),
//! )?;
//!
//! for disk in disks.status() {
//!     println!("{}: {} ({})", disk.name, disk.message, disk.level);
//! }
//! # Ok::<(), smart_monitor::SmartError>(())
//! ```
//!
//! ## Layers
//!
//! - [`device`]: device access through [`DeviceOpener`] / [`SmartDevice`],
//!   with a `smartctl` backed implementation
//! - [`diskstats`]: block device enumeration and I/O counters
//! - [`state`]: the health state engine
//! - [`agent`] and [`collection`]: refresh and export

#![warn(missing_docs)]
// Allow unwrap() in tests only - banned in production code
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod agent;
pub mod collection;
pub mod config;
pub mod device;
pub mod diskstats;
pub mod error;
pub mod state;
pub mod subprocess;
pub mod temperature;
pub mod template;
pub mod types;

pub use agent::{AgentOptions, DiskAgent};
pub use collection::{DiskCollection, DiskSummary};
pub use config::Config;
pub use device::{DeviceOpener, DeviceReader, OverallStatus, SizeUnit, SmartDevice, Smartctl};
pub use diskstats::{BlockDevice, DiskLister, IoCounters, ProcDiskstats};
pub use error::{Result, SmartError};
pub use state::{CurrentState, Level, State, StateTable};
pub use temperature::{TempUnit, Temperature};
pub use types::{Agent, Properties, Value};
