//! `smartctl --json` backed device access.
//!
//! One `smartctl -a` run per [`SmartDevice::read_data`] call; every accessor
//! afterwards answers from the parsed report. The overall verdict is derived
//! with [`derive_overall`] so it ranks the same way the native library does.

use super::{derive_overall, DeviceOpener, HealthInputs, Identify, SmartDevice};
use crate::error::{Result, SmartError};
use crate::subprocess::{run_with_timeout, SubprocessResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exit status bit: command line did not parse.
const EXIT_PARSE_ERROR: i32 = 1 << 0;
/// Exit status bit: device open failed, or the device is in a low-power mode with `-n`.
const EXIT_OPEN_FAILED: i32 = 1 << 1;

/// Reallocated sector count.
const ATTR_REALLOCATED_SECTORS: u16 = 5;
/// Current pending sector count.
const ATTR_PENDING_SECTORS: u16 = 197;

/// Kelvin offset in milli-degrees.
const MILLIKELVIN_OFFSET: i64 = 273_150;

#[derive(Debug, Default, Deserialize)]
struct Report {
    smart_status: Option<SmartStatus>,
    model_name: Option<String>,
    serial_number: Option<String>,
    firmware_version: Option<String>,
    user_capacity: Option<Capacity>,
    power_on_time: Option<PowerOnTime>,
    power_cycle_count: Option<u64>,
    temperature: Option<CurrentTemperature>,
    ata_smart_attributes: Option<AttributeTable>,
    nvme_smart_health_information_log: Option<NvmeHealthLog>,
}

#[derive(Debug, Deserialize)]
struct SmartStatus {
    passed: bool,
}

#[derive(Debug, Deserialize)]
struct Capacity {
    bytes: u64,
}

#[derive(Debug, Deserialize)]
struct PowerOnTime {
    hours: u64,
    #[serde(default)]
    minutes: u64,
}

#[derive(Debug, Deserialize)]
struct CurrentTemperature {
    current: i64,
}

#[derive(Debug, Deserialize)]
struct AttributeTable {
    #[serde(default)]
    table: Vec<Attribute>,
}

#[derive(Debug, Deserialize)]
struct Attribute {
    id: u16,
    #[serde(default)]
    when_failed: String,
    raw: RawValue,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct NvmeHealthLog {
    #[serde(default)]
    critical_warning: u64,
    #[serde(default)]
    media_errors: u64,
}

impl Report {
    fn attributes(&self) -> &[Attribute] {
        self.ata_smart_attributes.as_ref().map_or(&[], |t| t.table.as_slice())
    }

    fn attribute(&self, id: u16) -> Option<u64> {
        self.attributes().iter().find(|a| a.id == id).map(|a| a.raw.value)
    }

    fn bad_sectors(&self) -> Option<u64> {
        if let Some(log) = &self.nvme_smart_health_information_log {
            return Some(log.media_errors);
        }
        let reallocated = self.attribute(ATTR_REALLOCATED_SECTORS);
        let pending = self.attribute(ATTR_PENDING_SECTORS);
        match (reallocated, pending) {
            (None, None) => None,
            (r, p) => Some(r.unwrap_or(0).saturating_add(p.unwrap_or(0))),
        }
    }

    fn failing_now(&self) -> bool {
        let nvme_warning = self
            .nvme_smart_health_information_log
            .as_ref()
            .is_some_and(|l| l.critical_warning != 0);
        nvme_warning || self.attributes().iter().any(|a| a.when_failed == "now")
    }

    fn failed_in_past(&self) -> bool {
        self.attributes().iter().any(|a| a.when_failed == "past")
    }
}

/// Opens devices through the `smartctl` tool.
#[derive(Debug, Clone)]
pub struct Smartctl {
    program: String,
    timeout: Duration,
}

impl Smartctl {
    /// Uses `smartctl` from `PATH` with a 10 second timeout.
    #[must_use]
    pub fn new() -> Self {
        Self { program: "smartctl".to_string(), timeout: Duration::from_secs(10) }
    }

    /// Overrides the binary to run.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for Smartctl {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceOpener for Smartctl {
    fn open(&self, path: &Path) -> Result<Box<dyn SmartDevice>> {
        if !path.exists() {
            return Err(SmartError::DeviceOpen {
                path: path.display().to_string(),
                errno: libc::ENOENT,
                message: "no such device".to_string(),
            });
        }
        Ok(Box::new(SmartctlDevice {
            path: path.to_path_buf(),
            program: self.program.clone(),
            timeout: self.timeout,
            report: None,
        }))
    }
}

/// One device queried through `smartctl`.
#[derive(Debug)]
struct SmartctlDevice {
    path: PathBuf,
    program: String,
    timeout: Duration,
    report: Option<Report>,
}

impl SmartctlDevice {
    fn path_string(&self) -> String {
        self.path.display().to_string()
    }

    fn read_error(&self, errno: i32, message: impl Into<String>) -> SmartError {
        SmartError::SmartRead { path: self.path_string(), errno, message: message.into() }
    }

    fn report(&self, what: &'static str) -> Result<&Report> {
        self.report.as_ref().ok_or_else(|| {
            SmartError::query(self.path_string(), what, libc::ENODATA, "no S.M.A.R.T. report")
        })
    }

    fn field<T>(&self, what: &'static str, get: impl FnOnce(&Report) -> Option<T>) -> Result<T> {
        get(self.report(what)?).ok_or_else(|| {
            SmartError::query(self.path_string(), what, libc::ENOENT, "not reported by device")
        })
    }

    fn power_mode_error(&self, errno: i32, message: impl Into<String>) -> SmartError {
        SmartError::query(self.path_string(), "power mode", errno, message)
    }

    fn parse(&self, stdout: &str) -> Result<Report> {
        serde_json::from_str(stdout)
            .map_err(|e| self.read_error(libc::EBADMSG, format!("unexpected smartctl output: {e}")))
    }
}

impl SmartDevice for SmartctlDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_data(&mut self) -> Result<()> {
        self.report = None;

        let args = [self.path.as_os_str().to_os_string(), "--json".into(), "-a".into()];
        let result = run_with_timeout(&self.program, &args, self.timeout);

        let code = match &result {
            SubprocessResult::Completed(_) => result.exit_code().ok_or_else(|| {
                self.read_error(libc::EINTR, "smartctl was killed by a signal")
            })?,
            SubprocessResult::Timeout => {
                return Err(self.read_error(libc::ETIMEDOUT, "smartctl timed out"));
            }
            SubprocessResult::SpawnError(e) => {
                return Err(self.read_error(
                    e.raw_os_error().unwrap_or(libc::ENOENT),
                    format!("can't run {}: {e}", self.program),
                ));
            }
        };

        if code & EXIT_PARSE_ERROR != 0 {
            return Err(self.read_error(libc::EINVAL, "smartctl rejected its arguments"));
        }
        if code & EXIT_OPEN_FAILED != 0 {
            return Err(self.read_error(libc::ENODEV, "smartctl could not open the device"));
        }

        let stdout = result.stdout_string().unwrap_or_default();
        let report = self.parse(&stdout)?;
        log::trace!("{}: smartctl exit status {code:#x}", self.path.display());
        self.report = Some(report);
        Ok(())
    }

    fn overall(&self) -> Result<u16> {
        let report = self.report("overall status")?;
        let passed = self.field("overall status", |r| r.smart_status.as_ref().map(|s| s.passed))?;

        let inputs = HealthInputs {
            passed,
            bad_sectors: report.bad_sectors(),
            size_bytes: report.user_capacity.as_ref().map_or(0, |c| c.bytes),
            failing_now: report.failing_now(),
            failed_in_past: report.failed_in_past(),
        };
        Ok(derive_overall(&inputs).value())
    }

    fn identify_supported(&self) -> bool {
        self.report.as_ref().is_some_and(|r| r.model_name.is_some())
    }

    fn identify(&self) -> Result<Identify> {
        self.field("identify", |r| {
            Some(Identify {
                model: r.model_name.clone()?,
                serial: r.serial_number.clone().unwrap_or_default(),
                firmware: r.firmware_version.clone().unwrap_or_default(),
            })
        })
    }

    fn size(&self) -> Result<u64> {
        self.field("size", |r| r.user_capacity.as_ref().map(|c| c.bytes))
    }

    fn bad_sectors(&self) -> Result<u64> {
        self.field("bad sectors", Report::bad_sectors)
    }

    fn power_on_ms(&self) -> Result<u64> {
        self.field("power on time", |r| {
            r.power_on_time.as_ref().map(|t| (t.hours * 60 + t.minutes) * 60_000)
        })
    }

    fn power_cycles(&self) -> Result<u64> {
        self.field("power cycle count", |r| r.power_cycle_count)
    }

    fn temperature_mkelvin(&self) -> Result<u64> {
        self.field("temperature", |r| {
            let celsius = r.temperature.as_ref()?.current;
            u64::try_from(celsius * 1000 + MILLIKELVIN_OFFSET).ok()
        })
    }

    fn is_awake(&self) -> Result<bool> {
        let args =
            ["-n".into(), "standby".into(), "-i".into(), self.path.as_os_str().to_os_string()];
        let output = match run_with_timeout(&self.program, &args, self.timeout) {
            SubprocessResult::Completed(output) => output,
            SubprocessResult::Timeout => {
                return Err(self.power_mode_error(libc::ETIMEDOUT, "smartctl timed out"));
            }
            SubprocessResult::SpawnError(e) => {
                return Err(self.power_mode_error(
                    e.raw_os_error().unwrap_or(libc::ENOENT),
                    e.to_string(),
                ));
            }
        };

        let Some(code) = output.status.code() else {
            return Err(self.power_mode_error(libc::EINTR, "smartctl was killed by a signal"));
        };
        if code & EXIT_PARSE_ERROR != 0 {
            return Err(self.power_mode_error(libc::EINVAL, "smartctl rejected its arguments"));
        }
        if code & EXIT_OPEN_FAILED != 0 {
            // Bit 1 is shared between "skipped, low-power mode" and "open failed".
            if reports_low_power(&String::from_utf8_lossy(&output.stdout)) {
                return Ok(false);
            }
            return Err(SmartError::DeviceOpen {
                path: self.path_string(),
                errno: libc::ENODEV,
                message: "smartctl could not open the device".to_string(),
            });
        }
        Ok(true)
    }
}

/// True if `smartctl -n` output says the device was skipped for being in
/// STANDBY or SLEEP mode.
fn reports_low_power(stdout: &str) -> bool {
    stdout.lines().any(|line| {
        line.contains("Device is in") && (line.contains("STANDBY") || line.contains("SLEEP"))
    })
}
