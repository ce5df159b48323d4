//! S.M.A.R.T. device access.
//!
//! [`SmartDevice`] is the narrow contract of the native query layer: every
//! accessor is an independent query that may fail on its own. [`DeviceReader`]
//! wraps one opened device, enforces "read before query" and converts raw
//! values into typed ones.
//!
//! Reading S.M.A.R.T. data can wake a sleeping disk. [`DeviceReader::is_awake`]
//! lets callers skip reads; whether to do so is caller policy.

pub mod smartctl;

pub use smartctl::Smartctl;

use crate::error::{Result, SmartError};
use crate::temperature::Temperature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Overall disk health verdict, ordered by increasing severity.
///
/// Discriminants match the native library's enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum OverallStatus {
    /// All attributes within thresholds.
    #[serde(rename = "good")]
    Good = 0,
    /// A pre-fail attribute exceeded its threshold in the past.
    #[serde(rename = "bad-attribute-in-past")]
    BadAttributeInThePast = 1,
    /// At least one bad sector.
    #[serde(rename = "bad-sector")]
    BadSector = 2,
    /// A pre-fail attribute is exceeding its threshold now.
    #[serde(rename = "bad-attribute-now")]
    BadAttributeNow = 3,
    /// Bad sector count above the size-dependent threshold.
    #[serde(rename = "many-bad-sectors")]
    BadSectorMany = 4,
    /// The drive's self assessment failed.
    #[serde(rename = "bad-status")]
    BadStatus = 5,
}

impl OverallStatus {
    /// All codes, least severe first.
    pub const ALL: [Self; 6] = [
        Self::Good,
        Self::BadAttributeInThePast,
        Self::BadSector,
        Self::BadAttributeNow,
        Self::BadSectorMany,
        Self::BadStatus,
    ];

    /// Numeric value as reported by the native layer.
    #[must_use]
    pub fn value(self) -> u16 {
        self as u16
    }

    /// Configuration spelling of this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::BadAttributeInThePast => "bad-attribute-in-past",
            Self::BadSector => "bad-sector",
            Self::BadAttributeNow => "bad-attribute-now",
            Self::BadSectorMany => "many-bad-sectors",
            Self::BadStatus => "bad-status",
        }
    }
}

impl TryFrom<u16> for OverallStatus {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Self::ALL.into_iter().find(|s| s.value() == value).ok_or(value)
    }
}

impl FromStr for OverallStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown overall status '{s}'"))
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed identify block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identify {
    /// Model string.
    pub model: String,
    /// Serial number.
    pub serial: String,
    /// Firmware revision.
    pub firmware: String,
}

/// One opened S.M.A.R.T. device, as provided by the native layer.
///
/// A handle is used by one owner at a time; it is not shared across threads.
pub trait SmartDevice {
    /// Device path this handle was opened with.
    fn path(&self) -> &Path;

    /// Reads the S.M.A.R.T. data block.
    fn read_data(&mut self) -> Result<()>;

    /// Raw overall status code.
    fn overall(&self) -> Result<u16>;

    /// Whether the identify block can be parsed.
    fn identify_supported(&self) -> bool;

    /// Parsed identify block.
    fn identify(&self) -> Result<Identify>;

    /// Device size in bytes.
    fn size(&self) -> Result<u64>;

    /// Number of bad (reallocated plus pending) sectors.
    fn bad_sectors(&self) -> Result<u64>;

    /// Power-on time in milliseconds.
    fn power_on_ms(&self) -> Result<u64>;

    /// Power cycle count.
    fn power_cycles(&self) -> Result<u64>;

    /// Temperature in milli-Kelvin.
    fn temperature_mkelvin(&self) -> Result<u64>;

    /// Whether the disk is spun up.
    fn is_awake(&self) -> Result<bool>;
}

/// Opens devices by path.
pub trait DeviceOpener: Send + Sync {
    /// Opens `path` as a S.M.A.R.T.-capable device.
    ///
    /// # Errors
    ///
    /// Returns [`SmartError::DeviceOpen`] if the path is inaccessible or not
    /// S.M.A.R.T.-capable.
    fn open(&self, path: &Path) -> Result<Box<dyn SmartDevice>>;
}

/// Size unit with a decimal divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeUnit {
    /// Bytes.
    #[serde(rename = "B")]
    Bytes,
    /// 10^3 bytes.
    #[serde(rename = "KB")]
    Kilo,
    /// 10^6 bytes.
    #[serde(rename = "MB")]
    Mega,
    /// 10^9 bytes.
    #[serde(rename = "GB")]
    Giga,
    /// 10^12 bytes.
    #[serde(rename = "TB")]
    Tera,
}

impl SizeUnit {
    /// Units used by [`format_size`], largest first.
    const DESCENDING: [Self; 4] = [Self::Tera, Self::Giga, Self::Mega, Self::Kilo];

    /// Number of bytes in one unit.
    #[must_use]
    pub fn divisor(self) -> u64 {
        match self {
            Self::Bytes => 1,
            Self::Kilo => 1_000,
            Self::Mega => 1_000_000,
            Self::Giga => 1_000_000_000,
            Self::Tera => 1_000_000_000_000,
        }
    }

    /// Unit label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Bytes => "B",
            Self::Kilo => "KB",
            Self::Mega => "MB",
            Self::Giga => "GB",
            Self::Tera => "TB",
        }
    }
}

impl FromStr for SizeUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "B" => Ok(Self::Bytes),
            "KB" => Ok(Self::Kilo),
            "MB" => Ok(Self::Mega),
            "GB" => Ok(Self::Giga),
            "TB" => Ok(Self::Tera),
            other => Err(format!("unknown size unit '{other}'")),
        }
    }
}

/// Formats a byte count with the largest unit it reaches; division truncates.
///
/// ```
/// use smart_monitor::device::format_size;
///
/// assert_eq!(format_size(500), "500");
/// assert_eq!(format_size(2_000_000_000), "2 GB");
/// ```
#[must_use]
pub fn format_size(bytes: u64) -> String {
    SizeUnit::DESCENDING
        .into_iter()
        .find(|unit| bytes >= unit.divisor())
        .map_or_else(
            || bytes.to_string(),
            |unit| format!("{} {}", bytes / unit.divisor(), unit.label()),
        )
}

/// Bad sector count at which a disk counts as having "many" bad sectors.
///
/// 1024 sectors per power of two of the disk's 512-byte sector count.
#[must_use]
pub fn bad_sector_threshold(size_bytes: u64) -> u64 {
    let sectors = size_bytes / 512;
    if sectors <= 1 {
        return 0;
    }
    u64::from(sectors.ilog2()) * 1024
}

/// Inputs to [`derive_overall`], as read from the drive.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthInputs {
    /// Self assessment passed.
    pub passed: bool,
    /// Bad sector count, when the drive reports one.
    pub bad_sectors: Option<u64>,
    /// Device size in bytes.
    pub size_bytes: u64,
    /// Some pre-fail attribute is below threshold now.
    pub failing_now: bool,
    /// Some pre-fail attribute was below threshold in the past.
    pub failed_in_past: bool,
}

/// Derives the overall verdict from individual health inputs.
///
/// Priority: bad status, many bad sectors, attribute failing now, bad
/// sector, attribute failed in the past, good.
#[must_use]
pub fn derive_overall(inputs: &HealthInputs) -> OverallStatus {
    if !inputs.passed {
        return OverallStatus::BadStatus;
    }

    let sectors = inputs.bad_sectors.unwrap_or(0);
    if sectors > 0 && sectors >= bad_sector_threshold(inputs.size_bytes) {
        return OverallStatus::BadSectorMany;
    }
    if inputs.failing_now {
        return OverallStatus::BadAttributeNow;
    }
    if sectors > 0 {
        return OverallStatus::BadSector;
    }
    if inputs.failed_in_past {
        return OverallStatus::BadAttributeInThePast;
    }
    OverallStatus::Good
}

/// Reader over one opened device.
pub struct DeviceReader {
    device: Box<dyn SmartDevice>,
    data_read: bool,
}

impl fmt::Debug for DeviceReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceReader")
            .field("path", &self.device.path())
            .field("data_read", &self.data_read)
            .finish()
    }
}

impl DeviceReader {
    /// Opens `path` through `opener`.
    ///
    /// # Errors
    ///
    /// Propagates [`SmartError::DeviceOpen`] from the opener.
    pub fn open(opener: &dyn DeviceOpener, path: &Path) -> Result<Self> {
        Ok(Self::new(opener.open(path)?))
    }

    /// Wraps an already opened device.
    #[must_use]
    pub fn new(device: Box<dyn SmartDevice>) -> Self {
        Self { device, data_read: false }
    }

    /// Device path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.device.path()
    }

    fn path_string(&self) -> String {
        self.device.path().display().to_string()
    }

    fn ensure_read(&self, what: &'static str) -> Result<()> {
        if self.data_read {
            return Ok(());
        }
        Err(SmartError::query(self.path_string(), what, libc::ENODATA, "S.M.A.R.T. data not read"))
    }

    /// Reads the S.M.A.R.T. data; required before any attribute accessor.
    ///
    /// # Errors
    ///
    /// Returns [`SmartError::SmartRead`] if the device refuses the read.
    pub fn read(&mut self) -> Result<&mut Self> {
        self.data_read = false;
        self.device.read_data()?;
        self.data_read = true;
        Ok(self)
    }

    /// Whether the disk is spun up; does not require [`Self::read`].
    pub fn is_awake(&self) -> Result<bool> {
        self.device.is_awake()
    }

    /// Raw overall status code.
    pub fn overall(&self) -> Result<u16> {
        self.ensure_read("overall status")?;
        self.device.overall()
    }

    /// Typed overall status.
    ///
    /// # Errors
    ///
    /// Fails with [`SmartError::SmartQuery`] on a code outside the known set.
    pub fn overall_status(&self) -> Result<OverallStatus> {
        let raw = self.overall()?;
        OverallStatus::try_from(raw).map_err(|code| {
            SmartError::query(
                self.path_string(),
                "overall status",
                libc::ERANGE,
                format!("unknown overall status code {code}"),
            )
        })
    }

    /// Whether [`Self::identify`] can succeed.
    #[must_use]
    pub fn identify_supported(&self) -> bool {
        self.device.identify_supported()
    }

    /// Identify block.
    ///
    /// # Errors
    ///
    /// [`SmartError::Unsupported`] when the device has no identify support.
    pub fn identify(&self) -> Result<Identify> {
        self.ensure_read("identify")?;
        if !self.device.identify_supported() {
            return Err(SmartError::Unsupported { path: self.path_string(), feature: "identify" });
        }
        self.device.identify()
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<u64> {
        self.ensure_read("size")?;
        self.device.size()
    }

    /// Size formatted with [`format_size`].
    pub fn formatted_size(&self) -> Result<String> {
        self.size().map(format_size)
    }

    /// Bad sector count.
    pub fn bad_sectors(&self) -> Result<u64> {
        self.ensure_read("bad sectors")?;
        self.device.bad_sectors()
    }

    /// Accumulated power-on time.
    pub fn power_on_time(&self) -> Result<Duration> {
        self.ensure_read("power on time")?;
        self.device.power_on_ms().map(Duration::from_millis)
    }

    /// Power cycle count.
    pub fn power_cycles(&self) -> Result<u64> {
        self.ensure_read("power cycle count")?;
        self.device.power_cycles()
    }

    /// Current temperature (Kelvin).
    pub fn temperature(&self) -> Result<Temperature> {
        self.ensure_read("temperature")?;
        self.device.temperature_mkelvin().map(Temperature::from_millikelvin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct StubDevice {
        path: PathBuf,
        size: u64,
        overall: u16,
        identify: bool,
    }

    impl SmartDevice for StubDevice {
        fn path(&self) -> &Path {
            &self.path
        }
        fn read_data(&mut self) -> Result<()> {
            Ok(())
        }
        fn overall(&self) -> Result<u16> {
            Ok(self.overall)
        }
        fn identify_supported(&self) -> bool {
            self.identify
        }
        fn identify(&self) -> Result<Identify> {
            Ok(Identify { model: "M".into(), serial: "S".into(), firmware: "F".into() })
        }
        fn size(&self) -> Result<u64> {
            Ok(self.size)
        }
        fn bad_sectors(&self) -> Result<u64> {
            Err(SmartError::query("/dev/stub", "bad sectors", libc::ENOENT, "no attribute"))
        }
        fn power_on_ms(&self) -> Result<u64> {
            Ok(3_600_000)
        }
        fn power_cycles(&self) -> Result<u64> {
            Ok(12)
        }
        fn temperature_mkelvin(&self) -> Result<u64> {
            Ok(308_150)
        }
        fn is_awake(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn reader(size: u64, overall: u16, identify: bool) -> DeviceReader {
        DeviceReader::new(Box::new(StubDevice {
            path: PathBuf::from("/dev/stub"),
            size,
            overall,
            identify,
        }))
    }

    #[test]
    fn test_format_size_thresholds() {
        assert_eq!(format_size(500), "500");
        assert_eq!(format_size(999), "999");
        assert_eq!(format_size(1_000), "1 KB");
        assert_eq!(format_size(2048), "2 KB");
        assert_eq!(format_size(5_000_000), "5 MB");
        assert_eq!(format_size(2_000_000_000), "2 GB");
        assert_eq!(format_size(3_000_000_000_000), "3 TB");
    }

    #[test]
    fn test_format_size_truncates() {
        assert_eq!(format_size(1_999_999), "1 MB");
        assert_eq!(format_size(500_107_862_016), "500 GB");
    }

    #[test]
    fn test_accessors_require_read() {
        let mut r = reader(1_000_000, 0, true);

        let err = r.size().unwrap_err();
        assert!(matches!(err, SmartError::SmartQuery { what: "size", .. }));

        r.read().unwrap();
        assert_eq!(r.size().unwrap(), 1_000_000);
        assert_eq!(r.formatted_size().unwrap(), "1 MB");
    }

    #[test]
    fn test_partial_failure_does_not_invalidate_siblings() {
        let mut r = reader(1_000_000, 0, true);
        r.read().unwrap();

        assert!(r.bad_sectors().is_err());
        assert_eq!(r.power_cycles().unwrap(), 12);
        assert_eq!(r.power_on_time().unwrap(), Duration::from_secs(3600));
        assert!((r.temperature().unwrap().as_celsius() - 35.0).abs() < 0.01);
    }

    #[test]
    fn test_identify_unsupported() {
        let mut r = reader(1_000, 0, false);
        r.read().unwrap();

        assert!(!r.identify_supported());
        assert!(matches!(r.identify(), Err(SmartError::Unsupported { feature: "identify", .. })));
    }

    #[test]
    fn test_overall_status_unknown_code() {
        let mut r = reader(1_000, 42, true);
        r.read().unwrap();

        assert_eq!(r.overall().unwrap(), 42);
        let err = r.overall_status().unwrap_err();
        assert_eq!(err.errno(), Some(libc::ERANGE));
    }

    #[test]
    fn test_overall_status_round_trip() {
        for status in OverallStatus::ALL {
            assert_eq!(OverallStatus::try_from(status.value()), Ok(status));
            assert_eq!(status.as_str().parse::<OverallStatus>(), Ok(status));
        }
        assert_eq!(OverallStatus::try_from(6), Err(6));
    }

    #[test]
    fn test_overall_status_ordering() {
        assert!(OverallStatus::Good < OverallStatus::BadSector);
        assert!(OverallStatus::BadSectorMany < OverallStatus::BadStatus);
    }

    #[test]
    fn test_bad_sector_threshold() {
        assert_eq!(bad_sector_threshold(0), 0);
        // 2^20 sectors of 512 bytes
        assert_eq!(bad_sector_threshold(512 << 20), 20 * 1024);
    }

    #[test]
    fn test_derive_overall_priority() {
        let base = HealthInputs { passed: true, size_bytes: 512 << 20, ..Default::default() };
        assert_eq!(derive_overall(&base), OverallStatus::Good);

        let past = HealthInputs { failed_in_past: true, ..base };
        assert_eq!(derive_overall(&past), OverallStatus::BadAttributeInThePast);

        let sector = HealthInputs { bad_sectors: Some(3), ..past };
        assert_eq!(derive_overall(&sector), OverallStatus::BadSector);

        let now = HealthInputs { failing_now: true, ..sector };
        assert_eq!(derive_overall(&now), OverallStatus::BadAttributeNow);

        let many = HealthInputs { bad_sectors: Some(20 * 1024), ..now };
        assert_eq!(derive_overall(&many), OverallStatus::BadSectorMany);

        let failed = HealthInputs { passed: false, ..many };
        assert_eq!(derive_overall(&failed), OverallStatus::BadStatus);
    }

    #[test]
    fn test_size_unit_parse() {
        assert_eq!("mb".parse::<SizeUnit>(), Ok(SizeUnit::Mega));
        assert_eq!(SizeUnit::Giga.divisor(), 1_000_000_000);
        assert!("PB".parse::<SizeUnit>().is_err());
    }
}
