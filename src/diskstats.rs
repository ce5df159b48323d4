//! Block device enumeration and I/O counters.
//!
//! Parses `/proc/diskstats` on Linux. Partitions and virtual devices (loop,
//! ramdisk, device-mapper, optical, software RAID) are ignored for
//! enumeration but still carry counters.

use crate::device::SizeUnit;
use crate::error::{Result, SmartError};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Size of a sector as counted by `/proc/diskstats`, independent of the
/// device's physical sector size.
pub const SECTOR_SIZE: u64 = 512;

/// Default kernel statistics file.
pub const DISKSTATS_PATH: &str = "/proc/diskstats";

/// Name prefixes of kernel block devices with no S.M.A.R.T. data behind them.
const VIRTUAL_PREFIXES: [&str; 7] = ["loop", "ram", "zram", "dm-", "sr", "md", "nbd"];

/// Reads a file with a timeout so a hung device cannot block the caller.
fn read_file_with_timeout(path: &Path, timeout: Duration) -> Result<String> {
    let owned = path.to_path_buf();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let _ = tx.send(std::fs::read_to_string(&owned));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result?),
        Err(_) => Err(SmartError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("reading {} timed out", path.display()),
        ))),
    }
}

/// A block device as listed by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Major number.
    pub major: u32,
    /// Minor number; 0 for whole disks.
    pub minor: u32,
    /// Kernel name (e.g. "sda").
    pub name: String,
}

impl BlockDevice {
    /// Creates a device entry.
    #[must_use]
    pub fn new(major: u32, minor: u32, name: impl Into<String>) -> Self {
        Self { major, minor, name: name.into() }
    }

    /// True if this device is a partition of `disk` ("sda1" of "sda",
    /// "nvme0n1p2" of "nvme0n1"). Disks whose name ends in a digit take a
    /// `p` separator, so "nvme0n10" is not a partition of "nvme0n1".
    #[must_use]
    pub fn is_partition_of(&self, disk: &BlockDevice) -> bool {
        let Some(rest) = self.name.strip_prefix(disk.name.as_str()) else {
            return false;
        };
        let rest = if disk.name.ends_with(|c: char| c.is_ascii_digit()) {
            match rest.strip_prefix('p') {
                Some(number) => number,
                None => return false,
            }
        } else {
            rest
        };
        !disk.name.is_empty() && !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
    }

    /// True for loop, ramdisk, device-mapper, optical, RAID and network
    /// block devices.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        VIRTUAL_PREFIXES.iter().any(|p| self.name.starts_with(p))
    }

    /// Device node path, `/dev/<name>`.
    #[must_use]
    pub fn device_path(&self) -> PathBuf {
        Path::new("/dev").join(&self.name)
    }
}

/// One parsed `/proc/diskstats` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStat {
    /// The device this line describes.
    pub device: BlockDevice,
    /// Reads completed.
    pub reads_completed: u64,
    /// Sectors read.
    pub sectors_read: u64,
    /// Writes completed.
    pub writes_completed: u64,
    /// Sectors written.
    pub sectors_written: u64,
}

/// Parses the content of `/proc/diskstats`.
///
/// Lines with fewer than 10 fields or unparseable device numbers are skipped;
/// unparseable counters read as zero.
#[must_use]
pub fn parse_diskstats(content: &str) -> Vec<DiskStat> {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let counter = |i: usize| fields[i].parse::<u64>().unwrap_or(0);
            Some(DiskStat {
                device: BlockDevice::new(
                    fields[0].parse().ok()?,
                    fields[1].parse().ok()?,
                    fields[2],
                ),
                reads_completed: counter(3),
                sectors_read: counter(5),
                writes_completed: counter(7),
                sectors_written: counter(9),
            })
        })
        .collect()
}

/// Keeps whole physical disks only: named, non-virtual devices with minor 0,
/// or that are not a partition of another listed device.
#[must_use]
pub fn whole_disks(devices: Vec<BlockDevice>) -> Vec<BlockDevice> {
    let is_whole = |d: &BlockDevice| {
        !d.name.is_empty()
            && !d.is_virtual()
            && (d.minor == 0 || !devices.iter().any(|other| d.is_partition_of(other)))
    };
    let keep: Vec<bool> = devices.iter().map(is_whole).collect();
    devices.into_iter().zip(keep).filter_map(|(d, keep)| keep.then_some(d)).collect()
}

/// Source of block devices and their I/O counters.
pub trait DiskLister: Send + Sync {
    /// All block devices known to the system, partitions included.
    ///
    /// # Errors
    ///
    /// Returns an error if the device list cannot be read.
    fn list(&self) -> Result<Vec<BlockDevice>>;

    /// Current counters for the device called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the counters cannot be read or `name` is unknown.
    fn counters(&self, name: &str) -> Result<IoCounters>;
}

/// [`DiskLister`] over `/proc/diskstats`.
#[derive(Debug, Clone)]
pub struct ProcDiskstats {
    path: PathBuf,
    timeout: Duration,
}

impl ProcDiskstats {
    /// Reads [`DISKSTATS_PATH`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_path(DISKSTATS_PATH)
    }

    /// Reads an alternative file in the same format.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), timeout: Duration::from_secs(2) }
    }

    fn load(&self) -> Result<Vec<DiskStat>> {
        read_file_with_timeout(&self.path, self.timeout).map(|c| parse_diskstats(&c))
    }
}

impl Default for ProcDiskstats {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskLister for ProcDiskstats {
    fn list(&self) -> Result<Vec<BlockDevice>> {
        Ok(self.load()?.into_iter().map(|s| s.device).collect())
    }

    fn counters(&self, name: &str) -> Result<IoCounters> {
        self.load()?
            .into_iter()
            .find(|s| s.device.name == name)
            .map(|s| IoCounters::new(s.sectors_read, s.sectors_written))
            .ok_or_else(|| {
                SmartError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{name} not listed in {}", self.path.display()),
                ))
            })
    }
}

/// Snapshot of a device's sector counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoCounters {
    /// Sectors read since boot.
    pub read_sectors: u64,
    /// Sectors written since boot.
    pub write_sectors: u64,
    /// When the snapshot was taken.
    pub taken_at: Instant,
}

impl IoCounters {
    /// Snapshot taken now.
    #[must_use]
    pub fn new(read_sectors: u64, write_sectors: u64) -> Self {
        Self::at(read_sectors, write_sectors, Instant::now())
    }

    /// Snapshot taken at `taken_at`.
    #[must_use]
    pub fn at(read_sectors: u64, write_sectors: u64, taken_at: Instant) -> Self {
        Self { read_sectors, write_sectors, taken_at }
    }

    /// Activity since `earlier`. Counters that went backwards (device reset,
    /// wrap) yield zero.
    #[must_use]
    pub fn delta(&self, earlier: &Self) -> IoDelta {
        IoDelta {
            read_sectors: self.read_sectors.saturating_sub(earlier.read_sectors),
            write_sectors: self.write_sectors.saturating_sub(earlier.write_sectors),
            elapsed: self.taken_at.saturating_duration_since(earlier.taken_at),
        }
    }
}

/// Difference between two [`IoCounters`] snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoDelta {
    /// Sectors read in the interval.
    pub read_sectors: u64,
    /// Sectors written in the interval.
    pub write_sectors: u64,
    /// Interval length.
    pub elapsed: Duration,
}

impl IoDelta {
    /// Bytes read, expressed in `unit` (truncating).
    #[must_use]
    pub fn read_in(&self, unit: SizeUnit) -> u64 {
        self.read_sectors.saturating_mul(SECTOR_SIZE) / unit.divisor()
    }

    /// Bytes written, expressed in `unit` (truncating).
    #[must_use]
    pub fn write_in(&self, unit: SizeUnit) -> u64 {
        self.write_sectors.saturating_mul(SECTOR_SIZE) / unit.divisor()
    }

    /// Read rate in `unit` per second; zero for an empty interval.
    #[must_use]
    pub fn read_rate(&self, unit: SizeUnit) -> f64 {
        self.rate(self.read_sectors, unit)
    }

    /// Write rate in `unit` per second; zero for an empty interval.
    #[must_use]
    pub fn write_rate(&self, unit: SizeUnit) -> f64 {
        self.rate(self.write_sectors, unit)
    }

    fn rate(&self, sectors: u64, unit: SizeUnit) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (sectors as f64 * SECTOR_SIZE as f64 / unit.divisor() as f64) / secs
    }
}
