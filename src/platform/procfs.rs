//! Parsers for /proc text formats
//!
//! Pure functions over file contents so they can be exercised without a
//! live procfs.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Aggregate CPU jiffies from the first line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub total: u64,
}

impl CpuTimes {
    pub fn parse(stat: &str) -> Option<Self> {
        let line = stat.lines().find(|l| l.starts_with("cpu "))?;
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(8)
            .filter_map(|f| f.parse().ok())
            .collect();
        if fields.len() < 4 {
            return None;
        }
        // user nice system idle iowait irq softirq steal
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        let total: u64 = fields.iter().sum();
        Some(Self {
            busy: total.saturating_sub(idle),
            total,
        })
    }

    /// Busy percentage between two samples
    pub fn utilization_since(&self, prev: &CpuTimes) -> Option<f32> {
        let total = self.total.checked_sub(prev.total)?;
        if total == 0 {
            return None;
        }
        let busy = self.busy.saturating_sub(prev.busy);
        Some((busy as f64 / total as f64 * 100.0) as f32)
    }
}

/// Shortest window a rate is computed over
///
/// Two refreshes microseconds apart (a rebuild followed by a tick) would
/// otherwise turn a single packet into megabytes per second.
pub const MIN_RATE_INTERVAL: Duration = Duration::from_millis(100);

/// Per-second rate of a monotonic counter
///
/// A sample closer than [`MIN_RATE_INTERVAL`] to the previous one is not
/// diffed; the last rate is repeated and the older sample kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateTracker {
    sample: Option<(f64, Instant)>,
    rate: Option<f32>,
}

impl RateTracker {
    pub fn update(&mut self, counter: f64, now: Instant) -> Option<f32> {
        let Some((last, at)) = self.sample else {
            self.sample = Some((counter, now));
            return None;
        };
        let dt = now.saturating_duration_since(at);
        if dt < MIN_RATE_INTERVAL {
            return self.rate;
        }
        self.sample = Some((counter, now));
        // Counter reset or wrap
        self.rate = (counter >= last).then(|| ((counter - last) / dt.as_secs_f64()) as f32);
        self.rate
    }
}

/// One row of `/proc/diskstats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskStat {
    pub sectors_read: u64,
    pub sectors_written: u64,
    /// Milliseconds spent doing I/O
    pub io_ticks: u64,
}

/// Sector size used by diskstats regardless of the device's physical sectors
pub const SECTOR_BYTES: u64 = 512;

impl DiskStat {
    pub fn read_bytes(&self) -> u64 {
        self.sectors_read * SECTOR_BYTES
    }

    pub fn written_bytes(&self) -> u64 {
        self.sectors_written * SECTOR_BYTES
    }
}

/// Parse `/proc/diskstats` into a map keyed by device name
pub fn parse_diskstats(content: &str) -> HashMap<String, DiskStat> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 13 {
                return None;
            }
            let stat = DiskStat {
                sectors_read: parts[5].parse().ok()?,
                sectors_written: parts[9].parse().ok()?,
                io_ticks: parts[12].parse().ok()?,
            };
            Some((parts[2].to_string(), stat))
        })
        .collect()
}

/// Block devices that never correspond to a physical drive
pub fn is_virtual_block_device(name: &str) -> bool {
    const PREFIXES: &[&str] = &["loop", "ram", "zram", "dm-", "md", "sr", "fd", "nbd"];
    PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Source device of the `/` mount in `/proc/mounts`
pub fn root_mount_source(mounts: &str) -> Option<String> {
    mounts.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let source = parts.next()?;
        let target = parts.next()?;
        (target == "/").then(|| source.to_string())
    })
}
