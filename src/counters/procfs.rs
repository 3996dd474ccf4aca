//! Counter system over procfs and cpufreq

use super::{Counter, CounterCategory, CounterSystem, RawCounter, StaticFact};
use crate::error::{Error, Result};
use crate::platform::common::{parse_keyed_value, path_exists, read_file_f64};
use crate::platform::procfs::{self, CpuTimes, RateTracker};
use crate::uptime::UptimeSample;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub struct ProcfsCounters {
    sys: PathBuf,
    proc_root: PathBuf,
}

impl ProcfsCounters {
    pub fn new() -> Self {
        Self::with_roots("/sys", "/proc")
    }

    pub fn with_roots(sys: impl Into<PathBuf>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            sys: sys.into(),
            proc_root: proc_root.into(),
        }
    }

    fn cpufreq_files(&self, name: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.sys.join("devices/system/cpu")) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                let n = e.file_name();
                let n = n.to_string_lossy();
                n.strip_prefix("cpu").map(|d| d.chars().all(|c| c.is_ascii_digit()) && !d.is_empty()).unwrap_or(false)
            })
            .map(|e| e.path().join("cpufreq").join(name))
            .filter(|p| p.exists())
            .collect();
        files.sort();
        files
    }

    /// Base (non-boost) clock of cpu0 in kHz
    fn base_clock_khz(&self) -> Option<f64> {
        let cpu0 = self.sys.join("devices/system/cpu/cpu0/cpufreq");
        read_file_f64(cpu0.join("base_frequency"))
            .or_else(|_| read_file_f64(cpu0.join("cpuinfo_max_freq")))
            .ok()
            .filter(|v| *v > 0.0)
    }
}

impl Default for ProcfsCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSystem for ProcfsCounters {
    fn name(&self) -> &str {
        "procfs"
    }

    fn category_exists(&self, category: CounterCategory) -> bool {
        match category {
            CounterCategory::Processor => path_exists(self.proc_root.join("stat")),
            CounterCategory::Memory => path_exists(self.proc_root.join("meminfo")),
            CounterCategory::PhysicalDisk => path_exists(self.proc_root.join("diskstats")),
        }
    }

    fn open(&self, counter: RawCounter) -> Result<Box<dyn Counter>> {
        match counter {
            RawCounter::ProcessorUtility => Ok(Box::new(CpuUtility {
                stat: self.proc_root.join("stat"),
                prev: None,
            })),
            RawCounter::ProcessorPerformance => {
                let base_khz = self
                    .base_clock_khz()
                    .ok_or_else(|| Error::Unsupported("cpufreq base frequency".into()))?;
                let files = self.cpufreq_files("scaling_cur_freq");
                if files.is_empty() {
                    return Err(Error::Unsupported("cpufreq scaling_cur_freq".into()));
                }
                Ok(Box::new(CpuPerformance { files, base_khz }))
            }
            RawCounter::AvailableMemory => Ok(Box::new(AvailableMemory {
                meminfo: self.proc_root.join("meminfo"),
            })),
            RawCounter::DiskReadBytes | RawCounter::DiskWriteBytes => Ok(Box::new(DiskBytes {
                diskstats: self.proc_root.join("diskstats"),
                sys_block: self.sys.join("block"),
                write: counter == RawCounter::DiskWriteBytes,
                rate: RateTracker::default(),
            })),
        }
    }

    fn static_fact(&self, fact: StaticFact) -> Option<f64> {
        match fact {
            StaticFact::CpuBaseClockMhz => self.base_clock_khz().map(|khz| khz / 1000.0),
            StaticFact::TotalMemoryMb => {
                let meminfo = fs::read_to_string(self.proc_root.join("meminfo")).ok()?;
                parse_keyed_value(&meminfo, "MemTotal").map(|kb| kb as f64 / 1024.0)
            }
        }
    }

    fn uptime_sample(&self) -> Option<UptimeSample> {
        let content = fs::read_to_string(self.proc_root.join("uptime")).ok()?;
        let secs: f64 = content.split_whitespace().next()?.parse().ok()?;
        Some(UptimeSample {
            boot_uptime: Duration::from_secs_f64(secs.max(0.0)),
            // No hybrid shutdown on Linux; kernel uptime is the session
            session_age: None,
        })
    }
}

struct CpuUtility {
    stat: PathBuf,
    prev: Option<CpuTimes>,
}

impl Counter for CpuUtility {
    fn next_value(&mut self) -> Result<f32> {
        let content = fs::read_to_string(&self.stat)?;
        let current = CpuTimes::parse(&content).ok_or_else(|| Error::Parse("/proc/stat cpu line".into()))?;
        let prev = self.prev.replace(current);
        Ok(prev.and_then(|p| current.utilization_since(&p)).unwrap_or(0.0))
    }
}

struct CpuPerformance {
    files: Vec<PathBuf>,
    base_khz: f64,
}

impl Counter for CpuPerformance {
    fn next_value(&mut self) -> Result<f32> {
        let readings: Vec<f64> = self.files.iter().filter_map(|f| read_file_f64(f).ok()).collect();
        if readings.is_empty() {
            return Err(Error::Counter("no cpufreq readings".into()));
        }
        let avg = readings.iter().sum::<f64>() / readings.len() as f64;
        Ok((avg / self.base_khz * 100.0) as f32)
    }
}

struct AvailableMemory {
    meminfo: PathBuf,
}

impl Counter for AvailableMemory {
    fn next_value(&mut self) -> Result<f32> {
        let content = fs::read_to_string(&self.meminfo)?;
        let kb = parse_keyed_value(&content, "MemAvailable")
            .ok_or_else(|| Error::Parse("MemAvailable missing".into()))?;
        Ok((kb as f64 / 1024.0) as f32)
    }
}

struct DiskBytes {
    diskstats: PathBuf,
    sys_block: PathBuf,
    write: bool,
    rate: RateTracker,
}

impl DiskBytes {
    fn total_bytes(&self) -> Result<u64> {
        let content = fs::read_to_string(&self.diskstats)?;
        let stats = procfs::parse_diskstats(&content);
        // Whole disks only (partitions have no /sys/block entry); they would double count
        let sys_block = &self.sys_block;
        Ok(stats
            .iter()
            .filter(|(name, _)| !procfs::is_virtual_block_device(name))
            .filter(|(name, _)| !sys_block.exists() || sys_block.join(name).exists())
            .map(|(_, s)| if self.write { s.written_bytes() } else { s.read_bytes() })
            .sum())
    }
}

impl Counter for DiskBytes {
    fn next_value(&mut self) -> Result<f32> {
        let total = self.total_bytes()?;
        Ok(self.rate.update(total as f64, Instant::now()).unwrap_or(0.0))
    }
}
