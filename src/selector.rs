//! Network and disk device selection
//!
//! Several devices can expose the same throughput metric (virtual adapters,
//! tunnels, several disks). The selector keeps a cached "best" device and
//! only rescans when the cached one has gone quiet and the cooldown since
//! the last scan has expired:
//!
//! 1. A preferred device name, if present among candidates, always wins.
//! 2. Fast path: the cached device is active, read it.
//! 3. Hysteresis: the cached device is idle but the cooldown is running,
//!    read it anyway.
//! 4. Full scan: score every candidate, keep the best.
//!
//! Score is the sum of the device's throughput readings, minus
//! [`VIRTUAL_PENALTY`] for virtual/loopback names, plus [`SYSTEM_BONUS`] for
//! the boot volume. Ties go to the first device enumerated.

use crate::error::Error;
use crate::hwmon::{HardwareTree, HwSensorType, HwType, Sensor, SensorHandle};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Subtracted from the score of virtual adapters; larger than any real throughput
pub const VIRTUAL_PENALTY: f64 = 1.0e9;

/// Added to the score of the boot/system volume
pub const SYSTEM_BONUS: f64 = 1.0e6;

/// Name fragments of adapters that never carry the user's real traffic
const VIRTUAL_PATTERNS: &[&str] = &[
    "virtual",
    "vmware",
    "virtualbox",
    "hyper-v",
    "vethernet",
    "loopback",
    "pseudo",
    "tunnel",
    "teredo",
    "isatap",
    "6to4",
    "wan miniport",
    "bluetooth",
    "vpn",
    "wintun",
    "wireguard",
    "tailscale",
    "zerotier",
    "tap-",
];

/// Interface-name prefixes of Linux virtual devices
const VIRTUAL_PREFIXES: &[&str] = &["veth", "virbr", "vboxnet", "vmnet", "docker", "br-", "tun", "tap", "wg", "zt"];

/// Name-based virtual check; interface prefixes apply to network adapters only
pub fn is_virtual_name(class: DeviceClass, name: &str) -> bool {
    let lower = name.to_lowercase();
    if VIRTUAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return true;
    }
    class == DeviceClass::Network && (lower == "lo" || VIRTUAL_PREFIXES.iter().any(|p| lower.starts_with(p)))
}

/// Device class handled by a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Network,
    Disk,
}

impl DeviceClass {
    pub fn hw_type(self) -> HwType {
        match self {
            DeviceClass::Network => HwType::Network,
            DeviceClass::Disk => HwType::Storage,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Network => write!(f, "network"),
            DeviceClass::Disk => write!(f, "disk"),
        }
    }
}

impl FromStr for DeviceClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "network" | "net" => Ok(DeviceClass::Network),
            "disk" | "storage" => Ok(DeviceClass::Disk),
            other => Err(Error::Parse(format!("unknown device class: {}", other))),
        }
    }
}

/// Per-device metric served through a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceMetric {
    NetUp,
    NetDown,
    DiskRead,
    DiskWrite,
    DiskActivity,
    DiskTemp,
}

impl DeviceMetric {
    const NETWORK: [DeviceMetric; 2] = [DeviceMetric::NetUp, DeviceMetric::NetDown];
    const DISK: [DeviceMetric; 4] = [
        DeviceMetric::DiskRead,
        DeviceMetric::DiskWrite,
        DeviceMetric::DiskActivity,
        DeviceMetric::DiskTemp,
    ];

    pub fn class(self) -> DeviceClass {
        match self {
            DeviceMetric::NetUp | DeviceMetric::NetDown => DeviceClass::Network,
            _ => DeviceClass::Disk,
        }
    }

    fn for_class(class: DeviceClass) -> &'static [DeviceMetric] {
        match class {
            DeviceClass::Network => &Self::NETWORK,
            DeviceClass::Disk => &Self::DISK,
        }
    }

    /// Throughput metrics contribute to a device's activity score
    fn is_throughput(self) -> bool {
        !matches!(self, DeviceMetric::DiskActivity | DeviceMetric::DiskTemp)
    }

    fn matches(self, sensor: &Sensor) -> bool {
        let name = sensor.name.to_lowercase();
        let has = |patterns: &[&str]| patterns.iter().any(|p| name.contains(p));
        match self {
            DeviceMetric::NetUp => sensor.sensor_type == HwSensorType::Throughput && has(&["upload", "sent", "tx"]),
            DeviceMetric::NetDown => {
                sensor.sensor_type == HwSensorType::Throughput && has(&["download", "received", "rx"])
            }
            DeviceMetric::DiskRead => sensor.sensor_type == HwSensorType::Throughput && has(&["read"]),
            DeviceMetric::DiskWrite => sensor.sensor_type == HwSensorType::Throughput && has(&["write"]),
            DeviceMetric::DiskActivity => sensor.sensor_type == HwSensorType::Load && has(&["activity", "total"]),
            DeviceMetric::DiskTemp => sensor.sensor_type == HwSensorType::Temperature,
        }
    }
}

/// One device that could serve a class's metrics; valid for a single scan
#[derive(Debug, Clone)]
pub struct CandidateDevice {
    pub name: String,
    pub identifier: String,
    pub is_virtual: bool,
    pub is_system: bool,
    pub sensors: Vec<(DeviceMetric, SensorHandle)>,
    pub score: f64,
}

impl CandidateDevice {
    pub fn handle(&self, metric: DeviceMetric) -> Option<&SensorHandle> {
        self.sensors.iter().find(|(m, _)| *m == metric).map(|(_, h)| h)
    }

    pub fn read<S: CandidateSource + ?Sized>(&self, metric: DeviceMetric, source: &S) -> Option<f32> {
        source.read(self.handle(metric)?)
    }

    /// Sum of current throughput readings
    pub fn activity<S: CandidateSource + ?Sized>(&self, source: &S) -> f32 {
        self.sensors
            .iter()
            .filter(|(m, _)| m.is_throughput())
            .filter_map(|(_, h)| source.read(h))
            .filter(|v| v.is_finite() && *v > 0.0)
            .sum()
    }
}

pub fn score<S: CandidateSource + ?Sized>(device: &CandidateDevice, source: &S) -> f64 {
    let mut score = device.activity(source) as f64;
    if device.is_virtual {
        score -= VIRTUAL_PENALTY;
    }
    if device.is_system {
        score += SYSTEM_BONUS;
    }
    score
}

/// Enumerate candidates of `class` in tree order
pub fn enumerate(tree: &HardwareTree, class: DeviceClass) -> Vec<CandidateDevice> {
    let mut devices = Vec::new();
    tree.walk(|hw, path| {
        if hw.hw_type != class.hw_type() {
            return;
        }
        let sensors: Vec<(DeviceMetric, SensorHandle)> = DeviceMetric::for_class(class)
            .iter()
            .filter_map(|metric| {
                let idx = hw.sensors.iter().position(|s| metric.matches(s))?;
                Some((*metric, tree.handle(path, idx)))
            })
            .collect();
        if sensors.is_empty() {
            return;
        }
        devices.push(CandidateDevice {
            name: hw.name.clone(),
            identifier: hw.identifier.clone(),
            is_virtual: is_virtual_name(class, &hw.name),
            is_system: hw.is_system,
            sensors,
            score: 0.0,
        });
    });
    devices
}

/// Where a selector finds candidates and reads their sensors
pub trait CandidateSource {
    fn candidates(&self, class: DeviceClass) -> Vec<CandidateDevice>;

    fn read(&self, handle: &SensorHandle) -> Option<f32>;
}

impl CandidateSource for HardwareTree {
    fn candidates(&self, class: DeviceClass) -> Vec<CandidateDevice> {
        enumerate(self, class)
    }

    fn read(&self, handle: &SensorHandle) -> Option<f32> {
        HardwareTree::read(self, handle)
    }
}

/// Stateful best-device picker for one device class
#[derive(Debug)]
pub struct DeviceSelector {
    class: DeviceClass,
    cooldown: Duration,
    activity_threshold: f32,
    cached: Option<CandidateDevice>,
    last_scan: Option<Instant>,
    scans: u64,
}

impl DeviceSelector {
    pub fn new(class: DeviceClass, cooldown: Duration, activity_threshold: f32) -> Self {
        Self {
            class,
            cooldown,
            activity_threshold,
            cached: None,
            last_scan: None,
            scans: 0,
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Number of full scans performed
    pub fn scans(&self) -> u64 {
        self.scans
    }

    /// Name of the currently selected device
    pub fn current(&self) -> Option<&str> {
        self.cached.as_ref().map(|d| d.name.as_str())
    }

    /// Forget the cached device (its handles belong to a retired tree)
    pub fn reset(&mut self) {
        self.cached = None;
        self.last_scan = None;
    }

    pub fn get_best_value<S: CandidateSource + ?Sized>(
        &mut self,
        metric: DeviceMetric,
        now: Instant,
        preferred: Option<&str>,
        source: &S,
    ) -> Option<f32> {
        if let Some(name) = preferred {
            if let Some(device) = source.candidates(self.class).into_iter().find(|c| c.name == name) {
                return device.read(metric, source);
            }
            debug!("Preferred {} device {:?} not present, selecting automatically", self.class, name);
        }

        match &self.cached {
            Some(device) if device.activity(source) > self.activity_threshold => {
                return device.read(metric, source);
            }
            Some(device) if !self.cooldown_expired(now) => {
                return device.read(metric, source);
            }
            None if !self.cooldown_expired(now) => return None,
            _ => {}
        }

        self.scan(now, source);
        self.cached.as_ref().and_then(|d| d.read(metric, source))
    }

    fn cooldown_expired(&self, now: Instant) -> bool {
        match self.last_scan {
            Some(at) => now.saturating_duration_since(at) >= self.cooldown,
            None => true,
        }
    }

    fn scan<S: CandidateSource + ?Sized>(&mut self, now: Instant, source: &S) {
        self.scans += 1;
        self.last_scan = Some(now);

        let mut best: Option<CandidateDevice> = None;
        for mut candidate in source.candidates(self.class) {
            candidate.score = score(&candidate, source);
            if best.as_ref().map(|b| candidate.score > b.score).unwrap_or(true) {
                best = Some(candidate);
            }
        }

        let previous = self.current().map(str::to_owned);
        let selected = best.as_ref().map(|d| d.name.clone());
        if previous != selected {
            debug!(
                "{} selector: {:?} -> {:?} (score {:?})",
                self.class,
                previous,
                selected,
                best.as_ref().map(|d| d.score)
            );
        }
        self.cached = best;
    }
}
