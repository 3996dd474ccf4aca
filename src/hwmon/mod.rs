// Hardware tree model and platform sensor providers
//
// A provider enumerates hardware nodes (CPU, GPUs, disks, adapters, fan
// controllers...) each exposing typed sensors, and refreshes their values on
// request. The tree it produces is immutable in shape: sensor values live in
// atomics so the poll thread can refresh them while readers hold a shared
// reference. Changing the shape means scanning again and building a new tree
// with a new generation number.
//
// Supported providers:
// - Linux: /sys/class/hwmon, /proc/stat, /proc/meminfo, /proc/diskstats,
//   /sys/class/net, /sys/class/power_supply, RAPL powercap
// - Elsewhere: NullProvider (empty tree, every metric unavailable)

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(test)]
pub(crate) mod fixture;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Type of sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HwSensorType {
    Temperature,
    Voltage,
    Fan,
    Power,
    Clock,
    Load,
    Level, // Charge level, wear level (percent)
    Data,  // GB
    SmallData, // MB
    Throughput, // bytes per second
    Control, // PWM control values
    Energy,  // Energy counters (Joules)
}

/// Type of hardware component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HwType {
    Cpu,
    GpuDiscrete,
    GpuIntegrated,
    Motherboard,
    Controller, // Fan/pump/AIO controllers
    Storage,
    Memory,
    Network,
    Battery,
    Psu,
    Other,
}

impl HwType {
    /// Visit order when several nodes could satisfy the same key (lower first)
    pub fn priority(self) -> u8 {
        match self {
            HwType::GpuDiscrete => 0,
            HwType::GpuIntegrated => 1,
            _ => 2,
        }
    }

    /// Bit used in hardware-class demand masks
    pub(crate) fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Lock-free f32 cell; NaN means "no reading"
pub struct SensorValue(AtomicU32);

impl SensorValue {
    pub fn new() -> Self {
        Self(AtomicU32::new(f32::NAN.to_bits()))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for SensorValue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Hardware sensor
#[derive(Debug)]
pub struct Sensor {
    pub name: String,
    /// Provider-private locator, stable across scans for the same sensor
    pub identifier: String,
    pub sensor_type: HwSensorType,
    value: SensorValue,
}

impl Sensor {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>, sensor_type: HwSensorType) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            sensor_type,
            value: SensorValue::new(),
        }
    }

    /// Current reading; `None` until the provider has produced one
    pub fn value(&self) -> Option<f32> {
        let v = self.value.get();
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    pub fn set_value(&self, value: f32) {
        self.value.set(value);
    }

    pub fn clear(&self) {
        self.value.set(f32::NAN);
    }
}

/// Hardware node: a device exposing sensors, possibly with sub-devices
#[derive(Debug)]
pub struct Hardware {
    pub name: String,
    pub identifier: String,
    pub hw_type: HwType,
    /// Boot/system volume (storage) or primary device of its class
    pub is_system: bool,
    pub sensors: Vec<Sensor>,
    pub sub_hardware: Vec<Hardware>,
}

impl Hardware {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>, hw_type: HwType) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            hw_type,
            is_system: false,
            sensors: Vec::new(),
            sub_hardware: Vec::new(),
        }
    }

    pub fn with_sensor(mut self, sensor: Sensor) -> Self {
        self.sensors.push(sensor);
        self
    }

    pub fn with_sub_hardware(mut self, hardware: Hardware) -> Self {
        self.sub_hardware.push(hardware);
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// True if this node or any sub-hardware has a type in `mask`
    pub(crate) fn matches_mask(&self, mask: u32) -> bool {
        self.hw_type.bit() & mask != 0 || self.sub_hardware.iter().any(|h| h.matches_mask(mask))
    }

    fn sensor_count(&self) -> usize {
        self.sensors.len() + self.sub_hardware.iter().map(Hardware::sensor_count).sum::<usize>()
    }
}

/// Non-owning reference to a sensor in one generation of the tree
///
/// A handle resolves only against the tree generation it was taken from;
/// after a rebuild it reads as `None` until re-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorHandle {
    generation: u64,
    path: Box<[u16]>,
    sensor: u16,
}

impl SensorHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Options controlling which expensive subsystems a scan enumerates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Motherboard Super I/O fan headers
    pub fans: bool,
    /// External fan/pump/AIO controllers
    pub controllers: bool,
}

/// Snapshot of the hardware tree for one generation
#[derive(Debug)]
pub struct HardwareTree {
    generation: u64,
    hardware: Vec<Hardware>,
    built_at: Instant,
}

impl HardwareTree {
    pub fn new(generation: u64, hardware: Vec<Hardware>) -> Self {
        Self {
            generation,
            hardware,
            built_at: Instant::now(),
        }
    }

    /// Tree with no hardware (every metric unavailable)
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> Instant {
        self.built_at
    }

    pub fn hardware(&self) -> &[Hardware] {
        &self.hardware
    }

    pub fn sensor_count(&self) -> usize {
        self.hardware.iter().map(Hardware::sensor_count).sum()
    }

    /// Depth-first traversal in enumeration order; sub-hardware follows its parent
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&Hardware, &[u16]),
    {
        let mut path = Vec::with_capacity(4);
        for (i, hw) in self.hardware.iter().enumerate() {
            path.push(i as u16);
            visit(hw, &mut path, &mut f);
            path.pop();
        }
    }

    /// Depth-first traversal with top-level nodes ordered by [`HwType::priority`]
    ///
    /// Nodes of equal priority keep their enumeration order.
    pub fn walk_prioritized<F>(&self, mut f: F)
    where
        F: FnMut(&Hardware, &[u16]),
    {
        let mut order: Vec<usize> = (0..self.hardware.len()).collect();
        order.sort_by_key(|&i| self.hardware[i].hw_type.priority());

        let mut path = Vec::with_capacity(4);
        for i in order {
            path.push(i as u16);
            visit(&self.hardware[i], &mut path, &mut f);
            path.pop();
        }
    }

    /// Node at `path` (as passed to walk callbacks)
    pub fn node(&self, path: &[u16]) -> Option<&Hardware> {
        let (first, rest) = path.split_first()?;
        let mut node = self.hardware.get(*first as usize)?;
        for idx in rest {
            node = node.sub_hardware.get(*idx as usize)?;
        }
        Some(node)
    }

    /// Handle to sensor `index` of the node at `path`
    pub fn handle(&self, path: &[u16], index: usize) -> SensorHandle {
        SensorHandle {
            generation: self.generation,
            path: path.into(),
            sensor: index as u16,
        }
    }

    /// Resolve a handle; `None` if it belongs to another generation
    pub fn sensor(&self, handle: &SensorHandle) -> Option<&Sensor> {
        if handle.generation != self.generation {
            return None;
        }
        self.node(&handle.path)?.sensors.get(handle.sensor as usize)
    }

    /// Owning node of a handle
    pub fn owner(&self, handle: &SensorHandle) -> Option<&Hardware> {
        if handle.generation != self.generation {
            return None;
        }
        self.node(&handle.path)
    }

    /// Current reading behind a handle
    pub fn read(&self, handle: &SensorHandle) -> Option<f32> {
        self.sensor(handle)?.value()
    }

    /// First sensor (in walk order) satisfying `pred`
    pub fn find_sensor<P>(&self, mut pred: P) -> Option<SensorHandle>
    where
        P: FnMut(&Hardware, &Sensor) -> bool,
    {
        let mut found = None;
        self.walk(|hw, path| {
            if found.is_some() {
                return;
            }
            if let Some(idx) = hw.sensors.iter().position(|s| pred(hw, s)) {
                found = Some(self.handle(path, idx));
            }
        });
        found
    }
}

fn visit<F>(hw: &Hardware, path: &mut Vec<u16>, f: &mut F)
where
    F: FnMut(&Hardware, &[u16]),
{
    f(hw, path);
    for (i, sub) in hw.sub_hardware.iter().enumerate() {
        path.push(i as u16);
        visit(sub, path, f);
        path.pop();
    }
}

/// Platform sensor library
///
/// `scan` is the expensive enumeration that fixes the tree shape; `update`
/// must be called on a node before its values are fresh.
pub trait SensorProvider: Send {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Enumerate all hardware
    fn scan(&mut self, options: &ScanOptions) -> Result<Vec<Hardware>>;

    /// Refresh the sensor values of `hardware` and its sub-hardware
    fn update(&mut self, hardware: &Hardware) -> Result<()>;
}

/// Provider for platforms without a sensor library
#[derive(Debug, Default)]
pub struct NullProvider;

impl SensorProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    fn scan(&mut self, _options: &ScanOptions) -> Result<Vec<Hardware>> {
        Ok(Vec::new())
    }

    fn update(&mut self, _hardware: &Hardware) -> Result<()> {
        Ok(())
    }
}

/// Native provider for the current platform
pub fn platform_provider() -> Box<dyn SensorProvider> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxSensorProvider::new())
    }

    #[cfg(not(target_os = "linux"))]
    {
        log::warn!("No native sensor provider for this platform; sensor metrics unavailable");
        Box::new(NullProvider)
    }
}
