//! Semantic sensor keys
//!
//! A [`SensorKey`] names one semantic quantity (`"CPU.Temp"`, `"DISK.Read"`)
//! independently of how any particular sensor library labels it. Keys are
//! interned against a static table, so the same key always denotes the same
//! quantity and unit across catalog rebuilds. Each entry carries the metadata
//! the resolver needs: plausibility bounds, whether the key has an adaptive
//! maximum, and which source (counters, device selector, composite) can serve
//! it.

use crate::counters::CounterMetric;
use crate::hwmon::HwType;
use crate::selector::DeviceMetric;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Unit of a key's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Percent,
    Celsius,
    Megahertz,
    Watts,
    Volts,
    Rpm,
    Megabytes,
    Gigabytes,
    BytesPerSecond,
    Seconds,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Percent => "%",
            Unit::Celsius => "°C",
            Unit::Megahertz => "MHz",
            Unit::Watts => "W",
            Unit::Volts => "V",
            Unit::Rpm => "RPM",
            Unit::Megabytes => "MB",
            Unit::Gigabytes => "GB",
            Unit::BytesPerSecond => "B/s",
            Unit::Seconds => "s",
        }
    }
}

/// Sanity range for a key; readings outside it are treated as absent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f32,
    pub max: f32,
    pub require_positive: bool,
}

impl Bounds {
    const fn range(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            require_positive: false,
        }
    }

    const fn positive(max: f32) -> Self {
        Self {
            min: 0.0,
            max,
            require_positive: true,
        }
    }
}

/// Percentages may overshoot slightly from rounding in the source
const PERCENT: Bounds = Bounds::range(0.0, 100.5);
const TEMPERATURE: Bounds = Bounds::positive(150.0);
const POWER: Bounds = Bounds::range(0.0, 2000.0);
const FAN: Bounds = Bounds::range(0.0, 20_000.0);
const THROUGHPUT: Bounds = Bounds::range(0.0, 1.0e11);
const MEMORY_GB: Bounds = Bounds::range(0.0, 16_384.0);
const VRAM_MB: Bounds = Bounds::range(0.0, 1_048_576.0);

/// Unit normalization applied to raw readings before bounds checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalize {
    None,
    /// Readings reported in bytes or KB are brought back to MB. The unit is
    /// inferred from the raw reading of the given capacity key, so a small
    /// used amount in bytes is scaled the same way as its total.
    MegabytesBy(SensorKey),
}

/// Bytes-to-MB cutoff: no GPU has a terabyte of VRAM
const KB_THRESHOLD: f32 = 1_048_576.0;
const BYTES_THRESHOLD: f32 = 1_073_741_824.0;

/// Divisor that brings a reading to MB, judged from a capacity in the same unit
pub fn megabyte_divisor(reference: f32) -> f32 {
    if reference > BYTES_THRESHOLD {
        1_048_576.0
    } else if reference > KB_THRESHOLD {
        1024.0
    } else {
        1.0
    }
}

impl Normalize {
    /// `reference` is the raw reading of the capacity key, if any
    pub fn apply(self, value: f32, reference: f32) -> f32 {
        match self {
            Normalize::None => value,
            Normalize::MegabytesBy(_) => value / megabyte_divisor(reference),
        }
    }
}

/// Keys computed from other keys through the same resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    /// `used / total * 100`
    Percent { used: SensorKey, total: SensorKey },
    /// `a + b`
    Sum(SensorKey, SensorKey),
}

/// Static metadata for one key
#[derive(Debug)]
pub struct KeyInfo {
    pub name: &'static str,
    pub unit: Unit,
    /// Hardware classes that must be refreshed for this key
    pub hardware: &'static [HwType],
    pub bounds: Bounds,
    pub normalize: Normalize,
    /// Track the highest value ever seen for percentage-style scaling
    pub adaptive_max: bool,
    pub counter: Option<CounterMetric>,
    pub device: Option<DeviceMetric>,
    pub composite: Option<Composite>,
}

impl KeyInfo {
    /// Plausibility filter: `None` if the reading is NaN or outside bounds
    pub fn accept(&self, value: f32) -> Option<f32> {
        if !value.is_finite() {
            return None;
        }
        let b = &self.bounds;
        if b.require_positive && value <= 0.0 {
            return None;
        }
        if value < b.min || value > b.max {
            return None;
        }
        if self.unit == Unit::Percent {
            return Some(value.min(100.0));
        }
        Some(value)
    }

    pub(crate) fn demand_mask(&self) -> u32 {
        self.hardware.iter().fold(0, |mask, hw| mask | hw.bit())
    }
}

/// Interned semantic metric identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorKey(u16);

impl SensorKey {
    pub const CPU_LOAD: SensorKey = SensorKey(0);
    pub const CPU_TEMP: SensorKey = SensorKey(1);
    pub const CPU_CLOCK: SensorKey = SensorKey(2);
    pub const CPU_POWER: SensorKey = SensorKey(3);
    pub const CPU_VOLTAGE: SensorKey = SensorKey(4);
    pub const GPU_LOAD: SensorKey = SensorKey(5);
    pub const GPU_TEMP: SensorKey = SensorKey(6);
    pub const GPU_HOTSPOT: SensorKey = SensorKey(7);
    pub const GPU_CLOCK: SensorKey = SensorKey(8);
    pub const GPU_MEM_CLOCK: SensorKey = SensorKey(9);
    pub const GPU_POWER: SensorKey = SensorKey(10);
    pub const GPU_FAN: SensorKey = SensorKey(11);
    pub const GPU_VRAM_USED: SensorKey = SensorKey(12);
    pub const GPU_VRAM_TOTAL: SensorKey = SensorKey(13);
    pub const GPU_VRAM: SensorKey = SensorKey(14);
    pub const MEM_LOAD: SensorKey = SensorKey(15);
    pub const MEM_USED: SensorKey = SensorKey(16);
    pub const MEM_AVAILABLE: SensorKey = SensorKey(17);
    pub const MEM_TOTAL: SensorKey = SensorKey(18);
    pub const DISK_READ: SensorKey = SensorKey(19);
    pub const DISK_WRITE: SensorKey = SensorKey(20);
    pub const DISK_ACTIVITY: SensorKey = SensorKey(21);
    pub const DISK_TEMP: SensorKey = SensorKey(22);
    pub const NET_UP: SensorKey = SensorKey(23);
    pub const NET_DOWN: SensorKey = SensorKey(24);
    pub const NET_TOTAL: SensorKey = SensorKey(25);
    pub const FAN_CPU: SensorKey = SensorKey(26);
    pub const FAN_PUMP: SensorKey = SensorKey(27);
    pub const FAN_CASE: SensorKey = SensorKey(28);
    pub const MOBO_TEMP: SensorKey = SensorKey(29);
    pub const BAT_LEVEL: SensorKey = SensorKey(30);
    pub const BAT_RATE: SensorKey = SensorKey(31);
    pub const SYS_UPTIME: SensorKey = SensorKey(32);

    /// Look up a key by name (ASCII case-insensitive)
    pub fn parse(name: &str) -> Option<SensorKey> {
        KEYS.iter()
            .position(|info| info.name.eq_ignore_ascii_case(name))
            .map(|idx| SensorKey(idx as u16))
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn info(self) -> &'static KeyInfo {
        &KEYS[self.0 as usize]
    }

    /// Every known key, in table order
    pub fn all() -> impl Iterator<Item = SensorKey> {
        (0..KEYS.len() as u16).map(SensorKey)
    }
}

impl fmt::Debug for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorKey({})", self.name())
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for SensorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for SensorKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        SensorKey::parse(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown sensor key: {}", name)))
    }
}

const CPU: &[HwType] = &[HwType::Cpu];
const GPU: &[HwType] = &[HwType::GpuDiscrete, HwType::GpuIntegrated];
const MEMORY: &[HwType] = &[HwType::Memory];
const STORAGE: &[HwType] = &[HwType::Storage];
const NETWORK: &[HwType] = &[HwType::Network];
const FANS: &[HwType] = &[HwType::Motherboard, HwType::Controller];
const BOARD: &[HwType] = &[HwType::Motherboard];
const BATTERY: &[HwType] = &[HwType::Battery];

const fn key(name: &'static str, unit: Unit, hardware: &'static [HwType], bounds: Bounds) -> KeyInfo {
    KeyInfo {
        name,
        unit,
        hardware,
        bounds,
        normalize: Normalize::None,
        adaptive_max: false,
        counter: None,
        device: None,
        composite: None,
    }
}

impl KeyInfo {
    const fn adaptive(mut self) -> Self {
        self.adaptive_max = true;
        self
    }

    const fn counter(mut self, metric: CounterMetric) -> Self {
        self.counter = Some(metric);
        self
    }

    const fn device(mut self, metric: DeviceMetric) -> Self {
        self.device = Some(metric);
        self
    }

    const fn composite(mut self, composite: Composite) -> Self {
        self.composite = Some(composite);
        self
    }

    const fn megabytes_by(mut self, reference: SensorKey) -> Self {
        self.normalize = Normalize::MegabytesBy(reference);
        self
    }
}

// Order must match the SensorKey constants above.
static KEYS: [KeyInfo; 33] = [
    key("CPU.Load", Unit::Percent, CPU, PERCENT).counter(CounterMetric::CpuLoad),
    key("CPU.Temp", Unit::Celsius, CPU, TEMPERATURE),
    key("CPU.Clock", Unit::Megahertz, CPU, Bounds::positive(10_000.0))
        .adaptive()
        .counter(CounterMetric::CpuClock),
    key("CPU.Power", Unit::Watts, CPU, POWER).adaptive(),
    key("CPU.Voltage", Unit::Volts, CPU, Bounds::positive(5.0)),
    key("GPU.Load", Unit::Percent, GPU, PERCENT),
    key("GPU.Temp", Unit::Celsius, GPU, TEMPERATURE),
    key("GPU.HotSpot", Unit::Celsius, GPU, TEMPERATURE),
    key("GPU.Clock", Unit::Megahertz, GPU, Bounds::positive(6000.0)).adaptive(),
    key("GPU.MemClock", Unit::Megahertz, GPU, Bounds::positive(30_000.0)).adaptive(),
    key("GPU.Power", Unit::Watts, GPU, POWER).adaptive(),
    key("GPU.Fan", Unit::Rpm, GPU, FAN).adaptive(),
    key("GPU.VRAM.Used", Unit::Megabytes, GPU, VRAM_MB).megabytes_by(SensorKey::GPU_VRAM_TOTAL),
    key("GPU.VRAM.Total", Unit::Megabytes, GPU, Bounds::positive(1_048_576.0)).megabytes_by(SensorKey::GPU_VRAM_TOTAL),
    key("GPU.VRAM", Unit::Percent, GPU, PERCENT).composite(Composite::Percent {
        used: SensorKey::GPU_VRAM_USED,
        total: SensorKey::GPU_VRAM_TOTAL,
    }),
    key("MEM.Load", Unit::Percent, MEMORY, PERCENT).counter(CounterMetric::MemLoad),
    key("MEM.Used", Unit::Gigabytes, MEMORY, MEMORY_GB).counter(CounterMetric::MemUsed),
    key("MEM.Available", Unit::Gigabytes, MEMORY, MEMORY_GB).counter(CounterMetric::MemAvailable),
    key("MEM.Total", Unit::Gigabytes, MEMORY, MEMORY_GB)
        .composite(Composite::Sum(SensorKey::MEM_USED, SensorKey::MEM_AVAILABLE)),
    key("DISK.Read", Unit::BytesPerSecond, STORAGE, THROUGHPUT)
        .adaptive()
        .counter(CounterMetric::DiskRead)
        .device(DeviceMetric::DiskRead),
    key("DISK.Write", Unit::BytesPerSecond, STORAGE, THROUGHPUT)
        .adaptive()
        .counter(CounterMetric::DiskWrite)
        .device(DeviceMetric::DiskWrite),
    key("DISK.Activity", Unit::Percent, STORAGE, PERCENT).device(DeviceMetric::DiskActivity),
    key("DISK.Temp", Unit::Celsius, STORAGE, TEMPERATURE).device(DeviceMetric::DiskTemp),
    key("NET.Up", Unit::BytesPerSecond, NETWORK, THROUGHPUT)
        .adaptive()
        .device(DeviceMetric::NetUp),
    key("NET.Down", Unit::BytesPerSecond, NETWORK, THROUGHPUT)
        .adaptive()
        .device(DeviceMetric::NetDown),
    key("NET.Total", Unit::BytesPerSecond, NETWORK, THROUGHPUT)
        .adaptive()
        .composite(Composite::Sum(SensorKey::NET_UP, SensorKey::NET_DOWN)),
    key("FAN.CPU", Unit::Rpm, FANS, FAN).adaptive(),
    key("FAN.Pump", Unit::Rpm, FANS, FAN).adaptive(),
    key("FAN.Case", Unit::Rpm, FANS, FAN).adaptive(),
    key("MOBO.Temp", Unit::Celsius, BOARD, TEMPERATURE),
    key("BAT.Level", Unit::Percent, BATTERY, PERCENT),
    key("BAT.Rate", Unit::Watts, BATTERY, Bounds::range(-500.0, 500.0)),
    key("SYS.Uptime", Unit::Seconds, &[], Bounds::range(0.0, f32::MAX)).counter(CounterMetric::Uptime),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_match_table() {
        let expected = [
            (SensorKey::CPU_LOAD, "CPU.Load"),
            (SensorKey::CPU_VOLTAGE, "CPU.Voltage"),
            (SensorKey::GPU_CLOCK, "GPU.Clock"),
            (SensorKey::GPU_VRAM, "GPU.VRAM"),
            (SensorKey::MEM_TOTAL, "MEM.Total"),
            (SensorKey::DISK_TEMP, "DISK.Temp"),
            (SensorKey::NET_TOTAL, "NET.Total"),
            (SensorKey::FAN_CASE, "FAN.Case"),
            (SensorKey::BAT_RATE, "BAT.Rate"),
            (SensorKey::SYS_UPTIME, "SYS.Uptime"),
        ];
        for (key, name) in expected {
            assert_eq!(key.name(), name);
        }
        assert_eq!(SensorKey::all().count(), KEYS.len());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(SensorKey::parse("cpu.temp"), Some(SensorKey::CPU_TEMP));
        assert_eq!(SensorKey::parse("GPU.VRAM.Used"), Some(SensorKey::GPU_VRAM_USED));
        assert_eq!(SensorKey::parse("GPU.Whatever"), None);
    }

    #[test]
    fn test_plausibility_rejects_impossible_gpu_clock() {
        let info = SensorKey::GPU_CLOCK.info();
        assert_eq!(info.accept(1950.0), Some(1950.0));
        assert_eq!(info.accept(9000.0), None);
        assert_eq!(info.accept(0.0), None);
        assert_eq!(info.accept(f32::NAN), None);
    }

    #[test]
    fn test_plausibility_power_and_percent() {
        assert_eq!(SensorKey::CPU_POWER.info().accept(2500.0), None);
        assert_eq!(SensorKey::CPU_POWER.info().accept(0.0), Some(0.0));
        assert_eq!(SensorKey::CPU_LOAD.info().accept(100.3), Some(100.0));
        assert_eq!(SensorKey::CPU_LOAD.info().accept(130.0), None);
        assert_eq!(SensorKey::CPU_TEMP.info().accept(-5.0), None);
    }

    #[test]
    fn test_megabyte_normalization() {
        let n = SensorKey::GPU_VRAM_USED.info().normalize;
        assert_eq!(n, Normalize::MegabytesBy(SensorKey::GPU_VRAM_TOTAL));
        assert_eq!(n.apply(16_384.0, 16_384.0), 16_384.0);
        assert_eq!(n.apply(16_777_216.0, 16_777_216.0), 16_384.0); // KB
        assert_eq!(n.apply(17_179_869_184.0, 17_179_869_184.0), 16_384.0); // bytes
        // Used below a GiB is still bytes when the total is
        assert_eq!(n.apply(524_288_000.0, 17_179_869_184.0), 500.0);
        assert_eq!(Normalize::None.apply(524_288_000.0, 0.0), 524_288_000.0);
    }

    #[test]
    fn test_key_serializes_by_name() {
        let json = serde_json::to_string(&SensorKey::FAN_PUMP).unwrap();
        assert_eq!(json, "\"FAN.Pump\"");
        let key: SensorKey = serde_json::from_str("\"net.up\"").unwrap();
        assert_eq!(key, SensorKey::NET_UP);
        assert!(serde_json::from_str::<SensorKey>("\"NOPE\"").is_err());
    }
}
