//! Sensor catalog: semantic keys to sensor handles
//!
//! Mapping is driven by an ordered rule table. The first rule matching a
//! sensor's (hardware type, sensor type, name) decides its key, and the
//! rule's index is its rank. When several sensors map to one key:
//!
//! - across hardware nodes, the first node in priority order wins
//!   (discrete GPU, integrated GPU, then everything else in enumeration order)
//! - within one node, the better-ranked sensor wins
//!
//! Network and disk keys are not in the table; they go through the device
//! selector instead.

use crate::hwmon::{HardwareTree, HwSensorType, HwType, SensorHandle};
use crate::key::SensorKey;
use arc_swap::ArcSwap;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One normalization rule
#[derive(Debug)]
struct Rule {
    hardware: &'static [HwType],
    sensor: HwSensorType,
    /// Name must contain one of these (lowercase); empty matches any name
    any: &'static [&'static str],
    /// Name must contain none of these
    none: &'static [&'static str],
    key: SensorKey,
}

impl Rule {
    fn matches(&self, hw_type: HwType, sensor_type: HwSensorType, name: &str) -> bool {
        self.sensor == sensor_type
            && self.hardware.contains(&hw_type)
            && (self.any.is_empty() || self.any.iter().any(|p| name.contains(p)))
            && !self.none.iter().any(|p| name.contains(p))
    }
}

const CPU: &[HwType] = &[HwType::Cpu];
const GPU: &[HwType] = &[HwType::GpuDiscrete, HwType::GpuIntegrated];
const MEMORY: &[HwType] = &[HwType::Memory];
const BOARD: &[HwType] = &[HwType::Motherboard];
const FANS: &[HwType] = &[HwType::Motherboard, HwType::Controller];
const BATTERY: &[HwType] = &[HwType::Battery];

const fn rule(
    hardware: &'static [HwType],
    sensor: HwSensorType,
    any: &'static [&'static str],
    none: &'static [&'static str],
    key: SensorKey,
) -> Rule {
    Rule {
        hardware,
        sensor,
        any,
        none,
        key,
    }
}

use HwSensorType::*;

static RULES: &[Rule] = &[
    // CPU
    rule(CPU, Temperature, &["package", "tctl", "tdie"], &[], SensorKey::CPU_TEMP),
    rule(CPU, Temperature, &["core max", "core average", "cpu"], &[], SensorKey::CPU_TEMP),
    rule(CPU, Temperature, &["core", "ccd"], &[], SensorKey::CPU_TEMP),
    rule(CPU, Load, &["total"], &[], SensorKey::CPU_LOAD),
    rule(CPU, Clock, &["core #1", "core 0", "cpu 0 ", "cpu0"], &[], SensorKey::CPU_CLOCK),
    rule(CPU, Clock, &["core", "cpu"], &["bus", "effective"], SensorKey::CPU_CLOCK),
    rule(CPU, Power, &["package", "ppt"], &[], SensorKey::CPU_POWER),
    rule(CPU, Voltage, &["core", "vid", "vcore"], &["soc"], SensorKey::CPU_VOLTAGE),
    // GPU
    rule(GPU, Temperature, &["hot spot", "hotspot", "junction"], &[], SensorKey::GPU_HOTSPOT),
    rule(GPU, Temperature, &["core", "gpu", "edge"], &["memory"], SensorKey::GPU_TEMP),
    rule(
        GPU,
        Load,
        &["core", "d3d 3d", "gpu"],
        &["memory", "video", "bus", "frame buffer"],
        SensorKey::GPU_LOAD,
    ),
    rule(GPU, Clock, &["memory"], &[], SensorKey::GPU_MEM_CLOCK),
    rule(GPU, Clock, &["core", "gpu", "shader", "sclk"], &[], SensorKey::GPU_CLOCK),
    rule(GPU, Power, &["package", "total", "board", "ppt"], &[], SensorKey::GPU_POWER),
    rule(GPU, Power, &["gpu", "power"], &[], SensorKey::GPU_POWER),
    rule(GPU, Fan, &[], &[], SensorKey::GPU_FAN),
    rule(
        GPU,
        SmallData,
        &["memory used", "vram used"],
        &["shared", "free"],
        SensorKey::GPU_VRAM_USED,
    ),
    rule(
        GPU,
        SmallData,
        &["memory total", "vram total"],
        &["shared"],
        SensorKey::GPU_VRAM_TOTAL,
    ),
    // Memory
    rule(MEMORY, Load, &["memory"], &["virtual"], SensorKey::MEM_LOAD),
    rule(MEMORY, Data, &["memory used", "used memory"], &["virtual"], SensorKey::MEM_USED),
    rule(
        MEMORY,
        Data,
        &["memory available", "available memory"],
        &["virtual"],
        SensorKey::MEM_AVAILABLE,
    ),
    // Board and fan controllers
    rule(
        BOARD,
        Temperature,
        &["system", "motherboard", "systin", "mainboard"],
        &[],
        SensorKey::MOBO_TEMP,
    ),
    rule(FANS, Fan, &["pump", "aio"], &[], SensorKey::FAN_PUMP),
    rule(FANS, Fan, &["cpu"], &[], SensorKey::FAN_CPU),
    rule(FANS, Fan, &["system", "chassis", "case", "fan"], &[], SensorKey::FAN_CASE),
    // Battery
    rule(BATTERY, Level, &["charge", "capacity"], &["wear"], SensorKey::BAT_LEVEL),
    rule(BATTERY, Power, &["rate", "power"], &[], SensorKey::BAT_RATE),
];

/// Map a sensor to its key and rank (lower rank is better)
pub fn normalize(hw_type: HwType, sensor_type: HwSensorType, name: &str) -> Option<(SensorKey, usize)> {
    let name = name.to_lowercase();
    RULES
        .iter()
        .enumerate()
        .find(|(_, r)| r.matches(hw_type, sensor_type, &name))
        .map(|(rank, r)| (r.key, rank))
}

/// Immutable key-to-handle mapping for one tree generation
#[derive(Debug)]
pub struct CatalogSnapshot {
    generation: u64,
    built_at: Instant,
    entries: HashMap<SensorKey, SensorHandle>,
}

impl CatalogSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            built_at: Instant::now(),
            entries: HashMap::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> Instant {
        self.built_at
    }

    pub fn get(&self, key: SensorKey) -> Option<&SensorHandle> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = SensorKey> + '_ {
        self.entries.keys().copied()
    }
}

/// Build a snapshot for `tree` into a scratch map
pub fn build(tree: &HardwareTree) -> CatalogSnapshot {
    // key -> (node order, rank, handle)
    let mut best: HashMap<SensorKey, (usize, usize, SensorHandle)> = HashMap::new();
    let mut node_order = 0;

    tree.walk_prioritized(|hw, path| {
        for (idx, sensor) in hw.sensors.iter().enumerate() {
            let Some((key, rank)) = normalize(hw.hw_type, sensor.sensor_type, &sensor.name) else {
                continue;
            };
            let replace = match best.get(&key) {
                None => true,
                Some((order, current, _)) => *order == node_order && rank < *current,
            };
            if replace {
                best.insert(key, (node_order, rank, tree.handle(path, idx)));
            }
        }
        node_order += 1;
    });

    let entries: HashMap<SensorKey, SensorHandle> = best.into_iter().map(|(k, (_, _, h))| (k, h)).collect();
    debug!(
        "Catalog generation {}: {} keys from {} sensors",
        tree.generation(),
        entries.len(),
        tree.sensor_count()
    );
    CatalogSnapshot {
        generation: tree.generation(),
        built_at: Instant::now(),
        entries,
    }
}

/// Published catalog; readers always see a complete snapshot
pub struct SensorCatalog {
    current: ArcSwap<CatalogSnapshot>,
}

impl SensorCatalog {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(CatalogSnapshot::empty()),
        }
    }

    /// Build a snapshot for `tree` and publish it
    pub fn rebuild(&self, tree: &HardwareTree) -> Arc<CatalogSnapshot> {
        let snapshot = Arc::new(build(tree));
        self.publish(Arc::clone(&snapshot));
        snapshot
    }

    pub(crate) fn publish(&self, snapshot: Arc<CatalogSnapshot>) {
        self.current.store(snapshot);
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.load_full()
    }

    pub fn get(&self, key: SensorKey) -> Option<SensorHandle> {
        self.current.load().get(key).cloned()
    }

    /// True if the published snapshot is older than `max_age`
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.current.load().built_at.elapsed() >= max_age
    }
}

impl Default for SensorCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwmon::fixture::FixtureProvider;
    use crate::hwmon::{Hardware, ScanOptions, Sensor, SensorProvider};

    fn desktop_tree(options: ScanOptions) -> HardwareTree {
        let (mut provider, _controls) = FixtureProvider::desktop();
        let hardware = provider.scan(&options).unwrap();
        let tree = HardwareTree::new(1, hardware);
        for hw in tree.hardware() {
            provider.update(hw).unwrap();
        }
        tree
    }

    #[test]
    fn test_normalize_rules() {
        assert_eq!(
            normalize(HwType::Cpu, Temperature, "Core (Tctl/Tdie)").map(|(k, _)| k),
            Some(SensorKey::CPU_TEMP)
        );
        assert_eq!(
            normalize(HwType::GpuDiscrete, Temperature, "GPU Hot Spot").map(|(k, _)| k),
            Some(SensorKey::GPU_HOTSPOT)
        );
        assert_eq!(
            normalize(HwType::GpuDiscrete, Clock, "GPU Memory").map(|(k, _)| k),
            Some(SensorKey::GPU_MEM_CLOCK)
        );
        assert_eq!(
            normalize(HwType::GpuDiscrete, SmallData, "D3D Shared Memory Used"),
            None
        );
        // Same name, wrong hardware class
        assert_eq!(normalize(HwType::Storage, Temperature, "CPU Package"), None);
    }

    #[test]
    fn test_discrete_gpu_wins() {
        let tree = desktop_tree(ScanOptions::default());
        let snapshot = build(&tree);
        let handle = snapshot.get(SensorKey::GPU_TEMP).unwrap();
        assert_eq!(tree.owner(handle).unwrap().hw_type, HwType::GpuDiscrete);
        assert_eq!(tree.read(handle), Some(54.0));
    }

    #[test]
    fn test_better_rank_wins_within_node() {
        // "Core #1" is enumerated before "Core (Tctl/Tdie)" but ranks lower
        let tree = desktop_tree(ScanOptions::default());
        let snapshot = build(&tree);
        let handle = snapshot.get(SensorKey::CPU_TEMP).unwrap();
        assert_eq!(tree.sensor(handle).unwrap().name, "Core (Tctl/Tdie)");
    }

    #[test]
    fn test_first_node_wins_across_nodes() {
        let first = Hardware::new("CPU A", "/a", HwType::Cpu)
            .with_sensor(Sensor::new("Core #2", "a", Temperature));
        let second = Hardware::new("CPU B", "/b", HwType::Cpu)
            .with_sensor(Sensor::new("Package", "b", Temperature));
        let tree = HardwareTree::new(3, vec![first, second]);
        let snapshot = build(&tree);
        let handle = snapshot.get(SensorKey::CPU_TEMP).unwrap();
        assert_eq!(tree.owner(handle).unwrap().name, "CPU A");
    }

    #[test]
    fn test_fan_keys_need_fan_scanning() {
        let snapshot = build(&desktop_tree(ScanOptions::default()));
        assert!(snapshot.get(SensorKey::FAN_CPU).is_none());
        assert!(snapshot.get(SensorKey::MOBO_TEMP).is_some());

        let tree = desktop_tree(ScanOptions {
            fans: true,
            controllers: false,
        });
        let snapshot = build(&tree);
        assert_eq!(tree.read(snapshot.get(SensorKey::FAN_CPU).unwrap()), Some(900.0));
        assert_eq!(tree.read(snapshot.get(SensorKey::FAN_PUMP).unwrap()), Some(2400.0));
        assert_eq!(tree.read(snapshot.get(SensorKey::FAN_CASE).unwrap()), Some(700.0));
    }

    #[test]
    fn test_missing_key_is_none() {
        let catalog = SensorCatalog::new();
        catalog.rebuild(&HardwareTree::empty());
        assert!(catalog.get(SensorKey::BAT_LEVEL).is_none());
    }

    #[test]
    fn test_rebuild_publishes_and_staleness() {
        let catalog = SensorCatalog::new();
        let tree = desktop_tree(ScanOptions::default());
        let snapshot = catalog.rebuild(&tree);
        assert_eq!(catalog.snapshot().generation(), 1);
        assert_eq!(catalog.get(SensorKey::CPU_LOAD), snapshot.get(SensorKey::CPU_LOAD).cloned());
        assert!(!catalog.is_stale(Duration::from_secs(600)));
        assert!(catalog.is_stale(Duration::ZERO));
    }
}
