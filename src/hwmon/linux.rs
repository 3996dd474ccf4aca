// Linux sensor provider
//
// On Linux, hardware sensors are typically exposed via:
// - /sys/class/hwmon/* for temperatures, fans, voltages, power
// - /sys/devices/system/cpu/* for per-core clocks
// - /sys/class/powercap/intel-rapl* for package energy
// - /sys/block/* and /proc/diskstats for storage
// - /sys/class/net/* for adapters
// - /sys/class/power_supply/* for batteries
// - /proc/stat and /proc/meminfo for CPU and memory load
//
// A scan records a locator for every sensor it creates; updates only read
// the files behind those locators. Counter-style sources (RAPL energy, disk
// sectors, interface bytes) turn into rates on the second update after a
// scan and read as NaN until then.

use super::{Hardware, HwSensorType, HwType, ScanOptions, Sensor, SensorProvider};
use crate::error::Result;
use crate::platform::common::{parse_keyed_value, read_file_f64, read_file_string, read_optional_string};
use crate::platform::procfs::{self, CpuTimes, DiskStat, RateTracker, MIN_RATE_INTERVAL};
use log::{debug, trace};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const GIB: f64 = 1_073_741_824.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChipClass {
    Cpu,
    Gpu,
    Storage,
    Board,
    Controller,
    Other,
}

fn classify_hwmon_chip(name: &str) -> ChipClass {
    let name_lower = name.to_lowercase();

    if name_lower.contains("coretemp")
        || name_lower.contains("k10temp")
        || name_lower.contains("zenpower")
        || name_lower.contains("cpu")
    {
        ChipClass::Cpu
    } else if name_lower.contains("amdgpu")
        || name_lower.contains("nvidia")
        || name_lower.contains("radeon")
        || name_lower.contains("nouveau")
        || name_lower.contains("i915")
        || name_lower == "xe"
    {
        ChipClass::Gpu
    } else if name_lower.contains("nvme") || name_lower.contains("drivetemp") {
        ChipClass::Storage
    } else if name_lower.contains("kraken")
        || name_lower.contains("nzxt")
        || name_lower.contains("corsair")
        || name_lower.contains("d5next")
        || name_lower.contains("octo")
        || name_lower.contains("quadro")
        || name_lower.contains("aquacomputer")
    {
        ChipClass::Controller
    } else if name_lower.starts_with("nct")
        || name_lower.starts_with("it87")
        || name_lower.starts_with("f71")
        || name_lower.contains("nuvoton")
        || name_lower.contains("fintek")
        || name_lower.contains("smsc")
        || name_lower.contains("asus")
    {
        ChipClass::Board
    } else {
        ChipClass::Other
    }
}

#[derive(Debug)]
struct HwmonChip {
    path: PathBuf,
    name: String,
    class: ChipClass,
}

/// hwmon input families: file prefix, index range, scale to display units
#[derive(Debug, Clone, Copy)]
enum InputKind {
    Temp,
    Fan,
    Voltage,
    Power,
}

impl InputKind {
    fn prefix(self) -> &'static str {
        match self {
            InputKind::Temp => "temp",
            InputKind::Fan => "fan",
            InputKind::Voltage => "in",
            InputKind::Power => "power",
        }
    }

    fn range(self) -> std::ops::RangeInclusive<u32> {
        match self {
            InputKind::Temp => 1..=16,
            InputKind::Fan => 1..=8,
            InputKind::Voltage => 0..=16,
            InputKind::Power => 1..=4,
        }
    }

    // millidegrees, RPM, millivolts, microwatts
    fn scale(self) -> f64 {
        match self {
            InputKind::Temp | InputKind::Voltage => 0.001,
            InputKind::Fan => 1.0,
            InputKind::Power => 0.000_001,
        }
    }

    fn sensor_type(self) -> HwSensorType {
        match self {
            InputKind::Temp => HwSensorType::Temperature,
            InputKind::Fan => HwSensorType::Fan,
            InputKind::Voltage => HwSensorType::Voltage,
            InputKind::Power => HwSensorType::Power,
        }
    }

    fn default_label(self, i: u32) -> String {
        match self {
            InputKind::Temp => format!("Temp {}", i),
            InputKind::Fan => format!("Fan {}", i),
            InputKind::Voltage => format!("Voltage {}", i),
            InputKind::Power => format!("Power {}", i),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MemField {
    Load,
    Used,
    Available,
}

#[derive(Debug, Clone, Copy)]
enum DiskField {
    Read,
    Write,
    Activity,
}

/// Where a sensor's value comes from
#[derive(Debug, Clone)]
enum Locator {
    /// Instantaneous sysfs attribute
    File { path: PathBuf, scale: f64 },
    /// Monotonic counter file, reported as change per second
    Rate { path: PathBuf, scale: f64 },
    CpuTotal,
    Memory(MemField),
    Disk { device: String, field: DiskField },
    BatteryRate { dir: PathBuf },
}

/// State carried between updates for rate-style sensors
///
/// Survives rescans so a rebuild does not restart every rate from zero.
#[derive(Debug, Default)]
struct RateState {
    previous: HashMap<String, RateTracker>,
    cpu: Option<(CpuTimes, Instant)>,
    cpu_util: Option<f32>,
}

impl RateState {
    fn rate(&mut self, id: &str, counter: f64, now: Instant) -> Option<f32> {
        self.previous.entry(id.to_string()).or_default().update(counter, now)
    }

    fn cpu_utilization(&mut self, current: CpuTimes, now: Instant) -> Option<f32> {
        match self.cpu {
            Some((_, at)) if now.saturating_duration_since(at) < MIN_RATE_INTERVAL => {}
            Some((prev, _)) => {
                self.cpu_util = current.utilization_since(&prev);
                self.cpu = Some((current, now));
            }
            None => self.cpu = Some((current, now)),
        }
        self.cpu_util
    }

    /// Drop trackers for sensors that no longer exist
    fn retain(&mut self, locators: &HashMap<String, Locator>) {
        self.previous.retain(|id, _| locators.contains_key(id));
    }
}

/// procfs contents read at most once per update call
#[derive(Default)]
struct UpdateContext {
    cpu_util: Option<Option<f32>>,
    meminfo: Option<Option<String>>,
    diskstats: Option<HashMap<String, DiskStat>>,
}

/// Sensor provider backed by sysfs and procfs
pub struct LinuxSensorProvider {
    sys: PathBuf,
    proc_root: PathBuf,
    locators: HashMap<String, Locator>,
    state: RateState,
}

impl LinuxSensorProvider {
    pub fn new() -> Self {
        Self::with_roots("/sys", "/proc")
    }

    /// Provider reading from alternate sysfs/procfs roots
    pub fn with_roots(sys: impl Into<PathBuf>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            sys: sys.into(),
            proc_root: proc_root.into(),
            locators: HashMap::new(),
            state: RateState::default(),
        }
    }

    fn add(&mut self, hw: &mut Hardware, name: impl Into<String>, id: String, ty: HwSensorType, locator: Locator) {
        hw.sensors.push(Sensor::new(name, id.clone(), ty));
        self.locators.insert(id, locator);
    }

    fn hwmon_chips(&self) -> Vec<HwmonChip> {
        sorted_entries(&self.sys.join("class/hwmon"))
            .into_iter()
            .map(|path| {
                let name = read_optional_string(path.join("name")).unwrap_or_else(|| file_name(&path));
                let class = classify_hwmon_chip(&name);
                HwmonChip { path, name, class }
            })
            .collect()
    }

    /// Add every `{prefix}{i}_input` of `kind` found on a chip
    fn add_chip_inputs(&mut self, hw: &mut Hardware, chip: &Path, kind: InputKind) {
        let prefix = kind.prefix();
        for i in kind.range() {
            let mut input_file = chip.join(format!("{}{}_input", prefix, i));
            if !input_file.exists() {
                // Some GPUs only expose an averaged power reading
                let avg_file = chip.join(format!("{}{}_average", prefix, i));
                if matches!(kind, InputKind::Power) && avg_file.exists() {
                    input_file = avg_file;
                } else {
                    continue;
                }
            }

            let label = read_optional_string(chip.join(format!("{}{}_label", prefix, i)))
                .unwrap_or_else(|| kind.default_label(i));

            let id = input_file.to_string_lossy().into_owned();
            self.add(
                hw,
                label,
                id,
                kind.sensor_type(),
                Locator::File {
                    path: input_file,
                    scale: kind.scale(),
                },
            );
        }
    }

    fn scan_cpu(&mut self, chips: &[HwmonChip]) -> Hardware {
        let name = fs::read_to_string(self.proc_root.join("cpuinfo"))
            .ok()
            .and_then(|info| {
                info.lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split_once(':'))
                    .map(|(_, v)| v.trim().to_string())
            })
            .unwrap_or_else(|| "CPU".to_string());

        let mut cpu = Hardware::new(name, "/cpu/0", HwType::Cpu);
        self.add(&mut cpu, "CPU Total", "cpu/total".into(), HwSensorType::Load, Locator::CpuTotal);

        for chip in chips.iter().filter(|c| c.class == ChipClass::Cpu) {
            for kind in [InputKind::Temp, InputKind::Voltage, InputKind::Power] {
                self.add_chip_inputs(&mut cpu, &chip.path, kind);
            }
        }

        // Per-core clocks, cpu0, cpu1, ... in numeric order
        let cpu_dir = self.sys.join("devices/system/cpu");
        let mut cores: Vec<(u32, PathBuf)> = sorted_entries(&cpu_dir)
            .into_iter()
            .filter_map(|path| {
                let name = file_name(&path);
                let n = name.strip_prefix("cpu")?.parse().ok()?;
                Some((n, path))
            })
            .collect();
        cores.sort_by_key(|(n, _)| *n);
        for (n, path) in cores {
            let freq = path.join("cpufreq/scaling_cur_freq");
            if freq.exists() {
                let id = freq.to_string_lossy().into_owned();
                // kHz
                self.add(
                    &mut cpu,
                    format!("CPU {} Clock", n),
                    id,
                    HwSensorType::Clock,
                    Locator::File { path: freq, scale: 0.001 },
                );
            }
        }

        // RAPL top-level domains (intel-rapl:0, not intel-rapl:0:0)
        for path in sorted_entries(&self.sys.join("class/powercap")) {
            let dir = file_name(&path);
            if !dir.starts_with("intel-rapl:") || dir.matches(':').count() != 1 {
                continue;
            }
            let energy = path.join("energy_uj");
            if !energy.exists() {
                continue;
            }
            let domain = read_optional_string(path.join("name")).unwrap_or(dir);
            let label = if domain.starts_with("package") {
                "Package".to_string()
            } else {
                domain
            };
            let id = energy.to_string_lossy().into_owned();
            // microjoules per second
            self.add(
                &mut cpu,
                label,
                id,
                HwSensorType::Power,
                Locator::Rate {
                    path: energy,
                    scale: 0.000_001,
                },
            );
        }

        cpu
    }

    fn scan_gpu(&mut self, chip: &HwmonChip, index: usize) -> Hardware {
        let device = chip.path.join("device");
        let slot = fs::canonicalize(&device)
            .ok()
            .map(|p| file_name(&p))
            .unwrap_or_else(|| index.to_string());
        let vram_total = read_file_f64(device.join("mem_info_vram_total")).ok();

        let chip_lower = chip.name.to_lowercase();
        let (vendor, hw_type) = if chip_lower.contains("amdgpu") || chip_lower.contains("radeon") {
            // APUs carve out a small VRAM window from system memory
            let discrete = vram_total.map(|v| v >= GIB).unwrap_or(false);
            let ty = if discrete { HwType::GpuDiscrete } else { HwType::GpuIntegrated };
            ("AMD GPU", ty)
        } else if chip_lower.contains("i915") || chip_lower == "xe" {
            ("Intel Graphics", HwType::GpuIntegrated)
        } else {
            ("NVIDIA GPU", HwType::GpuDiscrete)
        };

        let mut gpu = Hardware::new(format!("{} ({})", vendor, slot), format!("/gpu/{}", slot), hw_type);

        for kind in [InputKind::Temp, InputKind::Fan, InputKind::Power] {
            self.add_chip_inputs(&mut gpu, &chip.path, kind);
        }

        // Clocks are reported in Hz with sclk/mclk labels
        for i in 1..=2 {
            let input = chip.path.join(format!("freq{}_input", i));
            if !input.exists() {
                continue;
            }
            let label = read_optional_string(chip.path.join(format!("freq{}_label", i))).unwrap_or_default();
            let name = match label.as_str() {
                "sclk" => "GPU Core".to_string(),
                "mclk" => "GPU Memory".to_string(),
                "" => format!("Clock {}", i),
                other => other.to_string(),
            };
            let id = input.to_string_lossy().into_owned();
            self.add(
                &mut gpu,
                name,
                id,
                HwSensorType::Clock,
                Locator::File {
                    path: input,
                    scale: 0.000_001,
                },
            );
        }

        let busy = device.join("gpu_busy_percent");
        if busy.exists() {
            let id = busy.to_string_lossy().into_owned();
            self.add(&mut gpu, "GPU Core", id, HwSensorType::Load, Locator::File { path: busy, scale: 1.0 });
        }

        for (file, name) in [("mem_info_vram_used", "GPU Memory Used"), ("mem_info_vram_total", "GPU Memory Total")] {
            let path = device.join(file);
            if path.exists() {
                let id = path.to_string_lossy().into_owned();
                // bytes to MB
                self.add(
                    &mut gpu,
                    name,
                    id,
                    HwSensorType::SmallData,
                    Locator::File {
                        path,
                        scale: 1.0 / 1_048_576.0,
                    },
                );
            }
        }

        gpu
    }

    fn scan_memory(&mut self) -> Hardware {
        let mut memory = Hardware::new("Generic Memory", "/ram", HwType::Memory);
        self.add(&mut memory, "Memory", "mem/load".into(), HwSensorType::Load, Locator::Memory(MemField::Load));
        self.add(&mut memory, "Memory Used", "mem/used".into(), HwSensorType::Data, Locator::Memory(MemField::Used));
        self.add(
            &mut memory,
            "Memory Available",
            "mem/available".into(),
            HwSensorType::Data,
            Locator::Memory(MemField::Available),
        );
        memory
    }

    fn scan_board(&mut self, chips: &[HwmonChip], options: &ScanOptions) -> Option<Hardware> {
        let board_chips: Vec<&HwmonChip> = chips.iter().filter(|c| c.class == ChipClass::Board).collect();
        if board_chips.is_empty() {
            return None;
        }
        let name = read_optional_string(self.sys.join("class/dmi/id/board_name"))
            .unwrap_or_else(|| board_chips[0].name.clone());
        let mut board = Hardware::new(name, "/motherboard", HwType::Motherboard);
        for chip in board_chips {
            self.add_chip_inputs(&mut board, &chip.path, InputKind::Temp);
            self.add_chip_inputs(&mut board, &chip.path, InputKind::Voltage);
            if options.fans {
                self.add_chip_inputs(&mut board, &chip.path, InputKind::Fan);
            }
        }
        Some(board)
    }

    fn scan_controllers(&mut self, chips: &[HwmonChip]) -> Vec<Hardware> {
        chips
            .iter()
            .filter(|c| c.class == ChipClass::Controller)
            .map(|chip| {
                let mut hw = Hardware::new(chip.name.clone(), format!("/controller/{}", file_name(&chip.path)), HwType::Controller);
                self.add_chip_inputs(&mut hw, &chip.path, InputKind::Fan);
                self.add_chip_inputs(&mut hw, &chip.path, InputKind::Temp);
                hw
            })
            .collect()
    }

    fn scan_storage(&mut self) -> Vec<Hardware> {
        let root = fs::read_to_string(self.proc_root.join("mounts"))
            .ok()
            .and_then(|m| procfs::root_mount_source(&m));

        let mut drives = Vec::new();
        for path in sorted_entries(&self.sys.join("block")) {
            let dev = file_name(&path);
            if procfs::is_virtual_block_device(&dev) {
                continue;
            }
            let model = read_optional_string(path.join("device/model")).unwrap_or_else(|| dev.clone());
            let mut drive = Hardware::new(model, format!("/disk/{}", dev), HwType::Storage);
            if root.as_deref().map(|r| r.starts_with(&format!("/dev/{}", dev))).unwrap_or(false) {
                drive.is_system = true;
            }

            for (name, field) in [
                ("Read Rate", DiskField::Read),
                ("Write Rate", DiskField::Write),
                ("Total Activity", DiskField::Activity),
            ] {
                let ty = match field {
                    DiskField::Activity => HwSensorType::Load,
                    _ => HwSensorType::Throughput,
                };
                let id = format!("disk/{}/{:?}", dev, field).to_lowercase();
                self.add(&mut drive, name, id, ty, Locator::Disk { device: dev.clone(), field });
            }

            if let Some(temp) = drive_temperature_input(&path.join("device")) {
                let id = temp.to_string_lossy().into_owned();
                self.add(&mut drive, "Temperature", id, HwSensorType::Temperature, Locator::File { path: temp, scale: 0.001 });
            }
            drives.push(drive);
        }
        drives
    }

    fn scan_network(&mut self) -> Vec<Hardware> {
        let mut adapters = Vec::new();
        for path in sorted_entries(&self.sys.join("class/net")) {
            let iface = file_name(&path);
            let stats = path.join("statistics");
            if !stats.exists() {
                continue;
            }
            let mut adapter = Hardware::new(iface.clone(), format!("/nic/{}", iface), HwType::Network);
            for (name, file) in [("Upload Speed", "tx_bytes"), ("Download Speed", "rx_bytes")] {
                let counter = stats.join(file);
                let id = counter.to_string_lossy().into_owned();
                self.add(&mut adapter, name, id, HwSensorType::Throughput, Locator::Rate { path: counter, scale: 1.0 });
            }
            adapters.push(adapter);
        }
        adapters
    }

    fn scan_batteries(&mut self) -> Vec<Hardware> {
        let mut batteries = Vec::new();
        for path in sorted_entries(&self.sys.join("class/power_supply")) {
            if read_optional_string(path.join("type")).as_deref() != Some("Battery") {
                continue;
            }
            let name = file_name(&path);
            let mut battery = Hardware::new(name.clone(), format!("/battery/{}", name), HwType::Battery);
            let capacity = path.join("capacity");
            if capacity.exists() {
                let id = capacity.to_string_lossy().into_owned();
                self.add(&mut battery, "Charge Level", id, HwSensorType::Level, Locator::File { path: capacity, scale: 1.0 });
            }
            self.add(
                &mut battery,
                "Charge Rate",
                format!("battery/{}/rate", name),
                HwSensorType::Power,
                Locator::BatteryRate { dir: path.clone() },
            );
            batteries.push(battery);
        }
        batteries
    }

    fn refresh(&mut self, hw: &Hardware, now: Instant, ctx: &mut UpdateContext) {
        for sensor in &hw.sensors {
            let value = match self.locators.get(&sensor.identifier) {
                Some(locator) => read_locator(locator, &sensor.identifier, &mut self.state, ctx, &self.proc_root, now),
                None => None,
            };
            match value {
                Some(v) => sensor.set_value(v),
                None => sensor.clear(),
            }
        }
        for sub in &hw.sub_hardware {
            self.refresh(sub, now, ctx);
        }
    }
}

impl Default for LinuxSensorProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorProvider for LinuxSensorProvider {
    fn name(&self) -> &str {
        "linux-sysfs"
    }

    fn scan(&mut self, options: &ScanOptions) -> Result<Vec<Hardware>> {
        self.locators.clear();

        let chips = self.hwmon_chips();
        let mut hardware = vec![self.scan_cpu(&chips)];
        let gpus: Vec<&HwmonChip> = chips.iter().filter(|c| c.class == ChipClass::Gpu).collect();
        for (i, chip) in gpus.into_iter().enumerate() {
            hardware.push(self.scan_gpu(chip, i));
        }
        hardware.push(self.scan_memory());
        if let Some(board) = self.scan_board(&chips, options) {
            hardware.push(board);
        }
        if options.controllers {
            hardware.extend(self.scan_controllers(&chips));
        }
        hardware.extend(self.scan_storage());
        hardware.extend(self.scan_network());
        hardware.extend(self.scan_batteries());
        self.state.retain(&self.locators);

        debug!(
            "linux provider: {} hardware nodes, {} sensors (fans: {}, controllers: {})",
            hardware.len(),
            self.locators.len(),
            options.fans,
            options.controllers
        );
        Ok(hardware)
    }

    fn update(&mut self, hardware: &Hardware) -> Result<()> {
        let mut ctx = UpdateContext::default();
        self.refresh(hardware, Instant::now(), &mut ctx);
        Ok(())
    }
}

fn read_locator(
    locator: &Locator,
    id: &str,
    state: &mut RateState,
    ctx: &mut UpdateContext,
    proc_root: &Path,
    now: Instant,
) -> Option<f32> {
    match locator {
        Locator::File { path, scale } => read_file_f64(path).ok().map(|v| (v * scale) as f32),
        Locator::Rate { path, scale } => {
            let counter = read_file_f64(path).ok()? * scale;
            state.rate(id, counter, now)
        }
        Locator::CpuTotal => *ctx.cpu_util.get_or_insert_with(|| {
            let current = fs::read_to_string(proc_root.join("stat"))
                .ok()
                .and_then(|s| CpuTimes::parse(&s))?;
            state.cpu_utilization(current, now)
        }),
        Locator::Memory(field) => {
            let meminfo = ctx
                .meminfo
                .get_or_insert_with(|| fs::read_to_string(proc_root.join("meminfo")).ok())
                .as_deref()?;
            let total = parse_keyed_value(meminfo, "MemTotal")? as f64;
            let available = parse_keyed_value(meminfo, "MemAvailable")? as f64;
            if total <= 0.0 {
                return None;
            }
            // kB
            let value = match field {
                MemField::Load => (total - available) / total * 100.0,
                MemField::Used => (total - available) / 1_048_576.0,
                MemField::Available => available / 1_048_576.0,
            };
            Some(value as f32)
        }
        Locator::Disk { device, field } => {
            let stats = ctx.diskstats.get_or_insert_with(|| {
                fs::read_to_string(proc_root.join("diskstats"))
                    .map(|s| procfs::parse_diskstats(&s))
                    .unwrap_or_default()
            });
            let stat = stats.get(device)?;
            match field {
                DiskField::Read => state.rate(id, stat.read_bytes() as f64, now),
                DiskField::Write => state.rate(id, stat.written_bytes() as f64, now),
                // io_ticks are milliseconds busy; ms per second / 10 = percent
                DiskField::Activity => state.rate(id, stat.io_ticks as f64, now).map(|r| (r / 10.0).min(100.0)),
            }
        }
        Locator::BatteryRate { dir } => {
            let watts = match read_file_f64(dir.join("power_now")) {
                Ok(uw) => uw / 1_000_000.0,
                Err(_) => {
                    let ua = read_file_f64(dir.join("current_now")).ok()?;
                    let uv = read_file_f64(dir.join("voltage_now")).ok()?;
                    ua * uv / 1e12
                }
            };
            let discharging = read_file_string(dir.join("status")).map(|s| s == "Discharging").unwrap_or(false);
            let signed = if discharging { -watts.abs() } else { watts.abs() };
            trace!("battery {:?}: {:.2} W", dir, signed);
            Some(signed as f32)
        }
    }
}

/// First `temp1_input` under a drive's hwmon directory (nvme or drivetemp)
fn drive_temperature_input(device: &Path) -> Option<PathBuf> {
    let candidates = sorted_entries(device)
        .into_iter()
        .filter(|p| file_name(p).starts_with("hwmon"))
        .flat_map(|p| {
            if file_name(&p) == "hwmon" {
                sorted_entries(&p)
            } else {
                vec![p]
            }
        });
    candidates.map(|p| p.join("temp1_input")).find(|p| p.exists())
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => return Vec::new(),
    };
    entries.sort();
    entries
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::fake::{fake_system, write};
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn find<'a>(hardware: &'a [Hardware], hw_type: HwType) -> &'a Hardware {
        hardware.iter().find(|h| h.hw_type == hw_type).unwrap()
    }

    fn value(hw: &Hardware, name: &str, ty: HwSensorType) -> Option<f32> {
        hw.sensors
            .iter()
            .find(|s| s.name == name && s.sensor_type == ty)
            .and_then(|s| s.value())
    }

    #[test]
    fn test_classify_hwmon_chip() {
        assert_eq!(classify_hwmon_chip("k10temp"), ChipClass::Cpu);
        assert_eq!(classify_hwmon_chip("amdgpu"), ChipClass::Gpu);
        assert_eq!(classify_hwmon_chip("nvme"), ChipClass::Storage);
        assert_eq!(classify_hwmon_chip("nct6799"), ChipClass::Board);
        assert_eq!(classify_hwmon_chip("kraken3"), ChipClass::Controller);
        assert_eq!(classify_hwmon_chip("acpitz"), ChipClass::Other);
    }

    #[test]
    fn test_scan_and_update_fake_sysfs() {
        let (_dir, sys, proc_root) = fake_system();
        let mut provider = LinuxSensorProvider::with_roots(&sys, &proc_root);
        let hardware = provider.scan(&ScanOptions::default()).unwrap();
        for hw in &hardware {
            provider.update(hw).unwrap();
        }

        let cpu = find(&hardware, HwType::Cpu);
        assert_eq!(cpu.name, "AMD Ryzen 9 7950X");
        assert_eq!(value(cpu, "Tctl", HwSensorType::Temperature), Some(61.5));
        assert_eq!(value(cpu, "CPU 0 Clock", HwSensorType::Clock), Some(4700.0));
        // First sample of a counter has nothing to diff against
        assert_eq!(value(cpu, "CPU Total", HwSensorType::Load), None);

        let gpu = find(&hardware, HwType::GpuDiscrete);
        assert_eq!(value(gpu, "GPU Core", HwSensorType::Clock), Some(1950.0));
        assert_eq!(value(gpu, "GPU Memory Total", HwSensorType::SmallData), Some(16_384.0));

        let memory = find(&hardware, HwType::Memory);
        assert_eq!(value(memory, "Memory", HwSensorType::Load), Some(50.0));
        assert_eq!(value(memory, "Memory Available", HwSensorType::Data), Some(16.0));

        let disk = find(&hardware, HwType::Storage);
        assert!(disk.is_system);
        assert_eq!(value(disk, "Temperature", HwSensorType::Temperature), Some(41.0));
        assert_eq!(hardware.iter().filter(|h| h.hw_type == HwType::Storage).count(), 1);

        // Fans are not enumerated unless asked for
        let board = find(&hardware, HwType::Motherboard);
        assert!(board.sensors.iter().all(|s| s.sensor_type != HwSensorType::Fan));
    }

    #[test]
    fn test_rates_appear_on_second_update() {
        let (_dir, sys, proc_root) = fake_system();
        let mut provider = LinuxSensorProvider::with_roots(&sys, &proc_root);
        let hardware = provider.scan(&ScanOptions::default()).unwrap();
        let nic = find(&hardware, HwType::Network);
        let cpu = find(&hardware, HwType::Cpu);
        provider.update(nic).unwrap();
        provider.update(cpu).unwrap();
        assert_eq!(value(nic, "Upload Speed", HwSensorType::Throughput), None);

        thread::sleep(Duration::from_millis(120));
        write(&sys, "class/net/eth0/statistics/tx_bytes", "21000\n");
        write(&proc_root, "stat", "cpu  200 0 200 1400 0 0 0 0 0 0\n");
        provider.update(nic).unwrap();
        provider.update(cpu).unwrap();

        let up = value(nic, "Upload Speed", HwSensorType::Throughput).unwrap();
        assert!(up > 0.0);
        let load = value(cpu, "CPU Total", HwSensorType::Load).unwrap();
        assert!((load - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_fan_scanning_adds_board_fans() {
        let (_dir, sys, proc_root) = fake_system();
        let mut provider = LinuxSensorProvider::with_roots(&sys, &proc_root);
        let options = ScanOptions {
            fans: true,
            controllers: false,
        };
        let hardware = provider.scan(&options).unwrap();
        let board = find(&hardware, HwType::Motherboard);
        provider.update(board).unwrap();
        assert_eq!(value(board, "Fan 1", HwSensorType::Fan), Some(900.0));
        assert_eq!(value(board, "SYSTIN", HwSensorType::Temperature), Some(36.0));
    }

    #[test]
    fn test_rescan_keeps_rate_baseline() {
        let (_dir, sys, proc_root) = fake_system();
        let mut provider = LinuxSensorProvider::with_roots(&sys, &proc_root);
        let hardware = provider.scan(&ScanOptions::default()).unwrap();
        provider.update(find(&hardware, HwType::Network)).unwrap();

        thread::sleep(Duration::from_millis(120));
        write(&sys, "class/net/eth0/statistics/rx_bytes", "7000\n");
        let hardware = provider.scan(&ScanOptions::default()).unwrap();
        let nic = find(&hardware, HwType::Network);
        provider.update(nic).unwrap();
        let down = value(nic, "Download Speed", HwSensorType::Throughput).unwrap();
        assert!(down > 0.0);

        // An immediate second update reuses the rate instead of diffing a tiny window
        write(&sys, "class/net/eth0/statistics/rx_bytes", "1007000\n");
        provider.update(nic).unwrap();
        assert_eq!(value(nic, "Download Speed", HwSensorType::Throughput), Some(down));
    }
}
