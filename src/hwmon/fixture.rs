// In-memory sensor provider for tests
//
// Layout is a desktop with a discrete and an integrated GPU, two disks and
// two network adapters (one virtual). Sensor values come from a shared map
// keyed by sensor identifier; sensors missing from the map read as NaN.

use super::{Hardware, HwSensorType, HwType, ScanOptions, Sensor, SensorProvider};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Handles tests keep to drive a [`FixtureProvider`] after it is boxed
#[derive(Clone, Default)]
pub(crate) struct FixtureControls {
    values: Arc<Mutex<HashMap<String, f32>>>,
    scans: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
    fail_scan: Arc<AtomicBool>,
    last_options: Arc<Mutex<Option<ScanOptions>>>,
}

impl FixtureControls {
    pub fn set(&self, identifier: &str, value: f32) {
        self.values.lock().insert(identifier.to_string(), value);
    }

    pub fn remove(&self, identifier: &str) {
        self.values.lock().remove(identifier);
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::SeqCst);
    }

    pub fn last_options(&self) -> Option<ScanOptions> {
        *self.last_options.lock()
    }
}

pub(crate) struct FixtureProvider {
    controls: FixtureControls,
}

impl FixtureProvider {
    pub fn desktop() -> (Self, FixtureControls) {
        let controls = FixtureControls::default();
        let defaults = [
            ("cpu.load", 25.0),
            ("cpu.temp.core1", 58.0),
            ("cpu.temp", 61.5),
            ("cpu.clock", 4700.0),
            ("cpu.power", 65.0),
            ("cpu.voltage", 1.25),
            ("gpu.temp", 54.0),
            ("gpu.hotspot", 68.0),
            ("gpu.load", 40.0),
            ("gpu.clock", 1950.0),
            ("gpu.memclock", 10_501.0),
            ("gpu.power", 180.0),
            ("gpu.fan", 1400.0),
            ("gpu.vram.used", 4096.0),
            ("gpu.vram.total", 16_384.0),
            ("igpu.temp", 45.0),
            ("igpu.load", 3.0),
            ("igpu.clock", 600.0),
            ("mem.load", 50.0),
            ("mem.used", 16.0),
            ("mem.available", 16.0),
            ("disk0.read", 2_000_000.0),
            ("disk0.write", 500_000.0),
            ("disk0.activity", 12.0),
            ("disk0.temp", 41.0),
            ("disk1.read", 0.0),
            ("disk1.write", 0.0),
            ("disk1.activity", 0.0),
            ("net0.up", 20_000.0),
            ("net0.down", 150_000.0),
            ("net1.up", 5_000_000.0),
            ("net1.down", 5_000_000.0),
            ("mobo.temp", 36.0),
            ("mobo.fan.cpu", 900.0),
            ("mobo.fan.pump", 2400.0),
            ("mobo.fan.sys1", 700.0),
            ("ctrl.pump", 2600.0),
        ];
        for (id, value) in defaults {
            controls.set(id, value);
        }
        (
            Self {
                controls: controls.clone(),
            },
            controls,
        )
    }
}

fn sensor(name: &str, id: &str, ty: HwSensorType) -> Sensor {
    Sensor::new(name, id, ty)
}

fn desktop_layout(options: &ScanOptions) -> Vec<Hardware> {
    use HwSensorType::*;

    let cpu = Hardware::new("AMD Ryzen 9 7950X", "/amdcpu/0", HwType::Cpu)
        .with_sensor(sensor("CPU Total", "cpu.load", Load))
        .with_sensor(sensor("Core #1", "cpu.temp.core1", Temperature))
        .with_sensor(sensor("Core (Tctl/Tdie)", "cpu.temp", Temperature))
        .with_sensor(sensor("Core #1", "cpu.clock", Clock))
        .with_sensor(sensor("Package", "cpu.power", Power))
        .with_sensor(sensor("Core VID", "cpu.voltage", Voltage));

    let igpu = Hardware::new("AMD Radeon Graphics", "/gpu-amd/1", HwType::GpuIntegrated)
        .with_sensor(sensor("GPU Core", "igpu.temp", Temperature))
        .with_sensor(sensor("GPU Core", "igpu.load", Load))
        .with_sensor(sensor("GPU Core", "igpu.clock", Clock));

    let dgpu = Hardware::new("NVIDIA GeForce RTX 4080", "/gpu-nvidia/0", HwType::GpuDiscrete)
        .with_sensor(sensor("GPU Core", "gpu.temp", Temperature))
        .with_sensor(sensor("GPU Hot Spot", "gpu.hotspot", Temperature))
        .with_sensor(sensor("GPU Core", "gpu.load", Load))
        .with_sensor(sensor("GPU Core", "gpu.clock", Clock))
        .with_sensor(sensor("GPU Memory", "gpu.memclock", Clock))
        .with_sensor(sensor("GPU Package", "gpu.power", Power))
        .with_sensor(sensor("GPU Fan 1", "gpu.fan", Fan))
        .with_sensor(sensor("GPU Memory Used", "gpu.vram.used", SmallData))
        .with_sensor(sensor("GPU Memory Total", "gpu.vram.total", SmallData));

    let memory = Hardware::new("Generic Memory", "/ram", HwType::Memory)
        .with_sensor(sensor("Memory", "mem.load", Load))
        .with_sensor(sensor("Memory Used", "mem.used", Data))
        .with_sensor(sensor("Memory Available", "mem.available", Data));

    let mut board = Hardware::new("ASUS ROG STRIX X670E", "/motherboard", HwType::Motherboard)
        .with_sensor(sensor("System", "mobo.temp", Temperature));
    if options.fans {
        board = board
            .with_sensor(sensor("CPU Fan", "mobo.fan.cpu", Fan))
            .with_sensor(sensor("Pump Fan", "mobo.fan.pump", Fan))
            .with_sensor(sensor("System Fan #1", "mobo.fan.sys1", Fan));
    }

    let system_disk = Hardware::new("Samsung SSD 990 PRO", "/nvme/0", HwType::Storage)
        .system()
        .with_sensor(sensor("Read Rate", "disk0.read", Throughput))
        .with_sensor(sensor("Write Rate", "disk0.write", Throughput))
        .with_sensor(sensor("Total Activity", "disk0.activity", Load))
        .with_sensor(sensor("Temperature", "disk0.temp", Temperature));

    let data_disk = Hardware::new("Disk2", "/hdd/1", HwType::Storage)
        .with_sensor(sensor("Read Rate", "disk1.read", Throughput))
        .with_sensor(sensor("Write Rate", "disk1.write", Throughput))
        .with_sensor(sensor("Total Activity", "disk1.activity", Load));

    let ethernet = Hardware::new("Ethernet", "/nic/0", HwType::Network)
        .with_sensor(sensor("Upload Speed", "net0.up", Throughput))
        .with_sensor(sensor("Download Speed", "net0.down", Throughput));

    let vmware = Hardware::new("VMware Virtual Ethernet Adapter", "/nic/1", HwType::Network)
        .with_sensor(sensor("Upload Speed", "net1.up", Throughput))
        .with_sensor(sensor("Download Speed", "net1.down", Throughput));

    let mut hardware = vec![cpu, igpu, dgpu, memory, board, system_disk, data_disk, ethernet, vmware];
    if options.controllers {
        hardware.push(
            Hardware::new("NZXT Kraken", "/nzxt/0", HwType::Controller)
                .with_sensor(sensor("Pump", "ctrl.pump", Fan)),
        );
    }
    hardware
}

impl SensorProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    fn scan(&mut self, options: &ScanOptions) -> Result<Vec<Hardware>> {
        self.controls.scans.fetch_add(1, Ordering::SeqCst);
        *self.controls.last_options.lock() = Some(*options);
        if self.controls.fail_scan.load(Ordering::SeqCst) {
            return Err(Error::Provider("fixture scan failure".into()));
        }
        Ok(desktop_layout(options))
    }

    fn update(&mut self, hardware: &Hardware) -> Result<()> {
        self.controls.updates.fetch_add(1, Ordering::SeqCst);
        let values = self.controls.values.lock();
        apply(hardware, &values);
        Ok(())
    }
}

fn apply(hardware: &Hardware, values: &HashMap<String, f32>) {
    for s in &hardware.sensors {
        match values.get(&s.identifier) {
            Some(v) => s.set_value(*v),
            None => s.clear(),
        }
    }
    for sub in &hardware.sub_hardware {
        apply(sub, values);
    }
}
