//! OS performance counters
//!
//! Cheap system-wide counters (processor utility, available memory, disk
//! bytes) preferred over sensor-library readings when they exist. Counter
//! construction can take seconds on some systems, so it runs once on a
//! background thread; until it finishes every read returns `None` and the
//! resolver falls through to other sources.
//!
//! Backend lifecycle:
//!
//! ```text
//! Pending ──initialize──▶ Ready        (at least one counter opened)
//!                    └──▶ Unavailable  (nothing opened; never retried)
//! ```
//!
//! Values are sampled on the poll thread by [`CounterBackend::sample`];
//! [`CounterBackend::read`] only looks up the latest sample.

#[cfg(test)]
pub(crate) mod fixture;
#[cfg(windows)]
pub mod pdh;
#[cfg(target_os = "linux")]
pub mod procfs;

use crate::error::Result;
use crate::uptime::{effective_uptime, UptimeSample};
use arc_swap::ArcSwap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

/// Derived metric served by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterMetric {
    CpuLoad,
    /// Effective clock: performance percentage times base clock
    CpuClock,
    MemLoad,
    MemUsed,
    MemAvailable,
    DiskRead,
    DiskWrite,
    Uptime,
}

/// Raw counter opened from the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawCounter {
    /// Percent
    ProcessorUtility,
    /// Percent of base frequency
    ProcessorPerformance,
    /// MB
    AvailableMemory,
    /// Bytes per second, all physical disks
    DiskReadBytes,
    DiskWriteBytes,
}

impl RawCounter {
    pub const ALL: [RawCounter; 5] = [
        RawCounter::ProcessorUtility,
        RawCounter::ProcessorPerformance,
        RawCounter::AvailableMemory,
        RawCounter::DiskReadBytes,
        RawCounter::DiskWriteBytes,
    ];

    pub fn category(self) -> CounterCategory {
        match self {
            RawCounter::ProcessorUtility | RawCounter::ProcessorPerformance => CounterCategory::Processor,
            RawCounter::AvailableMemory => CounterCategory::Memory,
            RawCounter::DiskReadBytes | RawCounter::DiskWriteBytes => CounterCategory::PhysicalDisk,
        }
    }
}

/// Counter category; stripped OS images may lack whole categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterCategory {
    Processor,
    Memory,
    PhysicalDisk,
}

/// Facts read once at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticFact {
    CpuBaseClockMhz,
    TotalMemoryMb,
}

/// An opened counter
///
/// Rate counters need two samples; the first value after opening is
/// meaningless and is discarded by the backend.
pub trait Counter: Send {
    fn next_value(&mut self) -> Result<f32>;
}

/// OS counter facility
pub trait CounterSystem: Send + Sync {
    fn name(&self) -> &str;

    fn category_exists(&self, category: CounterCategory) -> bool;

    fn open(&self, counter: RawCounter) -> Result<Box<dyn Counter>>;

    fn static_fact(&self, fact: StaticFact) -> Option<f64>;

    fn uptime_sample(&self) -> Option<UptimeSample>;
}

/// Counter system for platforms without one
#[derive(Debug, Default)]
pub struct NoCounters;

impl CounterSystem for NoCounters {
    fn name(&self) -> &str {
        "none"
    }

    fn category_exists(&self, _category: CounterCategory) -> bool {
        false
    }

    fn open(&self, counter: RawCounter) -> Result<Box<dyn Counter>> {
        Err(crate::error::Error::Unsupported(format!("{:?}", counter)))
    }

    fn static_fact(&self, _fact: StaticFact) -> Option<f64> {
        None
    }

    fn uptime_sample(&self) -> Option<UptimeSample> {
        None
    }
}

/// Native counter system for the current platform
pub fn platform_counters() -> Box<dyn CounterSystem> {
    #[cfg(target_os = "linux")]
    {
        Box::new(procfs::ProcfsCounters::new())
    }

    #[cfg(windows)]
    {
        Box::new(pdh::PdhCounters::new())
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Box::new(NoCounters)
    }
}

/// Initialization state of the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BackendState {
    Pending = 0,
    Ready = 1,
    Unavailable = 2,
}

impl BackendState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => BackendState::Ready,
            2 => BackendState::Unavailable,
            _ => BackendState::Pending,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Facts {
    base_clock_mhz: Option<f64>,
    total_memory_mb: Option<f64>,
}

/// Cached OS counters with asynchronous initialization
pub struct CounterBackend {
    system: Box<dyn CounterSystem>,
    state: AtomicU8,
    /// Serializes initialization; held for its whole duration
    init: Mutex<()>,
    /// `None` slots were disposed after a failure and are reopened lazily
    handles: Mutex<HashMap<RawCounter, Option<Box<dyn Counter>>>>,
    facts: Mutex<Facts>,
    latest: ArcSwap<HashMap<CounterMetric, f32>>,
}

impl CounterBackend {
    pub fn new(system: Box<dyn CounterSystem>) -> Self {
        Self {
            system,
            state: AtomicU8::new(BackendState::Pending as u8),
            init: Mutex::new(()),
            handles: Mutex::new(HashMap::new()),
            facts: Mutex::new(Facts::default()),
            latest: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn state(&self) -> BackendState {
        BackendState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == BackendState::Ready
    }

    /// Start initialization on a background thread
    pub fn initialize_async(self: &Arc<Self>) {
        let backend = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("hwpoll-counters".into())
            .spawn(move || backend.initialize());
        if let Err(e) = spawned {
            warn!("Failed to spawn counter initialization thread: {}", e);
            self.state.store(BackendState::Unavailable as u8, Ordering::Release);
        }
    }

    /// Open every available counter; no-op once the state is decided
    pub fn initialize(&self) {
        let _guard = self.init.lock();
        if self.state() != BackendState::Pending {
            return;
        }

        let mut opened = HashMap::new();
        for raw in RawCounter::ALL {
            if !self.system.category_exists(raw.category()) {
                debug!("{}: counter category {:?} missing", self.system.name(), raw.category());
                continue;
            }
            match self.open_warm(raw) {
                Some(counter) => {
                    opened.insert(raw, Some(counter));
                }
                None => continue,
            }
        }

        *self.facts.lock() = Facts {
            base_clock_mhz: self.system.static_fact(StaticFact::CpuBaseClockMhz),
            total_memory_mb: self.system.static_fact(StaticFact::TotalMemoryMb),
        };

        let state = if opened.is_empty() {
            warn!(
                "{}: no performance counters available; falling back to sensor readings",
                self.system.name()
            );
            BackendState::Unavailable
        } else {
            info!("{}: {} performance counters ready", self.system.name(), opened.len());
            *self.handles.lock() = opened;
            BackendState::Ready
        };
        self.state.store(state as u8, Ordering::Release);
    }

    /// Open a counter and discard its first (meaningless) value
    fn open_warm(&self, raw: RawCounter) -> Option<Box<dyn Counter>> {
        match self.system.open(raw) {
            Ok(mut counter) => {
                let _ = counter.next_value();
                Some(counter)
            }
            Err(e) => {
                debug!("{}: cannot open {:?}: {}", self.system.name(), raw, e);
                None
            }
        }
    }

    /// Sample every counter and publish derived metrics (poll thread)
    pub fn sample(&self) {
        let state = self.state();
        if state == BackendState::Pending {
            return;
        }

        let mut raw_values = HashMap::new();
        if state == BackendState::Ready {
            let mut handles = self.handles.lock();
            for (raw, slot) in handles.iter_mut() {
                if slot.is_none() {
                    // Reopened counters are primed this tick and read next tick
                    *slot = self.open_warm(*raw);
                    continue;
                }
                let Some(counter) = slot.as_mut() else {
                    continue;
                };
                match counter.next_value() {
                    Ok(v) if v.is_finite() => {
                        raw_values.insert(*raw, v);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("{}: {:?} failed, disposing: {}", self.system.name(), raw, e);
                        *slot = None;
                    }
                }
            }
        }

        let mut metrics = derive_metrics(&raw_values, *self.facts.lock());
        if let Some(sample) = self.system.uptime_sample() {
            metrics.insert(CounterMetric::Uptime, effective_uptime(&sample).as_secs_f32());
        }
        self.latest.store(Arc::new(metrics));
    }

    /// Latest sampled value; `None` until initialized and sampled
    pub fn read(&self, metric: CounterMetric) -> Option<f32> {
        match self.state() {
            BackendState::Ready => self.latest.load().get(&metric).copied(),
            // Uptime does not depend on counters
            BackendState::Unavailable if metric == CounterMetric::Uptime => {
                self.latest.load().get(&metric).copied()
            }
            _ => None,
        }
    }
}

fn derive_metrics(raw: &HashMap<RawCounter, f32>, facts: Facts) -> HashMap<CounterMetric, f32> {
    let mut metrics = HashMap::new();

    if let Some(util) = raw.get(&RawCounter::ProcessorUtility) {
        metrics.insert(CounterMetric::CpuLoad, util.clamp(0.0, 100.0));
    }
    if let (Some(perf), Some(base)) = (raw.get(&RawCounter::ProcessorPerformance), facts.base_clock_mhz) {
        metrics.insert(CounterMetric::CpuClock, (*perf as f64 / 100.0 * base) as f32);
    }
    if let Some(avail_mb) = raw.get(&RawCounter::AvailableMemory) {
        let avail_mb = *avail_mb as f64;
        metrics.insert(CounterMetric::MemAvailable, (avail_mb / 1024.0) as f32);
        if let Some(total_mb) = facts.total_memory_mb.filter(|t| *t > 0.0) {
            let used_mb = (total_mb - avail_mb).max(0.0);
            metrics.insert(CounterMetric::MemUsed, (used_mb / 1024.0) as f32);
            metrics.insert(CounterMetric::MemLoad, (used_mb / total_mb * 100.0) as f32);
        }
    }
    if let Some(read) = raw.get(&RawCounter::DiskReadBytes) {
        metrics.insert(CounterMetric::DiskRead, *read);
    }
    if let Some(write) = raw.get(&RawCounter::DiskWriteBytes) {
        metrics.insert(CounterMetric::DiskWrite, *write);
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::fixture::FixtureCounters;
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_read_none_until_initialized() {
        let (system, _controls) = FixtureCounters::available();
        let backend = CounterBackend::new(Box::new(system));
        backend.sample();
        assert_eq!(backend.state(), BackendState::Pending);
        assert_eq!(backend.read(CounterMetric::CpuLoad), None);
    }

    #[test]
    fn test_first_read_after_init_is_real_value() {
        let (system, controls) = FixtureCounters::available();
        controls.set(RawCounter::ProcessorUtility, 37.5);
        let backend = CounterBackend::new(Box::new(system));
        backend.initialize();
        backend.sample();
        assert!(backend.is_ready());
        assert_eq!(backend.read(CounterMetric::CpuLoad), Some(37.5));
    }

    #[test]
    fn test_derived_metrics() {
        let (system, controls) = FixtureCounters::available();
        controls.set(RawCounter::ProcessorPerformance, 110.0);
        controls.set(RawCounter::AvailableMemory, 8192.0);
        let backend = CounterBackend::new(Box::new(system));
        backend.initialize();
        backend.sample();
        // base clock 4500 MHz, total memory 32768 MB
        assert_eq!(backend.read(CounterMetric::CpuClock), Some(4950.0));
        assert_eq!(backend.read(CounterMetric::MemAvailable), Some(8.0));
        assert_eq!(backend.read(CounterMetric::MemUsed), Some(24.0));
        assert_eq!(backend.read(CounterMetric::MemLoad), Some(75.0));
    }

    #[test]
    fn test_unavailable_is_final() {
        let (system, controls) = FixtureCounters::absent();
        let backend = CounterBackend::new(Box::new(system));
        backend.initialize();
        assert_eq!(backend.state(), BackendState::Unavailable);
        backend.initialize();
        assert_eq!(controls.opens(), 0);
        backend.sample();
        assert_eq!(backend.read(CounterMetric::CpuLoad), None);
    }

    #[test]
    fn test_failed_counter_is_reopened_lazily() {
        let (system, controls) = FixtureCounters::available();
        controls.set(RawCounter::ProcessorUtility, 10.0);
        let backend = CounterBackend::new(Box::new(system));
        backend.initialize();
        let opened = controls.opens();

        controls.fail(RawCounter::ProcessorUtility, true);
        backend.sample();
        assert_eq!(backend.read(CounterMetric::CpuLoad), None);

        controls.fail(RawCounter::ProcessorUtility, false);
        controls.set(RawCounter::ProcessorUtility, 20.0);
        backend.sample(); // reopen and prime
        assert_eq!(controls.opens(), opened + 1);
        assert_eq!(backend.read(CounterMetric::CpuLoad), None);
        backend.sample();
        assert_eq!(backend.read(CounterMetric::CpuLoad), Some(20.0));
    }

    #[test]
    fn test_initialize_async() {
        let (system, controls) = FixtureCounters::available();
        controls.set(RawCounter::DiskReadBytes, 1024.0);
        let backend = Arc::new(CounterBackend::new(Box::new(system)));
        backend.initialize_async();
        // Blocks until the background initialization has finished
        backend.initialize();
        assert!(backend.is_ready());
        backend.sample();
        assert_eq!(backend.read(CounterMetric::DiskRead), Some(1024.0));
    }

    #[test]
    fn test_uptime_without_counters() {
        let (system, controls) = FixtureCounters::absent();
        controls.set_uptime(UptimeSample {
            boot_uptime: Duration::from_secs(7200),
            session_age: None,
        });
        let backend = CounterBackend::new(Box::new(system));
        backend.initialize();
        backend.sample();
        assert_eq!(backend.read(CounterMetric::Uptime), Some(7200.0));
    }
}
