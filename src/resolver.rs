//! Value resolution for consumer threads
//!
//! Resolution order for a key:
//!
//! 1. tick memo (already resolved since the last `on_tick_start`)
//! 2. OS counter, if the backend is ready, the key is counter-eligible and
//!    no manual device override applies
//! 3. composite keys, resolved recursively through this same pipeline
//! 4. device selector (network/disk keys) or direct catalog lookup
//! 5. last plausible value, if the live read is absent or implausible
//!
//! The state behind these steps sits under one mutex. Consumers wait at
//! most `lock_wait` for it; on timeout they read the lock-free published
//! copy of the last plausible values instead.

use crate::catalog::{CatalogSnapshot, SensorCatalog};
use crate::config::SelectorConfig;
use crate::counters::CounterBackend;
use crate::error::Result;
use crate::hwmon::{HardwareTree, HwSensorType};
use crate::key::{Composite, Normalize, SensorKey};
use crate::maxima::MaxTracker;
use crate::reload::PreferenceState;
use crate::selector::{DeviceClass, DeviceSelector};
use arc_swap::ArcSwap;
use log::trace;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Last plausible reading of a key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueCacheEntry {
    pub value: f32,
    pub observed_at: Instant,
}

/// Lock-free copy of the resolver's caches
#[derive(Debug, Default)]
struct Published {
    values: HashMap<SensorKey, ValueCacheEntry>,
    maxima: HashMap<SensorKey, f32>,
}

pub(crate) struct ResolverState {
    tree: Arc<HardwareTree>,
    catalog: Arc<CatalogSnapshot>,
    prefs: PreferenceState,
    network: DeviceSelector,
    disk: DeviceSelector,
    memo: HashMap<SensorKey, Option<f32>>,
    cache: HashMap<SensorKey, ValueCacheEntry>,
    maxima: MaxTracker,
    dirty: bool,
}

impl ResolverState {
    fn resolve(&mut self, key: SensorKey, now: Instant, counters: &CounterBackend) -> Option<f32> {
        if let Some(memoized) = self.memo.get(&key) {
            return *memoized;
        }

        let info = key.info();
        let value = match self.resolve_live(key, now, counters).and_then(|v| info.accept(v)) {
            Some(v) => {
                self.record(key, v, now);
                Some(v)
            }
            None => self.cache.get(&key).map(|e| e.value),
        };
        self.memo.insert(key, value);
        value
    }

    fn resolve_live(&mut self, key: SensorKey, now: Instant, counters: &CounterBackend) -> Option<f32> {
        let info = key.info();

        if let Some(metric) = info.counter {
            let overridden = info
                .device
                .map(|d| self.prefs.preferred(d.class()).is_some())
                .unwrap_or(false);
            if !overridden {
                if let Some(v) = counters.read(metric).and_then(|v| info.accept(v)) {
                    return Some(v);
                }
            }
        }

        if let Some(composite) = info.composite {
            return match composite {
                Composite::Percent { used, total } => {
                    let used = self.resolve(used, now, counters)?;
                    let total = self.resolve(total, now, counters)?;
                    (total > 0.0).then(|| used / total * 100.0)
                }
                Composite::Sum(a, b) => {
                    let a = self.resolve(a, now, counters);
                    let b = self.resolve(b, now, counters);
                    Some(a? + b?)
                }
            };
        }

        let raw = if let Some(metric) = info.device {
            let class = metric.class();
            let preferred = self.prefs.preferred(class);
            let selector = match class {
                DeviceClass::Disk => &mut self.disk,
                DeviceClass::Network => &mut self.network,
            };
            selector.get_best_value(metric, now, preferred, self.tree.as_ref())
        } else if key == SensorKey::FAN_CPU && self.prefs.preferred_fan.is_some() {
            let name = self.prefs.preferred_fan.as_deref();
            self.tree
                .find_sensor(|_, s| s.sensor_type == HwSensorType::Fan && Some(s.name.as_str()) == name)
                .and_then(|h| self.tree.read(&h))
                .or_else(|| self.catalog_read(key))
        } else {
            self.catalog_read(key)
        };

        raw.map(|v| {
            let reference = match info.normalize {
                Normalize::MegabytesBy(capacity) if capacity != key => self.catalog_read(capacity).unwrap_or(v),
                _ => v,
            };
            info.normalize.apply(v, reference)
        })
    }

    fn catalog_read(&self, key: SensorKey) -> Option<f32> {
        self.tree.read(self.catalog.get(key)?)
    }

    fn record(&mut self, key: SensorKey, value: f32, now: Instant) {
        self.cache.insert(key, ValueCacheEntry { value, observed_at: now });
        if key.info().adaptive_max {
            self.maxima.observe(key, value);
        }
        self.dirty = true;
    }

    fn published(&self) -> Published {
        Published {
            values: self.cache.clone(),
            maxima: self.maxima.snapshot(),
        }
    }
}

/// Thread-safe key lookup over the live tree, catalog and counters
pub struct ValueResolver {
    state: Mutex<ResolverState>,
    published: ArcSwap<Published>,
    counters: Arc<CounterBackend>,
    lock_wait: Duration,
    /// Hardware classes requested by consumers (HwType bits)
    demand: AtomicU32,
}

impl ValueResolver {
    pub fn new(counters: Arc<CounterBackend>, selector: &SelectorConfig, lock_wait: Duration, maxima: MaxTracker) -> Self {
        let cooldown = Duration::from_secs(selector.cooldown_secs);
        let state = ResolverState {
            tree: Arc::new(HardwareTree::empty()),
            catalog: Arc::new(CatalogSnapshot::empty()),
            prefs: PreferenceState::default(),
            network: DeviceSelector::new(DeviceClass::Network, cooldown, selector.activity_threshold),
            disk: DeviceSelector::new(DeviceClass::Disk, cooldown, selector.activity_threshold),
            memo: HashMap::new(),
            cache: HashMap::new(),
            maxima,
            dirty: false,
        };
        let published = ArcSwap::from_pointee(state.published());
        Self {
            state: Mutex::new(state),
            published,
            counters,
            lock_wait,
            demand: AtomicU32::new(0),
        }
    }

    /// Current value of `key`; `None` if unknown or unavailable
    pub fn get(&self, key: &str) -> Option<f32> {
        self.get_key(SensorKey::parse(key)?)
    }

    pub fn get_key(&self, key: SensorKey) -> Option<f32> {
        self.demand.fetch_or(key.info().demand_mask(), Ordering::Relaxed);

        let Some(mut state) = self.state.try_lock_for(self.lock_wait) else {
            trace!("{}: resolver busy, serving last valid value", key);
            return self.last_valid(key);
        };
        let value = state.resolve(key, Instant::now(), &self.counters);
        if state.dirty {
            state.dirty = false;
            self.published.store(Arc::new(state.published()));
        }
        value
    }

    /// Start a new tick: memoized results are discarded
    pub fn on_tick_start(&self) {
        self.state.lock().memo.clear();
    }

    /// Last plausible value, without touching the lock
    pub fn last_valid(&self, key: SensorKey) -> Option<f32> {
        self.published.load().values.get(&key).map(|e| e.value)
    }

    /// Highest value ever observed for an adaptive key
    pub fn scale_max(&self, key: SensorKey) -> Option<f32> {
        self.published.load().maxima.get(&key).copied()
    }

    /// Current value as a percentage of the key's observed maximum
    pub fn percent_of(&self, key: SensorKey) -> Option<f32> {
        let value = self.get_key(key)?;
        let max = self.scale_max(key).filter(|m| *m > 0.0)?;
        Some((value / max * 100.0).clamp(0.0, 100.0))
    }

    /// Hardware-class mask of every key requested so far
    pub fn demand_mask(&self) -> u32 {
        self.demand.load(Ordering::Relaxed)
    }

    /// Name of the device the selector currently reads for `class`
    pub fn selected_device(&self, class: DeviceClass) -> Option<String> {
        let state = self.state.try_lock_for(self.lock_wait)?;
        let selector = match class {
            DeviceClass::Disk => &state.disk,
            DeviceClass::Network => &state.network,
        };
        selector.current().map(str::to_owned)
    }

    pub(crate) fn tree(&self) -> Arc<HardwareTree> {
        Arc::clone(&self.state.lock().tree)
    }

    /// Swap in a rebuilt tree and catalog and drop every cache tied to the old one
    ///
    /// Maxima survive; they describe the hardware, not the tree.
    pub(crate) fn install(
        &self,
        tree: Arc<HardwareTree>,
        snapshot: Arc<CatalogSnapshot>,
        catalog: &SensorCatalog,
        prefs: PreferenceState,
    ) {
        let mut state = self.state.lock();
        catalog.publish(Arc::clone(&snapshot));
        state.tree = tree;
        state.catalog = snapshot;
        state.prefs = prefs;
        state.network.reset();
        state.disk.reset();
        state.memo.clear();
        state.cache.clear();
        state.dirty = false;
        self.published.store(Arc::new(state.published()));
    }

    /// Persist maxima if any changed since the last save
    pub(crate) fn save_maxima(&self, path: &Path) -> Result<bool> {
        let mut state = self.state.lock();
        if !state.maxima.is_dirty() {
            return Ok(false);
        }
        state.maxima.save(path)?;
        Ok(true)
    }
}
