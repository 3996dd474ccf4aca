//! Engine handle and poll loop
//!
//! An [`Engine`] is constructed once and shared (`Arc<Engine>`) with every
//! consumer. The poll side calls [`Engine::update_all`] on a timer, either
//! from its own loop or through [`Engine::start`]; consumers call
//! [`Engine::get`] at whatever cadence they redraw.

use crate::catalog::{self, SensorCatalog};
use crate::config::Config;
use crate::counters::{platform_counters, CounterBackend, CounterSystem};
use crate::error::Result;
use crate::hwmon::{platform_provider, HardwareTree, SensorProvider};
use crate::key::SensorKey;
use crate::maxima::MaxTracker;
use crate::reload::{PreferenceState, RebuildReason, ReloadCoordinator};
use crate::resolver::ValueResolver;
use crate::selector::{self, DeviceClass};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Passed to callbacks after every `update_all`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub tick: u64,
    pub elapsed: Duration,
    /// The catalog was rebuilt during this tick
    pub rebuilt: bool,
    pub at: DateTime<Utc>,
}

type UpdateCallback = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

pub struct Engine {
    config: Config,
    provider: Mutex<Box<dyn SensorProvider>>,
    counters: Arc<CounterBackend>,
    catalog: SensorCatalog,
    resolver: ValueResolver,
    reload: Mutex<ReloadCoordinator>,
    preferences: Mutex<PreferenceState>,
    callbacks: Mutex<Vec<UpdateCallback>>,
    /// Serializes poll cycles
    poll: Mutex<()>,
    generation: AtomicU64,
    tick: AtomicU64,
}

impl Engine {
    pub fn new(config: Config, provider: Box<dyn SensorProvider>, counters: Box<dyn CounterSystem>) -> Arc<Self> {
        let maxima = config
            .general
            .state_file
            .as_deref()
            .map(MaxTracker::load_or_default)
            .unwrap_or_default();

        let counters = Arc::new(CounterBackend::new(counters));
        counters.initialize_async();

        let resolver = ValueResolver::new(
            Arc::clone(&counters),
            &config.selector,
            config.general.lock_wait(),
            maxima,
        );

        info!("Engine using sensor provider {}", provider.name());
        Arc::new(Self {
            preferences: Mutex::new(config.preferences()),
            reload: Mutex::new(ReloadCoordinator::new(config.general.rebuild_interval())),
            config,
            provider: Mutex::new(provider),
            counters,
            catalog: SensorCatalog::new(),
            resolver,
            callbacks: Mutex::new(Vec::new()),
            poll: Mutex::new(()),
            generation: AtomicU64::new(0),
            tick: AtomicU64::new(0),
        })
    }

    /// Engine over the native sensor provider and counter system
    pub fn with_platform_defaults(config: Config) -> Arc<Self> {
        Self::new(config, platform_provider(), platform_counters())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current value of `key` (consumer thread)
    pub fn get(&self, key: &str) -> Option<f32> {
        self.resolver.get(key)
    }

    pub fn get_key(&self, key: SensorKey) -> Option<f32> {
        self.resolver.get_key(key)
    }

    pub fn scale_max(&self, key: SensorKey) -> Option<f32> {
        self.resolver.scale_max(key)
    }

    pub fn percent_of(&self, key: SensorKey) -> Option<f32> {
        self.resolver.percent_of(key)
    }

    /// Ticks completed so far
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    /// One poll cycle: rebuild if needed, refresh demanded hardware, sample
    /// counters, then start a new resolver tick
    pub fn update_all(&self) -> UpdateEvent {
        let _cycle = self.poll.lock();
        let started = Instant::now();

        // A rebuild already updated every node of the new tree
        let rebuilt = self.maybe_rebuild();
        if !rebuilt {
            self.refresh_subset(self.resolver.demand_mask());
        }
        self.counters.sample();
        self.resolver.on_tick_start();

        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        let persist_every = self.config.general.persist_every_ticks;
        if persist_every > 0 && tick % persist_every == 0 {
            if let Err(e) = self.persist_maxima() {
                warn!("Failed to persist maxima: {}", e);
            }
        }

        let event = UpdateEvent {
            tick,
            elapsed: started.elapsed(),
            rebuilt,
            at: Utc::now(),
        };
        debug!("Tick {} took {:?}", tick, event.elapsed);

        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(&event);
        }
        event
    }

    /// Rebuild the tree and catalog if preferences or the timer call for it
    ///
    /// The scan and catalog build happen off-lock; only the swap holds the
    /// resolver lock.
    pub fn maybe_rebuild(&self) -> bool {
        let now = Instant::now();
        let current = self.preferences.lock().clone();
        let Some(plan) = self.reload.lock().plan(&current, now) else {
            return false;
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut provider = self.provider.lock();
        let hardware = match provider.scan(&plan.scan_options()) {
            Ok(hardware) => hardware,
            Err(e) if plan.reason == RebuildReason::Initial => {
                warn!("{} scan failed, no sensors available: {}", provider.name(), e);
                Vec::new()
            }
            Err(e) => {
                warn!("{} scan failed, keeping previous hardware tree: {}", provider.name(), e);
                self.reload.lock().commit(&plan, now);
                return false;
            }
        };

        let tree = HardwareTree::new(generation, hardware);
        for hw in tree.hardware() {
            if let Err(e) = provider.update(hw) {
                debug!("{}: initial update of {} failed: {}", provider.name(), hw.name, e);
            }
        }
        drop(provider);

        let snapshot = Arc::new(catalog::build(&tree));
        info!(
            "Catalog rebuilt ({:?}): generation {}, {} hardware, {} sensors, {} keys",
            plan.reason,
            generation,
            tree.hardware().len(),
            tree.sensor_count(),
            snapshot.len()
        );
        self.resolver
            .install(Arc::new(tree), snapshot, &self.catalog, plan.preferences.clone());
        self.reload.lock().commit(&plan, now);
        true
    }

    /// Refresh hardware whose class is in `mask`; every node when `mask` is 0
    pub fn refresh_subset(&self, mask: u32) -> usize {
        let tree = self.resolver.tree();
        let mut provider = self.provider.lock();
        let mut refreshed = 0;
        for hw in tree.hardware() {
            if mask != 0 && !hw.matches_mask(mask) {
                continue;
            }
            if let Err(e) = provider.update(hw) {
                debug!("{}: update of {} failed: {}", provider.name(), hw.name, e);
            }
            refreshed += 1;
        }
        refreshed
    }

    /// Device names for a manual-override dropdown
    pub fn list_candidates(&self, class: DeviceClass) -> Vec<String> {
        selector::enumerate(&self.resolver.tree(), class)
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// Replace preferences; applied by the next `update_all`
    pub fn set_preferences(&self, preferences: PreferenceState) {
        *self.preferences.lock() = preferences;
    }

    pub fn preferences(&self) -> PreferenceState {
        self.preferences.lock().clone()
    }

    /// Current hardware tree, for diagnostics
    pub fn hardware_tree(&self) -> Arc<HardwareTree> {
        self.resolver.tree()
    }

    pub fn catalog(&self) -> &SensorCatalog {
        &self.catalog
    }

    pub fn counters(&self) -> &Arc<CounterBackend> {
        &self.counters
    }

    pub fn selected_device(&self, class: DeviceClass) -> Option<String> {
        self.resolver.selected_device(class)
    }

    /// Save maxima to the configured state file if they changed
    pub fn persist_maxima(&self) -> Result<bool> {
        match &self.config.general.state_file {
            Some(path) => self.resolver.save_maxima(path),
            None => Ok(false),
        }
    }

    /// Run `update_all` on a background thread every poll interval
    pub fn start(self: &Arc<Self>) -> Result<Poller> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let engine = Arc::clone(self);
        let interval = self.config.general.poll_interval();

        let handle = thread::Builder::new().name("hwpoll-poll".into()).spawn(move || {
            info!("Poll loop started ({:?} interval)", interval);
            loop {
                engine.update_all();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("Poll loop stopped");
        })?;

        Ok(Poller {
            engine: Arc::clone(self),
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

/// Running poll loop; stops (and saves maxima) on `stop` or drop
pub struct Poller {
    engine: Arc<Engine>,
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if handle.join().is_err() {
            warn!("Poll thread panicked");
        }
        if let Err(e) = self.engine.persist_maxima() {
            warn!("Failed to persist maxima: {}", e);
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
