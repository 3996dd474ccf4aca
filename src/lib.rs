//! # hwpoll
//!
//! Hardware telemetry acquisition for dashboards that redraw many times per
//! second. A poll thread refreshes the hardware tree on a fixed cadence;
//! consumers look values up by stable semantic key (`"CPU.Temp"`,
//! `"GPU.VRAM"`, `"NET.Down"`) without ever blocking on hardware I/O.
//!
//! ## Features
//!
//! - **Semantic keys**: a data-driven rule table maps raw sensor names to
//!   stable keys with fixed units
//! - **OS counters first**: processor, memory and disk counters are preferred
//!   over sensor readings when the platform provides them
//! - **Device selection**: the busiest real network adapter and the system
//!   disk are picked automatically, with hysteresis and manual overrides
//! - **Bounded waits**: a reader never waits more than a few milliseconds;
//!   under contention it gets the last plausible value
//! - **Adaptive maxima**: percentage gauges for clocks, power and throughput
//!   scale against the highest value seen, persisted across restarts
//!
//! ## Quick Start
//!
//! ```no_run
//! use hwpoll::{Config, Engine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::with_platform_defaults(Config::load()?);
//! let poller = engine.start()?;
//!
//! // From the UI thread, at any cadence
//! if let Some(temp) = engine.get("CPU.Temp") {
//!     println!("CPU: {:.1}°C", temp);
//! }
//!
//! poller.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! | Source            | Linux                        | Windows        | Other |
//! |-------------------|------------------------------|----------------|-------|
//! | Sensor tree       | sysfs hwmon, procfs          | -              | -     |
//! | OS counters       | procfs/cpufreq               | PDH + registry | -     |
//!
//! Platforms without a source report every affected key as unavailable.

pub mod catalog;
pub mod config;
pub mod counters; // OS performance counters with async initialization
pub mod engine;
pub mod error;
pub mod hwmon; // Hardware tree model and platform sensor providers
pub mod key;
pub mod maxima;
pub mod platform;
pub mod reload;
pub mod resolver;
pub mod selector; // Best-device selection for network and disk keys
pub mod uptime;

pub use catalog::{CatalogSnapshot, SensorCatalog};
pub use config::{Config, DeviceConfig, GeneralConfig, SelectorConfig};
pub use counters::{BackendState, CounterBackend, CounterMetric, CounterSystem};
pub use engine::{Engine, Poller, UpdateEvent};
pub use error::{Error, Result};
pub use hwmon::{Hardware, HardwareTree, HwSensorType, HwType, ScanOptions, Sensor, SensorHandle, SensorProvider};
pub use key::{KeyInfo, SensorKey, Unit};
pub use maxima::MaxTracker;
pub use reload::{PreferenceState, RebuildReason, ReloadCoordinator};
pub use resolver::{ValueCacheEntry, ValueResolver};
pub use selector::{CandidateDevice, DeviceClass, DeviceMetric, DeviceSelector};
