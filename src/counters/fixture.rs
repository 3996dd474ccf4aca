// Scriptable counter system for tests

use super::{Counter, CounterCategory, CounterSystem, RawCounter, StaticFact};
use crate::error::{Error, Result};
use crate::uptime::UptimeSample;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub(crate) struct CounterControls {
    values: Arc<Mutex<HashMap<RawCounter, f32>>>,
    failing: Arc<Mutex<HashSet<RawCounter>>>,
    opens: Arc<AtomicUsize>,
    uptime: Arc<Mutex<Option<UptimeSample>>>,
}

impl CounterControls {
    pub fn set(&self, counter: RawCounter, value: f32) {
        self.values.lock().insert(counter, value);
    }

    pub fn fail(&self, counter: RawCounter, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(counter);
        } else {
            set.remove(&counter);
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn set_uptime(&self, sample: UptimeSample) {
        *self.uptime.lock() = Some(sample);
    }
}

pub(crate) struct FixtureCounters {
    controls: CounterControls,
    available: bool,
}

impl FixtureCounters {
    pub fn available() -> (Self, CounterControls) {
        let controls = CounterControls::default();
        (
            Self {
                controls: controls.clone(),
                available: true,
            },
            controls,
        )
    }

    /// Every counter category missing, as on stripped OS images
    pub fn absent() -> (Self, CounterControls) {
        let controls = CounterControls::default();
        (
            Self {
                controls: controls.clone(),
                available: false,
            },
            controls,
        )
    }
}

struct FixtureCounter {
    raw: RawCounter,
    controls: CounterControls,
    primed: bool,
}

impl Counter for FixtureCounter {
    fn next_value(&mut self) -> Result<f32> {
        if self.controls.failing.lock().contains(&self.raw) {
            return Err(Error::Counter(format!("{:?} failed", self.raw)));
        }
        if !self.primed {
            self.primed = true;
            return Ok(0.0);
        }
        // Unscripted counters produce no reading
        Ok(self.controls.values.lock().get(&self.raw).copied().unwrap_or(f32::NAN))
    }
}

impl CounterSystem for FixtureCounters {
    fn name(&self) -> &str {
        "fixture"
    }

    fn category_exists(&self, _category: CounterCategory) -> bool {
        self.available
    }

    fn open(&self, counter: RawCounter) -> Result<Box<dyn Counter>> {
        self.controls.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixtureCounter {
            raw: counter,
            controls: self.controls.clone(),
            primed: false,
        }))
    }

    fn static_fact(&self, fact: StaticFact) -> Option<f64> {
        match fact {
            StaticFact::CpuBaseClockMhz => Some(4500.0),
            StaticFact::TotalMemoryMb => Some(32_768.0),
        }
    }

    fn uptime_sample(&self) -> Option<UptimeSample> {
        *self.controls.uptime.lock()
    }
}
