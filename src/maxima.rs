//! Adaptive maxima for percentage-style gauges
//!
//! Metrics without a natural ceiling (clocks, power, throughput, fan speed)
//! are scaled against the highest value ever observed. Maxima never
//! decrease and survive restarts through a small JSON state file.

use crate::error::Result;
use crate::key::SensorKey;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct MaxTracker {
    maxima: HashMap<SensorKey, f32>,
    dirty: bool,
}

impl MaxTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading; returns the (possibly raised) maximum
    pub fn observe(&mut self, key: SensorKey, value: f32) -> f32 {
        if !value.is_finite() {
            return self.maxima.get(&key).copied().unwrap_or(0.0);
        }
        match self.maxima.get_mut(&key) {
            Some(max) if value <= *max => *max,
            Some(max) => {
                *max = value;
                self.dirty = true;
                value
            }
            None => {
                self.maxima.insert(key, value);
                self.dirty = true;
                value
            }
        }
    }

    pub fn get(&self, key: SensorKey) -> Option<f32> {
        self.maxima.get(&key).copied()
    }

    /// `value` as a percentage of the key's maximum
    pub fn percent(&self, key: SensorKey, value: f32) -> Option<f32> {
        let max = self.get(key).filter(|m| *m > 0.0)?;
        Some((value / max * 100.0).clamp(0.0, 100.0))
    }

    pub fn len(&self) -> usize {
        self.maxima.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maxima.is_empty()
    }

    /// True if a maximum changed since the last save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn snapshot(&self) -> HashMap<SensorKey, f32> {
        self.maxima.clone()
    }

    /// Load maxima; unknown key names are skipped
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let stored: BTreeMap<String, f32> = serde_json::from_str(&content)?;
        let maxima = stored
            .into_iter()
            .filter_map(|(name, value)| {
                let key = SensorKey::parse(&name);
                if key.is_none() {
                    debug!("Ignoring stored maximum for unknown key {}", name);
                }
                Some((key?, value)).filter(|(_, v)| v.is_finite())
            })
            .collect();
        Ok(Self { maxima, dirty: false })
    }

    /// Load maxima, starting empty if the file is missing or unreadable
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }
        match Self::load(path) {
            Ok(tracker) => {
                debug!("Loaded {} maxima from {}", tracker.len(), path.display());
                tracker
            }
            Err(e) => {
                warn!("Ignoring unreadable maxima file {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored: BTreeMap<&str, f32> = self.maxima.iter().map(|(k, v)| (k.name(), *v)).collect();
        fs::write(path, serde_json::to_string_pretty(&stored)?)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_max_never_decreases() {
        let mut tracker = MaxTracker::new();
        for v in [50.0, 80.0, 60.0] {
            tracker.observe(SensorKey::CPU_POWER, v);
        }
        assert_eq!(tracker.get(SensorKey::CPU_POWER), Some(80.0));
        assert_eq!(tracker.percent(SensorKey::CPU_POWER, 60.0), Some(75.0));
        assert_eq!(tracker.percent(SensorKey::GPU_POWER, 60.0), None);
    }

    #[test]
    fn test_persist_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/maxima.json");
        let mut tracker = MaxTracker::new();
        tracker.observe(SensorKey::NET_DOWN, 125_000_000.0);
        tracker.observe(SensorKey::GPU_CLOCK, 2805.0);
        assert!(tracker.is_dirty());
        tracker.save(&path).unwrap();
        assert!(!tracker.is_dirty());

        let loaded = MaxTracker::load(&path).unwrap();
        assert_eq!(loaded.get(SensorKey::GPU_CLOCK), Some(2805.0));
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("maxima.json");
        fs::write(&path, "{not json").unwrap();
        assert!(MaxTracker::load(&path).is_err());
        assert!(MaxTracker::load_or_default(&path).is_empty());
        assert!(MaxTracker::load_or_default(&dir.path().join("missing.json")).is_empty());
    }

    #[test]
    fn test_unknown_keys_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("maxima.json");
        fs::write(&path, r#"{"CPU.Power": 142.0, "LEGACY.Thing": 3.0}"#).unwrap();
        let loaded = MaxTracker::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(SensorKey::CPU_POWER), Some(142.0));
    }
}
