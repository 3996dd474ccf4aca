//! Rebuild planning
//!
//! The coordinator compares the user's current preferences with the ones
//! the live catalog was built from and decides whether this tick needs a
//! rebuild:
//!
//! - first tick: always
//! - a preferred disk/network/fan name changed: immediately
//! - fan or controller scanning switched on: immediately
//! - scanning switched off: deferred to the next periodic rebuild, so a
//!   quick off/on flip does not tear down and reconnect the subsystem
//! - otherwise every `rebuild_interval` as a safety net
//!
//! The engine performs the rebuild and reports back with [`ReloadCoordinator::commit`].

use crate::hwmon::ScanOptions;
use crate::selector::DeviceClass;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// User preferences that shape the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceState {
    pub preferred_disk: Option<String>,
    pub preferred_network: Option<String>,
    pub preferred_fan: Option<String>,
    pub fan_scanning: bool,
    pub controller_scanning: bool,
}

impl PreferenceState {
    pub fn preferred(&self, class: DeviceClass) -> Option<&str> {
        match class {
            DeviceClass::Disk => self.preferred_disk.as_deref(),
            DeviceClass::Network => self.preferred_network.as_deref(),
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            fans: self.fan_scanning,
            controllers: self.controller_scanning,
        }
    }

    fn overrides_differ(&self, other: &PreferenceState) -> bool {
        self.preferred_disk != other.preferred_disk
            || self.preferred_network != other.preferred_network
            || self.preferred_fan != other.preferred_fan
    }

    fn enables_beyond(&self, applied: &PreferenceState) -> bool {
        (self.fan_scanning && !applied.fan_scanning) || (self.controller_scanning && !applied.controller_scanning)
    }

    /// Current overrides with subsystems kept on if either side has them on
    fn keeping_enabled(&self, applied: &PreferenceState) -> PreferenceState {
        PreferenceState {
            fan_scanning: self.fan_scanning || applied.fan_scanning,
            controller_scanning: self.controller_scanning || applied.controller_scanning,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildReason {
    Initial,
    PreferencesChanged,
    SubsystemEnabled,
    Periodic,
}

/// What the next rebuild should scan and which preferences it applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildPlan {
    pub reason: RebuildReason,
    pub preferences: PreferenceState,
}

impl RebuildPlan {
    pub fn scan_options(&self) -> ScanOptions {
        self.preferences.scan_options()
    }
}

#[derive(Debug)]
pub struct ReloadCoordinator {
    rebuild_interval: Duration,
    applied: Option<PreferenceState>,
    last_build: Option<Instant>,
}

impl ReloadCoordinator {
    pub fn new(rebuild_interval: Duration) -> Self {
        Self {
            rebuild_interval,
            applied: None,
            last_build: None,
        }
    }

    /// Preferences in effect for the live catalog
    pub fn applied(&self) -> Option<&PreferenceState> {
        self.applied.as_ref()
    }

    pub fn plan(&self, current: &PreferenceState, now: Instant) -> Option<RebuildPlan> {
        let Some(applied) = &self.applied else {
            return Some(RebuildPlan {
                reason: RebuildReason::Initial,
                preferences: current.clone(),
            });
        };

        let periodic_due = self
            .last_build
            .map(|at| now.saturating_duration_since(at) >= self.rebuild_interval)
            .unwrap_or(true);
        if periodic_due {
            // Natural rebuild point: deferred disables take effect here
            return Some(RebuildPlan {
                reason: RebuildReason::Periodic,
                preferences: current.clone(),
            });
        }

        let reason = if current.overrides_differ(applied) {
            RebuildReason::PreferencesChanged
        } else if current.enables_beyond(applied) {
            RebuildReason::SubsystemEnabled
        } else {
            return None;
        };
        Some(RebuildPlan {
            reason,
            preferences: current.keeping_enabled(applied),
        })
    }

    /// Record a completed rebuild
    pub fn commit(&mut self, plan: &RebuildPlan, now: Instant) {
        self.applied = Some(plan.preferences.clone());
        self.last_build = Some(now);
    }
}
