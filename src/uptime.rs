//! Effective system uptime
//!
//! With hybrid shutdown ("fast startup") the kernel is hibernated rather
//! than restarted, so the kernel tick count keeps growing across what the
//! user experiences as a cold boot. When the interactive session is much
//! younger than the kernel, the session age is the better answer.

use std::time::Duration;

/// Session and kernel ages further apart than this indicate a resumed kernel
pub const FAST_STARTUP_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// Raw inputs for the uptime heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimeSample {
    /// Time since the kernel booted
    pub boot_uptime: Duration,
    /// Time since the user's shell session started, if known
    pub session_age: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootKind {
    Cold,
    FastStartup,
}

pub fn classify(sample: &UptimeSample) -> BootKind {
    match sample.session_age {
        Some(session)
            if session < FAST_STARTUP_THRESHOLD
                && sample.boot_uptime > session + FAST_STARTUP_THRESHOLD =>
        {
            BootKind::FastStartup
        }
        _ => BootKind::Cold,
    }
}

pub fn effective_uptime(sample: &UptimeSample) -> Duration {
    match (classify(sample), sample.session_age) {
        (BootKind::FastStartup, Some(session)) => session,
        _ => sample.boot_uptime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u64 = 60;

    fn sample(boot_min: u64, session_min: Option<u64>) -> UptimeSample {
        UptimeSample {
            boot_uptime: Duration::from_secs(boot_min * MIN),
            session_age: session_min.map(|m| Duration::from_secs(m * MIN)),
        }
    }

    #[test]
    fn test_fast_startup_uses_session_age() {
        // Kernel resumed from hibernation three days ago, user logged in 5 min ago
        let s = sample(3 * 24 * 60, Some(5));
        assert_eq!(classify(&s), BootKind::FastStartup);
        assert_eq!(effective_uptime(&s), Duration::from_secs(5 * MIN));
    }

    #[test]
    fn test_cold_boot_uses_kernel_uptime() {
        // Session started shortly after boot
        let s = sample(20, Some(19));
        assert_eq!(classify(&s), BootKind::Cold);
        assert_eq!(effective_uptime(&s), Duration::from_secs(20 * MIN));

        // Long-lived session: relogin after hours is not a fast startup
        let s = sample(600, Some(45));
        assert_eq!(classify(&s), BootKind::Cold);

        assert_eq!(effective_uptime(&sample(90, None)), Duration::from_secs(90 * MIN));
    }
}
