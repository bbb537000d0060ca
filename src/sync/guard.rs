//! Process-wide connectivity and drain-in-flight state.
//!
//! Both flags live behind one mutex so that checking "online and idle" and
//! claiming the drain happen as a single step.

use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct GuardState {
    online: bool,
    draining: bool,
}

/// Why a drain could not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainRefusal {
    /// The network is reported offline.
    Offline,
    /// Another drain holds the permit.
    AlreadyRunning,
}

/// Shared guard over the online flag and the single-drain permit.
#[derive(Debug, Clone, Default)]
pub struct SyncGuard {
    state: Arc<Mutex<GuardState>>,
}

impl SyncGuard {
    /// Create a guard with the given initial connectivity.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(GuardState {
                online,
                draining: false,
            })),
        }
    }

    /// Last reported connectivity.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state.lock().online
    }

    /// Update connectivity. Returns `true` if the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        let mut state = self.state.lock();
        let changed = state.online != online;
        state.online = online;
        changed
    }

    /// Whether a drain currently holds the permit.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.state.lock().draining
    }

    /// Claim the drain permit if online and no drain is running.
    ///
    /// # Errors
    ///
    /// Returns the reason the drain cannot start.
    pub fn try_begin_drain(&self) -> Result<DrainPermit, DrainRefusal> {
        let mut state = self.state.lock();
        if state.draining {
            return Err(DrainRefusal::AlreadyRunning);
        }
        if !state.online {
            return Err(DrainRefusal::Offline);
        }
        state.draining = true;
        Ok(DrainPermit {
            state: Arc::clone(&self.state),
        })
    }
}

/// Proof that the holder is the only running drain. Released on drop.
#[derive(Debug)]
pub struct DrainPermit {
    state: Arc<Mutex<GuardState>>,
}

impl Drop for DrainPermit {
    fn drop(&mut self) {
        self.state.lock().draining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_permit() {
        let guard = SyncGuard::new(true);

        let permit = guard.try_begin_drain().unwrap();
        assert!(guard.is_draining());
        assert_eq!(guard.try_begin_drain().unwrap_err(), DrainRefusal::AlreadyRunning);

        drop(permit);
        assert!(!guard.is_draining());
        assert!(guard.try_begin_drain().is_ok());
    }

    #[test]
    fn test_offline_refused() {
        let guard = SyncGuard::new(false);
        assert_eq!(guard.try_begin_drain().unwrap_err(), DrainRefusal::Offline);
        assert!(!guard.is_draining());
    }

    #[test]
    fn test_set_online_reports_change() {
        let guard = SyncGuard::new(false);
        assert!(guard.set_online(true));
        assert!(!guard.set_online(true));
        assert!(guard.is_online());
    }

    #[test]
    fn test_clones_share_state() {
        let guard = SyncGuard::new(true);
        let other = guard.clone();
        let _permit = other.try_begin_drain().unwrap();
        assert!(guard.is_draining());
    }
}
