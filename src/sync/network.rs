//! Network monitor: the single source of truth for connectivity.
//!
//! The platform signal enters through [`NetworkMonitor::set_online`]. Each
//! real transition is published on a `watch` channel and dispatched once to
//! every subscriber callback. Callbacks run on a snapshot taken outside the
//! registry lock, so a callback may subscribe or unsubscribe without
//! deadlocking, and a panicking callback is caught and logged.

use std::net::{TcpStream, ToSocketAddrs};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::guard::SyncGuard;

/// Connectivity as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    #[must_use]
    pub const fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }

    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A best-effort connectivity check used to seed the monitor at startup.
pub trait ConnectivityProbe: Send + Sync {
    /// Whether the platform currently reports connectivity.
    fn check(&self) -> bool;
}

/// Probe that tries a bounded TCP connect to a known host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    /// `host:port` to connect to.
    pub target: String,
    pub timeout: Duration,
}

impl TcpProbe {
    #[must_use]
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }
}

impl ConnectivityProbe for TcpProbe {
    fn check(&self) -> bool {
        let Ok(addrs) = self.target.to_socket_addrs() else {
            debug!(probe = %self.target, "probe target did not resolve");
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

type Callback = Arc<dyn Fn(NetworkStatus) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: Vec<(u64, Callback)>,
}

struct MonitorInner {
    guard: SyncGuard,
    registry: Arc<Mutex<Registry>>,
    sender: watch::Sender<NetworkStatus>,
    // Serializes transitions so subscribers see them in order
    transition: Mutex<()>,
}

/// Observes connectivity transitions and fans them out.
///
/// Cloning shares the monitor.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

impl NetworkMonitor {
    /// Create a monitor with a known initial state.
    #[must_use]
    pub fn new(initial: NetworkStatus) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            inner: Arc::new(MonitorInner {
                guard: SyncGuard::new(initial.is_online()),
                registry: Arc::new(Mutex::new(Registry::default())),
                sender,
                transition: Mutex::new(()),
            }),
        }
    }

    /// Create a monitor seeded by querying the platform.
    #[must_use]
    pub fn from_probe(probe: &dyn ConnectivityProbe) -> Self {
        Self::new(NetworkStatus::from_online(probe.check()))
    }

    /// Best-effort current status; not a guarantee the remote is reachable.
    #[must_use]
    pub fn current_status(&self) -> NetworkStatus {
        NetworkStatus::from_online(self.inner.guard.is_online())
    }

    /// Shared guard holding the online flag and the drain permit.
    #[must_use]
    pub fn guard(&self) -> &SyncGuard {
        &self.inner.guard
    }

    /// Report a platform connectivity signal.
    ///
    /// Repeated signals with the same value are ignored. Returns `true` if
    /// this call was a transition. Callbacks must not call back into
    /// `set_online`.
    pub fn set_online(&self, online: bool) -> bool {
        let _ordered = self.inner.transition.lock();
        if !self.inner.guard.set_online(online) {
            return false;
        }

        let status = NetworkStatus::from_online(online);
        info!(%status, "network transition");
        self.inner.sender.send_replace(status);

        let snapshot: Vec<(u64, Callback)> = self.inner.registry.lock().callbacks.clone();
        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(status))).is_err() {
                error!(subscription = id, %status, "network subscriber panicked");
            }
        }
        true
    }

    /// Re-query a probe and report the result.
    pub fn refresh(&self, probe: &dyn ConnectivityProbe) -> bool {
        self.set_online(probe.check())
    }

    /// Register a callback invoked once per transition.
    ///
    /// The callback stays registered until the returned handle is
    /// unsubscribed or dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(NetworkStatus) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.callbacks.push((id, Arc::new(callback)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner.registry),
        }
    }

    /// Channel receiver that always holds the latest status.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<NetworkStatus> {
        self.inner.sender.subscribe()
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().callbacks.len()
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("status", &self.current_status())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle to a registered callback.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the callback.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().callbacks.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe(bool);

    impl ConnectivityProbe for FixedProbe {
        fn check(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_transitions_dispatch_once() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let _sub = monitor.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(monitor.set_online(true));
        assert!(!monitor.set_online(true));
        assert!(monitor.set_online(false));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.current_status(), NetworkStatus::Offline);
    }

    #[test]
    fn test_unsubscribe_and_drop() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let calls = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&calls);
        let first = monitor.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let seen = Arc::clone(&calls);
        let second = monitor.subscribe(move |_| {
            seen.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(monitor.subscriber_count(), 2);

        first.unsubscribe();
        monitor.set_online(true);
        assert_eq!(calls.load(Ordering::SeqCst), 10);

        drop(second);
        monitor.set_online(false);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(monitor.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let calls = Arc::new(AtomicUsize::new(0));

        let _bad = monitor.subscribe(|_| panic!("subscriber bug"));
        let seen = Arc::clone(&calls);
        let _good = monitor.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(monitor.set_online(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(monitor.current_status().is_online());
    }

    #[test]
    fn test_callback_can_unsubscribe_itself() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let own = Arc::clone(&slot);
        let sub = monitor.subscribe(move |_| {
            own.lock().take();
        });
        *slot.lock() = Some(sub);

        monitor.set_online(true);
        assert_eq!(monitor.subscriber_count(), 0);
    }

    #[test]
    fn test_watch_channel_tracks_latest() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let rx = monitor.watch();

        monitor.set_online(true);
        assert_eq!(*rx.borrow(), NetworkStatus::Online);
    }

    #[test]
    fn test_from_probe() {
        assert!(NetworkMonitor::from_probe(&FixedProbe(true)).current_status().is_online());
        let monitor = NetworkMonitor::from_probe(&FixedProbe(false));
        assert!(!monitor.guard().is_online());
        assert!(monitor.refresh(&FixedProbe(true)));
    }

    #[test]
    fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = TcpProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(probe.check());

        let unresolvable = TcpProbe::new("not a host", Duration::from_millis(100));
        assert!(!unresolvable.check());
    }
}
