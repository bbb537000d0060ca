//! Status, watch and drain commands.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, warn};

use crate::cli::args::OutputFormat;
use crate::config::Config;
use crate::error::FieldSyncError;
use crate::output::{format_drain_report, format_status};
use crate::storage::LocalStore;
use crate::sync::{
    CoordinatorConfig, HttpRemote, NetworkMonitor, NetworkStatus, StatusReporter, SyncCoordinator,
    SyncStatus, TcpProbe,
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Show the sync status.
///
/// The network counts as online when the configured endpoint accepts a
/// TCP connection.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn status(store: &LocalStore, config: &Config, format: OutputFormat) -> Result<String, FieldSyncError> {
    let monitor = monitor_for(config.remote.endpoint.as_deref(), false);
    let reporter = StatusReporter::new(store.queue(), monitor);

    let snapshot = reporter.snapshot()?;
    let stats = store.queue().stats()?;
    format_status(&snapshot, &stats, format)
}

/// Print every status change until interrupted.
///
/// The endpoint is re-probed on every poll interval so reconnects show up
/// without a restart.
///
/// # Errors
///
/// Returns an error if the initial status cannot be read.
pub async fn watch_status(
    store: &LocalStore,
    config: &Config,
    format: OutputFormat,
) -> Result<String, FieldSyncError> {
    let probe = config.remote.endpoint.as_deref().and_then(probe_for);
    let monitor = match &probe {
        Some(probe) => NetworkMonitor::from_probe(probe),
        None => NetworkMonitor::new(NetworkStatus::Offline),
    };
    let interval = config.sync.status_poll_interval().max(Duration::from_secs(1));
    let reporter = StatusReporter::new(store.queue(), monitor.clone()).with_poll_interval(interval);

    println!("{}", status_line(reporter.status()?, format));
    let watch = reporter.on_status_change(move |status| println!("{}", status_line(status, format)));

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let Some(probe) = probe.clone() else { continue };
                let monitor = monitor.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || monitor.refresh(&probe)).await {
                    warn!(error = %e, "connectivity probe failed");
                }
            },
        }
    }

    watch.stop().await;
    Ok(String::new())
}

fn status_line(status: SyncStatus, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(&status).unwrap_or_default(),
        OutputFormat::Pretty => format!("{}  {status}", Local::now().format("%H:%M:%S")),
    }
}

/// Run one drain against the HTTP endpoint.
///
/// # Errors
///
/// Returns an error if no endpoint is configured or the client cannot be
/// built. Failures during the drain are reported, not returned.
pub async fn drain(
    store: &LocalStore,
    config: &Config,
    endpoint: Option<String>,
    offline: bool,
    format: OutputFormat,
) -> Result<String, FieldSyncError> {
    let endpoint = endpoint.or_else(|| config.remote.endpoint.clone()).ok_or_else(|| {
        FieldSyncError::Config(
            "No sync endpoint; pass --endpoint or set remote.endpoint in config.yaml".to_string(),
        )
    })?;

    let remote = HttpRemote::new(&endpoint, config.remote.auth_token.clone())?;
    let monitor = probe_off_runtime(Some(&endpoint), offline).await;

    let coordinator = SyncCoordinator::new(store.clone(), Arc::new(remote), monitor)
        .with_config(CoordinatorConfig::from(&config.sync))
        .with_policy(Arc::from(config.retry.build_policy()));

    let report = coordinator.drain_now().await;
    format_drain_report(&report, format)
}

/// Build a monitor seeded from a reachability probe of `endpoint`.
fn monitor_for(endpoint: Option<&str>, force_offline: bool) -> NetworkMonitor {
    if force_offline {
        return NetworkMonitor::new(NetworkStatus::Offline);
    }
    match endpoint.and_then(probe_for) {
        Some(probe) => NetworkMonitor::from_probe(&probe),
        None => NetworkMonitor::new(NetworkStatus::Offline),
    }
}

/// Like [`monitor_for`], with the blocking connect on the blocking pool.
async fn probe_off_runtime(endpoint: Option<&str>, force_offline: bool) -> NetworkMonitor {
    let endpoint = endpoint.map(str::to_string);
    match tokio::task::spawn_blocking(move || monitor_for(endpoint.as_deref(), force_offline)).await {
        Ok(monitor) => monitor,
        Err(e) => {
            warn!(error = %e, "connectivity probe failed");
            NetworkMonitor::new(NetworkStatus::Offline)
        },
    }
}

fn probe_for(endpoint: &str) -> Option<TcpProbe> {
    let url = reqwest::Url::parse(endpoint).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    debug!(host, port, "probing sync endpoint");
    Some(TcpProbe::new(format!("{host}:{port}"), PROBE_TIMEOUT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FuelEntry;
    use crate::sync::SyncAction;

    #[test]
    fn test_probe_for() {
        let probe = probe_for("https://sync.example.com/api").unwrap();
        assert_eq!(probe.target, "sync.example.com:443");

        let probe = probe_for("http://127.0.0.1:8080").unwrap();
        assert_eq!(probe.target, "127.0.0.1:8080");

        assert!(probe_for("not a url").is_none());
    }

    #[test]
    fn test_status_line() {
        assert_eq!(
            status_line(SyncStatus::Pending(2), OutputFormat::Json),
            r#"{"state":"pending","count":2}"#
        );
        assert!(status_line(SyncStatus::Synced, OutputFormat::Pretty).ends_with("  synced"));
    }

    #[test]
    fn test_forced_offline() {
        let monitor = monitor_for(Some("http://127.0.0.1:1"), true);
        assert_eq!(monitor.current_status(), NetworkStatus::Offline);
    }

    #[tokio::test]
    async fn test_probe_off_runtime() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let monitor = probe_off_runtime(Some(&endpoint), false).await;
        assert_eq!(monitor.current_status(), NetworkStatus::Online);

        let monitor = probe_off_runtime(Some(&endpoint), true).await;
        assert_eq!(monitor.current_status(), NetworkStatus::Offline);

        let monitor = probe_off_runtime(None, false).await;
        assert_eq!(monitor.current_status(), NetworkStatus::Offline);
    }

    #[tokio::test]
    async fn test_drain_requires_endpoint() {
        let store = LocalStore::open_in_memory().unwrap();
        let err = drain(&store, &Config::default(), None, false, OutputFormat::Pretty)
            .await
            .unwrap_err();
        assert!(matches!(err, FieldSyncError::Config(_)));
    }

    #[tokio::test]
    async fn test_drain_offline_sends_nothing() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .record_change(&FuelEntry::new("f1", "v1", 10.0, 1.5), SyncAction::Create)
            .unwrap();

        let output = drain(
            &store,
            &Config::default(),
            Some("http://127.0.0.1:9".to_string()),
            true,
            OutputFormat::Json,
        )
        .await
        .unwrap();

        assert!(output.contains("\"outcome\": \"offline\""));
        assert_eq!(store.queue().open_count().unwrap(), 1);
    }

    #[test]
    fn test_status_without_endpoint_is_offline() {
        let store = LocalStore::open_in_memory().unwrap();
        let output = status(&store, &Config::default(), OutputFormat::Json).unwrap();
        assert!(output.contains("\"network\": \"offline\""));
    }
}
