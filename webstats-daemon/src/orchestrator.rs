//! Daemon orchestration -- assembly, lifecycle and shutdown ordering.
//!
//! The [`Orchestrator`] validates configuration, prepares the log directory,
//! builds the shared [`Collector`], installs the metrics recorder and runs
//! the pixel server until a shutdown signal arrives.
//!
//! # Shutdown Order
//!
//! 1. Stop accepting connections and let open ones finish
//! 2. Drain the open batch (flush or discard per `flush_on_shutdown`)
//! 3. Wait for every in-flight batch flush

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use webstats_collector::{Collector, CollectorBuilder, CollectorSettings, ShutdownReport};
use webstats_core::config::WebstatsConfig;
use webstats_core::metrics as m;

use crate::metrics_server;
use crate::server::PixelServer;

/// 가동 시간 메트릭 갱신 주기
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: WebstatsConfig,
    /// Collector shared with every connection task.
    collector: Arc<Collector>,
    /// Cancels the pixel server.
    shutdown: CancellationToken,
    /// Daemon start time, for the uptime gauge.
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, validation
    /// fails, or the log directory is unusable.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = WebstatsConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    pub fn build_from_config(mut config: WebstatsConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let log_dir = config
            .storage
            .prepare_log_dir()
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        config.storage.log_dir = log_dir.display().to_string();

        if config.collector.whitelisted_domains.is_empty() {
            tracing::warn!("whitelisted_domains is empty; every request will be answered with 404");
        }

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            record_daemon_metrics();
        }

        let collector = CollectorBuilder::new()
            .settings(CollectorSettings::from_core(&config))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build collector: {}", e))?;

        tracing::info!(
            domains = ?config.collector.whitelisted_domains,
            batch_size = config.collector.batch_size,
            log_dir = %log_dir.display(),
            format = %config.storage.format,
            "collector initialized"
        );

        Ok(Self {
            config,
            collector: Arc::new(collector),
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }

    /// Bind the listener, serve until SIGTERM or SIGINT, then shut down.
    pub async fn run(self) -> Result<ShutdownReport> {
        let addr = self.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))?;

        let signal_token = self.shutdown.clone();
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal = signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
            }
            signal_token.cancel();
        });

        self.serve(listener).await
    }

    /// Serve on an already bound listener until [`shutdown_token`](Self::shutdown_token)
    /// is cancelled, then shut the collector down.
    pub async fn serve(self, listener: TcpListener) -> Result<ShutdownReport> {
        let uptime = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown.clone()));

        let server = PixelServer::from_listener(listener, Arc::clone(&self.collector));
        let served = server.serve(self.shutdown.clone()).await;

        if let Some(handle) = uptime {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "uptime updater task failed");
            }
        }

        tracing::info!("shutting down collector");
        let report = self.collector.shutdown().await;
        tracing::info!(
            pending_records = report.pending_records,
            flushed = report.flushed_pending,
            "webstats-daemon shut down"
        );

        served.map_err(|e| anyhow::anyhow!("pixel server failed: {}", e))?;
        Ok(report)
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Shared collector.
    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &WebstatsConfig {
        &self.config
    }

    fn listen_addr(&self) -> Result<SocketAddr> {
        self.config
            .server
            .socket_addr()
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}

/// Record daemon-level metrics (build info).
///
/// Called once after the metrics recorder is installed.
fn record_daemon_metrics() {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that updates the uptime gauge until `shutdown` fires.
fn spawn_uptime_updater(
    start_time: Instant,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> WebstatsConfig {
        let mut config = WebstatsConfig::default();
        config.collector.whitelisted_domains = vec!["example.com".to_owned()];
        config.storage.log_dir = dir.join("batches").display().to_string();
        config
    }

    #[test]
    fn test_build_creates_log_dir() {
        // Given: A log directory that does not exist yet
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        // When: Building the orchestrator
        let orchestrator = Orchestrator::build_from_config(config).unwrap();

        // Then: The directory exists and the collector points at it
        assert!(dir.path().join("batches").is_dir());
        assert_eq!(orchestrator.collector().log_dir(), dir.path().join("batches"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.collector.batch_size = 0;

        let err = Orchestrator::build_from_config(config).err().unwrap();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_build_rejects_unwritable_log_dir() {
        // Given: log_dir pointing below a regular file
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let mut config = config_in(dir.path());
        config.storage.log_dir = blocker.join("sub").display().to_string();

        // When / Then: Startup fails
        assert!(Orchestrator::build_from_config(config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uptime_updater_stops_on_cancel() {
        // Given: A running updater
        let token = CancellationToken::new();
        let handle = spawn_uptime_updater(Instant::now(), token.clone());
        tokio::time::advance(UPTIME_UPDATE_INTERVAL * 3).await;
        assert!(!handle.is_finished());

        // When: Shutdown is requested
        token.cancel();

        // Then: The task exits
        handle.await.unwrap();
    }

    #[test]
    fn test_record_daemon_metrics_without_recorder() {
        record_daemon_metrics();
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::build_from_config(config_in(dir.path())).unwrap();
        orchestrator.collector().record(webstats_core::RequestRecord::new("10.0.0.1", "ua"));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token = orchestrator.shutdown_token();
        token.cancel();

        let report = orchestrator.serve(listener).await.unwrap();
        assert_eq!(report.pending_records, 1);
        assert!(report.flushed_pending);
        assert_eq!(std::fs::read_dir(dir.path().join("batches")).unwrap().count(), 1);
    }
}
