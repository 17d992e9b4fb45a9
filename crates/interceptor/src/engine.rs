//! Client-independent state shared by every clone of a wrapper.
//!
//! The [`Engine`] owns the configuration cell, the health flag, the telemetry
//! buffer and the background tasks. It is not generic over the wrapped
//! client, so one copy of this code serves every client type.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use domain::{
    CallRecord, ConfigCell, Configuration, HealthFlag, HealthState, PolicyFlags, ProxyError,
    SkewError,
};
use proxy::{HealthProbe, ProxyTransport};
use telemetry::{
    DispatchStats, Dispatcher, DispatcherHandle, EventBuffer, PolicySource, TelemetrySink,
    TelemetryStats,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Background pieces an [`Engine`] starts with.
pub(crate) struct EngineParts {
    pub(crate) config: Configuration,
    pub(crate) transport: Arc<dyn ProxyTransport>,
    pub(crate) sink: Arc<dyn TelemetrySink>,
    pub(crate) policy: Arc<dyn PolicySource>,
    pub(crate) http: reqwest::Client,
    pub(crate) health_probe: bool,
}

pub(crate) struct Engine {
    config: Arc<ConfigCell>,
    health: Arc<HealthState>,
    buffer: Arc<EventBuffer>,
    stats: Arc<DispatchStats>,
    transport: Arc<dyn ProxyTransport>,
    policy: Arc<dyn PolicySource>,
    dispatcher: Option<DispatcherHandle>,
    probe: Mutex<Option<JoinHandle<()>>>,
    background: CancellationToken,
    refresh_lock: Mutex<()>,
}

impl Engine {
    /// Builds the engine and starts its tasks on the ambient runtime.
    ///
    /// Outside a tokio runtime nothing is spawned: calls still work, but no
    /// telemetry is recorded and the health flag stays as calls leave it.
    pub(crate) fn start(parts: EngineParts) -> Self {
        let EngineParts {
            config,
            transport,
            sink,
            policy,
            http,
            health_probe,
        } = parts;

        let buffer = Arc::new(EventBuffer::new(
            config.telemetry.buffer_capacity,
            config.telemetry.batch_size,
        ));
        let config = Arc::new(ConfigCell::new(config));
        let health = Arc::new(HealthState::new());
        let stats = Arc::new(DispatchStats::default());
        let background = CancellationToken::new();

        let (dispatcher, probe) = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let dispatcher = Dispatcher::new(
                    Arc::clone(&buffer),
                    sink,
                    Arc::clone(&config),
                    Arc::clone(&stats),
                )
                .spawn(&runtime);
                let probe = health_probe.then(|| {
                    HealthProbe::new(http, Arc::clone(&health), Arc::clone(&config))
                        .spawn(&runtime, background.clone())
                });
                (Some(dispatcher), probe)
            }
            Err(_) => {
                warn!("no tokio runtime at wrap time; telemetry and health probing are disabled");
                (None, None)
            }
        };

        Self {
            config,
            health,
            buffer,
            stats,
            transport,
            policy,
            dispatcher,
            probe: Mutex::new(probe),
            background,
            refresh_lock: Mutex::new(()),
        }
    }

    // -----------------------------------------------------------------------
    // Call path
    // -----------------------------------------------------------------------

    pub(crate) fn snapshot(&self) -> Arc<Configuration> {
        self.config.load()
    }

    pub(crate) fn health(&self) -> HealthFlag {
        self.health.get()
    }

    pub(crate) fn transport(&self) -> &dyn ProxyTransport {
        self.transport.as_ref()
    }

    /// Whether records produced now can ever be delivered.
    ///
    /// False once shutdown has begun, so later calls leave nothing buffered.
    pub(crate) fn records_telemetry(&self) -> bool {
        self.dispatcher
            .as_ref()
            .is_some_and(DispatcherHandle::is_running)
            && !self.buffer.is_paused()
    }

    /// Enqueues without waiting; a full buffer drops the record.
    pub(crate) fn enqueue(&self, record: CallRecord) {
        if let Err(e) = self.buffer.try_push(record) {
            debug!(error = %e, dropped = self.buffer.dropped_count(), "telemetry record dropped");
        }
    }

    /// Marks the proxy unhealthy after a transport failure so later calls go
    /// direct until the probe sees it recover.
    ///
    /// Only applies while the probe runs; without it nothing would clear the
    /// flag again.
    pub(crate) fn note_proxy_failure(&self, error: &ProxyError) {
        if !error.allows_fallback() || !self.probe_running() {
            return;
        }
        if self.health.set(HealthFlag::Unhealthy) != HealthFlag::Unhealthy {
            warn!(error = %error, "proxy call failed; routing directly until the next healthy probe");
        }
    }

    fn probe_running(&self) -> bool {
        self.probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    pub(crate) fn pause_telemetry(&self) {
        if self.buffer.pause() {
            info!("telemetry paused");
        }
    }

    pub(crate) fn resume_telemetry(&self) {
        if self.buffer.resume() {
            info!("telemetry resumed");
        }
    }

    pub(crate) async fn flush_telemetry(&self, timeout: Duration) -> bool {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.flush(timeout).await,
            None => false,
        }
    }

    pub(crate) fn telemetry_stats(&self) -> TelemetryStats {
        TelemetryStats::collect(&self.buffer, &self.stats)
    }

    pub(crate) fn refresh(&self, config: Configuration) -> Result<(), SkewError> {
        config.validate()?;
        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.config.store(config);
        info!("configuration refreshed");
        Ok(())
    }

    pub(crate) fn refresh_policy(&self, flags: &PolicyFlags) -> Result<(), SkewError> {
        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let next = self.config.load().with_policy(flags)?;
        self.config.store(next);
        info!(?flags, "policy applied");
        Ok(())
    }

    pub(crate) async fn sync_policy(&self) -> bool {
        let config = self.config.load();
        let flags = match self.policy.fetch(&config).await {
            Ok(flags) => flags,
            Err(e) => {
                warn!(error = %e, "policy fetch failed; keeping current configuration");
                return false;
            }
        };
        match self.refresh_policy(&flags) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "policy rejected; keeping current configuration");
                false
            }
        }
    }

    pub(crate) async fn shutdown(&self, timeout: Duration) -> bool {
        self.background.cancel();
        let probe = self
            .probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = probe {
            let _ = tokio::time::timeout(timeout, task).await;
        }
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.shutdown(timeout).await,
            None => true,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.background.cancel();
    }
}
