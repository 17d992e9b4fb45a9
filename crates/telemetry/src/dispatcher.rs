//! Background delivery task.
//!
//! The [`Dispatcher`] owns the consumer side of the [`EventBuffer`]. It wakes
//! on three triggers:
//!
//! - the buffer reaching the batch size,
//! - the periodic flush interval,
//! - an explicit flush request from a [`DispatcherHandle`].
//!
//! Each batch is delivered with up to `max_delivery_attempts` attempts,
//! sleeping on the [`Backoff`] schedule between them. A batch that exhausts
//! its attempts, hits a non-retryable error, or is still pending when
//! telemetry is paused is dropped and counted. Nothing here ever reaches the
//! host's call path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use domain::{CallRecord, ConfigCell};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Backoff, EventBuffer, TelemetrySink};

/// Pending explicit flush requests beyond this are coalesced by the caller
/// timing out.
const FLUSH_QUEUE_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Delivery counters shared between the dispatcher and its handle.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    abandoned: AtomicU64,
    failed_attempts: AtomicU64,
}

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryStats {
    /// Records waiting in the buffer.
    pub buffered: usize,
    /// Buffer capacity.
    pub capacity: usize,
    /// Records dropped because the buffer was full.
    pub dropped: u64,
    /// Records accepted by the sink.
    pub delivered: u64,
    /// Records dropped after failed delivery.
    pub abandoned: u64,
    /// Delivery attempts that failed, including ones later retried.
    pub failed_attempts: u64,
    /// Whether telemetry is paused.
    pub paused: bool,
}

impl TelemetryStats {
    /// Reads the counters of a buffer and its dispatcher.
    pub fn collect(buffer: &EventBuffer, stats: &DispatchStats) -> Self {
        Self {
            buffered: buffer.len(),
            capacity: buffer.capacity(),
            dropped: buffer.dropped_count(),
            delivered: stats.delivered.load(Ordering::Relaxed),
            abandoned: stats.abandoned.load(Ordering::Relaxed),
            failed_attempts: stats.failed_attempts.load(Ordering::Relaxed),
            paused: buffer.is_paused(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Consumer loop that drains the buffer into a [`TelemetrySink`].
pub struct Dispatcher<S: ?Sized> {
    buffer: Arc<EventBuffer>,
    sink: Arc<S>,
    config: Arc<ConfigCell>,
    stats: Arc<DispatchStats>,
    shutdown: CancellationToken,
}

impl<S: TelemetrySink + ?Sized> Dispatcher<S> {
    /// Creates a dispatcher without starting it.
    pub fn new(
        buffer: Arc<EventBuffer>,
        sink: Arc<S>,
        config: Arc<ConfigCell>,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            buffer,
            sink,
            config,
            stats,
            shutdown: CancellationToken::new(),
        }
    }

    /// Starts the loop on `runtime` and returns its control handle.
    ///
    /// The flush interval is read once here; later refreshes change batch
    /// size, retry budget, endpoint and credential but not the tick period.
    pub fn spawn(self, runtime: &tokio::runtime::Handle) -> DispatcherHandle {
        let (flush_tx, flush_rx) = mpsc::channel(FLUSH_QUEUE_DEPTH);
        let handle = DispatcherHandle {
            buffer: Arc::clone(&self.buffer),
            stats: Arc::clone(&self.stats),
            flush_tx,
            shutdown: self.shutdown.clone(),
            task: Mutex::new(None),
        };
        let task = runtime.spawn(self.run(flush_rx));
        *handle.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        handle
    }

    async fn run(self, mut flush_rx: mpsc::Receiver<oneshot::Sender<()>>) {
        let period = self.config.load().telemetry.flush_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(interval_ms = period.as_millis() as u64, "telemetry dispatcher started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.drain_all().await;
                    break;
                }
                Some(reply) = flush_rx.recv() => {
                    self.drain_all().await;
                    let _ = reply.send(());
                }
                _ = self.buffer.ready() => {
                    self.drain_full_batches().await;
                }
                _ = ticker.tick() => {
                    self.drain_all().await;
                }
            }
        }

        let stats = TelemetryStats::collect(&self.buffer, &self.stats);
        info!(
            delivered = stats.delivered,
            abandoned = stats.abandoned,
            dropped = stats.dropped,
            "telemetry dispatcher stopped"
        );
    }

    fn batch_size(&self) -> usize {
        let size = self.config.load().telemetry.batch_size.max(1);
        self.buffer.set_flush_threshold(size);
        size
    }

    /// Delivers everything pending when the pass starts.
    ///
    /// Records that arrive during the pass are left for the next trigger so
    /// a steady producer cannot keep the pass alive forever.
    pub async fn drain_all(&self) {
        let batch_size = self.batch_size();
        let passes = self.buffer.len().div_ceil(batch_size);
        for _ in 0..passes {
            let batch = self.buffer.drain_batch(batch_size);
            if batch.is_empty() {
                break;
            }
            self.deliver(batch).await;
        }
    }

    async fn drain_full_batches(&self) {
        let batch_size = self.batch_size();
        while self.buffer.len() >= batch_size && !self.shutdown.is_cancelled() {
            let batch = self.buffer.drain_batch(batch_size);
            self.deliver(batch).await;
        }
    }

    async fn deliver(&self, batch: Vec<CallRecord>) {
        let count = batch.len() as u64;
        let mut attempt: u32 = 1;

        loop {
            if self.buffer.is_paused() {
                debug!(events = count, "telemetry paused; discarding in-flight batch");
                self.stats.abandoned.fetch_add(count, Ordering::Relaxed);
                return;
            }

            let config = self.config.load();
            let err = match self.sink.deliver(&batch, &config).await {
                Ok(()) => {
                    self.stats.delivered.fetch_add(count, Ordering::Relaxed);
                    return;
                }
                Err(err) => err,
            };
            self.stats.failed_attempts.fetch_add(1, Ordering::Relaxed);

            let policy = err.retry_policy();
            let max_attempts = config.telemetry.max_delivery_attempts.max(1);
            if !policy.is_retryable() || attempt >= max_attempts {
                warn!(
                    events = count,
                    attempt,
                    error = %err,
                    "dropping telemetry batch"
                );
                self.stats.abandoned.fetch_add(count, Ordering::Relaxed);
                return;
            }

            let delay = Backoff::from_settings(&config.telemetry).delay_for(attempt, policy);
            debug!(
                events = count,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "telemetry delivery failed; retrying"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.stats.abandoned.fetch_add(count, Ordering::Relaxed);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Control surface of a running dispatcher. Dropping it stops the task.
#[derive(Debug)]
pub struct DispatcherHandle {
    buffer: Arc<EventBuffer>,
    stats: Arc<DispatchStats>,
    flush_tx: mpsc::Sender<oneshot::Sender<()>>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DispatcherHandle {
    /// Asks the dispatcher to deliver everything pending and waits at most
    /// `timeout` for it to finish.
    ///
    /// Returns `true` if the flush completed in time.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let (tx, rx) = oneshot::channel();
        let request = async {
            self.flush_tx.send(tx).await.ok()?;
            rx.await.ok()
        };
        matches!(tokio::time::timeout(timeout, request).await, Ok(Some(())))
    }

    /// Current counters.
    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats::collect(&self.buffer, &self.stats)
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Stops the task after one final drain, waiting at most `timeout`.
    ///
    /// Retries are not attempted during the final drain. Returns `true` if
    /// the task exited in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.shutdown.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match task {
            Some(task) => tokio::time::timeout(timeout, task).await.is_ok(),
            None => true,
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
