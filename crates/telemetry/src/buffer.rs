//! Bounded in-memory record buffer.
//!
//! The buffer is the hand-off point between calling threads and the
//! dispatcher task. Producers never wait: when the buffer is at capacity the
//! newest record is discarded and counted. The pause flag lives under the
//! same lock as the queue, so once [`EventBuffer::pause`] returns no record
//! can be admitted until [`EventBuffer::resume`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use domain::{CallRecord, TelemetryError};
use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    queue: VecDeque<CallRecord>,
    paused: bool,
}

/// Fixed-capacity FIFO of pending records.
#[derive(Debug)]
pub struct EventBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
    flush_threshold: AtomicUsize,
    dropped: AtomicU64,
    ready: Notify,
}

impl EventBuffer {
    /// Creates an empty buffer holding at most `capacity` records.
    ///
    /// The dispatcher is woken whenever the queue reaches `flush_threshold`
    /// records. Both values are clamped to at least one.
    pub fn new(capacity: usize, flush_threshold: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                paused: false,
            }),
            capacity,
            flush_threshold: AtomicUsize::new(flush_threshold.max(1)),
            dropped: AtomicU64::new(0),
            ready: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record without waiting.
    ///
    /// Returns [`TelemetryError::BufferFull`] when the record was dropped for
    /// lack of space. A record offered while paused is discarded silently and
    /// is not counted as a drop.
    pub fn try_push(&self, record: CallRecord) -> Result<(), TelemetryError> {
        let len = {
            let mut inner = self.lock();
            if inner.paused {
                return Ok(());
            }
            if inner.queue.len() >= self.capacity {
                drop(inner);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(TelemetryError::BufferFull {
                    capacity: self.capacity,
                });
            }
            inner.queue.push_back(record);
            inner.queue.len()
        };

        if len >= self.flush_threshold.load(Ordering::Relaxed) {
            self.ready.notify_one();
        }
        Ok(())
    }

    /// Removes up to `max` records from the front, oldest first.
    pub fn drain_batch(&self, max: usize) -> Vec<CallRecord> {
        let mut inner = self.lock();
        let n = max.min(inner.queue.len());
        inner.queue.drain(..n).collect()
    }

    /// Discards every pending record, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let n = inner.queue.len();
        inner.queue.clear();
        n
    }

    /// Stops admitting records and discards the pending ones.
    ///
    /// Returns `false` if the buffer was already paused.
    pub fn pause(&self) -> bool {
        let mut inner = self.lock();
        if inner.paused {
            return false;
        }
        inner.paused = true;
        inner.queue.clear();
        true
    }

    /// Resumes admitting records. Returns `false` if it was not paused.
    pub fn resume(&self) -> bool {
        let mut inner = self.lock();
        std::mem::replace(&mut inner.paused, false)
    }

    /// Whether records are currently being discarded.
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether no records are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of pending records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records dropped because the buffer was full, since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Updates the queue length that wakes the dispatcher.
    pub fn set_flush_threshold(&self, threshold: usize) {
        self.flush_threshold.store(threshold.max(1), Ordering::Relaxed);
    }

    /// Completes once the queue has reached the flush threshold since the
    /// last wake-up.
    pub async fn ready(&self) {
        self.ready.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn drops_newest_when_full() {
        let buffer = EventBuffer::new(2, 10);
        buffer.try_push(record("a")).unwrap();
        buffer.try_push(record("b")).unwrap();

        let err = buffer.try_push(record("c")).unwrap_err();
        assert_eq!(err, TelemetryError::BufferFull { capacity: 2 });
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped_count(), 1);

        let models: Vec<_> = buffer.drain_batch(10).into_iter().map(|r| r.model).collect();
        assert_eq!(models, ["a", "b"]);
    }

    #[test]
    fn drain_batch_takes_oldest_first() {
        let buffer = EventBuffer::new(10, 10);
        for m in ["a", "b", "c"] {
            buffer.try_push(record(m)).unwrap();
        }

        let first: Vec<_> = buffer.drain_batch(2).into_iter().map(|r| r.model).collect();
        assert_eq!(first, ["a", "b"]);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.drain_batch(0).is_empty());
    }

    #[test]
    fn pause_clears_and_rejects_until_resume() {
        let buffer = EventBuffer::new(10, 10);
        buffer.try_push(record("a")).unwrap();

        assert!(buffer.pause());
        assert!(!buffer.pause());
        assert!(buffer.is_empty());

        buffer.try_push(record("b")).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped_count(), 0);

        assert!(buffer.resume());
        assert!(!buffer.resume());
        buffer.try_push(record("c")).unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let buffer = EventBuffer::new(0, 0);
        assert_eq!(buffer.capacity(), 1);
        buffer.try_push(record("a")).unwrap();
        assert!(buffer.try_push(record("b")).is_err());
    }

    #[tokio::test]
    async fn reaching_threshold_wakes_waiter() {
        let buffer = Arc::new(EventBuffer::new(10, 2));
        let waiter = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move { buffer.ready().await })
        };

        buffer.try_push(record("a")).unwrap();
        buffer.try_push(record("b")).unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[test]
    fn concurrent_producers_never_exceed_capacity() {
        let buffer = Arc::new(EventBuffer::new(50, 10));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let _ = buffer.try_push(record("m"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(buffer.len(), 50);
        assert_eq!(buffer.dropped_count(), 750);
    }
}
