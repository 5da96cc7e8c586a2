//! # Pending spans
//!
//! Spans that finish before the mapper knows which primary span they belong
//! to are parked here, grouped by the key of their parent. A parked group is
//! taken out as a whole once its parent resolves, or dropped once it has not
//! been touched for the configured retention time.
use crate::error::CorrelationError;
use crate::trace::{CorrelationKey, SpanRecord};
use opentelemetry::otel_debug;
use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Shortest interval between two sweeps of the cleanup worker.
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct PendingEntry {
    spans: Vec<SpanRecord>,
    expires_at: Option<Instant>,
}

/// Spans waiting for their parent, with optional expiry.
///
/// Every operation runs under a single lock, so a group is never observed
/// half-updated.
#[derive(Debug)]
pub struct PendingSpans {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<CorrelationKey, PendingEntry>>,
}

impl PendingSpans {
    /// Create a new `PendingSpans`. A `ttl` of `None` or zero keeps parked
    /// spans until they are fetched.
    pub fn new(ttl: Option<Duration>) -> Self {
        PendingSpans {
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// How long a group is retained after its last update.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Parks `span` under `key` and restarts the expiry of the group.
    pub fn put(&self, key: CorrelationKey, span: SpanRecord) {
        self.put_at(key, span, Instant::now())
    }

    pub(crate) fn put_at(&self, key: CorrelationKey, span: SpanRecord, now: Instant) {
        // a deadline past the clock's range never expires
        let expires_at = self.ttl.and_then(|ttl| now.checked_add(ttl));

        let mut entries = self.lock();
        let entry = entries.entry(key).or_insert_with(|| PendingEntry {
            spans: Vec::with_capacity(1),
            expires_at,
        });
        entry.spans.push(span);
        entry.expires_at = expires_at;
    }

    /// Takes every span parked under `key`, in the order they were parked.
    ///
    /// A second fetch of the same key returns nothing until a new span is
    /// parked under it.
    pub fn fetch(&self, key: &CorrelationKey) -> Vec<SpanRecord> {
        self.lock()
            .remove(key)
            .map(|entry| entry.spans)
            .unwrap_or_default()
    }

    /// Drops every group that expired at or before `now` and returns the
    /// number of spans dropped.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.lock().retain(|_, entry| match entry.expires_at {
            Some(expires_at) if expires_at <= now => {
                evicted += entry.spans.len();
                false
            }
            _ => true,
        });

        evicted
    }

    /// Number of parked spans.
    pub fn len(&self) -> usize {
        self.lock().values().map(|entry| entry.spans.len()).sum()
    }

    /// Returns `true` if no span is parked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationKey, PendingEntry>> {
        // no code panics while holding the lock, the map is always consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the cleanup worker sweeping expired groups every half of the
    /// retention time. Returns `None` when spans never expire.
    pub(crate) fn spawn_cleanup(
        self: &Arc<Self>,
    ) -> Result<Option<CleanupWorker>, CorrelationError> {
        let Some(ttl) = self.ttl else {
            return Ok(None);
        };

        let interval = (ttl / 2).max(MIN_CLEANUP_INTERVAL);
        let (stop_sender, stop_receiver) = sync_channel(1);
        let pending = Arc::clone(self);

        let handle = thread::Builder::new()
            .name("OpenTelemetry.Correlation.PendingSpansCleanup".to_string())
            .spawn(move || run_cleanup(&pending, &stop_receiver, interval))
            .map_err(|err| CorrelationError::CleanupWorker(err.to_string()))?;

        otel_debug!(
            name: "PendingSpans.CleanupStarted",
            interval_millis = format!("{}", interval.as_millis())
        );

        Ok(Some(CleanupWorker {
            stop_sender,
            handle,
        }))
    }
}

fn run_cleanup(pending: &PendingSpans, stop: &Receiver<()>, interval: Duration) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let evicted = pending.evict_expired(Instant::now());
                if evicted > 0 {
                    otel_debug!(
                        name: "PendingSpans.Evicted",
                        count = format!("{}", evicted)
                    );
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Handle of a running cleanup worker.
///
/// Dropping the handle also stops the worker, without waiting for it.
#[derive(Debug)]
pub(crate) struct CleanupWorker {
    stop_sender: SyncSender<()>,
    handle: thread::JoinHandle<()>,
}

impl CleanupWorker {
    /// Stops the worker and waits for its thread to exit.
    pub(crate) fn stop(self) -> Result<(), CorrelationError> {
        // a full channel means a stop request is already queued
        let _ = self.stop_sender.try_send(());
        self.handle.join().map_err(|_| {
            CorrelationError::CleanupWorker("cleanup thread panicked".to_string())
        })?;

        otel_debug!(name: "PendingSpans.CleanupStopped");
        Ok(())
    }
}
