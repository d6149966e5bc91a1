//! Concurrent rendering and order restoration.

use super::batch::{sleep_until, Batcher};
use super::input::TimestampBatch;
use super::Stats;
use crate::initializer::panic_message;
use crate::parameters::BatchParameters;
use chrono::DateTime;
use chrono_tz::Tz;
use eventum_plugins::{EventPlugin, RenderContext};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of rendering one timestamp.
///
/// Holds its render permit until dropped, so timestamps waiting in the
/// reorder buffer count against the concurrency limit.
pub(crate) struct Rendered {
    pub seq: u64,
    pub result: Result<Vec<String>, String>,
    _permit: OwnedSemaphorePermit,
}

fn render_one(
    event: &dyn EventPlugin,
    tags: &[String],
    timestamp: DateTime<Tz>,
) -> Result<Vec<String>, String> {
    let context = RenderContext { timestamp, tags };
    match catch_unwind(AssertUnwindSafe(|| event.render(&context))) {
        Ok(Ok(events)) => Ok(events),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!(
            "Event plugin panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

/// Everything a render task needs besides the timestamp.
#[derive(Clone)]
pub(crate) struct RenderPool {
    pub event: Arc<dyn EventPlugin>,
    pub tags: Arc<Vec<Vec<String>>>,
    pub timezone: Tz,
    pub semaphore: Arc<Semaphore>,
}

/// Assign sequence numbers and render each timestamp on the blocking pool.
///
/// Stops taking timestamps on cancellation; renders already started still
/// deliver their results.
pub(crate) async fn dispatch(
    mut rx: mpsc::Receiver<TimestampBatch>,
    pool: RenderPool,
    tx: mpsc::Sender<Rendered>,
    cancel: CancellationToken,
) {
    let mut seq: u64 = 0;

    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            batch = rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        for scheduled in batch {
            let permit = tokio::select! {
                _ = cancel.cancelled() => return,
                permit = Arc::clone(&pool.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let event = Arc::clone(&pool.event);
            let tags = Arc::clone(&pool.tags);
            let timestamp = scheduled.timestamp.with_timezone(&pool.timezone);
            let tx = tx.clone();
            let current = seq;
            seq += 1;

            tokio::task::spawn_blocking(move || {
                let input_tags = tags.get(scheduled.input).map(Vec::as_slice).unwrap_or(&[]);
                let result = render_one(event.as_ref(), input_tags, timestamp);
                let _ = tx.blocking_send(Rendered {
                    seq: current,
                    result,
                    _permit: permit,
                });
            });
        }
    }

    debug!("Render dispatcher stopped after {} timestamp(s)", seq);
}

/// Fixed-capacity buffer releasing items in sequence order.
///
/// Items must arrive within `capacity` of the next expected sequence number,
/// which the render permits guarantee.
pub(crate) struct ReorderBuffer<T> {
    slots: Vec<Option<T>>,
    next: u64,
}

impl<T> ReorderBuffer<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity.max(1)).map(|_| None).collect(),
            next: 0,
        }
    }

    fn slot(&self, seq: u64) -> usize {
        (seq % self.slots.len() as u64) as usize
    }

    pub(crate) fn insert(&mut self, seq: u64, item: T) {
        debug_assert!(seq >= self.next && seq < self.next + self.slots.len() as u64);
        let slot = self.slot(seq);
        self.slots[slot] = Some(item);
    }

    /// Take the next item in sequence if it has arrived.
    pub(crate) fn pop_ready(&mut self) -> Option<T> {
        let slot = self.slot(self.next);
        let item = self.slots[slot].take()?;
        self.next += 1;
        Some(item)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// Feeds rendered events into the batcher and forwards sealed batches.
struct Collector {
    batcher: Batcher,
    tx: mpsc::Sender<Vec<String>>,
    stats: Arc<Stats>,
}

impl Collector {
    /// Returns `false` once the delivery stage is gone.
    async fn accept(&mut self, rendered: Rendered) -> bool {
        match rendered.result {
            Ok(events) => {
                self.stats
                    .events
                    .fetch_add(events.len() as u64, Ordering::Relaxed);
                for event in events {
                    if let Some(batch) = self.batcher.push(event) {
                        if self.tx.send(batch).await.is_err() {
                            return false;
                        }
                    }
                }
            }
            Err(reason) => {
                self.stats.render_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to render event #{}: {}", rendered.seq, reason);
            }
        }
        true
    }

    async fn flush(&mut self) -> bool {
        match self.batcher.flush() {
            Some(batch) => self.tx.send(batch).await.is_ok(),
            None => true,
        }
    }
}

/// Collect rendered events into batches until every renderer is done.
///
/// With `keep_order`, results are released in sequence order; otherwise in
/// completion order. The partial batch is flushed at the end.
pub(crate) async fn collect(
    mut rx: mpsc::Receiver<Rendered>,
    keep_order: bool,
    capacity: usize,
    batch: BatchParameters,
    tx: mpsc::Sender<Vec<String>>,
    stats: Arc<Stats>,
) {
    let mut collector = Collector {
        batcher: Batcher::new(&batch),
        tx,
        stats,
    };
    let mut reorder = keep_order.then(|| ReorderBuffer::new(capacity));

    loop {
        tokio::select! {
            rendered = rx.recv() => {
                let Some(rendered) = rendered else { break };

                let open = match reorder.as_mut() {
                    Some(buffer) => {
                        buffer.insert(rendered.seq, rendered);
                        let mut open = true;
                        while let Some(ready) = buffer.pop_ready() {
                            if !collector.accept(ready).await {
                                open = false;
                                break;
                            }
                        }
                        open
                    }
                    None => collector.accept(rendered).await,
                };
                if !open {
                    return;
                }
            }
            _ = sleep_until(collector.batcher.deadline()) => {
                if !collector.flush().await {
                    return;
                }
            }
        }
    }

    if let Some(buffer) = &reorder {
        if !buffer.is_empty() {
            warn!("Reorder buffer still holds events at shutdown");
        }
    }
    collector.flush().await;
}
