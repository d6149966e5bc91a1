//! Timestamp production: pacing, emission and k-way merging of inputs.

use super::{ExecutionError, Stats};
use chrono::{DateTime, Utc};
use eventum_plugins::InputPlugin;
use futures::future::join_all;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A timestamp and the index of the input that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Scheduled {
    pub input: usize,
    pub timestamp: DateTime<Utc>,
}

pub(crate) type TimestampBatch = Vec<Scheduled>;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Release {
    Now,
    After(Duration),
}

/// Decides when a timestamp is released into the pipeline.
///
/// Already due timestamps, including those due before the run started, are
/// released immediately; nothing is ever discarded.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pacer {
    live_mode: bool,
}

impl Pacer {
    pub(crate) fn new(live_mode: bool) -> Self {
        Self { live_mode }
    }

    pub(crate) fn release(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Release {
        if !self.live_mode {
            return Release::Now;
        }
        match (timestamp - now).to_std() {
            Ok(wait) if !wait.is_zero() => Release::After(wait),
            _ => Release::Now,
        }
    }
}

/// Paces timestamps and sends them into the timestamp queue.
#[derive(Clone)]
pub(crate) struct Emitter {
    pacer: Pacer,
    tx: mpsc::Sender<TimestampBatch>,
    cancel: CancellationToken,
    stats: Arc<Stats>,
}

impl Emitter {
    pub(crate) fn new(
        pacer: Pacer,
        tx: mpsc::Sender<TimestampBatch>,
        cancel: CancellationToken,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            pacer,
            tx,
            cancel,
            stats,
        }
    }

    /// Release `items` in order, waiting for each to become due.
    ///
    /// Returns `false` once the pipeline stops accepting timestamps.
    pub(crate) async fn emit(&self, items: Vec<Scheduled>) -> bool {
        let mut pending = Vec::with_capacity(items.len());

        for item in items {
            match self.pacer.release(item.timestamp, Utc::now()) {
                Release::Now => pending.push(item),
                Release::After(wait) => {
                    if !pending.is_empty() && !self.send(std::mem::take(&mut pending)).await {
                        return false;
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => return false,
                        _ = tokio::time::sleep(wait) => {}
                    }
                    pending.push(item);
                }
            }
        }

        pending.is_empty() || self.send(pending).await
    }

    async fn send(&self, batch: TimestampBatch) -> bool {
        let count = batch.len() as u64;
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            result = self.tx.send(batch) => {
                if result.is_ok() {
                    self.stats.timestamps.fetch_add(count, Ordering::Relaxed);
                }
                result.is_ok()
            }
        }
    }

    fn abort(&self) {
        self.cancel.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Next chunk of an input, or `None` once it is exhausted.
async fn next_chunk(
    plugin: &mut dyn InputPlugin,
    limit: usize,
) -> Result<Option<Vec<DateTime<Utc>>>, ExecutionError> {
    let chunk = plugin.produce(limit).map_err(|e| ExecutionError::Input {
        plugin: plugin.name().to_string(),
        reason: e.to_string(),
    })?;

    if matches!(&chunk, Some(timestamps) if timestamps.is_empty()) {
        tokio::task::yield_now().await;
    }
    Ok(chunk)
}

fn fail(emitter: &Emitter, err: ExecutionError) -> Result<(), ExecutionError> {
    error!("{}", err);
    emitter.abort();
    Err(err)
}

/// Produce from one input straight into the timestamp queue.
async fn produce_paced(
    index: usize,
    mut plugin: Box<dyn InputPlugin>,
    emitter: Emitter,
    limit: usize,
) -> Result<(), ExecutionError> {
    while !emitter.is_cancelled() {
        let timestamps = match next_chunk(plugin.as_mut(), limit).await {
            Ok(Some(timestamps)) => timestamps,
            Ok(None) => break,
            Err(err) => return fail(&emitter, err),
        };

        let items = timestamps
            .into_iter()
            .map(|timestamp| Scheduled {
                input: index,
                timestamp,
            })
            .collect();

        if !emitter.emit(items).await {
            break;
        }
    }

    debug!("Input plugin `{}` #{} finished", plugin.name(), index);
    Ok(())
}

/// Produce from one input into its merge channel.
async fn produce_raw(
    index: usize,
    mut plugin: Box<dyn InputPlugin>,
    tx: mpsc::Sender<Vec<DateTime<Utc>>>,
    emitter: Emitter,
    limit: usize,
) -> Result<(), ExecutionError> {
    while !emitter.is_cancelled() {
        let timestamps = match next_chunk(plugin.as_mut(), limit).await {
            Ok(Some(timestamps)) if timestamps.is_empty() => continue,
            Ok(Some(timestamps)) => timestamps,
            Ok(None) => break,
            Err(err) => return fail(&emitter, err),
        };

        let sent = tokio::select! {
            _ = emitter.cancel.cancelled() => false,
            result = tx.send(timestamps) => result.is_ok(),
        };
        if !sent {
            break;
        }
    }

    debug!("Input plugin `{}` #{} finished", plugin.name(), index);
    Ok(())
}

struct MergeSource {
    rx: mpsc::Receiver<Vec<DateTime<Utc>>>,
    buffer: VecDeque<DateTime<Utc>>,
}

impl MergeSource {
    /// Next timestamp of this input, waiting for its producer if needed.
    async fn next(&mut self, cancel: &CancellationToken) -> Option<DateTime<Utc>> {
        while self.buffer.is_empty() {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return None,
                chunk = self.rx.recv() => chunk?,
            };
            self.buffer.extend(chunk);
        }
        self.buffer.pop_front()
    }
}

/// Merge per-input streams by increasing timestamp, ties broken by input
/// index, and emit the merged stream in chunks of up to `limit`.
async fn merge(
    receivers: Vec<mpsc::Receiver<Vec<DateTime<Utc>>>>,
    emitter: Emitter,
    limit: usize,
) {
    let mut sources: Vec<MergeSource> = receivers
        .into_iter()
        .map(|rx| MergeSource {
            rx,
            buffer: VecDeque::new(),
        })
        .collect();

    let mut heads = BinaryHeap::with_capacity(sources.len());
    for (index, source) in sources.iter_mut().enumerate() {
        if let Some(timestamp) = source.next(&emitter.cancel).await {
            heads.push(Reverse((timestamp, index)));
        }
    }

    let mut chunk = Vec::with_capacity(limit);
    while let Some(Reverse((timestamp, index))) = heads.pop() {
        chunk.push(Scheduled {
            input: index,
            timestamp,
        });

        // Flush before waiting on a producer so already merged timestamps
        // are not held back by a slow input.
        if chunk.len() >= limit || sources[index].buffer.is_empty() {
            if !emitter.emit(std::mem::take(&mut chunk)).await {
                return;
            }
        }

        if let Some(next) = sources[index].next(&emitter.cancel).await {
            heads.push(Reverse((next, index)));
        }
    }

    if !chunk.is_empty() {
        emitter.emit(chunk).await;
    }
}

/// Run every input until exhaustion or cancellation.
///
/// With `keep_order` and several inputs, their timestamps are merged before
/// pacing. Otherwise each input paces and emits independently.
pub(crate) async fn produce_all(
    inputs: Vec<Box<dyn InputPlugin>>,
    emitter: Emitter,
    keep_order: bool,
    limit: usize,
) -> Result<(), ExecutionError> {
    let results = if keep_order && inputs.len() > 1 {
        let mut receivers = Vec::with_capacity(inputs.len());
        let producers: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, plugin)| {
                let (tx, rx) = mpsc::channel(1);
                receivers.push(rx);
                produce_raw(index, plugin, tx, emitter.clone(), limit)
            })
            .collect();

        let (results, ()) =
            futures::future::join(join_all(producers), merge(receivers, emitter, limit)).await;
        results
    } else {
        join_all(
            inputs
                .into_iter()
                .enumerate()
                .map(|(index, plugin)| produce_paced(index, plugin, emitter.clone(), limit)),
        )
        .await
    };

    results.into_iter().collect()
}
