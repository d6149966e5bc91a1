//! Generation pipeline executor.
//!
//! ```text
//! inputs ──► [timestamp queue] ──► render pool ──► reorder/collect ──► [event queue] ──► outputs
//!  (paced,     bounded by            bounded by       (keep_order)         bounded by      (fan-out,
//!   merged)    max_timestamp_batches max_concurrency                       max_event_batches timeout)
//! ```
//!
//! Every stage is connected by a bounded channel, so a slow stage applies
//! backpressure all the way to the inputs. Cancellation stops the inputs;
//! renders in flight finish, the partial batch is flushed, and queued
//! batches are still delivered.

mod batch;
mod input;
mod output;
mod render;

use crate::initializer::InitializedPlugins;
use crate::parameters::{GenerationParameters, GeneratorParameters, DEFAULT_BATCH_SIZE};
use eventum_plugins::{EventPlugin, InputPlugin, OutputPlugin};
use input::{Emitter, Pacer};
use render::RenderPool;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Pipeline wiring that cannot work, detected before any stage starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImproperlyConfiguredError {
    #[error("At least one input plugin must be configured")]
    NoInputs,

    #[error("At least one output plugin must be configured")]
    NoOutputs,

    #[error("max_concurrency {value} exceeds the supported maximum of {max}")]
    Concurrency { value: usize, max: usize },
}

/// Fatal conditions that end a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Failed to open output plugin `{plugin}`: {reason}")]
    OutputOpen { plugin: String, reason: String },

    #[error("Input plugin `{plugin}` failed: {reason}")]
    Input { plugin: String, reason: String },

    #[error("Output plugin `{plugin}` failed to write {events} event(s): {reason}")]
    DeliveryAborted {
        plugin: String,
        events: usize,
        reason: String,
    },

    #[error("No output plugin accepted a batch of {0} event(s)")]
    NoOutputAccepted(usize),

    #[error("Pipeline task failed: {0}")]
    Task(String),
}

impl From<JoinError> for ExecutionError {
    fn from(e: JoinError) -> Self {
        ExecutionError::Task(e.to_string())
    }
}

/// Counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub timestamps: u64,
    pub events: u64,
    pub render_failures: u64,
    pub batches: u64,
    pub delivery_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub timestamps: AtomicU64,
    pub events: AtomicU64,
    pub render_failures: AtomicU64,
    pub batches: AtomicU64,
    pub delivery_failures: AtomicU64,
}

impl Stats {
    fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            timestamps: self.timestamps.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            render_failures: self.render_failures.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Runs the plugins of one generator through the pipeline, once.
pub struct Executor {
    id: String,
    inputs: Vec<Box<dyn InputPlugin>>,
    event: Arc<dyn EventPlugin>,
    outputs: Vec<Box<dyn OutputPlugin>>,
    live_mode: bool,
    skip_past: bool,
    generation: GenerationParameters,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("inputs", &self.inputs.len())
            .field("event", &self.event.name())
            .field("outputs", &self.outputs.len())
            .field("live_mode", &self.live_mode)
            .field("skip_past", &self.skip_past)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Executor {
    pub fn new(
        plugins: InitializedPlugins,
        params: &GeneratorParameters,
    ) -> Result<Self, ImproperlyConfiguredError> {
        if plugins.input.is_empty() {
            return Err(ImproperlyConfiguredError::NoInputs);
        }
        if plugins.output.is_empty() {
            return Err(ImproperlyConfiguredError::NoOutputs);
        }

        let generation = params.generation().clone();
        if generation.max_concurrency() > Semaphore::MAX_PERMITS {
            return Err(ImproperlyConfiguredError::Concurrency {
                value: generation.max_concurrency(),
                max: Semaphore::MAX_PERMITS,
            });
        }

        Ok(Self {
            id: params.id().to_string(),
            inputs: plugins.input,
            event: Arc::from(plugins.event),
            outputs: plugins.output,
            live_mode: params.live_mode(),
            skip_past: params.skip_past(),
            generation,
        })
    }

    /// Run until the inputs are exhausted and everything is delivered, or
    /// until `cancel` fires.
    pub async fn execute(
        self,
        cancel: CancellationToken,
    ) -> Result<ExecutionSummary, ExecutionError> {
        self.execute_with_stats(cancel, Arc::new(Stats::default()))
            .await
    }

    /// Run, counting into `stats` so progress is observable while running.
    pub(crate) async fn execute_with_stats(
        self,
        cancel: CancellationToken,
        stats: Arc<Stats>,
    ) -> Result<ExecutionSummary, ExecutionError> {
        let Executor {
            id,
            inputs,
            event,
            mut outputs,
            live_mode,
            skip_past,
            generation,
        } = self;

        output::open_outputs(&mut outputs).await?;
        info!(
            "Executor of generator {} started ({} input(s), {} output(s), live_mode={}, skip_past={})",
            id,
            inputs.len(),
            outputs.len(),
            live_mode,
            skip_past
        );

        let run = cancel.child_token();
        let queue = generation.queue();
        let concurrency = generation.max_concurrency();

        let (timestamps_tx, timestamps_rx) = mpsc::channel(queue.max_timestamp_batches());
        let (rendered_tx, rendered_rx) = mpsc::channel(concurrency);
        let (events_tx, events_rx) = mpsc::channel(queue.max_event_batches());

        let emitter = Emitter::new(
            Pacer::new(live_mode),
            timestamps_tx,
            run.clone(),
            Arc::clone(&stats),
        );
        let pool = RenderPool {
            event,
            tags: Arc::new(inputs.iter().map(|p| p.tags().to_vec()).collect()),
            timezone: generation.timezone(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
        };
        let limit = generation.batch().size().unwrap_or(DEFAULT_BATCH_SIZE);

        let producers = tokio::spawn(input::produce_all(
            inputs,
            emitter,
            generation.keep_order(),
            limit,
        ));
        let dispatcher = tokio::spawn(render::dispatch(
            timestamps_rx,
            pool,
            rendered_tx,
            run.clone(),
        ));
        let collector = tokio::spawn(render::collect(
            rendered_rx,
            generation.keep_order(),
            concurrency,
            *generation.batch(),
            events_tx,
            Arc::clone(&stats),
        ));

        let delivered = output::deliver_all(
            &mut outputs,
            events_rx,
            generation.write_timeout(),
            generation.on_write_failure(),
            &stats,
        )
        .await;
        if delivered.is_err() {
            run.cancel();
        }

        let produced = producers.await.map_err(ExecutionError::from).and_then(|r| r);
        let dispatched = dispatcher.await.map_err(ExecutionError::from);
        let collected = collector.await.map_err(ExecutionError::from);

        output::close_outputs(&mut outputs).await;

        let summary = stats.summary();
        produced.and(delivered).and(dispatched).and(collected)?;

        info!(
            "Executor of generator {} finished: {} timestamp(s), {} event(s), {} batch(es) delivered",
            id, summary.timestamps, summary.events, summary.batches
        );
        Ok(summary)
    }
}
