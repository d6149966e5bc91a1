//! Dual-trigger batching of rendered events.

use crate::parameters::BatchParameters;
use std::time::Duration;
use tokio::time::Instant;

/// Accumulates events and seals a batch at `size` events or `delay` after
/// the first event of the batch, whichever comes first.
#[derive(Debug)]
pub(crate) struct Batcher {
    size: Option<usize>,
    delay: Option<Duration>,
    events: Vec<String>,
    deadline: Option<Instant>,
}

impl Batcher {
    pub(crate) fn new(params: &BatchParameters) -> Self {
        Self {
            size: params.size(),
            delay: params.delay(),
            events: Vec::with_capacity(params.size().unwrap_or(0).min(65_536)),
            deadline: None,
        }
    }

    /// Add an event, returning the sealed batch if it reached `size`.
    pub(crate) fn push(&mut self, event: String) -> Option<Vec<String>> {
        if self.events.is_empty() {
            self.deadline = self
                .delay
                .and_then(|delay| Instant::now().checked_add(delay));
        }
        self.events.push(event);

        match self.size {
            Some(size) if self.events.len() >= size => self.flush(),
            _ => None,
        }
    }

    /// When the current batch must be sealed, if it is non-empty and timed.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Seal whatever has accumulated.
    pub(crate) fn flush(&mut self) -> Option<Vec<String>> {
        self.deadline = None;
        if self.events.is_empty() {
            return None;
        }
        let capacity = self.size.unwrap_or(0).min(65_536);
        Some(std::mem::replace(
            &mut self.events,
            Vec::with_capacity(capacity),
        ))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }
}

/// Sleep until `deadline`, or forever without one.
pub(crate) async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
