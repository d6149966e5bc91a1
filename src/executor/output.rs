//! Fan-out delivery of event batches to output plugins.

use super::{ExecutionError, Stats};
use crate::parameters::WriteFailurePolicy;
use eventum_plugins::OutputPlugin;
use futures::future::join_all;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Open every output; on failure close the ones already opened.
pub(crate) async fn open_outputs(
    outputs: &mut [Box<dyn OutputPlugin>],
) -> Result<(), ExecutionError> {
    for index in 0..outputs.len() {
        if let Err(e) = outputs[index].open().await {
            let err = ExecutionError::OutputOpen {
                plugin: outputs[index].name().to_string(),
                reason: e.to_string(),
            };
            error!("{}", err);
            close_outputs(&mut outputs[..index]).await;
            return Err(err);
        }
    }
    Ok(())
}

/// Close every output, logging failures.
pub(crate) async fn close_outputs(outputs: &mut [Box<dyn OutputPlugin>]) {
    for output in outputs.iter_mut() {
        if let Err(e) = output.close().await {
            warn!("Failed to close output plugin `{}`: {}", output.name(), e);
        }
    }
}

/// Write a batch to one output, retrying per `retries` with every attempt
/// bounded by `timeout`.
async fn write_with_retries(
    output: &mut Box<dyn OutputPlugin>,
    batch: &[String],
    timeout: Duration,
    retries: u32,
) -> Result<usize, String> {
    let mut attempt = 0;
    loop {
        let reason = match tokio::time::timeout(timeout, output.write(batch)).await {
            Ok(Ok(accepted)) => return Ok(accepted),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write timed out after {}s", timeout.as_secs_f64()),
        };

        if attempt >= retries {
            return Err(reason);
        }
        attempt += 1;
        warn!(
            "Output plugin `{}` failed ({}), retrying ({}/{})",
            output.name(),
            reason,
            attempt,
            retries
        );
    }
}

/// Deliver one batch to every output concurrently.
pub(crate) async fn deliver_batch(
    outputs: &mut [Box<dyn OutputPlugin>],
    batch: &[String],
    timeout: Duration,
    policy: WriteFailurePolicy,
    stats: &Stats,
) -> Result<(), ExecutionError> {
    let retries = policy.retries();
    let results = join_all(outputs.iter_mut().map(|output| async move {
        let result = write_with_retries(output, batch, timeout, retries).await;
        (output.name().to_string(), result)
    }))
    .await;

    let mut accepted_by = 0;
    for (plugin, result) in results {
        match result {
            Ok(accepted) => {
                accepted_by += 1;
                if accepted < batch.len() {
                    warn!(
                        "Output plugin `{}` accepted {} of {} event(s)",
                        plugin,
                        accepted,
                        batch.len()
                    );
                }
            }
            Err(reason) => {
                stats.delivery_failures.fetch_add(1, Ordering::Relaxed);
                if policy == WriteFailurePolicy::Abort {
                    return Err(ExecutionError::DeliveryAborted {
                        plugin,
                        events: batch.len(),
                        reason,
                    });
                }
                warn!(
                    "Output plugin `{}` failed to write {} event(s): {}",
                    plugin,
                    batch.len(),
                    reason
                );
            }
        }
    }

    if accepted_by == 0 {
        return Err(ExecutionError::NoOutputAccepted(batch.len()));
    }

    stats.batches.fetch_add(1, Ordering::Relaxed);
    debug!(
        "Delivered batch of {} event(s) to {} output(s)",
        batch.len(),
        accepted_by
    );
    Ok(())
}

/// Deliver batches until the event queue closes or delivery turns fatal.
pub(crate) async fn deliver_all(
    outputs: &mut [Box<dyn OutputPlugin>],
    mut rx: mpsc::Receiver<Vec<String>>,
    timeout: Duration,
    policy: WriteFailurePolicy,
    stats: &Stats,
) -> Result<(), ExecutionError> {
    while let Some(batch) = rx.recv().await {
        if let Err(err) = deliver_batch(outputs, &batch, timeout, policy, stats).await {
            error!("{}", err);
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eventum_plugins::PluginError;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Copy)]
    enum Behavior {
        Accept,
        Fail,
        Hang,
        FailOnce,
    }

    struct Scripted {
        name: &'static str,
        behavior: Behavior,
        calls: Arc<Mutex<usize>>,
        written: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn boxed(name: &'static str, behavior: Behavior) -> (Box<dyn OutputPlugin>, Arc<Mutex<Vec<String>>>) {
            let written = Arc::new(Mutex::new(Vec::new()));
            let plugin = Scripted {
                name,
                behavior,
                calls: Arc::new(Mutex::new(0)),
                written: Arc::clone(&written),
            };
            (Box::new(plugin), written)
        }
    }

    #[async_trait]
    impl OutputPlugin for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn write(&mut self, events: &[String]) -> Result<usize, PluginError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            match self.behavior {
                Behavior::Accept => {}
                Behavior::Fail => return Err(PluginError::runtime("sink refused")),
                Behavior::Hang => std::future::pending::<()>().await,
                Behavior::FailOnce if call == 1 => {
                    return Err(PluginError::runtime("transient"))
                }
                Behavior::FailOnce => {}
            }
            self.written.lock().unwrap().extend_from_slice(events);
            Ok(events.len())
        }
    }

    fn batch() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_failed_output_is_isolated_with_skip() {
        let (good, written) = Scripted::boxed("good", Behavior::Accept);
        let (bad, _) = Scripted::boxed("bad", Behavior::Fail);
        let mut outputs = vec![good, bad];
        let stats = Stats::default();

        deliver_batch(&mut outputs, &batch(), TIMEOUT, WriteFailurePolicy::Skip, &stats)
            .await
            .unwrap();

        assert_eq!(*written.lock().unwrap(), batch());
        assert_eq!(stats.delivery_failures.load(Ordering::Relaxed), 1);
        assert_eq!(stats.batches.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_no_output_accepting_is_fatal() {
        let (bad, _) = Scripted::boxed("bad", Behavior::Fail);
        let (slow, _) = Scripted::boxed("slow", Behavior::Hang);
        let mut outputs = vec![bad, slow];

        let err = deliver_batch(
            &mut outputs,
            &batch(),
            TIMEOUT,
            WriteFailurePolicy::Skip,
            &Stats::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExecutionError::NoOutputAccepted(2)));
    }

    #[tokio::test]
    async fn test_abort_policy_fails_on_any_failure() {
        let (good, _) = Scripted::boxed("good", Behavior::Accept);
        let (bad, _) = Scripted::boxed("bad", Behavior::Fail);
        let mut outputs = vec![good, bad];

        let err = deliver_batch(
            &mut outputs,
            &batch(),
            TIMEOUT,
            WriteFailurePolicy::Abort,
            &Stats::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExecutionError::DeliveryAborted { ref plugin, .. } if plugin == "bad"));
    }

    #[tokio::test]
    async fn test_retry_policy_recovers_transient_failure() {
        let (flaky, written) = Scripted::boxed("flaky", Behavior::FailOnce);
        let mut outputs = vec![flaky];
        let stats = Stats::default();

        deliver_batch(
            &mut outputs,
            &batch(),
            TIMEOUT,
            WriteFailurePolicy::Retry { attempts: 1 },
            &stats,
        )
        .await
        .unwrap();

        assert_eq!(*written.lock().unwrap(), batch());
        assert_eq!(stats.delivery_failures.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_deliver_all_drains_queue() {
        let (good, written) = Scripted::boxed("good", Behavior::Accept);
        let mut outputs = vec![good];
        let (tx, rx) = mpsc::channel(4);
        tx.send(vec!["1".to_string()]).await.unwrap();
        tx.send(vec!["2".to_string(), "3".to_string()]).await.unwrap();
        drop(tx);

        let stats = Stats::default();
        deliver_all(&mut outputs, rx, TIMEOUT, WriteFailurePolicy::Skip, &stats)
            .await
            .unwrap();

        assert_eq!(written.lock().unwrap().len(), 3);
        assert_eq!(stats.batches.load(Ordering::Relaxed), 2);
    }
}
