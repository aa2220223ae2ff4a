//! Producer run loop.
//!
//! One record at a time: submit, log the outcome, sleep the configured
//! interval, continue. The interval boundary is the only cancellation point;
//! an in-flight submission always runs to completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::client::{RecordSink, SubmitAck, SubmitError};
use crate::source::RecordSource;

/// Tally of one stream run, for the operator log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    pub submitted: usize,
    pub scored: usize,
    pub anomalies: usize,
    pub unscored: usize,
    pub rejected: usize,
    pub unreadable: usize,
}

pub struct Producer<S: RecordSink> {
    sink: S,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl<S: RecordSink> Producer<S> {
    pub fn new(sink: S, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for stopping the producer between records.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Drive `source` to exhaustion (or shutdown) and return the tally.
    ///
    /// A failed submission or unreadable record is logged and counted; the
    /// stream continues with the next record after the normal interval.
    pub async fn run(&self, source: &mut dyn RecordSource) -> ProducerReport {
        let mut report = ProducerReport::default();

        loop {
            match source.next_record() {
                Ok(None) => {
                    tracing::info!("source exhausted, stream complete");
                    break;
                }
                Ok(Some(record)) => {
                    report.submitted += 1;
                    match self.sink.submit(&record).await {
                        Ok(SubmitAck::Scored { is_anomaly }) => {
                            report.scored += 1;
                            if is_anomaly {
                                report.anomalies += 1;
                                tracing::info!("record flagged anomalous");
                            } else {
                                tracing::debug!("record scored, in tolerance");
                            }
                        }
                        Ok(SubmitAck::Unscored) => {
                            report.unscored += 1;
                            tracing::debug!("record persisted unscored (cold start)");
                        }
                        Err(SubmitError::Rejected {
                            kind,
                            message,
                            retry_safe,
                        }) => {
                            report.rejected += 1;
                            tracing::warn!(kind, retry_safe, "record rejected: {message}");
                        }
                        Err(SubmitError::Transport(detail)) => {
                            report.rejected += 1;
                            tracing::warn!("submission failed in transport: {detail}");
                        }
                    }
                }
                Err(e) => {
                    report.unreadable += 1;
                    tracing::warn!("skipping unreadable record: {e}");
                }
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    tracing::info!("shutdown requested, stopping at interval boundary");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VecSource;
    use async_trait::async_trait;
    use serde_json::{Value as JsonValue, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that records submissions and fails a chosen call.
    struct FakeSink {
        fail_on_call: Option<usize>,
        calls: AtomicUsize,
        seen: Mutex<Vec<JsonValue>>,
    }

    impl FakeSink {
        fn new(fail_on_call: Option<usize>) -> Self {
            Self {
                fail_on_call,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecordSink for FakeSink {
        async fn submit(&self, record: &JsonValue) -> Result<SubmitAck, SubmitError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(SubmitError::Rejected {
                    kind: "oracle_error".to_string(),
                    message: "model server down".to_string(),
                    retry_safe: true,
                });
            }
            self.seen.lock().unwrap().push(record.clone());
            Ok(SubmitAck::Scored { is_anomaly: false })
        }
    }

    fn records(n: usize) -> Vec<JsonValue> {
        (0..n)
            .map(|i| json!({"date": format!("2021-03-01T{i:02}:00:00Z"), "high": 10.0}))
            .collect()
    }

    #[tokio::test]
    async fn one_failed_record_does_not_halt_the_stream() {
        let producer = Producer::new(FakeSink::new(Some(3)), Duration::from_millis(1));
        let mut source = VecSource::new(records(5));

        let report = producer.run(&mut source).await;

        assert_eq!(report.submitted, 5);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.scored, 4);
        // Records 1, 2, 4, 5 got through; record 3 was rejected.
        assert_eq!(producer.sink.seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn source_exhaustion_terminates_cleanly() {
        let producer = Producer::new(FakeSink::new(None), Duration::from_millis(1));
        let mut source = VecSource::new(records(2));

        let report = producer.run(&mut source).await;
        assert_eq!(report.submitted, 2);
        assert_eq!(report.rejected, 0);
    }

    #[tokio::test]
    async fn shutdown_stops_at_the_interval_boundary() {
        let producer = Producer::new(FakeSink::new(None), Duration::from_secs(3600));
        let shutdown = producer.shutdown_handle();
        let mut source = VecSource::new(records(100));

        // Request shutdown before the run starts; the first record is still
        // submitted in full, then the loop stops at its first interval.
        shutdown.notify_one();
        let report = tokio::time::timeout(Duration::from_secs(5), producer.run(&mut source))
            .await
            .expect("producer did not honor shutdown");

        assert_eq!(report.submitted, 1);
    }
}
