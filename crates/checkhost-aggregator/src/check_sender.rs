//! Production sender: buffers emissions per check and ships them to the
//! aggregation pipeline as one batch per commit.

use flume::{Receiver, Sender as ChannelSender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics::SenderMetrics;
use crate::sender::{
    Emission, MetricSample, MetricType, Sender, ServiceCheck, ServiceCheckStatus,
};

/// Everything a check emitted between two commits, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitBatch {
    /// Id of the check that committed
    pub check_id: String,
    /// Per-sender commit counter, starting at 1
    pub sequence: u64,
    pub emissions: Vec<Emission>,
}

/// Creates the channel connecting senders to the pipeline.
///
/// `None` yields an unbounded channel. Commits never wait on a bounded one:
/// a batch committed while it is full is dropped and counted.
pub fn commit_channel(
    capacity: Option<usize>,
) -> (ChannelSender<CommitBatch>, Receiver<CommitBatch>) {
    match capacity {
        Some(cap) => flume::bounded(cap),
        None => flume::unbounded(),
    }
}

/// Buffering [`Sender`] bound to a single check.
pub struct CheckSender {
    check_id: String,
    buffer: Mutex<Vec<Emission>>,
    tx: ChannelSender<CommitBatch>,
    sequence: AtomicU64,
    metrics: Arc<SenderMetrics>,
}

impl CheckSender {
    pub fn new(check_id: impl Into<String>, tx: ChannelSender<CommitBatch>) -> Self {
        Self::with_metrics(check_id, tx, Arc::new(SenderMetrics::new()))
    }

    pub fn with_metrics(
        check_id: impl Into<String>,
        tx: ChannelSender<CommitBatch>,
        metrics: Arc<SenderMetrics>,
    ) -> Self {
        Self {
            check_id: check_id.into(),
            buffer: Mutex::new(Vec::new()),
            tx,
            sequence: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    /// Number of emissions waiting for the next commit.
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    fn push_metric(
        &self,
        kind: MetricType,
        metric: &str,
        value: f64,
        hostname: &str,
        tags: &[String],
    ) {
        self.buffer.lock().push(Emission::Metric(MetricSample {
            name: metric.to_string(),
            value,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
            kind,
        }));
        self.metrics.record_emission();
    }
}

impl Sender for CheckSender {
    fn rate(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.push_metric(MetricType::Rate, metric, value, hostname, tags);
    }

    fn count(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.push_metric(MetricType::Count, metric, value, hostname, tags);
    }

    fn monotonic_count(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.push_metric(MetricType::MonotonicCount, metric, value, hostname, tags);
    }

    fn histogram(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.push_metric(MetricType::Histogram, metric, value, hostname, tags);
    }

    fn gauge(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.push_metric(MetricType::Gauge, metric, value, hostname, tags);
    }

    fn service_check(
        &self,
        check_name: &str,
        status: ServiceCheckStatus,
        hostname: &str,
        tags: &[String],
        message: &str,
    ) {
        self.buffer.lock().push(Emission::ServiceCheck(ServiceCheck {
            name: check_name.to_string(),
            status,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
            message: message.to_string(),
        }));
        self.metrics.record_emission();
    }

    fn commit(&self) {
        // Take, number and enqueue under the buffer lock so batches reach the
        // pipeline in sequence order.
        let mut buffer = self.buffer.lock();
        let emissions = std::mem::take(&mut *buffer);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let count = emissions.len();

        let batch = CommitBatch {
            check_id: self.check_id.clone(),
            sequence,
            emissions,
        };
        let result = self.tx.try_send(batch);
        drop(buffer);

        match result {
            Ok(()) => {
                self.metrics.record_commit(count);
                debug!(check = %self.check_id, sequence, count, "committed telemetry batch");
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.record_dropped(count);
                warn!(
                    check = %self.check_id,
                    sequence,
                    count,
                    "pipeline full, dropping committed batch"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                self.metrics.record_dropped(count);
                warn!(
                    check = %self.check_id,
                    sequence,
                    count,
                    "pipeline closed, dropping committed batch"
                );
            }
        }
    }
}

impl std::fmt::Debug for CheckSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckSender")
            .field("check_id", &self.check_id)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nothing_visible_before_commit() {
        let (tx, rx) = commit_channel(None);
        let sender = CheckSender::new("disk", tx);

        sender.gauge("disk.free", 10.0, "host1", &tags(&["device:sda"]));
        sender.rate("disk.io", 2.0, "host1", &[]);

        assert!(rx.try_recv().is_err());
        assert_eq!(sender.pending(), 2);
    }

    #[test]
    fn test_commit_preserves_emission_order() {
        let (tx, rx) = commit_channel(None);
        let sender = CheckSender::new("disk", tx);

        sender.gauge("a", 1.0, "h", &[]);
        sender.service_check("disk.can_read", ServiceCheckStatus::Ok, "h", &[], "");
        sender.histogram("b", 2.0, "h", &[]);
        sender.commit();

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.check_id, "disk");
        assert_eq!(batch.sequence, 1);
        assert_eq!(batch.emissions.len(), 3);
        assert!(matches!(
            &batch.emissions[0],
            Emission::Metric(m) if m.name == "a" && m.kind == MetricType::Gauge
        ));
        assert!(matches!(
            &batch.emissions[1],
            Emission::ServiceCheck(s) if s.name == "disk.can_read"
        ));
        assert!(matches!(
            &batch.emissions[2],
            Emission::Metric(m) if m.name == "b" && m.kind == MetricType::Histogram
        ));
        assert_eq!(sender.pending(), 0);
    }

    #[test]
    fn test_each_commit_is_a_separate_batch() {
        let (tx, rx) = commit_channel(None);
        let sender = CheckSender::new("net", tx);

        sender.count("packets", 5.0, "h", &[]);
        sender.commit();
        sender.commit();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.emissions.len(), 1);
        assert_eq!(second.sequence, 2);
        assert!(second.emissions.is_empty());
    }

    #[test]
    fn test_values_pass_through_unvalidated() {
        let (tx, rx) = commit_channel(None);
        let sender = CheckSender::new("odd", tx);

        sender.monotonic_count("", f64::NAN, "", &tags(&["::", ""]));
        sender.commit();

        let batch = rx.try_recv().unwrap();
        match &batch.emissions[0] {
            Emission::Metric(m) => {
                assert!(m.name.is_empty());
                assert!(m.value.is_nan());
                assert_eq!(m.tags, tags(&["::", ""]));
            }
            other => panic!("unexpected emission {other:?}"),
        }
    }

    #[test]
    fn test_commit_after_pipeline_closed_does_not_panic() {
        let (tx, rx) = commit_channel(Some(1));
        drop(rx);
        let sender = CheckSender::new("gone", tx);
        sender.gauge("x", 1.0, "h", &[]);
        sender.commit();
        assert_eq!(sender.pending(), 0);
    }

    #[test]
    fn test_commit_into_full_pipeline_drops_without_blocking() {
        let (tx, rx) = commit_channel(Some(1));
        let metrics = Arc::new(SenderMetrics::new());
        let sender = CheckSender::with_metrics("busy", tx, Arc::clone(&metrics));

        sender.gauge("x", 1.0, "h", &[]);
        sender.commit();
        sender.gauge("y", 2.0, "h", &[]);
        sender.gauge("z", 3.0, "h", &[]);
        sender.commit();

        assert_eq!(metrics.get_dropped(), 2);
        assert_eq!(sender.pending(), 0);

        let kept = rx.try_recv().unwrap();
        assert_eq!(kept.sequence, 1);
        assert_eq!(kept.emissions.len(), 1);
        assert!(rx.try_recv().is_err());

        sender.commit();
        assert_eq!(rx.try_recv().unwrap().sequence, 3);
    }

    #[test]
    fn test_concurrent_commits_arrive_in_sequence_order() {
        const THREADS: usize = 4;
        const COMMITS: usize = 500;

        let (tx, rx) = commit_channel(None);
        let sender = Arc::new(CheckSender::new("shared", tx));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let sender = Arc::clone(&sender);
                std::thread::spawn(move || {
                    for i in 0..COMMITS {
                        sender.gauge("tick", (t * COMMITS + i) as f64, "h", &[]);
                        sender.commit();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sequences: Vec<u64> = rx.drain().map(|batch| batch.sequence).collect();
        let expected: Vec<u64> = (1..=(THREADS * COMMITS) as u64).collect();
        assert_eq!(sequences, expected);
    }
}
