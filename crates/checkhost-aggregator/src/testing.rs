//! Recording sender for unit-testing check code.

use parking_lot::Mutex;

use crate::sender::{Sender, ServiceCheckStatus};

/// One recorded call on a [`MockSender`].
#[derive(Debug, Clone, PartialEq)]
pub enum SenderCall {
    Rate { metric: String, value: f64, hostname: String, tags: Vec<String> },
    Count { metric: String, value: f64, hostname: String, tags: Vec<String> },
    MonotonicCount { metric: String, value: f64, hostname: String, tags: Vec<String> },
    Histogram { metric: String, value: f64, hostname: String, tags: Vec<String> },
    Gauge { metric: String, value: f64, hostname: String, tags: Vec<String> },
    ServiceCheck {
        check_name: String,
        status: ServiceCheckStatus,
        hostname: String,
        tags: Vec<String>,
        message: String,
    },
    Commit,
}

impl SenderCall {
    pub fn gauge(metric: &str, value: f64, hostname: &str, tags: &[&str]) -> Self {
        SenderCall::Gauge {
            metric: metric.to_string(),
            value,
            hostname: hostname.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn service_check(
        check_name: &str,
        status: ServiceCheckStatus,
        hostname: &str,
        tags: &[&str],
        message: &str,
    ) -> Self {
        SenderCall::ServiceCheck {
            check_name: check_name.to_string(),
            status,
            hostname: hostname.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            message: message.to_string(),
        }
    }

    /// Method name as it appears on the [`Sender`] trait.
    pub fn method(&self) -> &'static str {
        match self {
            SenderCall::Rate { .. } => "rate",
            SenderCall::Count { .. } => "count",
            SenderCall::MonotonicCount { .. } => "monotonic_count",
            SenderCall::Histogram { .. } => "histogram",
            SenderCall::Gauge { .. } => "gauge",
            SenderCall::ServiceCheck { .. } => "service_check",
            SenderCall::Commit => "commit",
        }
    }
}

/// [`Sender`] that records every call, in order, instead of forwarding it.
#[derive(Debug, Default)]
pub struct MockSender {
    calls: Mutex<Vec<SenderCall>>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the calls recorded so far.
    pub fn calls(&self) -> Vec<SenderCall> {
        self.calls.lock().clone()
    }

    /// Returns and clears the recorded calls.
    pub fn take_calls(&self) -> Vec<SenderCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Number of recorded calls to `method`.
    pub fn count_of(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.method() == method).count()
    }

    /// Panics unless the recorded calls equal `expected` exactly.
    #[track_caller]
    pub fn assert_calls(&self, expected: &[SenderCall]) {
        let calls = self.calls.lock();
        assert_eq!(
            calls.as_slice(),
            expected,
            "sender calls mismatch\n  recorded: {:?}\n  expected: {:?}",
            calls.iter().map(SenderCall::method).collect::<Vec<_>>(),
            expected.iter().map(SenderCall::method).collect::<Vec<_>>(),
        );
    }

    fn record(&self, call: SenderCall) {
        self.calls.lock().push(call);
    }
}

impl Sender for MockSender {
    fn rate(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.record(SenderCall::Rate {
            metric: metric.to_string(),
            value,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
        });
    }

    fn count(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.record(SenderCall::Count {
            metric: metric.to_string(),
            value,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
        });
    }

    fn monotonic_count(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.record(SenderCall::MonotonicCount {
            metric: metric.to_string(),
            value,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
        });
    }

    fn histogram(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.record(SenderCall::Histogram {
            metric: metric.to_string(),
            value,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
        });
    }

    fn gauge(&self, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        self.record(SenderCall::Gauge {
            metric: metric.to_string(),
            value,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
        });
    }

    fn service_check(
        &self,
        check_name: &str,
        status: ServiceCheckStatus,
        hostname: &str,
        tags: &[String],
        message: &str,
    ) {
        self.record(SenderCall::ServiceCheck {
            check_name: check_name.to_string(),
            status,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
            message: message.to_string(),
        });
    }

    fn commit(&self) {
        self.record(SenderCall::Commit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_then_commit_records_exactly_two_calls() {
        let sender = MockSender::new();
        sender.gauge("foo", 1.0, "host1", &["tag:x".to_string()]);
        sender.commit();

        sender.assert_calls(&[
            SenderCall::gauge("foo", 1.0, "host1", &["tag:x"]),
            SenderCall::Commit,
        ]);
        assert_eq!(sender.count_of("gauge"), 1);
        assert_eq!(sender.count_of("commit"), 1);
    }

    #[test]
    fn test_take_calls_clears() {
        let sender = MockSender::new();
        sender.service_check("up", ServiceCheckStatus::Warning, "h", &[], "slow");
        let taken = sender.take_calls();
        assert_eq!(
            taken,
            vec![SenderCall::service_check("up", ServiceCheckStatus::Warning, "h", &[], "slow")]
        );
        assert!(sender.calls().is_empty());
    }

    #[test]
    #[should_panic(expected = "sender calls mismatch")]
    fn test_assert_calls_reports_mismatch() {
        let sender = MockSender::new();
        sender.commit();
        sender.assert_calls(&[]);
    }
}
