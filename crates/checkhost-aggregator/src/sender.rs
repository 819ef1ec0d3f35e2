use serde::{Deserialize, Serialize};

/// Status reported by a service check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceCheckStatus {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl ServiceCheckStatus {
    /// Maps the numeric status used by check code; out-of-range values are
    /// rejected rather than coerced.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Warning),
            2 => Some(Self::Critical),
            3 => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Kind of a metric emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Gauge,
    Rate,
    Count,
    MonotonicCount,
    Histogram,
}

impl MetricType {
    pub const ALL: [MetricType; 5] = [
        MetricType::Gauge,
        MetricType::Rate,
        MetricType::Count,
        MetricType::MonotonicCount,
        MetricType::Histogram,
    ];

    /// Numeric code exposed to check code by the `aggregator` module.
    pub fn code(self) -> i64 {
        match self {
            MetricType::Gauge => 0,
            MetricType::Rate => 1,
            MetricType::Count => 2,
            MetricType::MonotonicCount => 3,
            MetricType::Histogram => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Upper-case constant name, e.g. `MONOTONIC_COUNT`.
    pub fn constant_name(self) -> &'static str {
        match self {
            MetricType::Gauge => "GAUGE",
            MetricType::Rate => "RATE",
            MetricType::Count => "COUNT",
            MetricType::MonotonicCount => "MONOTONIC_COUNT",
            MetricType::Histogram => "HISTOGRAM",
        }
    }
}

/// One metric emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub hostname: String,
    pub tags: Vec<String>,
    pub kind: MetricType,
}

/// One service-check emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub name: String,
    pub status: ServiceCheckStatus,
    pub hostname: String,
    pub tags: Vec<String>,
    pub message: String,
}

/// A buffered record awaiting the next commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Emission {
    Metric(MetricSample),
    ServiceCheck(ServiceCheck),
}

/// Telemetry sink handed to checks.
///
/// Implementations perform no validation: empty names, NaN values and
/// malformed tags are passed through untouched. Records become visible
/// downstream only after [`Sender::commit`].
pub trait Sender: Send + Sync {
    /// Submits a rate.
    fn rate(&self, metric: &str, value: f64, hostname: &str, tags: &[String]);

    /// Submits a count.
    fn count(&self, metric: &str, value: f64, hostname: &str, tags: &[String]);

    /// Submits a monotonic count.
    fn monotonic_count(&self, metric: &str, value: f64, hostname: &str, tags: &[String]);

    /// Submits a histogram sample.
    fn histogram(&self, metric: &str, value: f64, hostname: &str, tags: &[String]);

    /// Submits a gauge.
    fn gauge(&self, metric: &str, value: f64, hostname: &str, tags: &[String]);

    /// Submits a service check.
    fn service_check(
        &self,
        check_name: &str,
        status: ServiceCheckStatus,
        hostname: &str,
        tags: &[String],
        message: &str,
    );

    /// Flushes everything emitted since the previous commit.
    fn commit(&self);

    /// Dispatches to the method matching `kind`.
    fn submit(&self, kind: MetricType, metric: &str, value: f64, hostname: &str, tags: &[String]) {
        match kind {
            MetricType::Gauge => self.gauge(metric, value, hostname, tags),
            MetricType::Rate => self.rate(metric, value, hostname, tags),
            MetricType::Count => self.count(metric, value, hostname, tags),
            MetricType::MonotonicCount => self.monotonic_count(metric, value, hostname, tags),
            MetricType::Histogram => self.histogram(metric, value, hostname, tags),
        }
    }
}
