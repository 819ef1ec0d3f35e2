//! Lock and lifecycle counters, exported through the `metrics` facade.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct RuntimeMetrics {
    acquisitions: AtomicU64,
    contended: AtomicU64,
    nested: AtomicU64,
    injections: AtomicU64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        describe_counter!(
            "checkhost_runtime_lock_acquisitions_total",
            "Total acquisitions of the runtime lock"
        );
        describe_counter!(
            "checkhost_runtime_lock_contended_total",
            "Acquisitions that had to wait for another holder"
        );
        describe_histogram!(
            "checkhost_runtime_lock_wait_seconds",
            "Time spent waiting for the runtime lock"
        );
        describe_counter!(
            "checkhost_runtime_capability_injections_total",
            "Capability modules injected into the runtime"
        );

        Self {
            acquisitions: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            nested: AtomicU64::new(0),
            injections: AtomicU64::new(0),
        }
    }

    pub fn record_acquire(&self, waited: Duration, contended: bool, nested: bool) {
        if nested {
            self.nested.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        counter!("checkhost_runtime_lock_acquisitions_total").increment(1);
        histogram!("checkhost_runtime_lock_wait_seconds").record(waited.as_secs_f64());
        if contended {
            self.contended.fetch_add(1, Ordering::Relaxed);
            counter!("checkhost_runtime_lock_contended_total").increment(1);
        }
    }

    pub fn record_injection(&self, module: &str) {
        self.injections.fetch_add(1, Ordering::Relaxed);
        counter!("checkhost_runtime_capability_injections_total", "module" => module.to_string())
            .increment(1);
    }

    pub fn get_acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    pub fn get_contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    pub fn get_nested(&self) -> u64 {
        self.nested.load(Ordering::Relaxed)
    }

    pub fn get_injections(&self) -> u64 {
        self.injections.load(Ordering::Relaxed)
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_acquires_counted_separately() {
        let metrics = RuntimeMetrics::new();
        metrics.record_acquire(Duration::from_millis(1), false, false);
        metrics.record_acquire(Duration::from_millis(5), true, false);
        metrics.record_acquire(Duration::ZERO, false, true);
        metrics.record_injection("aggregator");

        assert_eq!(metrics.get_acquisitions(), 2);
        assert_eq!(metrics.get_contended(), 1);
        assert_eq!(metrics.get_nested(), 1);
        assert_eq!(metrics.get_injections(), 1);
    }
}
