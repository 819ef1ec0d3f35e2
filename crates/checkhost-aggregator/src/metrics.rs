//! Sender-side counters, exported through the `metrics` facade.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::atomic::{AtomicU64, Ordering};

/// Emission and commit counters shared by the senders of one host.
#[derive(Debug)]
pub struct SenderMetrics {
    emissions: AtomicU64,
    commits: AtomicU64,
    dropped: AtomicU64,
}

impl SenderMetrics {
    pub fn new() -> Self {
        describe_counter!(
            "checkhost_sender_emissions_total",
            "Total metric and service-check emissions buffered by senders"
        );
        describe_counter!(
            "checkhost_sender_commits_total",
            "Total commit batches delivered to the pipeline"
        );
        describe_counter!(
            "checkhost_sender_dropped_total",
            "Total emissions dropped because the pipeline was full or closed"
        );
        describe_histogram!(
            "checkhost_sender_batch_size",
            "Number of emissions in each committed batch"
        );

        Self {
            emissions: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_emission(&self) {
        self.emissions.fetch_add(1, Ordering::Relaxed);
        counter!("checkhost_sender_emissions_total").increment(1);
    }

    pub fn record_commit(&self, emissions: usize) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        counter!("checkhost_sender_commits_total").increment(1);
        histogram!("checkhost_sender_batch_size").record(emissions as f64);
    }

    pub fn record_dropped(&self, emissions: usize) {
        self.dropped.fetch_add(emissions as u64, Ordering::Relaxed);
        counter!("checkhost_sender_dropped_total").increment(emissions as u64);
    }

    pub fn get_emissions(&self) -> u64 {
        self.emissions.load(Ordering::Relaxed)
    }

    pub fn get_commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn get_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for SenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = SenderMetrics::new();
        metrics.record_emission();
        metrics.record_emission();
        metrics.record_commit(2);
        metrics.record_dropped(3);

        assert_eq!(metrics.get_emissions(), 2);
        assert_eq!(metrics.get_commits(), 1);
        assert_eq!(metrics.get_dropped(), 3);
    }
}
