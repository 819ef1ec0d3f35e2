use dashmap::DashMap;
use flume::Sender as ChannelSender;
use std::sync::Arc;

use crate::check_sender::{CheckSender, CommitBatch};
use crate::metrics::SenderMetrics;
use crate::sender::Sender;

/// Lookup of senders by check id, as used by the runtime's `aggregator`
/// capability module.
pub trait SenderProvider: Send + Sync {
    fn get_sender(&self, check_id: &str) -> Option<Arc<dyn Sender>>;
}

/// Registry of per-check senders sharing one pipeline channel.
pub struct SenderManager {
    senders: DashMap<String, Arc<dyn Sender>>,
    tx: ChannelSender<CommitBatch>,
    metrics: Arc<SenderMetrics>,
}

impl SenderManager {
    pub fn new(tx: ChannelSender<CommitBatch>) -> Self {
        Self {
            senders: DashMap::new(),
            tx,
            metrics: Arc::new(SenderMetrics::new()),
        }
    }

    /// Returns the sender for `check_id`, creating a [`CheckSender`] on first
    /// use.
    pub fn get_or_create(&self, check_id: &str) -> Arc<dyn Sender> {
        self.senders
            .entry(check_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(check = check_id, "creating sender");
                let sender: Arc<dyn Sender> = Arc::new(CheckSender::with_metrics(
                    check_id,
                    self.tx.clone(),
                    Arc::clone(&self.metrics),
                ));
                sender
            })
            .clone()
    }

    /// Installs a custom sender (typically a test double), returning the
    /// one it replaces.
    pub fn register(&self, check_id: &str, sender: Arc<dyn Sender>) -> Option<Arc<dyn Sender>> {
        self.senders.insert(check_id.to_string(), sender)
    }

    /// Removes the sender for `check_id`. Uncommitted emissions are dropped.
    pub fn destroy(&self, check_id: &str) -> bool {
        self.senders.remove(check_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn metrics(&self) -> &SenderMetrics {
        &self.metrics
    }
}

impl SenderProvider for SenderManager {
    fn get_sender(&self, check_id: &str) -> Option<Arc<dyn Sender>> {
        self.senders.get(check_id).map(|s| Arc::clone(s.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check_sender::commit_channel;
    use crate::testing::{MockSender, SenderCall};

    #[test]
    fn test_get_or_create_reuses_sender() {
        let (tx, rx) = commit_channel(None);
        let manager = SenderManager::new(tx);

        let a = manager.get_or_create("disk");
        let b = manager.get_or_create("disk");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);

        a.gauge("x", 1.0, "h", &[]);
        b.commit();
        assert_eq!(rx.try_recv().unwrap().emissions.len(), 1);
        assert_eq!(manager.metrics().get_commits(), 1);
    }

    #[test]
    fn test_provider_lookup_does_not_create() {
        let (tx, _rx) = commit_channel(None);
        let manager = SenderManager::new(tx);
        assert!(manager.get_sender("missing").is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_register_mock_and_destroy() {
        let (tx, _rx) = commit_channel(None);
        let manager = SenderManager::new(tx);
        let mock = Arc::new(MockSender::new());
        manager.register("disk", mock.clone());

        let sender = manager.get_sender("disk").unwrap();
        sender.commit();
        assert_eq!(mock.calls(), vec![SenderCall::Commit]);

        assert!(manager.destroy("disk"));
        assert!(!manager.destroy("disk"));
    }
}
