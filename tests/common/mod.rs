//! Common test utilities and helpers for integration tests

use checkhost_aggregator::{commit_channel, CommitBatch, SenderManager};
use checkhost_core::config::AppConfig;
use checkhost_runtime::{HostMetadata, Interpreter};
use flume::Receiver;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const TEST_CONFIG: &str = r#"
app:
  hostname: test-host
runtime:
  search_paths: ["/opt/checks.d", "/opt/extra"]
checks:
  - name: uptime
    module: checks.uptime
    tags: ["env:test"]
  - name: heartbeat
    module: checks.heartbeat
  - name: missing
    module: checks.missing
  - name: disabled
    module: checks.uptime
    enabled: false
"#;

/// Writes `contents` to a temporary YAML file kept alive by the handle.
pub fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp config file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write config");
    file
}

pub struct Host {
    pub interp: Arc<Interpreter>,
    pub senders: Arc<SenderManager>,
    pub batches: Receiver<CommitBatch>,
}

/// Boots a runtime the way the binary does for `config`.
pub fn boot(config: &AppConfig) -> Host {
    let (tx, batches) = commit_channel(config.telemetry.channel_capacity);
    let senders = Arc::new(SenderManager::new(tx));
    let interp = Arc::new(Interpreter::new(
        config.runtime.clone(),
        HostMetadata::from_app_config(&config.app, "0.0.0-test"),
        senders.clone(),
    ));
    interp
        .initialize(&config.runtime.search_paths)
        .expect("Failed to initialize runtime");
    Host {
        interp,
        senders,
        batches,
    }
}
