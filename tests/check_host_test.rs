//! End-to-end tests of the host: config loading, boot, check resolution,
//! check runs and status output.

mod common;

use checkhost::{agent_check_base, register_builtin_checks, CheckRunner};
use checkhost_aggregator::{Emission, MetricType, ServiceCheckStatus};
use checkhost_core::config::AppConfig;
use checkhost_core::format_status;
use checkhost_runtime::{find_subclass_of, Object};
use std::sync::Arc;
use std::time::Duration;

fn load_test_config() -> AppConfig {
    let file = common::write_config(common::TEST_CONFIG);
    let config = AppConfig::from_config_builder(file.path()).expect("Failed to load test config");
    config.validate().expect("Test config should be valid");
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_commits_batches_in_order() {
    let config = load_test_config();
    let host = common::boot(&config);
    let base = agent_check_base();
    register_builtin_checks(&host.interp, &base).unwrap();

    let mut runner = CheckRunner::new(
        Arc::clone(&host.interp),
        Arc::clone(&host.senders),
        "test-host",
    );
    runner.resolve(&base, config.enabled_checks());

    assert_eq!(runner.run_once().await, 2);
    assert_eq!(runner.run_once().await, 2);

    let batches: Vec<_> = host.batches.drain().collect();
    assert_eq!(batches.len(), 4);

    let heartbeat: Vec<_> = batches.iter().filter(|b| b.check_id == "heartbeat").collect();
    assert_eq!(heartbeat.iter().map(|b| b.sequence).collect::<Vec<_>>(), vec![1, 2]);

    match heartbeat[0].emissions.as_slice() {
        [Emission::Metric(sample), Emission::ServiceCheck(check)] => {
            assert_eq!(sample.name, "checkhost.heartbeat");
            assert_eq!(sample.kind, MetricType::MonotonicCount);
            assert_eq!(sample.hostname, "test-host");
            assert_eq!(check.name, "checkhost.can_run");
            assert_eq!(check.status, ServiceCheckStatus::Ok);
        }
        other => panic!("unexpected heartbeat emissions: {:?}", other),
    }

    let uptime = batches.iter().find(|b| b.check_id == "uptime").unwrap();
    match uptime.emissions.as_slice() {
        [Emission::Metric(sample)] => {
            assert_eq!(sample.kind, MetricType::Gauge);
            assert_eq!(sample.tags, vec!["env:test".to_string()]);
        }
        other => panic!("unexpected uptime emissions: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_reports_resolution_failures() {
    let config = load_test_config();
    let host = common::boot(&config);
    let base = agent_check_base();
    register_builtin_checks(&host.interp, &base).unwrap();

    let mut runner = CheckRunner::new(
        Arc::clone(&host.interp),
        Arc::clone(&host.senders),
        "test-host",
    );
    runner.resolve(&base, config.enabled_checks());
    runner.run_once().await;

    let status = runner.status().unwrap();
    assert_eq!(status.state, "initialized");
    assert_eq!(status.search_paths, vec!["/opt/checks.d", "/opt/extra"]);
    assert_eq!(status.checks.len(), 3);

    let missing = status.checks.iter().find(|c| c.name == "missing").unwrap();
    assert!(missing.class.is_none());
    assert!(missing.last_error.as_deref().unwrap().contains("No module named 'missing'"));

    let uptime = status.checks.iter().find(|c| c.name == "uptime").unwrap();
    assert_eq!(uptime.class.as_deref(), Some("uptime.UptimeCheck"));
    assert_eq!(uptime.runs, 1);

    let text = format_status(&status);
    assert!(text.contains("uptime [checks.uptime] -> uptime.UptimeCheck (runs: 1)"));
    assert!(text.contains("/opt/extra"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_pipeline_drops_batches_instead_of_stalling() {
    let file = common::write_config(
        r#"
app:
  hostname: test-host
telemetry:
  channel_capacity: 1
checks:
  - name: uptime
    module: checks.uptime
  - name: heartbeat
    module: checks.heartbeat
"#,
    );
    let config = AppConfig::from_config_builder(file.path()).unwrap();
    config.validate().unwrap();
    let host = common::boot(&config);
    let base = agent_check_base();
    register_builtin_checks(&host.interp, &base).unwrap();

    let mut runner = CheckRunner::new(
        Arc::clone(&host.interp),
        Arc::clone(&host.senders),
        "test-host",
    );
    runner.resolve(&base, config.enabled_checks());

    let succeeded = tokio::time::timeout(Duration::from_secs(5), runner.run_once())
        .await
        .expect("check run stalled on a full pipeline");
    assert_eq!(succeeded, 2);

    assert!(host.interp.acquire().is_ok());
    let delivered: Vec<_> = host.batches.drain().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].check_id, "uptime");
    // heartbeat's metric and service check
    assert_eq!(host.senders.metrics().get_dropped(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_async_setup_keeps_worker_free_while_lock_is_busy() {
    let config = load_test_config();
    let host = common::boot(&config);
    let base = agent_check_base();
    register_builtin_checks(&host.interp, &base).unwrap();

    // A blocking thread holds the runtime lock until an async task says so.
    let (held_tx, held_rx) = flume::bounded::<()>(1);
    let (release_tx, release_rx) = flume::bounded::<()>(1);
    let holder = {
        let interp = Arc::clone(&host.interp);
        tokio::task::spawn_blocking(move || {
            interp.with_lock(|_| {
                held_tx.send(()).ok();
                release_rx.recv().ok();
                Ok(())
            })
        })
    };
    held_rx.recv_async().await.unwrap();

    let checks = config.enabled_checks().into_iter().cloned().collect();
    let mut runner = CheckRunner::new(
        Arc::clone(&host.interp),
        Arc::clone(&host.senders),
        "test-host",
    );
    let setup = tokio::spawn(async move {
        runner.resolve_async(base, checks).await?;
        runner.status_async().await
    });
    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        release_tx.send_async(()).await.ok();
    });

    let status = tokio::time::timeout(Duration::from_secs(5), setup)
        .await
        .expect("async setup starved the worker")
        .unwrap()
        .unwrap();
    releaser.await.unwrap();
    holder.await.unwrap().unwrap();

    assert_eq!(status.checks.len(), 3);
    let uptime = status.checks.iter().find(|c| c.name == "uptime").unwrap();
    assert_eq!(uptime.class.as_deref(), Some("uptime.UptimeCheck"));
}

#[test]
fn test_reexported_base_is_skipped() {
    let config = load_test_config();
    let host = common::boot(&config);
    let base = agent_check_base();
    register_builtin_checks(&host.interp, &base).unwrap();

    let module = host
        .interp
        .with_lock(|token| host.interp.import(token, "heartbeat"))
        .unwrap();
    let found =
        find_subclass_of(&host.interp, &Object::from(base), &Object::from(module)).unwrap();
    assert_eq!(found.class_name(), "HeartbeatCheck");
}

#[test]
fn test_shutdown_clears_modules() {
    let config = load_test_config();
    let host = common::boot(&config);
    let state = host.interp.initialize(&config.runtime.search_paths).unwrap();

    host.interp.shutdown(state).unwrap();
    let status = host.interp.status().unwrap();
    assert_eq!(status.state, "finalized");
    assert!(status.modules.is_empty());
}
