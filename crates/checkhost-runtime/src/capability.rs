//! Synthetic modules injected into the runtime at boot.
//!
//! `aggregator` lets check code reach the [`Sender`] registered for its check
//! id; `host_agent` exposes host metadata and a bridge into host logging.

use checkhost_aggregator::{MetricType, Sender, SenderProvider, ServiceCheckStatus};
use checkhost_core::config::ApplicationConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::lock::LockToken;
use crate::object::{ModuleHandle, Object};

pub const AGGREGATOR_MODULE: &str = "aggregator";
pub const HOST_AGENT_MODULE: &str = "host_agent";

/// Host facts readable from check code.
#[derive(Debug, Clone, Default)]
pub struct HostMetadata {
    pub hostname: String,
    pub version: String,
    pub settings: BTreeMap<String, String>,
}

impl HostMetadata {
    pub fn new(hostname: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            version: version.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn from_app_config(app: &ApplicationConfig, version: impl Into<String>) -> Self {
        Self {
            hostname: app.resolved_hostname(),
            version: version.into(),
            settings: app.settings.clone(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

/// Positional argument access for native functions.
struct Args<'a> {
    func: &'static str,
    args: &'a [Object],
}

impl<'a> Args<'a> {
    fn exact(func: &'static str, args: &'a [Object], expected: usize) -> RuntimeResult<Self> {
        if args.len() != expected {
            return Err(RuntimeError::TypeError(format!(
                "{}() takes {} arguments ({} given)",
                func,
                expected,
                args.len()
            )));
        }
        Ok(Self { func, args })
    }

    fn mismatch(&self, index: usize, expected: &str) -> RuntimeError {
        RuntimeError::TypeError(format!(
            "{}() argument {} must be {}, not {}",
            self.func,
            index + 1,
            expected,
            self.args[index].type_name()
        ))
    }

    fn str(&self, index: usize) -> RuntimeResult<&'a str> {
        self.args[index].as_str().ok_or_else(|| self.mismatch(index, "str"))
    }

    /// String argument where `None` reads as empty.
    fn str_or_empty(&self, index: usize) -> RuntimeResult<&'a str> {
        if self.args[index].is_none() {
            return Ok("");
        }
        self.str(index)
    }

    fn int(&self, index: usize) -> RuntimeResult<i64> {
        self.args[index].as_i64().ok_or_else(|| self.mismatch(index, "int"))
    }

    fn float(&self, index: usize) -> RuntimeResult<f64> {
        self.args[index].as_f64().ok_or_else(|| self.mismatch(index, "float"))
    }

    /// A list of strings; `None` reads as no tags.
    fn tags(&self, index: usize) -> RuntimeResult<Vec<String>> {
        match &self.args[index] {
            Object::None => Ok(Vec::new()),
            Object::List(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.mismatch(index, "a list of str"))
                })
                .collect(),
            _ => Err(self.mismatch(index, "list")),
        }
    }
}

fn sender_for(senders: &dyn SenderProvider, check_id: &str) -> RuntimeResult<Arc<dyn Sender>> {
    senders.get_sender(check_id).ok_or_else(|| {
        RuntimeError::Capability(format!("no sender registered for check '{}'", check_id))
    })
}

/// Builds the `aggregator` module.
pub(crate) fn aggregator_module(
    token: &LockToken<'_>,
    senders: Arc<dyn SenderProvider>,
) -> ModuleHandle {
    let module = ModuleHandle::new(AGGREGATOR_MODULE);

    for kind in MetricType::ALL {
        module.set_attr(token, kind.constant_name(), Object::Int(kind.code()));
    }

    let provider = Arc::clone(&senders);
    module.set_attr(
        token,
        "submit_metric",
        Object::function("submit_metric", move |_token, args| {
            let args = Args::exact("submit_metric", args, 6)?;
            let check_id = args.str(0)?;
            let code = args.int(1)?;
            let kind = MetricType::from_code(code)
                .ok_or_else(|| RuntimeError::Capability(format!("unknown metric type {}", code)))?;
            let name = args.str(2)?;
            let value = args.float(3)?;
            let tags = args.tags(4)?;
            let hostname = args.str_or_empty(5)?;

            sender_for(provider.as_ref(), check_id)?.submit(kind, name, value, hostname, &tags);
            Ok(Object::None)
        }),
    );

    let provider = Arc::clone(&senders);
    module.set_attr(
        token,
        "submit_service_check",
        Object::function("submit_service_check", move |_token, args| {
            let args = Args::exact("submit_service_check", args, 6)?;
            let check_id = args.str(0)?;
            let name = args.str(1)?;
            let code = args.int(2)?;
            let status = ServiceCheckStatus::from_i64(code).ok_or_else(|| {
                RuntimeError::Capability(format!("unknown service check status {}", code))
            })?;
            let tags = args.tags(3)?;
            let hostname = args.str_or_empty(4)?;
            let message = args.str_or_empty(5)?;

            sender_for(provider.as_ref(), check_id)?
                .service_check(name, status, hostname, &tags, message);
            Ok(Object::None)
        }),
    );

    let provider = senders;
    module.set_attr(
        token,
        "commit",
        Object::function("commit", move |_token, args| {
            let args = Args::exact("commit", args, 1)?;
            sender_for(provider.as_ref(), args.str(0)?)?.commit();
            Ok(Object::None)
        }),
    );

    module
}

/// Builds the `host_agent` module.
pub(crate) fn host_agent_module(token: &LockToken<'_>, host: HostMetadata) -> ModuleHandle {
    let module = ModuleHandle::new(HOST_AGENT_MODULE);
    let host = Arc::new(host);

    let version = host.version.clone();
    module.set_attr(
        token,
        "get_version",
        Object::function("get_version", move |_token, args| {
            Args::exact("get_version", args, 0)?;
            Ok(Object::str(&version))
        }),
    );

    let hostname = host.hostname.clone();
    module.set_attr(
        token,
        "get_hostname",
        Object::function("get_hostname", move |_token, args| {
            Args::exact("get_hostname", args, 0)?;
            Ok(Object::str(&hostname))
        }),
    );

    module.set_attr(
        token,
        "get_config",
        Object::function("get_config", move |_token, args| {
            let args = Args::exact("get_config", args, 1)?;
            Ok(host
                .settings
                .get(args.str(0)?)
                .map(Object::str)
                .unwrap_or(Object::None))
        }),
    );

    module.set_attr(
        token,
        "log",
        Object::function("log", |_token, args| {
            let args = Args::exact("log", args, 2)?;
            let level = args.str(0)?;
            let message = args.str(1)?;
            match level.to_ascii_lowercase().as_str() {
                "critical" | "error" => error!(target: "checkhost::check", "{}", message),
                "warn" | "warning" => warn!(target: "checkhost::check", "{}", message),
                "info" => info!(target: "checkhost::check", "{}", message),
                "debug" => debug!(target: "checkhost::check", "{}", message),
                "trace" => trace!(target: "checkhost::check", "{}", message),
                other => {
                    return Err(RuntimeError::Capability(format!("unknown log level '{}'", other)));
                }
            }
            Ok(Object::None)
        }),
    );

    module
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::GlobalLock;
    use checkhost_aggregator::testing::{MockSender, SenderCall};
    use checkhost_aggregator::{commit_channel, SenderManager};

    fn manager_with_mock(check_id: &str) -> (Arc<SenderManager>, Arc<MockSender>) {
        let (tx, _rx) = commit_channel(None);
        let manager = Arc::new(SenderManager::new(tx));
        let mock = Arc::new(MockSender::new());
        manager.register(check_id, mock.clone());
        (manager, mock)
    }

    #[test]
    fn test_aggregator_constants() {
        let lock = GlobalLock::new();
        let token = lock.lock();
        let (manager, _) = manager_with_mock("disk");
        let module = aggregator_module(&token, manager);

        assert_eq!(module.get_attr(&token, "GAUGE").unwrap().as_i64(), Some(0));
        assert_eq!(module.get_attr(&token, "RATE").unwrap().as_i64(), Some(1));
        assert_eq!(module.get_attr(&token, "COUNT").unwrap().as_i64(), Some(2));
        assert_eq!(module.get_attr(&token, "MONOTONIC_COUNT").unwrap().as_i64(), Some(3));
        assert_eq!(module.get_attr(&token, "HISTOGRAM").unwrap().as_i64(), Some(4));
    }

    #[test]
    fn test_submit_metric_routes_to_sender() {
        let lock = GlobalLock::new();
        let token = lock.lock();
        let (manager, mock) = manager_with_mock("disk");
        let module = aggregator_module(&token, manager);

        let submit = module.get_attr(&token, "submit_metric").unwrap();
        submit
            .call(
                &token,
                &[
                    Object::str("disk"),
                    Object::Int(0),
                    Object::str("foo"),
                    Object::Float(1.0),
                    Object::str_list(["tag:x"]),
                    Object::str("host1"),
                ],
            )
            .unwrap();
        module
            .get_attr(&token, "commit")
            .unwrap()
            .call(&token, &[Object::str("disk")])
            .unwrap();

        mock.assert_calls(&[
            SenderCall::gauge("foo", 1.0, "host1", &["tag:x"]),
            SenderCall::Commit,
        ]);
    }

    #[test]
    fn test_submit_service_check() {
        let lock = GlobalLock::new();
        let token = lock.lock();
        let (manager, mock) = manager_with_mock("disk");
        let module = aggregator_module(&token, manager);

        module
            .get_attr(&token, "submit_service_check")
            .unwrap()
            .call(
                &token,
                &[
                    Object::str("disk"),
                    Object::str("disk.can_connect"),
                    Object::Int(2),
                    Object::None,
                    Object::None,
                    Object::str("unreachable"),
                ],
            )
            .unwrap();

        mock.assert_calls(&[SenderCall::service_check(
            "disk.can_connect",
            ServiceCheckStatus::Critical,
            "",
            &[],
            "unreachable",
        )]);
    }

    #[test]
    fn test_unknown_check_and_bad_arguments() {
        let lock = GlobalLock::new();
        let token = lock.lock();
        let (manager, _) = manager_with_mock("disk");
        let module = aggregator_module(&token, manager);
        let commit = module.get_attr(&token, "commit").unwrap();

        let err = commit.call(&token, &[Object::str("nope")]).unwrap_err();
        assert!(matches!(err, RuntimeError::Capability(_)));

        let err = commit.call(&token, &[]).unwrap_err();
        assert!(err.to_string().contains("commit() takes 1 arguments (0 given)"));

        let err = commit.call(&token, &[Object::Int(3)]).unwrap_err();
        assert!(err.to_string().contains("must be str, not int"));
    }

    #[test]
    fn test_submit_metric_rejects_unknown_type() {
        let lock = GlobalLock::new();
        let token = lock.lock();
        let (manager, mock) = manager_with_mock("disk");
        let module = aggregator_module(&token, manager);

        let err = module
            .get_attr(&token, "submit_metric")
            .unwrap()
            .call(
                &token,
                &[
                    Object::str("disk"),
                    Object::Int(99),
                    Object::str("foo"),
                    Object::Int(1),
                    Object::None,
                    Object::None,
                ],
            )
            .unwrap_err();
        assert!(err.to_string().contains("unknown metric type 99"));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_host_agent_functions() {
        let lock = GlobalLock::new();
        let token = lock.lock();
        let host = HostMetadata::new("web-01", "7.1.0").with_setting("site", "eu1");
        let module = host_agent_module(&token, host);

        let call = |name: &str, args: &[Object]| {
            module.get_attr(&token, name).unwrap().call(&token, args)
        };

        assert_eq!(call("get_hostname", &[]).unwrap().as_str(), Some("web-01"));
        assert_eq!(call("get_version", &[]).unwrap().as_str(), Some("7.1.0"));
        assert_eq!(call("get_config", &[Object::str("site")]).unwrap().as_str(), Some("eu1"));
        assert!(call("get_config", &[Object::str("missing")]).unwrap().is_none());
        assert!(call("log", &[Object::str("info"), Object::str("hello")]).is_ok());
        assert!(call("log", &[Object::str("loud"), Object::str("hello")]).is_err());
    }
}
