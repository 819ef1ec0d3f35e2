//! Resolves configured checks and runs them against the runtime.

use checkhost_aggregator::SenderManager;
use checkhost_core::config::CheckConfig;
use checkhost_core::status::{CheckStatus, RuntimeStatus};
use checkhost_runtime::{
    resolve_check, Interpreter, Object, PluginDescriptor, RuntimeError, RuntimeResult, TypeObject,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ResolvedCheck {
    config: CheckConfig,
    descriptor: Option<PluginDescriptor>,
    status: CheckStatus,
}

/// Drives the enabled checks of one host.
pub struct CheckRunner {
    interp: Arc<Interpreter>,
    senders: Arc<SenderManager>,
    hostname: String,
    checks: Vec<ResolvedCheck>,
}

impl CheckRunner {
    pub fn new(
        interp: Arc<Interpreter>,
        senders: Arc<SenderManager>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            interp,
            senders,
            hostname: hostname.into(),
            checks: Vec::new(),
        }
    }

    /// Resolves the entry-point class of every check. Failures are recorded
    /// on the check and do not stop the others.
    pub fn resolve<'a>(
        &mut self,
        base: &TypeObject,
        checks: impl IntoIterator<Item = &'a CheckConfig>,
    ) {
        for config in checks {
            let resolved = resolve_one(&self.interp, &self.senders, base, config);
            self.checks.push(resolved);
        }
    }

    /// [`resolve`](Self::resolve) for async callers. Resolution takes the
    /// runtime lock, so it runs on a blocking thread.
    pub async fn resolve_async(
        &mut self,
        base: TypeObject,
        checks: Vec<CheckConfig>,
    ) -> RuntimeResult<()> {
        let senders = Arc::clone(&self.senders);
        let resolved = self
            .interp
            .run_blocking(move |interp| {
                Ok(checks
                    .iter()
                    .map(|config| resolve_one(interp, &senders, &base, config))
                    .collect::<Vec<_>>())
            })
            .await?;
        self.checks.extend(resolved);
        Ok(())
    }

    /// Runs every resolved check once, each in its own critical section.
    pub async fn run_once(&mut self) -> usize {
        let mut succeeded = 0;
        for check in &mut self.checks {
            let Some(descriptor) = check.descriptor.clone() else {
                continue;
            };

            let args = vec![
                Object::str(&check.config.name),
                Object::str_list(&check.config.tags),
                Object::str(&self.hostname),
            ];
            let result = self
                .interp
                .with_lock_blocking(move |token| {
                    let method = descriptor.class.lookup("check").ok_or_else(|| {
                        RuntimeError::AttributeError {
                            owner: descriptor.class.qualname(),
                            name: "check".to_string(),
                        }
                    })?;
                    method.call(token, &args)
                })
                .await;

            check.status.runs += 1;
            match result {
                Ok(_) => {
                    debug!(check = %check.config.name, "check run completed");
                    check.status.last_error = None;
                    succeeded += 1;
                }
                Err(e) => {
                    warn!(check = %check.config.name, error = %e, "check run failed");
                    check.status.last_error = Some(e.to_string());
                }
            }
        }
        succeeded
    }

    pub fn check_statuses(&self) -> Vec<CheckStatus> {
        self.checks.iter().map(|c| c.status.clone()).collect()
    }

    /// Runtime status including per-check results.
    pub fn status(&self) -> RuntimeResult<RuntimeStatus> {
        let mut status = self.interp.status()?;
        status.checks = self.check_statuses();
        Ok(status)
    }

    /// [`status`](Self::status) for async callers.
    pub async fn status_async(&self) -> RuntimeResult<RuntimeStatus> {
        let mut status = self.interp.run_blocking(|interp| interp.status()).await?;
        status.checks = self.check_statuses();
        Ok(status)
    }
}

fn resolve_one(
    interp: &Interpreter,
    senders: &SenderManager,
    base: &TypeObject,
    config: &CheckConfig,
) -> ResolvedCheck {
    let mut status = CheckStatus {
        name: config.name.clone(),
        module: config.module.clone(),
        ..CheckStatus::default()
    };

    let descriptor = match resolve_check(interp, base, &config.module) {
        Ok(descriptor) => {
            info!(check = %config.name, class = descriptor.class_name(), "resolved check");
            status.class = Some(descriptor.class.qualname());
            senders.get_or_create(&config.name);
            Some(descriptor)
        }
        Err(e) => {
            warn!(
                check = %config.name,
                module = %config.module,
                error = %e,
                "failed to resolve check"
            );
            status.last_error = Some(e.to_string());
            None
        }
    };

    ResolvedCheck {
        config: config.clone(),
        descriptor,
        status,
    }
}
