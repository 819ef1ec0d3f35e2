//! Built-in check modules.
//!
//! These stand in for check modules an external loader would register. Each
//! one imports `aggregator` at registration time, the way check code does,
//! and defines one class deriving from `AgentCheck` with a `check` method
//! taking `(check_id, tags, hostname)`.

use checkhost_runtime::{
    Interpreter, LockToken, ModuleHandle, Object, RuntimeError, RuntimeResult, TypeObject,
    AGGREGATOR_MODULE, HOST_AGENT_MODULE,
};
use std::time::Instant;

/// Module holding the base class every check derives from.
pub const CHECKS_MODULE: &str = "checks";
pub const BASE_CLASS: &str = "AgentCheck";

/// Builds the `AgentCheck` base type.
pub fn agent_check_base() -> TypeObject {
    TypeObject::builder(BASE_CLASS)
        .module(CHECKS_MODULE)
        .attr(
            "check",
            Object::function("check", |_token, _args| {
                Err(RuntimeError::TypeError("AgentCheck.check is abstract".to_string()))
            }),
        )
        .build()
}

/// Registers `checks`, `uptime` and `heartbeat` in the module table.
pub fn register_builtin_checks(interp: &Interpreter, base: &TypeObject) -> RuntimeResult<()> {
    interp.with_lock(|token| {
        let checks = ModuleHandle::new(CHECKS_MODULE);
        checks.set_attr(token, BASE_CLASS, base.clone().into());
        interp.add_module(token, checks);

        interp.add_module(token, uptime_module(interp, token, base)?);
        interp.add_module(token, heartbeat_module(interp, token, base)?);
        Ok(())
    })
}

fn uptime_module(
    interp: &Interpreter,
    token: &LockToken<'_>,
    base: &TypeObject,
) -> RuntimeResult<ModuleHandle> {
    let aggregator = interp.import(token, AGGREGATOR_MODULE)?;
    let started = Instant::now();

    let check = Object::function("check", move |token, args| {
        let [check_id, tags, hostname] = args else {
            return Err(RuntimeError::TypeError("check() takes 3 arguments".to_string()));
        };
        let gauge = aggregator.get_attr(token, "GAUGE")?;
        aggregator.get_attr(token, "submit_metric")?.call(
            token,
            &[
                check_id.clone(),
                gauge,
                Object::str("checkhost.uptime"),
                Object::Float(started.elapsed().as_secs_f64()),
                tags.clone(),
                hostname.clone(),
            ],
        )?;
        aggregator.get_attr(token, "commit")?.call(token, &[check_id.clone()])
    });

    let module = ModuleHandle::new("uptime");
    module.set_attr(
        token,
        "UptimeCheck",
        TypeObject::builder("UptimeCheck")
            .module("uptime")
            .base(base)
            .attr("check", check)
            .build()
            .into(),
    );
    Ok(module)
}

fn heartbeat_module(
    interp: &Interpreter,
    token: &LockToken<'_>,
    base: &TypeObject,
) -> RuntimeResult<ModuleHandle> {
    let aggregator = interp.import(token, AGGREGATOR_MODULE)?;
    let host_agent = interp.import(token, HOST_AGENT_MODULE)?;

    let check = Object::function("check", move |token, args| {
        let [check_id, tags, hostname] = args else {
            return Err(RuntimeError::TypeError("check() takes 3 arguments".to_string()));
        };
        let hostname = if hostname.is_none() {
            host_agent.get_attr(token, "get_hostname")?.call(token, &[])?
        } else {
            hostname.clone()
        };

        let count = aggregator.get_attr(token, "MONOTONIC_COUNT")?;
        aggregator.get_attr(token, "submit_metric")?.call(
            token,
            &[
                check_id.clone(),
                count,
                Object::str("checkhost.heartbeat"),
                Object::Int(1),
                tags.clone(),
                hostname.clone(),
            ],
        )?;
        aggregator.get_attr(token, "submit_service_check")?.call(
            token,
            &[
                check_id.clone(),
                Object::str("checkhost.can_run"),
                Object::Int(0),
                tags.clone(),
                hostname,
                Object::str(""),
            ],
        )?;
        aggregator.get_attr(token, "commit")?.call(token, &[check_id.clone()])
    });

    let module = ModuleHandle::new("heartbeat");
    // Re-exported base, as in `from checks import AgentCheck`.
    module.set_attr(token, BASE_CLASS, base.clone().into());
    module.set_attr(
        token,
        "HeartbeatCheck",
        TypeObject::builder("HeartbeatCheck")
            .module("heartbeat")
            .base(base)
            .attr("check", check)
            .build()
            .into(),
    );
    Ok(module)
}
