//! # checkhost Runtime
//!
//! Bridge between the multi-threaded host and the embedded check runtime.
//!
//! The runtime is single-owner: one global lock, owned by a native thread.
//! The host drives it from many threads and tasks, so every entry goes
//! through [`Interpreter::acquire`] and the [`LockToken`] it returns.
//!
//! - **Lock coordination** ([`lock`]): thread-affine, re-entrant tokens that
//!   cannot cross threads.
//! - **Lifecycle** ([`interpreter`]): boot once, inject the `aggregator` and
//!   `host_agent` capability modules, tear down once.
//! - **Resolution** ([`resolver`]): find the check class a module defines.
//!
//! ## Example
//!
//! ```
//! use checkhost_aggregator::{commit_channel, SenderManager};
//! use checkhost_core::config::RuntimeConfig;
//! use checkhost_runtime::{
//!     find_subclass_of, HostMetadata, Interpreter, ModuleHandle, Object, TypeObject,
//! };
//! use std::sync::Arc;
//!
//! let (tx, _rx) = commit_channel(None);
//! let interp = Interpreter::new(
//!     RuntimeConfig::default(),
//!     HostMetadata::new("localhost", "1.0.0"),
//!     Arc::new(SenderManager::new(tx)),
//! );
//! let state = interp.initialize(&["/opt/checks"]).unwrap();
//!
//! let base = TypeObject::new("AgentCheck");
//! let module = ModuleHandle::new("disk");
//! interp
//!     .with_lock(|token| {
//!         let check = TypeObject::builder("DiskCheck").base(&base).build();
//!         module.set_attr(token, "DiskCheck", check.into());
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let found = find_subclass_of(&interp, &base.into(), &module.into()).unwrap();
//! assert_eq!(found.class_name(), "DiskCheck");
//!
//! interp.shutdown(state).unwrap();
//! ```

pub mod capability;
pub mod error;
pub mod interpreter;
pub mod lock;
pub mod metrics;
pub mod object;
pub mod resolver;

pub use capability::{HostMetadata, AGGREGATOR_MODULE, HOST_AGENT_MODULE};
pub use error::{RuntimeError, RuntimeResult};
pub use interpreter::{Interpreter, LifecycleState, SavedExecutionState, SYS_MODULE};
pub use lock::LockToken;
pub use metrics::RuntimeMetrics;
pub use object::{ModuleHandle, NativeFunction, Object, TypeObject, TypeObjectBuilder};
pub use resolver::{find_subclass_of, module_name, resolve_check, PluginDescriptor};

/// Version of the embedded runtime.
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");
