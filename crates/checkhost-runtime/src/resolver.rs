//! Discovery of check entry points inside loaded modules.
//!
//! A check module defines one class deriving from a well-known base type.
//! [`find_subclass_of`] scans the module namespace for it.

use std::fmt;
use tracing::{debug, trace};

use crate::error::{RuntimeError, RuntimeResult};
use crate::interpreter::Interpreter;
use crate::object::{ModuleHandle, Object, TypeObject};

/// A resolved entry-point class and the module it came from.
#[derive(Clone)]
pub struct PluginDescriptor {
    pub class: TypeObject,
    pub module: ModuleHandle,
}

impl PluginDescriptor {
    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    pub fn module_name(&self) -> &str {
        self.module.name()
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("class", &self.class)
            .field("module", &self.module)
            .finish()
    }
}

/// Returns the first class in `module` that strictly derives from `base`.
///
/// Names are visited in the runtime's introspection order. That order is
/// not guaranteed, so when a module holds several qualifying classes any of
/// them may be returned. `base` itself is never returned, even when the
/// module re-exports it under another name.
pub fn find_subclass_of(
    interp: &Interpreter,
    base: &Object,
    module: &Object,
) -> RuntimeResult<PluginDescriptor> {
    interp.with_lock(|token| {
        let base_type = base.as_type().ok_or_else(|| {
            RuntimeError::invalid_argument(
                "base",
                format!("{} is not a type object", base.describe()),
            )
        })?;
        let module = module.as_module().ok_or_else(|| {
            RuntimeError::invalid_argument(
                "module",
                format!("{} is not a module object", module.describe()),
            )
        })?;

        for name in module.dir(token) {
            let candidate = match module.get_attr(token, &name)? {
                Object::Type(t) => t,
                _ => continue,
            };

            if candidate.is_subclass(base_type) && !candidate.is(base_type) {
                debug!(
                    module = module.name(),
                    class = candidate.name(),
                    base = base_type.name(),
                    "resolved subclass"
                );
                return Ok(PluginDescriptor {
                    class: candidate,
                    module: module.clone(),
                });
            }
            trace!(symbol = %name, "skipping unrelated type");
        }

        Err(RuntimeError::NotFound {
            base: base_type.qualname(),
            module: module.name().to_string(),
        })
    })
}

/// Last component of a dotted module path: `foo.bar.baz` gives `baz`.
pub fn module_name(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

/// Imports the module named by the last component of `dotted_path` and
/// resolves its `base` subclass.
pub fn resolve_check(
    interp: &Interpreter,
    base: &TypeObject,
    dotted_path: &str,
) -> RuntimeResult<PluginDescriptor> {
    let name = module_name(dotted_path);
    let module = interp.with_lock(|token| interp.import(token, name))?;
    find_subclass_of(interp, &Object::Type(base.clone()), &Object::Module(module))
}
