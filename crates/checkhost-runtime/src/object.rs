//! Object model of the embedded runtime.
//!
//! Only the surface the host needs is modelled: plain values, type objects
//! with inheritance, modules with a namespace, and native functions. Every
//! namespace access takes a [`LockToken`], so touching runtime state without
//! holding the lock does not compile.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{RuntimeError, RuntimeResult};
use crate::lock::LockToken;

type NativeFn = dyn Fn(&LockToken<'_>, &[Object]) -> RuntimeResult<Object> + Send + Sync;

/// A value living inside the runtime.
#[derive(Clone)]
pub enum Object {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Vec<Object>>),
    Type(TypeObject),
    Module(ModuleHandle),
    Function(NativeFunction),
}

impl Object {
    pub fn str(value: impl AsRef<str>) -> Self {
        Object::Str(Arc::from(value.as_ref()))
    }

    pub fn list(items: impl IntoIterator<Item = Object>) -> Self {
        Object::List(Arc::new(items.into_iter().collect()))
    }

    pub fn str_list<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> Self {
        Self::list(items.into_iter().map(Object::str))
    }

    pub fn function<F>(name: &str, func: F) -> Self
    where
        F: Fn(&LockToken<'_>, &[Object]) -> RuntimeResult<Object> + Send + Sync + 'static,
    {
        Object::Function(NativeFunction::new(name, func))
    }

    /// Name of the object's kind, as the runtime reports it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::None => "NoneType",
            Object::Bool(_) => "bool",
            Object::Int(_) => "int",
            Object::Float(_) => "float",
            Object::Str(_) => "str",
            Object::List(_) => "list",
            Object::Type(_) => "type",
            Object::Module(_) => "module",
            Object::Function(_) => "builtin_function",
        }
    }

    /// Renders the object the way the runtime's `str()` would.
    pub fn describe(&self) -> String {
        self.to_string()
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Object::None)
    }

    pub fn as_type(&self) -> Option<&TypeObject> {
        match self {
            Object::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&ModuleHandle> {
        match self {
            Object::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Object::Int(i) => Some(*i),
            Object::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Numeric value; ints are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Object::Float(f) => Some(*f),
            Object::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Object]> {
        match self {
            Object::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Calls a native function object.
    pub fn call(&self, token: &LockToken<'_>, args: &[Object]) -> RuntimeResult<Object> {
        match self {
            Object::Function(f) => f.call(token, args),
            other => Err(RuntimeError::TypeError(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::None => write!(f, "None"),
            Object::Bool(true) => write!(f, "True"),
            Object::Bool(false) => write!(f, "False"),
            Object::Int(i) => write!(f, "{}", i),
            Object::Float(v) => write!(f, "{:?}", v),
            Object::Str(s) => write!(f, "'{}'", s),
            Object::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Object::Type(t) => write!(f, "<class '{}'>", t.qualname()),
            Object::Module(m) => write!(f, "<module '{}'>", m.name()),
            Object::Function(func) => write!(f, "<built-in function {}>", func.name()),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<TypeObject> for Object {
    fn from(value: TypeObject) -> Self {
        Object::Type(value)
    }
}

impl From<ModuleHandle> for Object {
    fn from(value: ModuleHandle) -> Self {
        Object::Module(value)
    }
}

impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Object::str(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Int(value)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Float(value)
    }
}

/// A host function exposed to runtime code.
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&LockToken<'_>, &[Object]) -> RuntimeResult<Object> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, token: &LockToken<'_>, args: &[Object]) -> RuntimeResult<Object> {
        (self.func)(token, args)
    }
}

struct TypeData {
    name: String,
    module: Option<String>,
    bases: Vec<TypeObject>,
    attrs: BTreeMap<String, Object>,
}

/// A class defined in the runtime.
///
/// Type objects are immutable once built and compared by identity: two types
/// with the same name and bases are still different types.
#[derive(Clone)]
pub struct TypeObject {
    inner: Arc<TypeData>,
}

impl TypeObject {
    /// Root type with no bases.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> TypeObjectBuilder {
        TypeObjectBuilder {
            name: name.into(),
            module: None,
            bases: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `module.Name`, or just `Name` for types without a module.
    pub fn qualname(&self) -> String {
        match &self.inner.module {
            Some(module) => format!("{}.{}", module, self.inner.name),
            None => self.inner.name.clone(),
        }
    }

    pub fn module_name(&self) -> Option<&str> {
        self.inner.module.as_deref()
    }

    pub fn bases(&self) -> &[TypeObject] {
        &self.inner.bases
    }

    /// Identity comparison.
    pub fn is(&self, other: &TypeObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// True when `self` is `base` or inherits from it, directly or not.
    pub fn is_subclass(&self, base: &TypeObject) -> bool {
        self.is(base) || self.inner.bases.iter().any(|b| b.is_subclass(base))
    }

    /// Method resolution order: depth-first, left to right, first
    /// occurrence wins.
    pub fn mro(&self) -> Vec<TypeObject> {
        let mut order: Vec<TypeObject> = Vec::new();
        self.collect_mro(&mut order);
        order
    }

    fn collect_mro(&self, order: &mut Vec<TypeObject>) {
        if order.iter().any(|t| t.is(self)) {
            return;
        }
        order.push(self.clone());
        for base in &self.inner.bases {
            base.collect_mro(order);
        }
    }

    /// Looks `name` up along the MRO.
    pub fn lookup(&self, name: &str) -> Option<Object> {
        self.mro()
            .into_iter()
            .find_map(|t| t.inner.attrs.get(name).cloned())
    }
}

impl fmt::Debug for TypeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class '{}'>", self.qualname())
    }
}

/// Builder for [`TypeObject`].
pub struct TypeObjectBuilder {
    name: String,
    module: Option<String>,
    bases: Vec<TypeObject>,
    attrs: BTreeMap<String, Object>,
}

impl TypeObjectBuilder {
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn base(mut self, base: &TypeObject) -> Self {
        self.bases.push(base.clone());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: Object) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }

    pub fn build(self) -> TypeObject {
        TypeObject {
            inner: Arc::new(TypeData {
                name: self.name,
                module: self.module,
                bases: self.bases,
                attrs: self.attrs,
            }),
        }
    }
}

struct ModuleData {
    name: String,
    namespace: RwLock<BTreeMap<String, Object>>,
}

/// A module loaded into the runtime.
#[derive(Clone)]
pub struct ModuleHandle {
    inner: Arc<ModuleData>,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ModuleData {
                name: name.into(),
                namespace: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is(&self, other: &ModuleHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Top-level symbol names in the runtime's introspection order (sorted).
    /// Callers must not depend on that order.
    pub fn dir(&self, _token: &LockToken<'_>) -> Vec<String> {
        self.inner.namespace.read().keys().cloned().collect()
    }

    pub fn get_attr(&self, _token: &LockToken<'_>, name: &str) -> RuntimeResult<Object> {
        self.inner
            .namespace
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::AttributeError {
                owner: format!("module '{}'", self.name()),
                name: name.to_string(),
            })
    }

    /// Binds `name`, returning the previous binding.
    pub fn set_attr(
        &self,
        _token: &LockToken<'_>,
        name: impl Into<String>,
        value: Object,
    ) -> Option<Object> {
        self.inner.namespace.write().insert(name.into(), value)
    }

    pub fn del_attr(&self, _token: &LockToken<'_>, name: &str) -> Option<Object> {
        self.inner.namespace.write().remove(name)
    }

    pub fn len(&self, _token: &LockToken<'_>) -> usize {
        self.inner.namespace.read().len()
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module '{}'>", self.name())
    }
}
