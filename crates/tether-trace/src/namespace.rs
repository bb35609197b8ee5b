//! Resolution of global names seen by a trace.

use std::collections::BTreeMap;
use std::fmt;

use tether_abi::ModuleId;

/// Value a global name resolves to.
#[derive(Clone, Debug, PartialEq)]
pub enum GlobalValue {
    /// A bound native module.
    Module(ModuleId),
    Int(i64),
    Float(f64),
    Str(String),
}

impl GlobalValue {
    pub fn as_module(&self) -> Option<ModuleId> {
        match self {
            GlobalValue::Module(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for GlobalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlobalValue::Module(id) => write!(f, "{id}"),
            GlobalValue::Int(v) => write!(f, "{v}"),
            GlobalValue::Float(v) => write!(f, "{v:?}"),
            GlobalValue::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<ModuleId> for GlobalValue {
    fn from(id: ModuleId) -> Self {
        GlobalValue::Module(id)
    }
}

/// The namespace a traced function's globals are looked up in.
///
/// Lookups happen once per `load_global`, so a namespace that changes
/// between compiles is observed fresh each time.
pub trait Namespace {
    fn resolve(&self, name: &str) -> Option<GlobalValue>;
}

/// A plain map-backed [`Namespace`].
#[derive(Clone, Debug, Default)]
pub struct Globals {
    values: BTreeMap<String, GlobalValue>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<GlobalValue>,
    ) -> Option<GlobalValue> {
        self.values.insert(name.into(), value.into())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<GlobalValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<GlobalValue> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GlobalValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Namespace for Globals {
    fn resolve(&self, name: &str) -> Option<GlobalValue> {
        self.values.get(name).cloned()
    }
}
