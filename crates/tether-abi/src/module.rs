//! Identity of loaded binding modules.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::binding::BindingTable;
use crate::error::DescriptorError;

/// Process-unique identifier of one bind request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl ModuleId {
    pub fn new(raw: u64) -> Self {
        ModuleId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Name under which the generated unit for this module is compiled.
    pub fn module_name(self) -> ModuleName {
        ModuleName(format!("module{}", self.0))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module{}", self.0)
    }
}

/// Identifier of a generated compilation unit, e.g. `module3`.
///
/// Always a valid C identifier fragment; it is spliced into the names of the
/// registration table and the init entry point.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exported symbol the loader resolves to obtain the module definition.
    pub fn init_symbol(&self) -> String {
        format!("tether_init_{}", self.0)
    }
}

/// Explicit names must be C identifiers.
impl FromStr for ModuleName {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(ModuleName(s.to_owned()))
        } else {
            Err(DescriptorError::new(s, "module name must be a C identifier"))
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read access to the binding tables of loaded modules.
///
/// The trace compiler uses this to decide whether a method reference
/// targets a native-bound symbol.
pub trait ModuleLookup {
    fn binding_table(&self, module: ModuleId) -> Option<Arc<BindingTable>>;

    fn exports(&self, module: ModuleId, name: &str) -> bool {
        self.binding_table(module)
            .is_some_and(|table| table.contains(name))
    }
}
