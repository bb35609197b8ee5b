//! One registry, one namespace, one toolchain.

use std::path::Path;
use std::sync::Arc;

use tether_abi::BindingTable;
use tether_loader::{
    Binder, CcToolchain, ModuleHandle, ModuleRegistry, ObjectClass, ObjectLayout, Toolchain,
};
use tether_trace::{
    CompiledTrace, GlobalValue, Globals, TraceCompiler, TraceFunction, lower_source, parse_assembly,
};

use crate::error::Result;

/// Binds modules into a shared registry and compiles traces against them.
///
/// Modules bound with [`Session::bind_as`] are also published under a
/// global name, which is how traced code refers to them.
#[derive(Debug)]
pub struct Session<T = CcToolchain> {
    registry: ModuleRegistry,
    toolchain: T,
    globals: Globals,
}

impl Session<CcToolchain> {
    /// A session driving the environment-configured C compiler.
    pub fn new() -> Self {
        Self::with_toolchain(CcToolchain::from_env())
    }
}

impl Default for Session<CcToolchain> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Toolchain> Session<T> {
    pub fn with_toolchain(toolchain: T) -> Self {
        Session {
            registry: ModuleRegistry::new(),
            toolchain,
            globals: Globals::new(),
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Globals {
        &mut self.globals
    }

    fn binder(&self) -> Binder<'_, &T> {
        Binder::with_toolchain(&self.registry, &self.toolchain)
    }

    pub fn bind(
        &self,
        library: impl AsRef<Path>,
        table: BindingTable,
    ) -> Result<Arc<ModuleHandle>> {
        Ok(Arc::new(self.binder().bind(library, table)?))
    }

    pub fn bind_json(
        &self,
        library: impl AsRef<Path>,
        descriptors: &str,
    ) -> Result<Arc<ModuleHandle>> {
        Ok(Arc::new(self.binder().bind_json(library, descriptors)?))
    }

    /// Bind and publish the module as the global `name`. A failed bind
    /// leaves the namespace untouched.
    pub fn bind_as(
        &mut self,
        name: &str,
        library: impl AsRef<Path>,
        table: BindingTable,
    ) -> Result<Arc<ModuleHandle>> {
        let module = self.bind(library, table)?;
        self.globals.insert(name, module.id());
        Ok(module)
    }

    /// Forget a module: it is no longer visible to traces and every global
    /// naming it is removed. Existing handles keep working.
    pub fn unbind(&mut self, module: &ModuleHandle) {
        self.registry.unregister(module.id());
        let stale: Vec<String> = self
            .globals
            .iter()
            .filter(|(_, value)| value.as_module() == Some(module.id()))
            .map(|(name, _)| name.to_owned())
            .collect();
        for name in stale {
            self.globals.remove(&name);
        }
    }

    pub fn object_class(&self, module: Arc<ModuleHandle>) -> Result<ObjectClass> {
        Ok(ObjectClass::new(module)?)
    }

    /// Bind a library whose table describes a native object type.
    pub fn bind_class(
        &self,
        library: impl AsRef<Path>,
        table: BindingTable,
        layout: &ObjectLayout,
    ) -> Result<ObjectClass> {
        let module = self.bind(library, table)?;
        Ok(ObjectClass::with_layout(module, layout)?)
    }

    pub fn define(&mut self, name: &str, value: impl Into<GlobalValue>) {
        self.globals.insert(name, value);
    }

    pub fn compile(&self, function: &TraceFunction) -> Result<CompiledTrace> {
        Ok(TraceCompiler::new(&self.globals, &self.registry).compile(function)?)
    }

    /// Lower and compile every function in expression-language `source`.
    pub fn trace_source(&self, source: &str) -> Result<Vec<CompiledTrace>> {
        lower_source(source)?.iter().map(|f| self.compile(f)).collect()
    }

    /// Compile every function in assembly text.
    pub fn trace_assembly(&self, text: &str) -> Result<Vec<CompiledTrace>> {
        parse_assembly(text)?.iter().map(|f| self.compile(f)).collect()
    }
}
