//! The bind pipeline: validate, generate, compile, load, register.

use std::ffi::{CStr, c_char};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tether_abi::{
    ABI_VERSION, AbiType, BindingTable, HEADER_NAME, HEADER_SOURCE, InitFn, MethodDef, ModuleDef,
    ModuleName, ThunkFn,
};

use crate::error::{BindError, BindResult};
use crate::library::NativeLibrary;
use crate::module::{BoundFunction, ModuleHandle};
use crate::registry::ModuleRegistry;
use crate::toolchain::{BuildJob, CcToolchain, Toolchain};

/// Turns native libraries plus binding tables into [`ModuleHandle`]s.
#[derive(Debug)]
pub struct Binder<'r, T = CcToolchain> {
    registry: &'r ModuleRegistry,
    toolchain: T,
}

impl<'r> Binder<'r, CcToolchain> {
    /// A binder driving the environment-configured C compiler.
    pub fn new(registry: &'r ModuleRegistry) -> Self {
        Self::with_toolchain(registry, CcToolchain::from_env())
    }
}

impl<'r, T: Toolchain> Binder<'r, T> {
    pub fn with_toolchain(registry: &'r ModuleRegistry, toolchain: T) -> Self {
        Binder {
            registry,
            toolchain,
        }
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn registry(&self) -> &'r ModuleRegistry {
        self.registry
    }

    /// Parse a JSON binding document and bind it.
    pub fn bind_json(
        &self,
        library: impl AsRef<Path>,
        descriptors: &str,
    ) -> BindResult<ModuleHandle> {
        let table = BindingTable::from_json(descriptors)?;
        self.bind(library, table)
    }

    /// Build and load glue for `table` against the library at `library`.
    ///
    /// On success the module is registered and the returned handle owns
    /// the loaded image. On failure nothing is registered, and the scratch
    /// directory is removed either way.
    pub fn bind(&self, library: impl AsRef<Path>, table: BindingTable) -> BindResult<ModuleHandle> {
        for entry in &table {
            entry.validate()?;
        }

        let id = self.registry.reserve();
        let module = id.module_name();
        let library = library.as_ref();
        let library = library.canonicalize().map_err(|err| {
            let reason = format!("native library is not accessible: {err}");
            BindError::load_failure(&module, library, reason)
        })?;

        let scratch = tempfile::Builder::new().prefix("tether-").tempdir()?;
        let span = tracing::info_span!("bind", %module, library = %library.display());
        let _enter = span.enter();

        let result = self.build_and_load(&module, &library, &table, &scratch);
        close_scratch(scratch);
        let functions = result?;

        let table = Arc::new(table);
        self.registry.register(id, Arc::clone(&table));
        tracing::info!(functions = functions.len(), "module bound");
        Ok(ModuleHandle::new(id, library, table, functions))
    }

    fn build_and_load(
        &self,
        module: &ModuleName,
        library: &Path,
        table: &BindingTable,
        scratch: &TempDir,
    ) -> BindResult<Vec<BoundFunction>> {
        let unit = tether_glue::generate(module, table);
        let dir = scratch.path();
        let source = dir.join(format!("{module}.c"));
        let output = dir.join(format!("{module}.{}", self.toolchain.module_extension()));
        fs::write(dir.join(HEADER_NAME), HEADER_SOURCE)?;
        fs::write(&source, &unit.source)?;

        let include_dirs = [dir.to_path_buf()];
        self.toolchain.compile(&BuildJob {
            module,
            source: &source,
            library,
            output: &output,
            include_dirs: &include_dirs,
            scratch: dir,
        })?;

        if !output.is_file() {
            return Err(BindError::build_failure(
                module,
                format!("toolchain reported success but produced no {}", output.display()),
            ));
        }

        let image = NativeLibrary::load(&output)
            .map(Arc::new)
            .map_err(|err| BindError::load_failure(module, &output, err.to_string()))?;
        link(module, &image, table)
    }
}

/// One row of a module's registration table.
#[derive(Debug)]
struct Registration {
    name: String,
    thunk: Option<ThunkFn>,
    arity: usize,
    arg_format: String,
    ret_format: String,
}

/// Resolve the module's init entry point and match its registration table
/// against `table`.
fn link(
    module: &ModuleName,
    image: &Arc<NativeLibrary>,
    table: &BindingTable,
) -> BindResult<Vec<BoundFunction>> {
    let fail = |reason: String| BindError::load_failure(module, image.path(), reason);

    // Safety: the init symbol is generated with exactly this signature.
    let init: InitFn = unsafe { image.symbol(&module.init_symbol()) }
        .map_err(|err| fail(format!("missing entry point `{}`: {err}", module.init_symbol())))?;
    // Safety: generated init functions return a pointer to static data.
    let def = unsafe { init() };
    if def.is_null() {
        return Err(fail("entry point returned no module definition".into()));
    }
    // Safety: non-null and static for the lifetime of `image`.
    let def: &ModuleDef = unsafe { &*def };
    if def.abi_version != ABI_VERSION {
        return Err(fail(format!(
            "module uses wire ABI version {}, expected {ABI_VERSION}",
            def.abi_version
        )));
    }
    // Safety: the table is terminated by a record with a null name.
    let registrations = unsafe { read_registrations(def.methods) };

    let mut functions = Vec::with_capacity(table.len());
    for entry in table {
        let found = registrations
            .iter()
            .find(|r| r.name == entry.exposed_name())
            .ok_or_else(|| fail(format!("`{}` is not registered", entry.exposed_name())))?;
        let arg_format = AbiType::format_string(entry.params());
        let ret_format = AbiType::format_string(&[entry.ret()]);
        if found.arity != entry.arity()
            || found.arg_format != arg_format
            || found.ret_format != ret_format
        {
            return Err(fail(format!(
                "`{}` is registered as ({}) -> {:?} with arity {}, \
                 expected ({arg_format}) -> {ret_format:?}",
                found.name, found.arg_format, found.ret_format, found.arity
            )));
        }
        let thunk = found
            .thunk
            .ok_or_else(|| fail(format!("`{}` has no thunk", entry.exposed_name())))?;
        let owner: Arc<NativeLibrary> = Arc::clone(image);
        functions.push(BoundFunction::new(entry.clone(), thunk, owner));
    }
    tracing::debug!(registered = registrations.len(), "registration table verified");
    Ok(functions)
}

unsafe fn read_registrations(methods: *const MethodDef) -> Vec<Registration> {
    let mut out = Vec::new();
    if methods.is_null() {
        return out;
    }
    for i in 0.. {
        let record = unsafe { &*methods.add(i) };
        if record.name.is_null() {
            break;
        }
        out.push(Registration {
            name: unsafe { c_text(record.name) },
            thunk: record.thunk,
            arity: record.arity,
            arg_format: unsafe { c_text(record.arg_format) },
            ret_format: unsafe { c_text(record.ret_format) },
        });
    }
    out
}

unsafe fn c_text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

fn close_scratch(scratch: TempDir) {
    let path = scratch.path().to_path_buf();
    if let Err(err) = scratch.close() {
        tracing::warn!(path = %path.display(), "failed to remove scratch directory: {err}");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;

    use super::*;

    /// Records invocations and never produces an artifact.
    #[derive(Default)]
    struct Recording {
        calls: Cell<usize>,
        scratch: RefCell<Option<PathBuf>>,
    }

    impl Toolchain for Recording {
        fn module_extension(&self) -> &str {
            "so"
        }

        fn compile(&self, job: &BuildJob<'_>) -> BindResult<()> {
            self.calls.set(self.calls.get() + 1);
            assert!(job.source.is_file());
            assert!(job.include_dirs[0].join(HEADER_NAME).is_file());
            *self.scratch.borrow_mut() = Some(job.scratch.to_path_buf());
            Ok(())
        }
    }

    fn library() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    #[test]
    fn invalid_tables_never_reach_the_toolchain() {
        let registry = ModuleRegistry::new();
        let binder = Binder::with_toolchain(&registry, Recording::default());
        let lib = library();
        let err = binder
            .bind_json(lib.path(), r#"{"foo": [["int32"], "double"]}"#)
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidBindingDescriptor(_)));
        assert_eq!(binder.toolchain().calls.get(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_artifact_is_a_build_failure() {
        let registry = ModuleRegistry::new();
        let binder = Binder::with_toolchain(&registry, Recording::default());
        let lib = library();
        let err = binder
            .bind_json(lib.path(), r#"{"foo": [["int32", "int32"], "float32"]}"#)
            .unwrap_err();
        assert!(matches!(err, BindError::BuildFailure { ref module, .. } if module == "module0"));
        assert_eq!(binder.toolchain().calls.get(), 1);
        assert!(registry.is_empty());

        let scratch = binder.toolchain().scratch.borrow().clone().unwrap();
        assert!(!scratch.exists());
    }

    #[test]
    fn unreadable_library_is_a_load_failure() {
        let registry = ModuleRegistry::new();
        let binder = Binder::with_toolchain(&registry, Recording::default());
        let err = binder
            .bind_json("/nonexistent/libnothing.so", r#"{"foo": [[], "void"]}"#)
            .unwrap_err();
        assert!(matches!(err, BindError::LoadFailure { .. }));
        assert_eq!(binder.toolchain().calls.get(), 0);
    }
}
