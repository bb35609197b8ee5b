//! Host objects wrapping opaque native handles.
//!
//! A module whose table carries a constructor entry returning `ptr` and a
//! destructor entry taking a single `ptr` can back an [`ObjectClass`]. Every
//! other entry whose first parameter is `ptr` becomes a method; calling it
//! passes the instance's handle as that first argument.

use std::cell::Cell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tether_abi::{AbiType, BindingEntry, Value};

use crate::error::ObjectError;
use crate::module::{BoundFunction, ModuleHandle};

/// Names of the lifecycle entries in an object table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectLayout {
    pub constructor: String,
    pub destructor: String,
}

impl Default for ObjectLayout {
    fn default() -> Self {
        ObjectLayout {
            constructor: "__init__".to_owned(),
            destructor: "__del__".to_owned(),
        }
    }
}

#[derive(Debug)]
struct ClassInner {
    module: Arc<ModuleHandle>,
    constructor: BoundFunction,
    destructor: BoundFunction,
    /// Dispatch table, built once per class.
    methods: HashMap<String, BoundFunction>,
}

/// A host class backed by a bound module.
#[derive(Clone, Debug)]
pub struct ObjectClass {
    inner: Arc<ClassInner>,
}

impl ObjectClass {
    pub fn new(module: Arc<ModuleHandle>) -> Result<Self, ObjectError> {
        Self::with_layout(module, &ObjectLayout::default())
    }

    pub fn with_layout(
        module: Arc<ModuleHandle>,
        layout: &ObjectLayout,
    ) -> Result<Self, ObjectError> {
        let constructor = lifecycle(&module, &layout.constructor)?;
        if constructor.entry().ret() != AbiType::Pointer {
            return Err(invalid_layout(constructor.entry(), "constructor", "must return ptr"));
        }
        let destructor = lifecycle(&module, &layout.destructor)?;
        if destructor.entry().params() != [AbiType::Pointer] {
            return Err(invalid_layout(destructor.entry(), "destructor", "must take a single ptr"));
        }

        let methods = module
            .functions()
            .filter(|f| f.name() != layout.constructor && f.name() != layout.destructor)
            .filter(|f| f.entry().params().first() == Some(&AbiType::Pointer))
            .map(|f| (f.name().to_owned(), f.clone()))
            .collect();

        Ok(ObjectClass {
            inner: Arc::new(ClassInner {
                module,
                constructor,
                destructor,
                methods,
            }),
        })
    }

    pub fn module(&self) -> &Arc<ModuleHandle> {
        &self.inner.module
    }

    /// Method names in table order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.inner
            .module
            .functions()
            .map(BoundFunction::name)
            .filter(|name| self.inner.methods.contains_key(*name))
    }

    /// Run the constructor and wrap the handle it returns.
    pub fn construct(&self, args: &[Value]) -> Result<NativeObject, ObjectError> {
        let constructor = &self.inner.constructor;
        let Value::Pointer(handle) = constructor.call(args)? else {
            return Err(invalid_layout(constructor.entry(), "constructor", "must return ptr"));
        };
        if handle == 0 {
            return Err(ObjectError::NullHandle {
                name: constructor.name().to_owned(),
            });
        }
        tracing::trace!(
            module = %self.inner.module.name(),
            handle = format_args!("{handle:#x}"),
            "constructed native object"
        );
        Ok(NativeObject {
            class: Arc::clone(&self.inner),
            handle: Some(handle),
            _not_sync: PhantomData,
        })
    }
}

fn lifecycle(module: &ModuleHandle, name: &str) -> Result<BoundFunction, ObjectError> {
    module
        .function(name)
        .cloned()
        .ok_or_else(|| ObjectError::MissingBinding { name: name.to_owned() })
}

fn invalid_layout(entry: &BindingEntry, role: &'static str, reason: &str) -> ObjectError {
    ObjectError::InvalidLayout {
        name: entry.exposed_name().to_owned(),
        role,
        reason: format!("{reason}, declared as {entry}"),
    }
}

/// One live native object.
///
/// May move between threads but is never shared: native handles are not
/// assumed to tolerate concurrent calls.
#[derive(Debug)]
pub struct NativeObject {
    class: Arc<ClassInner>,
    handle: Option<u64>,
    _not_sync: PhantomData<Cell<()>>,
}

impl NativeObject {
    /// The opaque handle, or `None` once torn down.
    pub fn handle(&self) -> Option<u64> {
        self.handle
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Resolve `name` against the class dispatch table.
    pub fn method(&self, name: &str) -> Result<BoundMethod<'_>, ObjectError> {
        let handle = self.handle.ok_or(ObjectError::UseAfterTeardown)?;
        let function = self
            .class
            .methods
            .get(name)
            .ok_or_else(|| ObjectError::UnknownMethod { name: name.to_owned() })?;
        Ok(BoundMethod { handle, function })
    }

    /// Shorthand for `self.method(name)?.call(args)`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ObjectError> {
        self.method(name)?.call(args)
    }

    /// Run the destructor. The handle is released first, so a failing
    /// destructor is never retried.
    pub fn teardown(&mut self) -> Result<(), ObjectError> {
        let handle = self.handle.take().ok_or(ObjectError::DoubleTeardown)?;
        self.class.destructor.call(&[Value::Pointer(handle)])?;
        Ok(())
    }
}

impl Drop for NativeObject {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.class.destructor.call(&[Value::Pointer(handle)]) {
                tracing::warn!(handle = format_args!("{handle:#x}"), "destructor failed: {err}");
            }
        }
    }
}

/// A method bound to one object's handle.
#[derive(Debug)]
pub struct BoundMethod<'o> {
    handle: u64,
    function: &'o BoundFunction,
}

impl BoundMethod<'_> {
    pub fn name(&self) -> &str {
        self.function.name()
    }

    /// Call with the handle prepended to `args`.
    pub fn call(&self, args: &[Value]) -> Result<Value, ObjectError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::Pointer(self.handle));
        full.extend_from_slice(args);
        Ok(self.function.call(&full)?)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::c_int;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tether_abi::{BindingTable, ModuleId, STATUS_OK, ThunkFn, WireValue};

    use super::*;

    unsafe extern "C" fn construct(
        args: *const WireValue,
        _argc: usize,
        out: *mut WireValue,
    ) -> c_int {
        unsafe {
            let value = if (*args).int32 < 0 {
                std::ptr::null_mut()
            } else {
                Box::into_raw(Box::new((*args).int32))
            };
            (*out).ptr = value as i64;
        }
        STATUS_OK
    }

    unsafe extern "C" fn destroy(
        args: *const WireValue,
        _argc: usize,
        _out: *mut WireValue,
    ) -> c_int {
        unsafe {
            drop(Box::from_raw((*args).ptr as *mut i32));
        }
        STATUS_OK
    }

    unsafe extern "C" fn mul(args: *const WireValue, argc: usize, out: *mut WireValue) -> c_int {
        unsafe {
            let args = std::slice::from_raw_parts(args, argc);
            (*out).int32 = *(args[0].ptr as *const i32) * args[1].int32;
        }
        STATUS_OK
    }

    unsafe extern "C" fn sub(args: *const WireValue, argc: usize, out: *mut WireValue) -> c_int {
        unsafe {
            let args = std::slice::from_raw_parts(args, argc);
            (*out).int32 = *(args[0].ptr as *const i32) - args[1].int32;
        }
        STATUS_OK
    }

    unsafe extern "C" fn free(
        _args: *const WireValue,
        _argc: usize,
        _out: *mut WireValue,
    ) -> c_int {
        STATUS_OK
    }

    fn module(entries: Vec<(BindingEntry, ThunkFn)>) -> Arc<ModuleHandle> {
        let mut table = BindingTable::new();
        let mut functions = Vec::new();
        for (entry, thunk) in entries {
            table.insert(entry.clone()).unwrap();
            functions.push(BoundFunction::new(entry, thunk, Arc::new(())));
        }
        Arc::new(ModuleHandle::new(
            ModuleId::new(0),
            PathBuf::from("/lib/libobj.so"),
            Arc::new(table),
            functions,
        ))
    }

    fn object_module() -> Arc<ModuleHandle> {
        use AbiType::*;
        module(vec![
            (
                BindingEntry::new("__init__", vec![Int32], Pointer).with_symbol("objconstructor"),
                construct,
            ),
            (
                BindingEntry::new("__del__", vec![Pointer], Void).with_symbol("objdestructor"),
                destroy,
            ),
            (BindingEntry::new("mul", vec![Pointer, Int32], Int32), mul),
            (BindingEntry::new("sub", vec![Pointer, Int32], Int32), sub),
            (BindingEntry::new("free_fn", vec![Int32], Void), free),
        ])
    }

    #[test]
    fn methods_receive_the_handle() {
        let class = ObjectClass::new(object_module()).unwrap();
        assert_eq!(class.method_names().collect::<Vec<_>>(), ["mul", "sub"]);

        let mut obj = class.construct(&[Value::Int32(8)]).unwrap();
        assert_eq!(obj.call("mul", &[Value::Int32(4)]), Ok(Value::Int32(32)));
        assert_eq!(obj.call("sub", &[Value::Int32(3)]), Ok(Value::Int32(5)));
        assert_eq!(obj.teardown(), Ok(()));
    }

    #[test]
    fn lifecycle_errors() {
        let class = ObjectClass::new(object_module()).unwrap();
        let mut obj = class.construct(&[Value::Int32(1)]).unwrap();
        assert_eq!(
            obj.call("free_fn", &[Value::Int32(1)]),
            Err(ObjectError::UnknownMethod { name: "free_fn".into() })
        );
        assert_eq!(
            obj.call("__init__", &[Value::Int32(1)]),
            Err(ObjectError::UnknownMethod { name: "__init__".into() })
        );

        obj.teardown().unwrap();
        assert!(!obj.is_live());
        assert_eq!(obj.teardown(), Err(ObjectError::DoubleTeardown));
        assert_eq!(obj.call("mul", &[Value::Int32(2)]).unwrap_err(), ObjectError::UseAfterTeardown);
    }

    #[test]
    fn null_constructor_result_is_rejected() {
        let class = ObjectClass::new(object_module()).unwrap();
        assert_eq!(
            class.construct(&[Value::Int32(-1)]).unwrap_err(),
            ObjectError::NullHandle { name: "__init__".into() }
        );
    }

    #[test]
    fn dropping_a_live_object_runs_the_destructor() {
        static DROPPED: AtomicUsize = AtomicUsize::new(0);

        unsafe extern "C" fn counted(
            args: *const WireValue,
            argc: usize,
            out: *mut WireValue,
        ) -> c_int {
            DROPPED.fetch_add(1, Ordering::SeqCst);
            unsafe { destroy(args, argc, out) }
        }

        use AbiType::*;
        let class = ObjectClass::new(module(vec![
            (BindingEntry::new("__init__", vec![Int32], Pointer), construct),
            (BindingEntry::new("__del__", vec![Pointer], Void), counted),
        ]))
        .unwrap();

        let obj = class.construct(&[Value::Int32(2)]).unwrap();
        assert!(obj.handle().is_some());
        drop(obj);
        assert_eq!(DROPPED.load(Ordering::SeqCst), 1);

        let mut obj = class.construct(&[Value::Int32(2)]).unwrap();
        obj.teardown().unwrap();
        drop(obj);
        assert_eq!(DROPPED.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn layout_is_validated() {
        use AbiType::*;
        let missing = module(vec![(BindingEntry::new("mul", vec![Pointer, Int32], Int32), mul)]);
        assert_eq!(
            ObjectClass::new(missing).unwrap_err(),
            ObjectError::MissingBinding { name: "__init__".into() }
        );

        let bad_ctor = module(vec![
            (BindingEntry::new("__init__", vec![Int32], Int32), mul),
            (BindingEntry::new("__del__", vec![Pointer], Void), destroy),
        ]);
        assert!(matches!(
            ObjectClass::new(bad_ctor).unwrap_err(),
            ObjectError::InvalidLayout { role: "constructor", .. }
        ));

        let custom = module(vec![
            (BindingEntry::new("make", vec![Int32], Pointer), construct),
            (BindingEntry::new("release", vec![Pointer], Void), destroy),
        ]);
        let layout = ObjectLayout {
            constructor: "make".into(),
            destructor: "release".into(),
        };
        let mut obj = ObjectClass::with_layout(custom, &layout)
            .unwrap()
            .construct(&[Value::Int32(3)])
            .unwrap();
        obj.teardown().unwrap();
    }

    #[test]
    fn objects_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<NativeObject>();
    }
}
