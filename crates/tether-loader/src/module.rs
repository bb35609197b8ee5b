//! Loaded modules and the functions they expose.

use std::any::Any;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tether_abi::{
    AbiType, BindingEntry, BindingTable, ModuleId, ModuleName, STATUS_OK, ThunkFn, Value,
    WireValue,
};

use crate::error::CallError;

/// A function bound through a module's registration table.
#[derive(Clone)]
pub struct BoundFunction {
    entry: BindingEntry,
    thunk: ThunkFn,
    /// Owner of the code `thunk` points into.
    _image: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFunction")
            .field("entry", &self.entry)
            .field("thunk", &(self.thunk as *const ()))
            .finish_non_exhaustive()
    }
}

impl BoundFunction {
    /// `thunk` must implement exactly `entry`'s signature over the wire
    /// ABI, and must stay valid while `image` is alive.
    pub(crate) fn new(
        entry: BindingEntry,
        thunk: ThunkFn,
        image: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        BoundFunction {
            entry,
            thunk,
            _image: image,
        }
    }

    pub fn name(&self) -> &str {
        self.entry.exposed_name()
    }

    pub fn entry(&self) -> &BindingEntry {
        &self.entry
    }

    /// Encode `args`, run the native function and decode its result.
    ///
    /// Arguments must match the declared parameter types exactly; no
    /// numeric coercion is performed. String arguments stay valid for the
    /// duration of the call only.
    pub fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        let params = self.entry.params();
        if args.len() != params.len() {
            return Err(CallError::ArityMismatch {
                function: self.name().to_owned(),
                expected: params.len(),
                found: args.len(),
            });
        }

        let mut strings = Vec::new();
        let mut wire = Vec::with_capacity(args.len());
        for (index, (arg, &ty)) in args.iter().zip(params).enumerate() {
            wire.push(self.encode(index, ty, arg, &mut strings)?);
        }

        let mut out = WireValue::zeroed();
        // Safety: the thunk was registered for this entry, so it reads
        // exactly `params.len()` slots of the declared types. `strings`
        // outlives the call.
        let status = unsafe { (self.thunk)(wire.as_ptr(), wire.len(), &mut out) };
        if status != STATUS_OK {
            return Err(CallError::NativeStatus {
                function: self.name().to_owned(),
                status,
            });
        }
        // Safety: the thunk stored a value of the declared return type.
        Ok(unsafe { decode(self.entry.ret(), out) })
    }

    fn encode(
        &self,
        index: usize,
        ty: AbiType,
        arg: &Value,
        strings: &mut Vec<CString>,
    ) -> Result<WireValue, CallError> {
        let slot = match (ty, arg) {
            (AbiType::Int32, Value::Int32(v)) => WireValue { int32: *v },
            (AbiType::UInt32, Value::UInt32(v)) => WireValue { uint32: *v },
            (AbiType::Float32, Value::Float32(v)) => WireValue { float32: *v },
            (AbiType::Pointer, Value::Pointer(v)) => WireValue { ptr: *v as i64 },
            (AbiType::CString, Value::Str(s)) => {
                let s = CString::new(s.as_str()).map_err(|_| CallError::InteriorNul {
                    function: self.name().to_owned(),
                    index,
                })?;
                let slot = WireValue { str: s.as_ptr() };
                strings.push(s);
                slot
            }
            (expected, found) => {
                return Err(CallError::ArgumentType {
                    function: self.name().to_owned(),
                    index,
                    expected,
                    found: found.abi_type(),
                });
            }
        };
        Ok(slot)
    }
}

/// # Safety
///
/// `out` must hold a value written for `ty`.
unsafe fn decode(ty: AbiType, out: WireValue) -> Value {
    unsafe {
        match ty {
            AbiType::Int32 => Value::Int32(out.int32),
            AbiType::UInt32 => Value::UInt32(out.uint32),
            AbiType::Float32 => Value::Float32(out.float32),
            AbiType::Pointer => Value::Pointer(out.ptr as u64),
            AbiType::CString if out.str.is_null() => Value::Unit,
            AbiType::CString => {
                Value::Str(CStr::from_ptr(out.str).to_string_lossy().into_owned())
            }
            AbiType::Void => Value::Unit,
        }
    }
}

/// A successfully bound module.
///
/// Holds the loaded glue image; dropping the last handle (and every
/// [`BoundFunction`] cloned out of it) unloads it.
#[derive(Debug)]
pub struct ModuleHandle {
    id: ModuleId,
    name: ModuleName,
    library_path: PathBuf,
    table: Arc<BindingTable>,
    functions: Vec<BoundFunction>,
    index: HashMap<String, usize>,
}

impl ModuleHandle {
    pub(crate) fn new(
        id: ModuleId,
        library_path: PathBuf,
        table: Arc<BindingTable>,
        functions: Vec<BoundFunction>,
    ) -> Self {
        let index = functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().to_owned(), i))
            .collect();
        ModuleHandle {
            id,
            name: id.module_name(),
            library_path,
            table,
            functions,
            index,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    /// Canonical path of the native library this module wraps.
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    pub fn table(&self) -> &Arc<BindingTable> {
        &self.table
    }

    pub fn function(&self, name: &str) -> Option<&BoundFunction> {
        self.index.get(name).map(|&i| &self.functions[i])
    }

    /// Bound functions in table order.
    pub fn functions(&self) -> impl Iterator<Item = &BoundFunction> {
        self.functions.iter()
    }

    /// Look up `name` and call it.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, CallError> {
        let function = self.function(name).ok_or_else(|| CallError::UnknownFunction {
            module: self.name.to_string(),
            function: name.to_owned(),
        })?;
        function.call(args)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::c_int;

    use tether_abi::STATUS_ARITY_MISMATCH;

    use super::*;

    unsafe extern "C" fn foo(args: *const WireValue, argc: usize, out: *mut WireValue) -> c_int {
        if argc != 2 {
            return STATUS_ARITY_MISMATCH;
        }
        unsafe {
            let args = std::slice::from_raw_parts(args, argc);
            (*out).float32 = (args[0].int32 * args[1].int32) as f32;
        }
        STATUS_OK
    }

    unsafe extern "C" fn length(
        args: *const WireValue,
        _argc: usize,
        out: *mut WireValue,
    ) -> c_int {
        unsafe {
            let text = CStr::from_ptr((*args).str);
            (*out).uint32 = text.to_bytes().len() as u32;
        }
        STATUS_OK
    }

    unsafe extern "C" fn nothing(
        _args: *const WireValue,
        _argc: usize,
        out: *mut WireValue,
    ) -> c_int {
        unsafe {
            (*out).str = std::ptr::null();
        }
        STATUS_OK
    }

    unsafe extern "C" fn fails(
        _args: *const WireValue,
        _argc: usize,
        _out: *mut WireValue,
    ) -> c_int {
        7
    }

    fn bound(entry: BindingEntry, thunk: ThunkFn) -> BoundFunction {
        BoundFunction::new(entry, thunk, Arc::new(()))
    }

    #[test]
    fn calls_encode_and_decode_scalars() {
        let f = bound(
            BindingEntry::new("foo", vec![AbiType::Int32, AbiType::Int32], AbiType::Float32),
            foo,
        );
        assert_eq!(f.call(&[Value::Int32(4), Value::Int32(4)]), Ok(Value::Float32(16.0)));
    }

    #[test]
    fn strings_are_passed_as_c_strings() {
        let f = bound(BindingEntry::new("length", vec![AbiType::CString], AbiType::UInt32), length);
        assert_eq!(f.call(&[Value::from("tether")]), Ok(Value::UInt32(6)));
        assert_eq!(
            f.call(&[Value::from("a\0b")]),
            Err(CallError::InteriorNul {
                function: "length".into(),
                index: 0
            })
        );
    }

    #[test]
    fn null_string_results_decode_to_unit() {
        let f = bound(BindingEntry::new("nothing", Vec::new(), AbiType::CString), nothing);
        assert_eq!(f.call(&[]), Ok(Value::Unit));
    }

    #[test]
    fn arguments_are_checked_before_the_call() {
        let f = bound(
            BindingEntry::new("foo", vec![AbiType::Int32, AbiType::Int32], AbiType::Float32),
            foo,
        );
        assert_eq!(
            f.call(&[Value::Int32(1)]),
            Err(CallError::ArityMismatch {
                function: "foo".into(),
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            f.call(&[Value::Int32(1), Value::Float32(2.0)]),
            Err(CallError::ArgumentType {
                function: "foo".into(),
                index: 1,
                expected: AbiType::Int32,
                found: AbiType::Float32
            })
        );
    }

    #[test]
    fn nonzero_status_is_an_error() {
        let f = bound(BindingEntry::new("fails", Vec::new(), AbiType::Void), fails);
        assert_eq!(
            f.call(&[]),
            Err(CallError::NativeStatus {
                function: "fails".into(),
                status: 7
            })
        );
    }

    #[test]
    fn handles_dispatch_by_exposed_name() {
        let entry =
            BindingEntry::new("foo", vec![AbiType::Int32, AbiType::Int32], AbiType::Float32);
        let table = Arc::new(BindingTable::new().with(entry.clone()).unwrap());
        let id = ModuleId::new(3);
        let library = PathBuf::from("/lib/libfoo.so");
        let handle = ModuleHandle::new(id, library, table, vec![bound(entry, foo)]);
        assert_eq!(handle.name().as_str(), "module3");
        assert_eq!(
            handle.call("foo", &[Value::Int32(2), Value::Int32(3)]),
            Ok(Value::Float32(6.0))
        );
        assert_eq!(
            handle.call("bar", &[]),
            Err(CallError::UnknownFunction {
                module: "module3".into(),
                function: "bar".into()
            })
        );
    }
}
