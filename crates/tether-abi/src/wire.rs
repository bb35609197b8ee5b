//! The C wire ABI between the host and generated glue.
//!
//! Every thunk has the same C signature: it receives an array of
//! [`WireValue`]s, writes its result into one more, and returns a status
//! code. A module exports a single init function returning a [`ModuleDef`]
//! whose `abi_version` must equal [`ABI_VERSION`]; the version only changes
//! when these layouts do, so modules built against an older header keep
//! loading across host upgrades.
//!
//! The Rust types here mirror [`HEADER_SOURCE`] field for field.

use std::ffi::{c_char, c_int};

/// Pinned wire ABI version.
pub const ABI_VERSION: u32 = 1;

/// Thunk completed and wrote its result.
pub const STATUS_OK: c_int = 0;
/// Thunk was called with the wrong number of arguments.
pub const STATUS_ARITY_MISMATCH: c_int = 1;

/// File name generated units include the header under.
pub const HEADER_NAME: &str = "tether_abi.h";

/// Contents of [`HEADER_NAME`], written next to each generated unit.
pub const HEADER_SOURCE: &str = r#"/* tether wire ABI. Layouts must match tether_abi::wire. */
#ifndef TETHER_ABI_H
#define TETHER_ABI_H

#include <stddef.h>
#include <stdint.h>

#define TETHER_ABI_VERSION 1u

#define TETHER_OK 0
#define TETHER_ARITY_MISMATCH 1

#if defined(_WIN32)
#define TETHER_EXPORT __declspec(dllexport)
#else
#define TETHER_EXPORT __attribute__((visibility("default")))
#endif

typedef union tether_value {
    int32_t int32;
    uint32_t uint32;
    float float32;
    const char *str;
    int64_t ptr;
} tether_value;

typedef int (*tether_thunk)(const tether_value *args, size_t argc, tether_value *out);

typedef struct tether_method_def {
    const char *name;
    tether_thunk thunk;
    size_t arity;
    const char *arg_format;
    const char *ret_format;
    const char *doc;
} tether_method_def;

typedef struct tether_module_def {
    uint32_t abi_version;
    const char *name;
    const tether_method_def *methods;
} tether_module_def;

#endif /* TETHER_ABI_H */
"#;

/// One argument or result slot (`tether_value`).
#[repr(C)]
#[derive(Clone, Copy)]
pub union WireValue {
    pub int32: i32,
    pub uint32: u32,
    pub float32: f32,
    pub str: *const c_char,
    pub ptr: i64,
}

impl WireValue {
    pub const fn zeroed() -> Self {
        WireValue { ptr: 0 }
    }
}

impl Default for WireValue {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// `tether_thunk`
pub type ThunkFn =
    unsafe extern "C" fn(args: *const WireValue, argc: usize, out: *mut WireValue) -> c_int;

/// `tether_module_def *tether_init_<module>(void)`
pub type InitFn = unsafe extern "C" fn() -> *const ModuleDef;

/// One registration record (`tether_method_def`). A record with a null
/// `name` terminates the table.
#[repr(C)]
pub struct MethodDef {
    pub name: *const c_char,
    pub thunk: Option<ThunkFn>,
    pub arity: usize,
    pub arg_format: *const c_char,
    pub ret_format: *const c_char,
    pub doc: *const c_char,
}

/// Module definition returned by the init entry point (`tether_module_def`).
#[repr(C)]
pub struct ModuleDef {
    pub abi_version: u32,
    pub name: *const c_char,
    pub methods: *const MethodDef,
}
