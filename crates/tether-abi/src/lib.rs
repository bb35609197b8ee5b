//! ABI vocabulary shared by the tether crates.
//!
//! This crate owns everything both sides of the native boundary must agree on:
//! the closed set of scalar ABI types, binding tables describing a library's
//! callable surface, dynamic host values, and the C wire format that
//! generated glue exchanges with the host.

pub mod binding;
pub mod error;
pub mod module;
pub mod types;
pub mod value;
pub mod wire;

pub use binding::{BindingEntry, BindingTable};
pub use error::DescriptorError;
pub use module::{ModuleId, ModuleLookup, ModuleName};
pub use types::AbiType;
pub use value::Value;
pub use wire::{
    ABI_VERSION, HEADER_NAME, HEADER_SOURCE, InitFn, MethodDef, ModuleDef, STATUS_ARITY_MISMATCH,
    STATUS_OK, ThunkFn, WireValue,
};
