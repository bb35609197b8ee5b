//! Bind native shared libraries through generated C glue, wrap opaque native
//! objects, and trace calls into bound modules.
//!
//! The pieces live in the `tether-*` crates; [`Session`] ties them to one
//! module registry and one global namespace.

pub mod error;
pub mod session;

pub use error::{Error, Result};
pub use session::Session;

pub use tether_abi::{AbiType, BindingEntry, BindingTable, ModuleId, Value};
pub use tether_loader::{
    BindError, CallError, ModuleHandle, NativeObject, ObjectClass, ObjectError, ObjectLayout,
    ToolchainConfig,
};
pub use tether_trace::{CompiledTrace, GlobalValue, TraceError, TraceFunction};
