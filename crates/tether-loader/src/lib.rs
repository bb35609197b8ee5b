//! Building, loading and calling generated glue.
//!
//! [`Binder::bind`] drives the whole pipeline for one native library:
//!
//! 1. validate the binding table,
//! 2. generate the glue unit into a private scratch directory,
//! 3. compile it with the configured [`Toolchain`],
//! 4. load the result and verify its registration table,
//! 5. register the module and hand back a [`ModuleHandle`].
//!
//! Loading a library runs native code. Once a module is bound, calls through
//! it are only as safe as the native functions behind it.

pub mod bind;
pub mod config;
pub mod error;
pub mod library;
pub mod module;
pub mod object;
pub mod registry;
pub mod toolchain;

pub use bind::Binder;
pub use config::{OptLevel, ToolchainConfig};
pub use error::{BindError, BindResult, CallError, ObjectError};
pub use library::NativeLibrary;
pub use module::{BoundFunction, ModuleHandle};
pub use object::{BoundMethod, NativeObject, ObjectClass, ObjectLayout};
pub use registry::ModuleRegistry;
pub use toolchain::{BuildJob, CcToolchain, Toolchain};
