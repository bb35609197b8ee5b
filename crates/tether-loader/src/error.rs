//! Error types for binding, calling and object wrapping.

use std::path::PathBuf;
use std::time::Duration;

use derive_more::{Display, Error, From};
use tether_abi::{AbiType, DescriptorError};

pub type BindResult<T> = Result<T, BindError>;

/// A bind request failed. No module is registered and no temporary
/// artifact survives the failure.
#[derive(Debug, Display, Error, From)]
pub enum BindError {
    /// The table was rejected before any toolchain ran.
    #[display("{_0}")]
    InvalidBindingDescriptor(DescriptorError),

    /// The toolchain could not be started, exited unsuccessfully, or
    /// produced no artifact.
    #[from(ignore)]
    #[display("build of {module} failed: {reason}")]
    BuildFailure { module: String, reason: String },

    #[from(ignore)]
    #[display("build of {module} timed out after {}s", timeout.as_secs_f64())]
    BuildTimeout { module: String, timeout: Duration },

    /// The loader rejected the artifact or its registration table.
    #[from(ignore)]
    #[display("failed to load {module} from {}: {reason}", path.display())]
    LoadFailure {
        module: String,
        path: PathBuf,
        reason: String,
    },

    #[display("I/O error: {_0}")]
    Io(std::io::Error),
}

impl BindError {
    pub(crate) fn build_failure(module: impl ToString, reason: impl Into<String>) -> Self {
        BindError::BuildFailure {
            module: module.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn load_failure(
        module: impl ToString,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        BindError::LoadFailure {
            module: module.to_string(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A call through a bound function failed before or after reaching native code.
#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum CallError {
    #[display("`{function}` is not bound in {module}")]
    UnknownFunction { module: String, function: String },

    #[display("`{function}` takes {expected} argument(s) but {found} were supplied")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[display("argument {index} of `{function}` must be {expected}, found {found}")]
    ArgumentType {
        function: String,
        index: usize,
        expected: AbiType,
        found: AbiType,
    },

    #[display("argument {index} of `{function}` contains an interior NUL byte")]
    InteriorNul { function: String, index: usize },

    #[display("`{function}` returned status {status}")]
    NativeStatus { function: String, status: i32 },
}

/// Errors raised by handle-based object wrappers.
#[derive(Debug, Clone, PartialEq, Display, Error, From)]
pub enum ObjectError {
    #[from(ignore)]
    #[display("object table has no `{name}` binding")]
    MissingBinding { name: String },

    #[from(ignore)]
    #[display("`{name}` cannot serve as the {role}: {reason}")]
    InvalidLayout {
        name: String,
        role: &'static str,
        reason: String,
    },

    #[from(ignore)]
    #[display("bound object has no method `{name}`")]
    UnknownMethod { name: String },

    #[from(ignore)]
    #[display("object was already torn down")]
    DoubleTeardown,

    #[from(ignore)]
    #[display("object was used after teardown")]
    UseAfterTeardown,

    #[from(ignore)]
    #[display("constructor `{name}` returned a null handle")]
    NullHandle { name: String },

    #[display("{_0}")]
    Call(CallError),
}
