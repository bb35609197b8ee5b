//! Crate-level error type.

use derive_more::{Display, Error, From};
use tether_abi::DescriptorError;
use tether_loader::{BindError, CallError, ObjectError};
use tether_trace::{ParseError, TraceError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any failure surfaced by a [`Session`](crate::Session) or the CLI.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    #[display("{_0}")]
    Descriptor(DescriptorError),

    #[display("{_0}")]
    Bind(BindError),

    #[display("{_0}")]
    Call(CallError),

    #[display("{_0}")]
    Object(ObjectError),

    #[display("{_0}")]
    Parse(ParseError),

    #[display("{_0}")]
    Trace(TraceError),

    #[display("I/O error: {_0}")]
    Io(std::io::Error),

    /// Command-line input that could not be interpreted.
    #[from(ignore)]
    #[display("{message}")]
    Usage { message: String },
}

impl Error {
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage {
            message: message.into(),
        }
    }
}
