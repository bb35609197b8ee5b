//! Type descriptor registry.
//!
//! The set of types that may cross the native boundary is closed: scalars,
//! C strings and opaque pointers. Each type carries a one-character wire tag
//! that generated thunks use both to decode arguments and to encode results.

use std::fmt;
use std::str::FromStr;

use derive_more::{Display, Error};

/// A scalar ABI type understood by generated glue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AbiType {
    Int32,
    UInt32,
    Float32,
    /// NUL-terminated string, borrowed for the duration of a call.
    CString,
    /// Opaque native pointer, carried across the boundary as a 64-bit integer.
    Pointer,
    Void,
}

impl AbiType {
    /// Every descriptor in the registry, in tag order.
    pub const ALL: [AbiType; 6] = [
        AbiType::Int32,
        AbiType::UInt32,
        AbiType::Float32,
        AbiType::CString,
        AbiType::Pointer,
        AbiType::Void,
    ];

    /// Canonical name used in binding tables.
    pub fn name(self) -> &'static str {
        match self {
            AbiType::Int32 => "int32",
            AbiType::UInt32 => "uint32",
            AbiType::Float32 => "float32",
            AbiType::CString => "string",
            AbiType::Pointer => "ptr",
            AbiType::Void => "void",
        }
    }

    /// Spelling of the type in a C declaration.
    pub fn c_decl(self) -> &'static str {
        match self {
            AbiType::Int32 => "int32_t",
            AbiType::UInt32 => "uint32_t",
            AbiType::Float32 => "float",
            AbiType::CString => "char *",
            AbiType::Pointer => "void *",
            AbiType::Void => "void",
        }
    }

    /// Wire format tag. `void` has none: it is never decoded or encoded.
    pub fn wire_tag(self) -> Option<char> {
        match self {
            AbiType::Int32 => Some('i'),
            AbiType::UInt32 => Some('I'),
            AbiType::Float32 => Some('f'),
            AbiType::CString => Some('s'),
            AbiType::Pointer => Some('L'),
            AbiType::Void => None,
        }
    }

    /// Member of the `tether_value` union that holds values of this type.
    pub fn wire_slot(self) -> Option<&'static str> {
        match self {
            AbiType::Int32 => Some("int32"),
            AbiType::UInt32 => Some("uint32"),
            AbiType::Float32 => Some("float32"),
            AbiType::CString => Some("str"),
            AbiType::Pointer => Some("ptr"),
            AbiType::Void => None,
        }
    }

    pub fn is_void(self) -> bool {
        self == AbiType::Void
    }

    /// Concatenated wire tags of a parameter list, e.g. `"iif"`.
    pub fn format_string(types: &[AbiType]) -> String {
        types.iter().filter_map(|ty| ty.wire_tag()).collect()
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a binding table names a type outside the registry.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("unknown ABI type `{name}`")]
pub struct UnknownAbiType {
    pub name: String,
}

impl FromStr for AbiType {
    type Err = UnknownAbiType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s {
            "int32" | "i32" => AbiType::Int32,
            "uint32" | "u32" => AbiType::UInt32,
            "float32" | "float" | "f32" => AbiType::Float32,
            "string" | "cstring" => AbiType::CString,
            "ptr" | "pointer" => AbiType::Pointer,
            "void" => AbiType::Void,
            _ => {
                return Err(UnknownAbiType {
                    name: s.to_owned(),
                });
            }
        };
        Ok(ty)
    }
}
