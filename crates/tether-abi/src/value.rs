//! Dynamic host values passed to and returned from bound functions.

use std::fmt;

use crate::types::AbiType;

/// A host-side value typed by one of the registry's [`AbiType`]s.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int32(i32),
    UInt32(u32),
    Float32(f32),
    Str(String),
    /// Opaque native pointer, never dereferenced on the host side.
    Pointer(u64),
    /// Result of a `void` function, or of a function returning a null string.
    Unit,
}

impl Value {
    /// The ABI type this value encodes as.
    pub fn abi_type(&self) -> AbiType {
        match self {
            Value::Int32(_) => AbiType::Int32,
            Value::UInt32(_) => AbiType::UInt32,
            Value::Float32(_) => AbiType::Float32,
            Value::Str(_) => AbiType::CString,
            Value::Pointer(_) => AbiType::Pointer,
            Value::Unit => AbiType::Void,
        }
    }

    /// Parse textual input (command line, test fixtures) as a value of `ty`.
    pub fn parse_as(ty: AbiType, text: &str) -> Option<Value> {
        match ty {
            AbiType::Int32 => text.parse().ok().map(Value::Int32),
            AbiType::UInt32 => text.parse().ok().map(Value::UInt32),
            AbiType::Float32 => text.parse().ok().map(Value::Float32),
            AbiType::CString => Some(Value::Str(text.to_owned())),
            AbiType::Pointer => {
                let parsed = match text.strip_prefix("0x") {
                    Some(hex) => u64::from_str_radix(hex, 16).ok(),
                    None => text.parse().ok(),
                };
                parsed.map(Value::Pointer)
            }
            AbiType::Void => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<u64> {
        match self {
            Value::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Pointer(p) => write!(f, "{p:#x}"),
            Value::Unit => f.write_str("()"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
