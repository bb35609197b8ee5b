use std::fmt;

use derive_more::{Display, Error};

/// A trace compile failed. Every variant names the offending instruction
/// index; `index == code.len()` refers to the end of the stream.
#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum TraceError {
    #[display("instruction {index}: local slot {slot} is read before it is written")]
    UnboundLocal { index: usize, slot: u32 },

    #[display("instruction {index}: global `{name}` is not defined")]
    UnboundGlobal { index: usize, name: String },

    #[display("instruction {index}: unsupported opcode `{instruction}`")]
    UnsupportedOpcode { index: usize, instruction: String },

    #[display("instruction {index}: unsupported control flow: {reason}")]
    UnsupportedControlFlow { index: usize, reason: String },

    #[display("instruction {index}: call with {argc} argument(s), stack holds {available}")]
    ArityMismatch {
        index: usize,
        argc: u32,
        available: usize,
    },

    #[display("instruction {index}: `{instruction}` pops from an empty stack")]
    StackUnderflow { index: usize, instruction: String },
}

impl TraceError {
    pub fn index(&self) -> usize {
        match self {
            TraceError::UnboundLocal { index, .. }
            | TraceError::UnboundGlobal { index, .. }
            | TraceError::UnsupportedOpcode { index, .. }
            | TraceError::UnsupportedControlFlow { index, .. }
            | TraceError::ArityMismatch { index, .. }
            | TraceError::StackUnderflow { index, .. } => *index,
        }
    }
}

/// Syntax error in assembly or source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// 1-based.
    pub line: usize,
    /// Byte offset into the whole input.
    pub offset: usize,
}

impl ParseError {
    pub(crate) fn at(input: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(input.len());
        ParseError {
            message: message.into(),
            line: input[..offset].matches('\n').count() + 1,
            offset,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}
