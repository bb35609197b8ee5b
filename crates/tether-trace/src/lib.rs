//! Trace compilation of straight-line instruction streams.
//!
//! A [`TraceFunction`] is a flat sequence of stack-machine [`Instruction`]s.
//! It can be written directly in assembly ([`parse_assembly`]) or lowered
//! from a small expression language ([`lower_source`]). The
//! [`TraceCompiler`] replays the stream abstractly and produces a
//! [`TraceGraph`] whose calls into bound native modules are labeled.
//!
//! Branches and loops are rejected rather than traced.

pub mod asm;
pub mod compile;
pub mod error;
pub mod graph;
pub mod instruction;
pub mod lower;
pub mod namespace;

pub use asm::parse_assembly;
pub use compile::{CompiledTrace, TraceCompiler};
pub use error::{ParseError, TraceError};
pub use graph::{NativeCall, Node, NodeKind, NodeRef, TraceGraph};
pub use instruction::{BinaryOperator, Instruction, TraceFunction};
pub use lower::lower_source;
pub use namespace::{GlobalValue, Globals, Namespace};
