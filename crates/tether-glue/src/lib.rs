//! Glue source generation.
//!
//! Renders one C compilation unit per binding table. The unit contains a
//! forward declaration for every native symbol, a thunk per binding that
//! decodes [`tether_abi::WireValue`] arguments, calls the symbol and encodes
//! its result, a static registration table, and one exported init function
//! the loader resolves after `dlopen`.

pub mod generate;
pub mod source;

pub use generate::{GlueUnit, ThunkInfo, generate, thunk_symbol};
pub use source::CSource;
