//! Errors raised while validating binding descriptors.

use derive_more::{Display, Error};

/// A binding table entry failed validation.
///
/// Raised before any external process is spawned, and always names the
/// offending entry so the caller can fix the table.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("invalid binding descriptor `{entry}`: {reason}")]
pub struct DescriptorError {
    pub entry: String,
    pub reason: String,
}

impl DescriptorError {
    pub fn new(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        DescriptorError {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}
