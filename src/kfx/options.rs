//! Decoding options.

use super::ion::DEFAULT_MAX_DEPTH;

/// How much of a document to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Decode only entities that can contribute to book metadata
    /// (`book_metadata`, `metadata`, `external_resource`, `bcRawMedia`).
    pub metadata_only: bool,
    /// Bound on nested lists, structs and typed data.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            metadata_only: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    pub fn metadata_only() -> Self {
        Self {
            metadata_only: true,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
