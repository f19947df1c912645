//! KFX container, KDF fragment store and packed Ion decoding.
//!
//! ## Module structure
//!
//! - `ion` - packed Ion value model and decoder
//! - `symbols` - built-in symbol table and document symbol overlay
//! - `container` - KFX container format parsing
//! - `kdf` - KDF (SQLite) fragment store
//! - `metadata` - book metadata and cover extraction
//! - `reader` - file-level entry points
//! - `serialization` - packed Ion and container writer
//! - `options` - decoding options
//! - `json` - JSON rendering of decoded values

pub mod container;
pub mod ion;
#[cfg(feature = "json")]
pub mod json;
#[cfg(feature = "kdf")]
pub mod kdf;
pub mod metadata;
pub mod options;
pub mod reader;
pub mod serialization;
pub mod symbols;

use crate::error::Result;

pub use ion::TypedValue;
pub use options::DecodeOptions;

/// Anything that yields decoded entities: a KFX container or a KDF database.
///
/// Both produce the same shape, so metadata extraction does not care where
/// the entities came from.
pub trait EntitySource {
    fn decode_entities(&self, options: &DecodeOptions) -> Result<Vec<TypedValue>>;
}
