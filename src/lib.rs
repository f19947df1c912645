//! # kfxmeta
//!
//! Metadata and cover extraction for Kindle KFX books.
//!
//! ## Features
//!
//! - Decode KFX containers (`.kfx`, `.azw8`) and their packed Ion entities
//! - Decode KDF fragment stores (SQLite, `kdf` feature)
//! - Merge book metadata and resolve the cover image bytes
//! - Fall back to the `.sdr` sidecar for encrypted books
//! - Render decoded values as JSON (`json` feature)
//!
//! ## Quick Start
//!
//! ```no_run
//! use kfxmeta::read_kindle_metadata;
//!
//! let metadata = read_kindle_metadata("documents/book.kfx").unwrap();
//! println!("{:?} by {:?}", metadata.title(), metadata.authors());
//! if let Some(cover) = metadata.cover_image_data() {
//!     std::fs::write("cover.jpg", cover).unwrap();
//! }
//! ```
//!
//! ## Decoding Raw Entities
//!
//! ```
//! use kfxmeta::{DecodeOptions, IonValue, KfxContainer, extract_metadata};
//! use kfxmeta::kfx::serialization::ContainerBuilder;
//!
//! let data = ContainerBuilder::new()
//!     .ion_entity(
//!         "metadata",
//!         "S258",
//!         &IonValue::Struct(vec![("title".into(), IonValue::String("Meditations".into()))]),
//!     )
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let container = KfxContainer::parse(&data).unwrap();
//! let entities = container.decode(&DecodeOptions::default()).unwrap();
//! assert_eq!(extract_metadata(&entities).title(), Some("Meditations"));
//! ```

pub mod error;
pub mod io;
pub mod kfx;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use error::{Error, Result};
pub use kfx::EntitySource;
pub use kfx::container::KfxContainer;
pub use kfx::ion::{Decimal, IonValue, TypedValue};
pub use kfx::metadata::{Metadata, extract_metadata};
pub use kfx::options::DecodeOptions;
pub use kfx::reader::{
    Decoded, decode_bytes, decode_file, kindle_metadata_from_bytes, read_kindle_metadata,
};
pub use kfx::symbols::SymbolTable;

#[cfg(feature = "kdf")]
pub use kfx::kdf::KdfDatabase;
