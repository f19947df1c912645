//! File-level entry points: format sniffing and Kindle metadata lookup.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::container::{CONTAINER_MAGIC, KfxContainer};
use super::ion::{ION_MAGIC, IonParser, IonValue, TypedValue};
use super::metadata::{Metadata, extract_metadata};
use super::options::DecodeOptions;
use super::symbols::SymbolTable;
use crate::error::{Error, Result};

/// Header of an encrypted Ion payload; an 8-byte trailer follows the data.
pub const DRMION_MAGIC: &[u8; 8] = b"\xeaDRMION\xee";

/// Result of decoding a file of unknown kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Entities from a KFX container or KDF database.
    Entities(Vec<TypedValue>),
    /// Top-level values of a raw Ion stream.
    Values(Vec<IonValue>),
}

/// Decode a KFX container, raw Ion stream or DRMION-wrapped Ion stream.
pub fn decode_bytes(data: &[u8], options: &DecodeOptions) -> Result<Decoded> {
    if data.starts_with(CONTAINER_MAGIC) {
        let container = KfxContainer::parse_with_depth(data, options.max_depth)?;
        return container.decode(options).map(Decoded::Entities);
    }

    let ion = if data.starts_with(&ION_MAGIC) {
        data
    } else if data.starts_with(DRMION_MAGIC) {
        let end = data.len().checked_sub(8).filter(|&end| end >= 8).ok_or(
            Error::UnexpectedEof {
                needed: 16,
                remaining: data.len(),
            },
        )?;
        &data[8..end]
    } else {
        return Err(Error::Format {
            context: "KFX, KDF or ION",
            found: data[..data.len().min(8)].to_vec(),
        });
    };

    let symbols = SymbolTable::builtin();
    IonParser::new(ion, &symbols)
        .with_max_depth(options.max_depth)
        .parse_all()
        .map(Decoded::Values)
}

/// Decode a `.kfx`, `.azw8`, `.ion` or (with the `kdf` feature) `.kdf` file.
pub fn decode_file(path: impl AsRef<Path>, options: &DecodeOptions) -> Result<Decoded> {
    let path = path.as_ref();

    #[cfg(feature = "kdf")]
    {
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("kdf")) {
            let db = super::kdf::KdfDatabase::open(path)?;
            return db.decode(options).map(Decoded::Entities);
        }
    }

    decode_bytes(&fs::read(path)?, options)
}

/// Where a Kindle keeps the unencrypted metadata of an encrypted book:
/// `<stem>.sdr/assets/metadata.kfx` next to the book file.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut sdr = path.with_extension("").into_os_string();
    sdr.push(".sdr");
    PathBuf::from(sdr).join("assets").join("metadata.kfx")
}

/// Extract metadata from a KFX container held in memory.
pub fn kindle_metadata_from_bytes(data: &[u8]) -> Result<Metadata> {
    let container = KfxContainer::parse(data)?;
    let entities = container.decode(&DecodeOptions::metadata_only())?;
    Ok(extract_metadata(&entities))
}

/// Extract metadata from a KFX file in a Kindle `documents` directory.
///
/// Encrypted books keep their metadata in a sidecar container, which is read
/// instead.
pub fn read_kindle_metadata(path: impl AsRef<Path>) -> Result<Metadata> {
    let path = path.as_ref();
    let mut data = fs::read(path)?;

    if data.starts_with(DRMION_MAGIC) {
        let sidecar = sidecar_path(path);
        debug!(path = %path.display(), sidecar = %sidecar.display(), "encrypted book, reading sidecar");
        data = fs::read(&sidecar)?;
    }

    kindle_metadata_from_bytes(&data)
}
