//! KFX container format parsing.
//!
//! A container starts with a `CONT` header pointing at an Ion "container info"
//! struct. That struct locates the document symbol table and the entity
//! index; each index record gives the byte range of one `ENTY` block.
//! Parsing borrows from the input buffer, nothing is copied until entities
//! are decoded.

use tracing::debug;

use super::ion::{ION_MAGIC, IonParser, IonValue, TypedValue};
use super::options::DecodeOptions;
use super::symbols::SymbolTable;
use super::EntitySource;
use crate::error::{Error, Result};
use crate::io::{ByteCursor, slice_at};

/// KFX container magic
pub const CONTAINER_MAGIC: &[u8; 4] = b"CONT";

/// Entity magic
pub const ENTITY_MAGIC: &[u8; 4] = b"ENTY";

/// Size of one entity index record: id(4) + type_id(4) + offset(8) + length(8).
const INDEX_ENTRY_SIZE: usize = 24;

/// Entity types that hold book metadata, the cover reference and media.
pub const METADATA_ENTITY_TYPES: [u32; 4] = [
    164, // external_resource
    258, // metadata
    417, // bcRawMedia
    490, // book_metadata
];

/// Location of an entity within the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLoc {
    /// Entity ID (symbol ID).
    pub id: u32,
    /// Entity type ID (symbol ID).
    pub type_id: u32,
    /// Byte offset relative to the end of the container header.
    pub offset: usize,
    /// Length in bytes.
    pub length: usize,
}

/// Parsed container info fields: (offset, length) pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub index: Option<(usize, usize)>,
    pub doc_symbols: Option<(usize, usize)>,
}

/// Read magic(4) + version(2) + header_len(4), the header shared by
/// container and entity blocks.
fn read_block_header(
    cursor: &mut ByteCursor<'_>,
    magic: &[u8; 4],
    context: &'static str,
) -> Result<(u16, usize)> {
    let found = cursor.peek(magic.len().min(cursor.remaining()))?;
    if found != magic {
        return Err(Error::Format {
            context,
            found: found.to_vec(),
        });
    }
    cursor.advance(magic.len())?;
    let version = cursor.read_u16_le()?;
    let header_len = cursor.read_u32_le()? as usize;
    Ok((version, header_len))
}

/// Non-negative integer field of the container info, if present.
fn usize_field(info: &IonValue, name: &'static str) -> Result<Option<usize>> {
    let Some(value) = info.get(name).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    value
        .as_int()
        .and_then(|n| usize::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| Error::UnsupportedEncoding(format!("{name} is not a valid offset")))
}

/// Offset/length pair, present only when the length is set and non-zero.
fn region(
    info: &IonValue,
    offset: &'static str,
    length: &'static str,
) -> Result<Option<(usize, usize)>> {
    match usize_field(info, length)? {
        Some(len) if len > 0 => {
            let off = usize_field(info, offset)?.ok_or(Error::MissingField(offset))?;
            Ok(Some((off, len)))
        }
        _ => Ok(None),
    }
}

/// Decode the container info struct. Only built-in symbols apply here, the
/// document symbols are not known yet.
pub fn parse_container_info(data: &[u8], max_depth: usize) -> Result<ContainerInfo> {
    let builtin = SymbolTable::builtin();
    let info = IonParser::new(data, &builtin)
        .with_max_depth(max_depth)
        .parse()?;

    Ok(ContainerInfo {
        index: region(&info, "bcIndexTabOffset", "bcIndexTabLength")?,
        doc_symbols: region(&info, "bcDocSymbolOffset", "bcDocSymbolLength")?,
    })
}

/// Parse the entity index table.
///
/// A trailing partial record is an error rather than silently dropped.
pub fn parse_index_table(data: &[u8]) -> Result<Vec<EntityLoc>> {
    let mut cursor = ByteCursor::new(data);
    let mut entities = Vec::with_capacity(data.len() / INDEX_ENTRY_SIZE);

    while !cursor.is_empty() {
        let id = cursor.read_u32_le()?;
        let type_id = cursor.read_u32_le()?;
        let offset = cursor.read_u64_le()?;
        let length = cursor.read_u64_le()?;
        let too_large = || Error::UnsupportedEncoding("entity range exceeds address space".into());
        entities.push(EntityLoc {
            id,
            type_id,
            offset: usize::try_from(offset).map_err(|_| too_large())?,
            length: usize::try_from(length).map_err(|_| too_large())?,
        });
    }

    Ok(entities)
}

/// Entity payload: structured Ion data or an opaque resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityPayload<'a> {
    Ion(&'a [u8]),
    Raw(&'a [u8]),
}

/// One `ENTY` block, borrowed from the container.
#[derive(Debug, Clone, Copy)]
pub struct RawEntity<'a> {
    pub id: u32,
    pub type_id: u32,
    pub version: u16,
    pub payload: EntityPayload<'a>,
}

impl<'a> RawEntity<'a> {
    /// Parse an `ENTY` block and split off its payload.
    pub fn parse(data: &'a [u8], type_id: u32, id: u32) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let (version, header_len) = read_block_header(&mut cursor, ENTITY_MAGIC, "ENTY")?;
        let body = slice_at(data, header_len, data.len().saturating_sub(header_len))?;
        let payload = if body.starts_with(&ION_MAGIC) {
            EntityPayload::Ion(body)
        } else {
            EntityPayload::Raw(body)
        };
        Ok(Self {
            id,
            type_id,
            version,
            payload,
        })
    }

    /// Whether this entity carries book metadata, a cover reference or media.
    pub fn is_metadata(&self) -> bool {
        METADATA_ENTITY_TYPES.contains(&self.type_id)
    }

    /// Decode into a typed value; raw payloads become blobs.
    pub fn decode(&self, symbols: &SymbolTable, max_depth: usize) -> Result<TypedValue> {
        let value = match self.payload {
            EntityPayload::Ion(data) => IonParser::new(data, symbols)
                .with_max_depth(max_depth)
                .parse()?,
            EntityPayload::Raw(data) => IonValue::Blob(data.to_vec()),
        };
        Ok(TypedValue {
            type_name: symbols.resolve(self.type_id as u64),
            id_name: symbols.resolve(self.id as u64),
            value,
        })
    }
}

/// Parsed KFX container.
#[derive(Debug)]
pub struct KfxContainer<'a> {
    pub version: u16,
    pub header_len: usize,
    pub info: ContainerInfo,
    symbol_data: Option<&'a [u8]>,
    entities: Vec<RawEntity<'a>>,
}

impl<'a> KfxContainer<'a> {
    /// Parse the container header, info struct and entity index.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        Self::parse_with_depth(data, super::ion::DEFAULT_MAX_DEPTH)
    }

    pub fn parse_with_depth(data: &'a [u8], max_depth: usize) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let (version, header_len) = read_block_header(&mut cursor, CONTAINER_MAGIC, "CONT")?;
        let container_info_offset = cursor.read_u32_le()? as usize;
        let container_info_length = cursor.read_u32_le()? as usize;

        debug!(
            version,
            header_len, container_info_offset, container_info_length, "KFX container header"
        );

        let info = parse_container_info(
            slice_at(data, container_info_offset, container_info_length)?,
            max_depth,
        )?;

        let symbol_data = info
            .doc_symbols
            .map(|(offset, len)| slice_at(data, offset, len))
            .transpose()?;

        let mut entities = Vec::new();
        if let Some((offset, len)) = info.index {
            for loc in parse_index_table(slice_at(data, offset, len)?)? {
                let start = header_len.checked_add(loc.offset).ok_or(Error::UnexpectedEof {
                    needed: loc.offset,
                    remaining: data.len(),
                })?;
                let block = slice_at(data, start, loc.length)?;
                entities.push(RawEntity::parse(block, loc.type_id, loc.id)?);
            }
        }

        debug!(entities = entities.len(), "KFX entity index");

        Ok(Self {
            version,
            header_len,
            info,
            symbol_data,
            entities,
        })
    }

    /// Raw bytes of the document symbol table, if the container has one.
    pub fn symbol_data(&self) -> Option<&'a [u8]> {
        self.symbol_data
    }

    pub fn entities(&self) -> &[RawEntity<'a>] {
        &self.entities
    }

    /// Built-in symbols overlaid with this container's document symbols.
    pub fn symbol_table(&self, max_depth: usize) -> Result<SymbolTable> {
        SymbolTable::from_symbol_data(self.symbol_data, max_depth)
    }

    /// Decode entities, or only the metadata-bearing ones if requested.
    pub fn decode(&self, options: &DecodeOptions) -> Result<Vec<TypedValue>> {
        let symbols = self.symbol_table(options.max_depth)?;
        self.entities
            .iter()
            .filter(|entity| !options.metadata_only || entity.is_metadata())
            .map(|entity| entity.decode(&symbols, options.max_depth))
            .collect()
    }
}

impl EntitySource for KfxContainer<'_> {
    fn decode_entities(&self, options: &DecodeOptions) -> Result<Vec<TypedValue>> {
        self.decode(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::serialization::{ContainerBuilder, create_entity_data};

    #[test]
    fn test_parse_container_header() {
        let data = ContainerBuilder::new().build().unwrap();
        let container = KfxContainer::parse(&data).unwrap();
        assert_eq!(container.version, 2);
        assert_eq!(container.header_len, data.len());
        assert_eq!(container.info, ContainerInfo::default());
        assert!(container.entities().is_empty());
        assert!(container.symbol_data().is_none());
    }

    #[test]
    fn test_parse_container_header_invalid_magic() {
        let mut data = ContainerBuilder::new().build().unwrap();
        data[..4].copy_from_slice(b"PK\x03\x04");
        match KfxContainer::parse(&data) {
            Err(Error::Format { context, found }) => {
                assert_eq!(context, "CONT");
                assert_eq!(found, b"PK\x03\x04");
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_container_header_too_short() {
        let result = KfxContainer::parse(b"CONT\x02\x00\x12");
        assert!(matches!(result, Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn test_parse_index_table() {
        let mut data = vec![0u8; 48];

        // Entry 1: id=1, type_id=100, offset=1000, length=500
        data[0..4].copy_from_slice(&1u32.to_le_bytes());
        data[4..8].copy_from_slice(&100u32.to_le_bytes());
        data[8..16].copy_from_slice(&1000u64.to_le_bytes());
        data[16..24].copy_from_slice(&500u64.to_le_bytes());

        // Entry 2: id=2, type_id=200, offset=2000, length=300
        data[24..28].copy_from_slice(&2u32.to_le_bytes());
        data[28..32].copy_from_slice(&200u32.to_le_bytes());
        data[32..40].copy_from_slice(&2000u64.to_le_bytes());
        data[40..48].copy_from_slice(&300u64.to_le_bytes());

        let entities = parse_index_table(&data).unwrap();
        assert_eq!(
            entities,
            vec![
                EntityLoc {
                    id: 1,
                    type_id: 100,
                    offset: 1000,
                    length: 500
                },
                EntityLoc {
                    id: 2,
                    type_id: 200,
                    offset: 2000,
                    length: 300
                },
            ]
        );
    }

    #[test]
    fn test_parse_index_table_partial_record() {
        let data = vec![0u8; 30];
        assert!(matches!(
            parse_index_table(&data),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_entity_payload_kinds() {
        let ion = create_entity_data(&[0xe0, 0x01, 0x00, 0xea, 0x20]);
        let entity = RawEntity::parse(&ion, 258, 1000).unwrap();
        assert_eq!(entity.version, 1);
        assert!(matches!(entity.payload, EntityPayload::Ion(_)));
        assert!(entity.is_metadata());

        let raw = create_entity_data(b"\xff\xd8\xff\xe0");
        let entity = RawEntity::parse(&raw, 417, 1001).unwrap();
        assert_eq!(entity.payload, EntityPayload::Raw(b"\xff\xd8\xff\xe0"));
    }

    #[test]
    fn test_entity_bad_magic() {
        let mut data = create_entity_data(b"x");
        data[..4].copy_from_slice(b"ENTX");
        assert!(matches!(
            RawEntity::parse(&data, 1, 1),
            Err(Error::Format { context: "ENTY", .. })
        ));
    }

    #[test]
    fn test_entity_header_past_end() {
        let mut data = create_entity_data(b"x");
        data[6..10].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            RawEntity::parse(&data, 1, 1),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_decode_raw_entity_is_blob() {
        let raw = create_entity_data(b"\x89PNG");
        let entity = RawEntity::parse(&raw, 417, 12).unwrap();
        let typed = entity.decode(&SymbolTable::builtin(), 8).unwrap();
        assert_eq!(typed.type_name, "bcRawMedia");
        assert_eq!(typed.id_name, "S12");
        assert_eq!(typed.value, IonValue::Blob(b"\x89PNG".to_vec()));
    }

    #[test]
    fn test_entity_range_out_of_bounds() {
        let mut data = ContainerBuilder::new()
            .raw_entity("bcRawMedia", "S1000", b"abc")
            .unwrap()
            .build()
            .unwrap();
        // Shrink the file so the entity runs past the end
        data.truncate(data.len() - 2);
        assert!(matches!(
            KfxContainer::parse(&data),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_metadata_only_filter() {
        let data = ContainerBuilder::new()
            .doc_symbols(&["c1", "section1"], 1001)
            .unwrap()
            .ion_entity("S260", "section1", &IonValue::Int(1))
            .unwrap()
            .ion_entity("metadata", "S258", &IonValue::Struct(vec![]))
            .unwrap()
            .build()
            .unwrap();
        let container = KfxContainer::parse(&data).unwrap();
        assert_eq!(container.entities().len(), 2);

        let all = container.decode(&DecodeOptions::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].type_name, "S260");
        assert_eq!(all[0].id_name, "section1");

        let meta = container.decode(&DecodeOptions::metadata_only()).unwrap();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].type_name, "metadata");
    }
}
