//! Packed Ion and KFX container serialization.
//!
//! The inverse of the decoder: used to build fixtures for tests and
//! benchmarks, and by anything that needs to hand a well-formed container to
//! the reader. Names are mapped back to symbol ids through a [`SymbolTable`].

use super::container::{CONTAINER_MAGIC, ENTITY_MAGIC};
use super::ion::{ION_MAGIC, IonValue, TypedValue};
use super::symbols::SymbolTable;
use crate::error::{Error, Result};

/// Append a VarUInt: 7 bits per byte, most significant group first, high bit
/// set on the last byte.
pub fn write_varuint(out: &mut Vec<u8>, value: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7f) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        out.push(if i == 0 { groups[i] | 0x80 } else { groups[i] });
    }
}

/// Minimal big-endian bytes of an unsigned value (empty for zero).
fn uint_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

/// Packed Ion writer.
pub struct IonWriter<'s> {
    buf: Vec<u8>,
    symbols: &'s SymbolTable,
}

impl<'s> IonWriter<'s> {
    pub fn new(symbols: &'s SymbolTable) -> Self {
        Self {
            buf: Vec::new(),
            symbols,
        }
    }

    pub fn write_bvm(&mut self) {
        self.buf.extend_from_slice(&ION_MAGIC);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn symbol_id(&self, name: &str) -> Result<u64> {
        self.symbols
            .id_of(name)
            .ok_or_else(|| Error::UnknownSymbol(name.to_string()))
    }

    fn write_header(&mut self, type_code: u8, len: usize) {
        if len < 14 {
            self.buf.push((type_code << 4) | len as u8);
        } else {
            self.buf.push((type_code << 4) | 14);
            write_varuint(&mut self.buf, len as u64);
        }
    }

    fn write_payload(&mut self, type_code: u8, payload: &[u8]) {
        self.write_header(type_code, payload.len());
        self.buf.extend_from_slice(payload);
    }

    /// Encode a nested value into its own buffer.
    fn encode(&self, value: &IonValue) -> Result<Vec<u8>> {
        let mut inner = IonWriter::new(self.symbols);
        inner.write_value(value)?;
        Ok(inner.buf)
    }

    pub fn write_value(&mut self, value: &IonValue) -> Result<()> {
        match value {
            IonValue::Null => self.buf.push(0x0f),
            IonValue::Bool(b) => self.buf.push(0x10 | *b as u8),
            IonValue::Int(n) => {
                let magnitude = u64::try_from(n.unsigned_abs()).map_err(|_| {
                    Error::UnsupportedEncoding(format!("integer {n} wider than 64 bits"))
                })?;
                let type_code = if *n < 0 { 3 } else { 2 };
                self.write_payload(type_code, &uint_bytes(magnitude));
            }
            IonValue::Float(f) => {
                if *f == 0.0 && f.is_sign_positive() {
                    self.buf.push(0x40);
                } else {
                    self.write_payload(4, &f.to_be_bytes());
                }
            }
            IonValue::Decimal(d) => {
                if d.mantissa == 0 && d.scale == 0 {
                    self.buf.push(0x50);
                } else {
                    if !(-63..=63).contains(&d.scale) {
                        return Err(Error::UnsupportedEncoding(format!(
                            "decimal scale {} needs a multi-byte signed number",
                            d.scale
                        )));
                    }
                    let mut payload = vec![if d.scale < 0 {
                        0xc0 | d.scale.unsigned_abs() as u8
                    } else {
                        0x80 | d.scale as u8
                    }];
                    let mut coefficient = uint_bytes(d.mantissa.unsigned_abs());
                    if coefficient.first().is_some_and(|b| b & 0x80 != 0) {
                        coefficient.insert(0, 0);
                    }
                    if d.mantissa < 0 {
                        coefficient[0] |= 0x80;
                    }
                    payload.extend_from_slice(&coefficient);
                    self.write_payload(5, &payload);
                }
            }
            IonValue::Timestamp(ts) => {
                use chrono::{Datelike, Timelike};
                let mut payload = Vec::new();
                write_varuint(&mut payload, 0);
                for field in [
                    ts.year() as u64,
                    ts.month() as u64,
                    ts.day() as u64,
                    ts.hour() as u64,
                    ts.minute() as u64,
                    ts.second() as u64,
                    0,
                ] {
                    write_varuint(&mut payload, field);
                }
                self.write_payload(6, &payload);
            }
            IonValue::Symbol(name) => {
                let id = self.symbol_id(name)?;
                self.write_payload(7, &uint_bytes(id));
            }
            IonValue::String(s) => self.write_payload(8, s.as_bytes()),
            IonValue::Clob(s) => self.write_payload(9, s.as_bytes()),
            IonValue::Blob(bytes) => self.write_payload(10, bytes),
            IonValue::List(items) | IonValue::Sexp(items) => {
                let mut payload = Vec::new();
                for item in items {
                    payload.extend_from_slice(&self.encode(item)?);
                }
                let type_code = if matches!(value, IonValue::List(_)) { 11 } else { 12 };
                self.write_payload(type_code, &payload);
            }
            IonValue::Struct(fields) => {
                let mut payload = Vec::new();
                for (name, field) in fields {
                    write_varuint(&mut payload, self.symbol_id(name)?);
                    payload.extend_from_slice(&self.encode(field)?);
                }
                self.write_payload(13, &payload);
            }
            IonValue::Typed(typed) => {
                let mut payload = Vec::new();
                write_varuint(&mut payload, self.symbol_id(&typed.type_name)?);
                write_varuint(&mut payload, self.symbol_id(&typed.id_name)?);
                payload.extend_from_slice(&self.encode(&typed.value)?);
                self.write_payload(14, &payload);
            }
        }
        Ok(())
    }
}

/// BVM followed by one value.
pub fn encode_document(value: &IonValue, symbols: &SymbolTable) -> Result<Vec<u8>> {
    let mut writer = IonWriter::new(symbols);
    writer.write_bvm();
    writer.write_value(value)?;
    Ok(writer.into_bytes())
}

/// Wrap an entity payload in an ENTY header.
///
/// The header's own Ion struct is left empty; readers skip it using the
/// header length.
pub fn create_entity_data(payload: &[u8]) -> Vec<u8> {
    let mut header_ion = ION_MAGIC.to_vec();
    header_ion.push(0xd0);

    // ENTY header: magic(4) + version(2) + header_len(4) = 10
    let header_len = 10 + header_ion.len();

    let mut data = Vec::with_capacity(header_len + payload.len());
    data.extend_from_slice(ENTITY_MAGIC);
    data.extend_from_slice(&1u16.to_le_bytes()); // version
    data.extend_from_slice(&(header_len as u32).to_le_bytes());
    data.extend_from_slice(&header_ion);
    data.extend_from_slice(payload);
    data
}

/// Serialized entity ready for container output.
struct SerializedEntity {
    id: u32,
    entity_type: u32,
    data: Vec<u8>,
}

/// Builds KFX containers entity by entity.
///
/// Container layout:
/// - Header: CONT magic + version + header_len + ci_offset + ci_len
/// - Entity table (indexed by bcIndexTabOffset/bcIndexTabLength)
/// - Doc symbols ION (indexed by bcDocSymbolOffset/bcDocSymbolLength)
/// - Container info ION
/// - Entity payloads (after header_len)
#[derive(Default)]
pub struct ContainerBuilder {
    symbols: SymbolTable,
    doc_symbols: Option<(Vec<String>, u64)>,
    entities: Vec<SerializedEntity>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare document symbols ending at `max_id`; entity names and field
    /// names may then use them.
    pub fn doc_symbols(mut self, names: &[&str], max_id: u64) -> Result<Self> {
        self.symbols = SymbolTable::with_document_symbols(names, max_id)?;
        self.doc_symbols = Some((names.iter().map(|s| s.to_string()).collect(), max_id));
        Ok(self)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    fn push(&mut self, type_name: &str, id_name: &str, data: Vec<u8>) -> Result<()> {
        let id_for = |name: &str| -> Result<u32> {
            let id = self
                .symbols
                .id_of(name)
                .ok_or_else(|| Error::UnknownSymbol(name.to_string()))?;
            u32::try_from(id).map_err(|_| Error::UnknownSymbol(name.to_string()))
        };
        let entity = SerializedEntity {
            id: id_for(id_name)?,
            entity_type: id_for(type_name)?,
            data,
        };
        self.entities.push(entity);
        Ok(())
    }

    /// Add an Ion-encoded entity.
    pub fn ion_entity(mut self, type_name: &str, id_name: &str, value: &IonValue) -> Result<Self> {
        let payload = encode_document(value, &self.symbols)?;
        self.push(type_name, id_name, create_entity_data(&payload))?;
        Ok(self)
    }

    /// Add a raw media entity (image, font) stored without Ion encoding.
    pub fn raw_entity(mut self, type_name: &str, id_name: &str, bytes: &[u8]) -> Result<Self> {
        self.push(type_name, id_name, create_entity_data(bytes))?;
        Ok(self)
    }

    pub fn build(self) -> Result<Vec<u8>> {
        let builtin = SymbolTable::builtin();

        let mut entity_table = Vec::with_capacity(self.entities.len() * 24);
        let mut entity_data = Vec::new();
        for entity in &self.entities {
            entity_table.extend_from_slice(&entity.id.to_le_bytes());
            entity_table.extend_from_slice(&entity.entity_type.to_le_bytes());
            entity_table.extend_from_slice(&(entity_data.len() as u64).to_le_bytes());
            entity_table.extend_from_slice(&(entity.data.len() as u64).to_le_bytes());
            entity_data.extend_from_slice(&entity.data);
        }

        let symtab_ion = match &self.doc_symbols {
            Some((names, max_id)) => {
                let symbols = names.iter().map(|s| IonValue::String(s.clone())).collect();
                let table = IonValue::Struct(vec![
                    ("symbols".into(), IonValue::List(symbols)),
                    ("max_id".into(), IonValue::Int(*max_id as i128)),
                ]);
                let annotated = TypedValue::new("S1", "$ion_symbol_table", table);
                encode_document(&IonValue::Typed(Box::new(annotated)), &builtin)?
            }
            None => Vec::new(),
        };

        // Header is 18 bytes: magic(4) + version(2) + header_len(4) + ci_offset(4) + ci_len(4)
        const HEADER_SIZE: usize = 18;
        let entity_table_offset = HEADER_SIZE;
        let symtab_offset = entity_table_offset + entity_table.len();

        let mut container_info_fields = Vec::new();
        if !entity_table.is_empty() {
            container_info_fields.push((
                "bcIndexTabOffset".to_string(),
                IonValue::Int(entity_table_offset as i128),
            ));
            container_info_fields.push((
                "bcIndexTabLength".to_string(),
                IonValue::Int(entity_table.len() as i128),
            ));
        }
        if !symtab_ion.is_empty() {
            container_info_fields.push((
                "bcDocSymbolOffset".to_string(),
                IonValue::Int(symtab_offset as i128),
            ));
            container_info_fields.push((
                "bcDocSymbolLength".to_string(),
                IonValue::Int(symtab_ion.len() as i128),
            ));
        }
        let container_info_data =
            encode_document(&IonValue::Struct(container_info_fields), &builtin)?;

        let container_info_offset = symtab_offset + symtab_ion.len();
        let header_len = container_info_offset + container_info_data.len();

        let mut output = Vec::with_capacity(header_len + entity_data.len());
        output.extend_from_slice(CONTAINER_MAGIC);
        output.extend_from_slice(&2u16.to_le_bytes()); // version
        output.extend_from_slice(&(header_len as u32).to_le_bytes());
        output.extend_from_slice(&(container_info_offset as u32).to_le_bytes());
        output.extend_from_slice(&(container_info_data.len() as u32).to_le_bytes());
        output.extend_from_slice(&entity_table);
        output.extend_from_slice(&symtab_ion);
        output.extend_from_slice(&container_info_data);
        output.extend_from_slice(&entity_data);
        Ok(output)
    }
}
