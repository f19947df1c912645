//! Packed Ion binary decoder.
//!
//! KFX stores structured data in a binary encoding derived from Amazon Ion.
//! Every value starts with a control byte: the high nibble is the type tag
//! and the low nibble the payload length, with 14 meaning "a VarUInt length
//! follows". Every other length, 15 included, is inline. Type 14 is read as
//! typed data (`type`, `id`, `value`), the shape KFX uses for self-describing
//! records.
//!
//! Decoding is permissive where the symbol and type universe is incomplete:
//! unknown symbol ids resolve to `S<id>` placeholders and unknown type tags are
//! skipped with a warning. Truncated or malformed data is an error.
//!
//! Reference: <https://amazon-ion.github.io/ion-docs/docs/binary.html>

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use super::symbols::SymbolTable;
use crate::error::{Error, Result};
use crate::io::ByteCursor;

/// Ion binary version marker (BVM)
pub const ION_MAGIC: [u8; 4] = [0xe0, 0x01, 0x00, 0xea];

/// Default bound on nested lists, structs and typed data.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Ion type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum IonType {
    Null = 0,
    Bool = 1,
    PosInt = 2,
    NegInt = 3,
    Float = 4,
    Decimal = 5,
    Timestamp = 6,
    Symbol = 7,
    String = 8,
    Clob = 9,
    Blob = 10,
    List = 11,
    Sexp = 12,
    Struct = 13,
    TypedData = 14,
}

impl IonType {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(IonType::Null),
            1 => Some(IonType::Bool),
            2 => Some(IonType::PosInt),
            3 => Some(IonType::NegInt),
            4 => Some(IonType::Float),
            5 => Some(IonType::Decimal),
            6 => Some(IonType::Timestamp),
            7 => Some(IonType::Symbol),
            8 => Some(IonType::String),
            9 => Some(IonType::Clob),
            10 => Some(IonType::Blob),
            11 => Some(IonType::List),
            12 => Some(IonType::Sexp),
            13 => Some(IonType::Struct),
            14 => Some(IonType::TypedData),
            _ => None, // Reserved (15)
        }
    }
}

/// Exact decimal: `mantissa × 10^scale`.
///
/// Equality compares values, so `100e1` equals `1000e0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decimal {
    pub mantissa: i64,
    pub scale: i32,
}

impl Decimal {
    pub const fn new(mantissa: i64, scale: i32) -> Self {
        Self { mantissa, scale }
    }

    /// Nearest binary float, for display and JSON output.
    pub fn to_f64(self) -> f64 {
        let mantissa = self.mantissa as f64;
        if self.scale < 0 {
            mantissa / 10f64.powi(-self.scale)
        } else {
            mantissa * 10f64.powi(self.scale)
        }
    }

    /// Same value with trailing zeros moved from the mantissa into the scale.
    fn normalized(self) -> Self {
        if self.mantissa == 0 {
            return Self::default();
        }
        let (mut mantissa, mut scale) = (self.mantissa, self.scale);
        while mantissa % 10 == 0 {
            mantissa /= 10;
            scale += 1;
        }
        Self { mantissa, scale }
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.normalized(), other.normalized());
        a.mantissa == b.mantissa && a.scale == b.scale
    }
}

impl Eq for Decimal {}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();
        if self.mantissa == 0 && self.scale >= 0 {
            return f.write_str("0");
        }
        if self.scale >= 0 {
            return write!(f, "{sign}{digits}{}", "0".repeat(self.scale as usize));
        }
        let frac = self.scale.unsigned_abs() as usize;
        if digits.len() > frac {
            let (int, dec) = digits.split_at(digits.len() - frac);
            write!(f, "{sign}{int}.{dec}")
        } else {
            write!(f, "{sign}0.{}{digits}", "0".repeat(frac - digits.len()))
        }
    }
}

/// A self-describing record: resolved type name, resolved id name and value.
///
/// Top-level container entities and embedded typed data both decode to this.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub type_name: String,
    pub id_name: String,
    pub value: IonValue,
}

impl TypedValue {
    pub fn new(type_name: impl Into<String>, id_name: impl Into<String>, value: IonValue) -> Self {
        Self {
            type_name: type_name.into(),
            id_name: id_name.into(),
            value,
        }
    }
}

/// Decoded Ion value.
///
/// Symbols are resolved to names at decode time. Structs keep their fields in
/// the order they appear in the data; a repeated field name replaces the
/// earlier value in place.
#[derive(Debug, Clone, PartialEq)]
pub enum IonValue {
    Null,
    Bool(bool),
    /// Sign comes from the type tag, magnitude is up to 64 bits.
    Int(i128),
    Float(f64),
    Decimal(Decimal),
    Timestamp(NaiveDateTime),
    Symbol(String),
    String(String),
    Clob(String),
    Blob(Vec<u8>),
    List(Vec<IonValue>),
    Sexp(Vec<IonValue>),
    Struct(Vec<(String, IonValue)>),
    Typed(Box<TypedValue>),
}

impl IonValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, IonValue::Null)
    }

    /// Text of a string, symbol or clob.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            IonValue::String(s) | IonValue::Symbol(s) | IonValue::Clob(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value if it fits in an i64.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            IonValue::Int(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            IonValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            IonValue::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Items of a list or s-expression.
    #[inline]
    pub fn as_list(&self) -> Option<&[IonValue]> {
        match self {
            IonValue::List(items) | IonValue::Sexp(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_struct(&self) -> Option<&[(String, IonValue)]> {
        match self {
            IonValue::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    #[inline]
    pub fn as_typed(&self) -> Option<&TypedValue> {
        match self {
            IonValue::Typed(typed) => Some(typed),
            _ => None,
        }
    }

    /// Get a struct field by name. O(n) scan, structs here are small.
    pub fn get(&self, name: &str) -> Option<&IonValue> {
        self.as_struct()?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Whether the value counts as set: not null, false, zero or empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            IonValue::Null => false,
            IonValue::Bool(b) => *b,
            IonValue::Int(n) => *n != 0,
            IonValue::Float(f) => *f != 0.0,
            IonValue::Decimal(d) => d.mantissa != 0,
            IonValue::Symbol(s) | IonValue::String(s) | IonValue::Clob(s) => !s.is_empty(),
            IonValue::Blob(b) => !b.is_empty(),
            IonValue::List(items) | IonValue::Sexp(items) => !items.is_empty(),
            IonValue::Struct(fields) => !fields.is_empty(),
            IonValue::Timestamp(_) | IonValue::Typed(_) => true,
        }
    }
}

/// Decode one magic-prefixed Ion value.
pub fn decode(data: &[u8], symbols: &SymbolTable) -> Result<IonValue> {
    IonParser::new(data, symbols).parse()
}

/// Decode a magic-prefixed Ion stream holding a bare sequence of values.
pub fn decode_many(data: &[u8], symbols: &SymbolTable) -> Result<Vec<IonValue>> {
    IonParser::new(data, symbols).parse_all()
}

/// Ion binary parser.
pub struct IonParser<'a, 's> {
    cursor: ByteCursor<'a>,
    symbols: &'s SymbolTable,
    depth: usize,
    max_depth: usize,
}

impl<'a, 's> IonParser<'a, 's> {
    /// Create a new parser for the given data.
    #[inline]
    pub fn new(data: &'a [u8], symbols: &'s SymbolTable) -> Self {
        Self {
            cursor: ByteCursor::new(data),
            symbols,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parser over a nested payload, one level deeper.
    fn child(&self, data: &'a [u8]) -> Result<Self> {
        let depth = self.depth + 1;
        if depth > self.max_depth {
            return Err(Error::DepthExceeded(self.max_depth));
        }
        Ok(Self {
            cursor: ByteCursor::new(data),
            symbols: self.symbols,
            depth,
            max_depth: self.max_depth,
        })
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Parse Ion data starting with the BVM marker.
    pub fn parse(&mut self) -> Result<IonValue> {
        self.check_magic()?;
        self.parse_value()
    }

    /// Parse every value following the BVM marker.
    pub fn parse_all(&mut self) -> Result<Vec<IonValue>> {
        self.check_magic()?;
        self.parse_values()
    }

    fn check_magic(&mut self) -> Result<()> {
        let found = self.cursor.peek(ION_MAGIC.len().min(self.remaining()))?;
        if found != ION_MAGIC {
            return Err(Error::Format {
                context: "ION",
                found: found.to_vec(),
            });
        }
        self.cursor.advance(ION_MAGIC.len())
    }

    /// Parse values until the data is exhausted.
    pub fn parse_values(&mut self) -> Result<Vec<IonValue>> {
        let mut items = Vec::new();
        while !self.cursor.is_empty() {
            items.push(self.parse_value()?);
        }
        Ok(items)
    }

    /// Parse a single Ion value at current position.
    pub fn parse_value(&mut self) -> Result<IonValue> {
        let type_byte = self.cursor.read_u8()?;
        let type_code = type_byte >> 4;
        let length_code = type_byte & 0x0f;

        let length = if length_code == 14 {
            let length = read_varuint(&mut self.cursor)?;
            usize::try_from(length).map_err(|_| Error::UnexpectedEof {
                needed: usize::MAX,
                remaining: self.remaining(),
            })?
        } else {
            length_code as usize
        };

        let Some(ion_type) = IonType::from_nibble(type_code) else {
            warn!(type_code, length, "encountered unknown data type, skipping");
            self.cursor.advance(length)?;
            return Ok(IonValue::Null);
        };

        // Null ignores its length and bool carries its value in it; neither
        // has a payload
        let payload = match ion_type {
            IonType::Null | IonType::Bool => &[][..],
            _ => self.cursor.extract(length)?,
        };

        match ion_type {
            IonType::Null => Ok(IonValue::Null),

            IonType::Bool => Ok(IonValue::Bool(length != 0)),

            IonType::PosInt => Ok(IonValue::Int(uint(payload)? as i128)),

            IonType::NegInt => Ok(IonValue::Int(-(uint(payload)? as i128))),

            IonType::Float => match length {
                0 => Ok(IonValue::Float(0.0)),
                8 => ByteCursor::new(payload).read_f64_be().map(IonValue::Float),
                _ => Err(Error::UnsupportedEncoding(format!(
                    "{length}-byte float (only 8-byte floats are supported)"
                ))),
            },

            IonType::Decimal => decode_decimal(payload).map(IonValue::Decimal),

            IonType::Timestamp => decode_timestamp(payload).map(IonValue::Timestamp),

            IonType::Symbol => Ok(IonValue::Symbol(self.symbols.resolve(uint(payload)?))),

            IonType::String => Ok(IonValue::String(std::str::from_utf8(payload)?.to_string())),

            IonType::Clob => Ok(IonValue::Clob(std::str::from_utf8(payload)?.to_string())),

            IonType::Blob => Ok(IonValue::Blob(payload.to_vec())),

            IonType::List => self.child(payload)?.parse_values().map(IonValue::List),

            IonType::Sexp => self.child(payload)?.parse_values().map(IonValue::Sexp),

            IonType::Struct => {
                let mut inner = self.child(payload)?;
                let mut fields: Vec<(String, IonValue)> = Vec::new();
                while !inner.cursor.is_empty() {
                    let name = self.symbols.resolve(read_varuint(&mut inner.cursor)?);
                    let value = inner.parse_value()?;
                    match fields.iter_mut().find(|(k, _)| *k == name) {
                        Some(field) => field.1 = value,
                        None => fields.push((name, value)),
                    }
                }
                Ok(IonValue::Struct(fields))
            }

            IonType::TypedData => {
                let mut inner = self.child(payload)?;
                let type_name = self.symbols.resolve(read_varuint(&mut inner.cursor)?);
                let id_name = self.symbols.resolve(read_varuint(&mut inner.cursor)?);
                let value = inner.parse_value()?;
                expect_consumed(length, inner.remaining())?;
                Ok(IonValue::Typed(Box::new(TypedValue {
                    type_name,
                    id_name,
                    value,
                })))
            }
        }
    }
}

/// Read a VarUInt: 7 bits per byte, most significant group first, high bit
/// set on the last byte.
pub fn read_varuint(cursor: &mut ByteCursor<'_>) -> Result<u64> {
    let mut result: u64 = 0;
    loop {
        let byte = cursor.read_u8()?;
        if result > u64::MAX >> 7 {
            return Err(Error::UnsupportedEncoding(
                "VarUInt does not fit in 64 bits".to_string(),
            ));
        }
        result = (result << 7) | (byte & 0x7f) as u64;
        if byte & 0x80 != 0 {
            return Ok(result);
        }
    }
}

/// Read a single-byte VarInt: high bit marks the last byte, next bit is the
/// sign, the low six bits the magnitude. Longer VarInts are rejected.
pub fn read_signed_number(cursor: &mut ByteCursor<'_>) -> Result<i32> {
    let byte = cursor.read_u8()?;
    if byte & 0x80 == 0 {
        return Err(Error::UnsupportedEncoding(
            "encountered multi-byte signed number".to_string(),
        ));
    }
    if byte & 0x40 != 0 {
        return Ok(-((byte & 0x3f) as i32));
    }
    Ok((byte & 0x7f) as i32)
}

/// Unsigned big-endian integer filling the whole slice.
fn uint(bytes: &[u8]) -> Result<u64> {
    ByteCursor::new(bytes).read_uint_be(bytes.len())
}

/// Signed-magnitude big-endian integer: the top bit of the first byte is the sign.
fn signed_int(bytes: &[u8]) -> Result<i64> {
    let Some((&first, rest)) = bytes.split_first() else {
        return Ok(0);
    };
    if bytes.len() > 8 {
        return Err(Error::UnsupportedEncoding(format!(
            "{}-byte decimal coefficient does not fit in 64 bits",
            bytes.len()
        )));
    }
    let magnitude = rest
        .iter()
        .fold((first & 0x7f) as u64, |acc, &b| (acc << 8) | b as u64);
    let magnitude = i64::try_from(magnitude).map_err(|_| {
        Error::UnsupportedEncoding("decimal coefficient does not fit in 64 bits".to_string())
    })?;
    Ok(if first & 0x80 != 0 { -magnitude } else { magnitude })
}

fn decode_decimal(payload: &[u8]) -> Result<Decimal> {
    if payload.is_empty() {
        return Ok(Decimal::default());
    }
    let mut cursor = ByteCursor::new(payload);
    let scale = read_signed_number(&mut cursor)?;
    let mantissa = signed_int(cursor.rest())?;
    Ok(Decimal::new(mantissa, scale))
}

fn decode_timestamp(payload: &[u8]) -> Result<NaiveDateTime> {
    let mut cursor = ByteCursor::new(payload);
    read_varuint(&mut cursor)?; // offset, unused
    let mut field = || -> Result<u32> {
        let n = read_varuint(&mut cursor)?;
        u32::try_from(n).map_err(|_| {
            Error::UnsupportedEncoding(format!("timestamp field {n} out of range"))
        })
    };
    let year = field()?;
    let month = field()?;
    let day = field()?;
    let hour = field()?;
    let minute = field()?;
    let second = field()?;

    // Trailing fraction field, unused
    if !cursor.is_empty() {
        read_varuint(&mut cursor)?;
    }
    expect_consumed(payload.len(), cursor.remaining())?;

    i32::try_from(year)
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, month, day))
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| {
            Error::UnsupportedEncoding(format!(
                "invalid timestamp {year}-{month}-{day} {hour}:{minute}:{second}"
            ))
        })
}

/// Post-condition: the sub-fields of a value used exactly its declared length.
fn expect_consumed(declared: usize, remaining: usize) -> Result<()> {
    if remaining != 0 {
        return Err(Error::LengthMismatch {
            declared,
            consumed: declared - remaining,
        });
    }
    Ok(())
}
