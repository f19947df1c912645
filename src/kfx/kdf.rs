//! KDF fragment store.
//!
//! Kindle Previewer writes books as `book.kdf`, an SQLite database whose
//! `fragments` table holds `(id, payload_type, payload_value)` rows. Blob rows
//! are packed Ion documents equivalent to KFX entities, so they decode into
//! the same [`TypedValue`] shape.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::EntitySource;
use super::container::METADATA_ENTITY_TYPES;
use super::ion::{IonParser, IonValue, TypedValue};
use super::options::DecodeOptions;
use super::symbols::{SymbolTable, builtin_name};
use crate::error::Result;

/// One row of the `fragments` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub id: String,
    pub payload_type: String,
    /// Raw bytes for blob payloads; other payload kinds are not needed here.
    pub payload: Option<Vec<u8>>,
}

/// Fragments loaded from a KDF database.
#[derive(Debug, Clone, Default)]
pub struct KdfDatabase {
    fragments: Vec<Fragment>,
}

impl KdfDatabase {
    /// Read every fragment row from the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(Duration::from_secs(30))?;
        Self::from_connection(&conn)
    }

    pub fn from_connection(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT id, payload_type, payload_value FROM fragments")?;
        let fragments = stmt
            .query_map([], |row| {
                let payload = match row.get::<_, Value>(2)? {
                    Value::Blob(bytes) => Some(bytes),
                    _ => None,
                };
                Ok(Fragment {
                    id: row.get(0)?,
                    payload_type: row.get(1)?,
                    payload,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(fragments = fragments.len(), "KDF fragments");
        Ok(Self { fragments })
    }

    pub fn from_fragments(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Decode every blob fragment except the `max_id` bookkeeping row.
    ///
    /// Each blob is an annotated Ion value; its annotation symbol (the id
    /// half of the decoded typed data) names the fragment type.
    pub fn decode(&self, options: &DecodeOptions) -> Result<Vec<TypedValue>> {
        let symbols = SymbolTable::builtin();
        let mut decoded = Vec::new();

        for fragment in &self.fragments {
            if fragment.payload_type != "blob" || fragment.id == "max_id" {
                continue;
            }
            let Some(payload) = &fragment.payload else {
                debug!(id = %fragment.id, "blob fragment without blob payload");
                continue;
            };

            let value = IonParser::new(payload, &symbols)
                .with_max_depth(options.max_depth)
                .parse()?;
            match value {
                IonValue::Typed(typed)
                    if options.metadata_only && !is_metadata_type(&typed.id_name) => {}
                IonValue::Typed(typed) => decoded.push(TypedValue {
                    type_name: typed.id_name,
                    id_name: fragment.id.clone(),
                    value: typed.value,
                }),
                _ => debug!(id = %fragment.id, "fragment is not typed data, skipping"),
            }
        }

        Ok(decoded)
    }
}

fn is_metadata_type(name: &str) -> bool {
    METADATA_ENTITY_TYPES
        .iter()
        .any(|&id| builtin_name(id as u64) == Some(name))
}

impl EntitySource for KdfDatabase {
    fn decode_entities(&self, options: &DecodeOptions) -> Result<Vec<TypedValue>> {
        self.decode(options)
    }
}
