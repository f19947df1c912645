//! KFX symbol tables.
//!
//! Ion data refers to field names, types and entity ids by number. The full
//! `YJ_symbols` table Amazon ships with its readers is not reproduced here;
//! the built-in table only names the symbols needed to find book metadata and
//! the container's own bookkeeping fields. Every other id resolves to a
//! placeholder of the form `S<id>` instead of failing.
//!
//! A container can carry its own symbol table (the "document symbols"), which
//! is overlaid on the built-in one.

use std::collections::HashMap;

use tracing::debug;

use super::ion::{IonParser, IonValue};
use crate::error::{Error, Result};

/// Ion system symbols followed by the metadata-related subset of `YJ_symbols`.
///
/// Sorted by id.
pub const KFX_SYMBOL_TABLE: &[(u64, &str)] = &[
    (1, "$ion"),
    (2, "$ion_1_0"),
    (3, "$ion_symbol_table"),
    (4, "name"),
    (5, "version"),
    (6, "imports"),
    (7, "symbols"),
    (8, "max_id"),
    (9, "$ion_shared_symbol_table"),
    (10, "language"),
    (153, "title"),
    (154, "description"),
    (164, "external_resource"),
    (165, "location"),
    (169, "reading_orders"),
    (222, "author"),
    (224, "ASIN"),
    (232, "publisher"),
    (251, "cde_content_type"),
    (258, "metadata"),
    (307, "value"),
    (413, "bcIndexTabOffset"),
    (414, "bcIndexTabLength"),
    (415, "bcDocSymbolOffset"),
    (416, "bcDocSymbolLength"),
    (417, "bcRawMedia"),
    (424, "cover_image"),
    (490, "book_metadata"),
    (491, "categorised_metadata"),
    (492, "key"),
];

/// Number of Ion system symbols; shared imports start right after them.
const ION_SYSTEM_SYMBOLS: u64 = 9;

/// Look up a built-in symbol name.
pub fn builtin_name(id: u64) -> Option<&'static str> {
    KFX_SYMBOL_TABLE
        .binary_search_by_key(&id, |&(sid, _)| sid)
        .ok()
        .map(|i| KFX_SYMBOL_TABLE[i].1)
}

/// Look up a built-in symbol id by name.
pub fn builtin_id(name: &str) -> Option<u64> {
    KFX_SYMBOL_TABLE
        .iter()
        .find(|&&(_, s)| s == name)
        .map(|&(id, _)| id)
}

/// Symbol id → name mapping: the built-in table plus document-local symbols.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    local: HashMap<u64, String>,
}

impl SymbolTable {
    /// The built-in table with no document symbols.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Overlay document symbols numbered so that the last one is `max_id`.
    pub fn with_document_symbols<S: AsRef<str>>(symbols: &[S], max_id: u64) -> Result<Self> {
        let count = symbols.len() as u64;
        if count > max_id + 1 {
            return Err(Error::UnsupportedEncoding(format!(
                "{count} document symbols cannot end at max_id {max_id}"
            )));
        }
        let mut table = Self::builtin();
        table.extend(max_id + 1 - count, symbols);
        Ok(table)
    }

    /// Build the table for a container from its symbol data region, if any.
    ///
    /// The region is one Ion value (optionally wrapped as typed data, the way
    /// an annotated `$ion_symbol_table` decodes) holding a `symbols` list.
    /// Numbering comes from a top-level `max_id` when present, otherwise the
    /// local symbols follow the system symbols and every import's `max_id`.
    pub fn from_symbol_data(data: Option<&[u8]>, max_depth: usize) -> Result<Self> {
        let Some(data) = data else {
            return Ok(Self::builtin());
        };

        let builtin = Self::builtin();
        let decoded = IonParser::new(data, &builtin)
            .with_max_depth(max_depth)
            .parse()?;
        let table = match &decoded {
            IonValue::Typed(typed) => &typed.value,
            other => other,
        };

        let symbols: Vec<&str> = table
            .get("symbols")
            .and_then(IonValue::as_list)
            .ok_or(Error::MissingField("symbols"))?
            .iter()
            .map(|sym| sym.as_str().unwrap_or_default())
            .collect();

        let max_id = match table.get("max_id").and_then(IonValue::as_int) {
            Some(max_id) => u64::try_from(max_id).map_err(|_| {
                Error::UnsupportedEncoding(format!("negative max_id {max_id}"))
            })?,
            None => {
                let imported = imported_max_id(table).ok_or(Error::MissingField("max_id"))?;
                ION_SYSTEM_SYMBOLS + imported + symbols.len() as u64
            }
        };

        debug!(count = symbols.len(), max_id, "document symbol table");
        Self::with_document_symbols(&symbols, max_id)
    }

    fn extend<S: AsRef<str>>(&mut self, first_id: u64, symbols: &[S]) {
        for (i, name) in symbols.iter().enumerate() {
            self.local.insert(first_id + i as u64, name.as_ref().to_string());
        }
    }

    /// Resolve an id to its name, or `S<id>` when the id is unknown.
    pub fn resolve(&self, id: u64) -> String {
        self.name(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("S{id}"))
    }

    /// Resolve an id if the table knows it.
    pub fn name(&self, id: u64) -> Option<&str> {
        self.local
            .get(&id)
            .map(String::as_str)
            .or_else(|| builtin_name(id))
    }

    /// Reverse lookup, accepting `S<id>` placeholders for unknown ids.
    pub fn id_of(&self, name: &str) -> Option<u64> {
        self.local
            .iter()
            .find(|(_, s)| s.as_str() == name)
            .map(|(&id, _)| id)
            .or_else(|| builtin_id(name))
            .or_else(|| name.strip_prefix('S')?.parse().ok())
    }

    /// Number of document-local symbols.
    pub fn local_len(&self) -> usize {
        self.local.len()
    }
}

/// Sum of `max_id` over the `imports` list of a symbol table struct.
fn imported_max_id(table: &IonValue) -> Option<u64> {
    let imports = table.get("imports")?.as_list()?;
    imports.iter().try_fold(0u64, |acc, import| {
        let max_id = u64::try_from(import.get("max_id")?.as_int()?).ok()?;
        acc.checked_add(max_id)
    })
}
