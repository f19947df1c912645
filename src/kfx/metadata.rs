//! Book metadata extraction from decoded KFX entities.
//!
//! Metadata comes from two entity types: `book_metadata`, whose
//! `categorised_metadata` list groups `{key, value}` records by category, and
//! `metadata`, a flat struct. Both are merged into one mapping. The cover is
//! found by following `cover_image` to an `external_resource` entity and its
//! `location` to a `bcRawMedia` entity holding the image bytes.

use std::collections::BTreeMap;

use tracing::debug;

use super::ion::{IonValue, TypedValue};
use crate::error::{Error, Result};

/// Key under which the cover image bytes are attached.
pub const COVER_IMAGE_DATA: &str = "cover_image_data";

/// Merged book metadata: field name → value.
///
/// Repeated `author` values accumulate (without duplicates) in an `authors`
/// list; `author` itself keeps the first one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    fields: BTreeMap<String, IonValue>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one metadata field.
    pub fn add(&mut self, key: &str, value: IonValue) {
        if key != "author" {
            self.fields.insert(key.to_string(), value);
            return;
        }
        match self.fields.get_mut("authors") {
            Some(IonValue::List(authors)) => {
                if !authors.contains(&value) {
                    authors.push(value);
                }
            }
            _ => {
                self.fields.insert("author".to_string(), value.clone());
                self.fields
                    .insert("authors".to_string(), IonValue::List(vec![value]));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&IonValue> {
        self.fields.get(key)
    }

    /// Text of a string or symbol field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(IonValue::as_str)
    }

    /// Text field the caller cannot do without.
    pub fn require_str(&self, key: &'static str) -> Result<&str> {
        self.get_str(key).ok_or(Error::MissingField(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    pub fn language(&self) -> Option<&str> {
        self.get_str("language")
    }

    pub fn asin(&self) -> Option<&str> {
        self.get_str("ASIN")
    }

    /// Document type, e.g. `EBOK` or `PDOC`.
    pub fn cde_content_type(&self) -> Option<&str> {
        self.get_str("cde_content_type")
    }

    pub fn author(&self) -> Option<&str> {
        self.get_str("author")
    }

    pub fn authors(&self) -> Vec<&str> {
        self.get("authors")
            .and_then(IonValue::as_list)
            .map(|list| list.iter().filter_map(IonValue::as_str).collect())
            .unwrap_or_default()
    }

    pub fn cover_image_data(&self) -> Option<&[u8]> {
        self.get(COVER_IMAGE_DATA).and_then(IonValue::as_blob)
    }

    /// Fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IonValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Merge metadata from all entities and attach the cover image if it can be
/// resolved. Malformed records are skipped, never fatal.
pub fn extract_metadata(entities: &[TypedValue]) -> Metadata {
    let mut metadata = Metadata::new();

    for entity in entities {
        match entity.type_name.as_str() {
            "book_metadata" => add_categorised(&mut metadata, &entity.value),
            "metadata" => match entity.value.as_struct() {
                Some(fields) => {
                    for (key, value) in fields {
                        metadata.add(key, value.clone());
                    }
                }
                None => debug!(id = %entity.id_name, "metadata entity is not a struct"),
            },
            _ => {}
        }
    }

    let cover = metadata
        .get("cover_image")
        .filter(|v| v.is_truthy())
        .and_then(IonValue::as_str);
    if let Some(data) = cover.and_then(|name| find_cover(entities, name)) {
        metadata.add(COVER_IMAGE_DATA, IonValue::Blob(data.to_vec()));
    }

    metadata
}

fn add_categorised(metadata: &mut Metadata, value: &IonValue) {
    let Some(categories) = value.get("categorised_metadata").and_then(IonValue::as_list) else {
        debug!("book_metadata without categorised_metadata");
        return;
    };

    for category in categories {
        let Some(records) = category.get("metadata").and_then(IonValue::as_list) else {
            continue;
        };
        for record in records {
            match (record.get("key").and_then(IonValue::as_str), record.get("value")) {
                (Some(key), Some(value)) => metadata.add(key, value.clone()),
                _ => debug!(?record, "skipping malformed metadata record"),
            }
        }
    }
}

/// cover_image → external_resource.location → bcRawMedia bytes.
fn find_cover<'e>(entities: &'e [TypedValue], cover: &str) -> Option<&'e [u8]> {
    let resource = entities
        .iter()
        .find(|e| e.type_name == "external_resource" && e.id_name == cover)?;

    let Some(location) = resource.value.get("location").and_then(IonValue::as_str) else {
        debug!(cover, "external resource has no location");
        return None;
    };

    let media = entities
        .iter()
        .find(|e| e.type_name == "bcRawMedia" && e.id_name == location);
    if media.is_none() {
        debug!(cover, location, "no raw media for cover");
    }
    media?.value.as_blob()
}
