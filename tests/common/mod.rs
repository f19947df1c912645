//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use kfxmeta::IonValue;
use kfxmeta::kfx::serialization::ContainerBuilder;

pub const COVER_JPEG: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00\x01";

/// Local symbols of the sample book, numbered 900 onwards.
pub const DOC_SYMBOLS: &[&str] = &["cover_res", "cover_img", "storyline", "c0"];

pub fn string(s: &str) -> IonValue {
    IonValue::String(s.to_string())
}

pub fn symbol(s: &str) -> IonValue {
    IonValue::Symbol(s.to_string())
}

pub fn record(key: &str, value: IonValue) -> IonValue {
    IonValue::Struct(vec![("key".into(), string(key)), ("value".into(), value)])
}

pub fn book_metadata(records: Vec<IonValue>) -> IonValue {
    IonValue::Struct(vec![(
        "categorised_metadata".into(),
        IonValue::List(vec![IonValue::Struct(vec![(
            "metadata".into(),
            IonValue::List(records),
        )])]),
    )])
}

/// A Standard Ebooks style KFX book: categorised metadata, a flat metadata
/// entity, a cover chain and one content entity.
pub fn sample_book() -> ContainerBuilder {
    let max_id = 900 + DOC_SYMBOLS.len() as u64 - 1;
    ContainerBuilder::new()
        .doc_symbols(DOC_SYMBOLS, max_id)
        .unwrap()
        .ion_entity(
            "book_metadata",
            "book_metadata",
            &book_metadata(vec![
                record("title", string("Short Works")),
                record("author", string("Epictetus")),
                record("author", string("George Long")),
                record("ASIN", string("B000FC1PWA")),
                record("cde_content_type", string("EBOK")),
                record("cover_image", symbol("cover_res")),
            ]),
        )
        .unwrap()
        .ion_entity(
            "metadata",
            "S258",
            &IonValue::Struct(vec![("language".into(), string("en"))]),
        )
        .unwrap()
        .ion_entity(
            "external_resource",
            "cover_res",
            &IonValue::Struct(vec![("location".into(), symbol("cover_img"))]),
        )
        .unwrap()
        .raw_entity("bcRawMedia", "cover_img", COVER_JPEG)
        .unwrap()
        .ion_entity(
            "storyline",
            "c0",
            &IonValue::Struct(vec![("description".into(), string("Enchiridion"))]),
        )
        .unwrap()
}

pub fn sample_book_bytes() -> Vec<u8> {
    sample_book().build().unwrap()
}
