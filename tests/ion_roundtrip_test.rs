//! Property tests: values written by `IonWriter` decode back unchanged.

use chrono::{NaiveDate, NaiveDateTime};
use kfxmeta::kfx::ion::{decode, decode_many};
use kfxmeta::kfx::serialization::{IonWriter, encode_document};
use kfxmeta::{Decimal, IonValue, SymbolTable};
use proptest::prelude::*;

/// Field names with built-in symbol ids.
const FIELD_NAMES: &[&str] = &[
    "title",
    "author",
    "language",
    "description",
    "publisher",
    "location",
    "value",
    "key",
];

fn timestamp() -> impl Strategy<Value = NaiveDateTime> {
    (1970i32..2100, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60).prop_map(
        |(y, mo, d, h, mi, s)| {
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, mi, s)
                .unwrap()
        },
    )
}

fn scalar() -> impl Strategy<Value = IonValue> {
    prop_oneof![
        Just(IonValue::Null),
        any::<bool>().prop_map(IonValue::Bool),
        any::<i64>().prop_map(|n| IonValue::Int(n as i128)),
        any::<u64>().prop_map(|n| IonValue::Int(n as i128)),
        any::<f64>()
            .prop_filter("NaN never compares equal", |f| !f.is_nan())
            .prop_map(IonValue::Float),
        // Single-byte scale, coefficient within 8 bytes
        ((i64::MIN + 1)..=i64::MAX, -63i32..=63)
            .prop_map(|(m, s)| IonValue::Decimal(Decimal::new(m, s))),
        timestamp().prop_map(IonValue::Timestamp),
        "[a-zA-Z0-9 .,'-]{0,40}".prop_map(IonValue::String),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(IonValue::Blob),
        prop::sample::select(FIELD_NAMES).prop_map(|s| IonValue::Symbol(s.to_string())),
    ]
}

fn value() -> impl Strategy<Value = IonValue> {
    scalar().prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(IonValue::List),
            prop::collection::vec(inner.clone(), 0..8).prop_map(IonValue::Sexp),
            prop::collection::btree_map(prop::sample::select(FIELD_NAMES), inner, 0..6)
                .prop_map(|fields| {
                    IonValue::Struct(
                        fields
                            .into_iter()
                            .map(|(name, value)| (name.to_string(), value))
                            .collect(),
                    )
                }),
        ]
    })
}

proptest! {
    #[test]
    fn prop_value_roundtrip(value in value()) {
        let table = SymbolTable::builtin();
        let data = encode_document(&value, &table).unwrap();
        prop_assert_eq!(decode(&data, &table).unwrap(), value);
    }

    #[test]
    fn prop_sequence_roundtrip(values in prop::collection::vec(scalar(), 0..16)) {
        let table = SymbolTable::builtin();
        let mut writer = IonWriter::new(&table);
        writer.write_bvm();
        for value in &values {
            writer.write_value(value).unwrap();
        }
        let data = writer.into_bytes();
        prop_assert_eq!(decode_many(&data, &table).unwrap(), values);
    }

    #[test]
    fn prop_truncation_never_panics(value in value(), cut in any::<prop::sample::Index>()) {
        let table = SymbolTable::builtin();
        let data = encode_document(&value, &table).unwrap();
        let end = cut.index(data.len());
        // Any prefix either decodes or reports an error
        let _ = decode(&data[..end], &table);
    }
}

#[test]
fn test_unknown_type_between_strings() {
    let table = SymbolTable::builtin();
    let data = [
        0xe0, 0x01, 0x00, 0xea, // BVM
        0x85, b'f', b'i', b'r', b's', b't', // "first"
        0xf4, 0xde, 0xad, 0xbe, 0xef, // reserved type, 4 bytes
        0x86, b's', b'e', b'c', b'o', b'n', b'd', // "second"
    ];
    let values = decode_many(&data, &table).unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(values[0], IonValue::String("first".into()));
    assert_eq!(values[2], IonValue::String("second".into()));
}
