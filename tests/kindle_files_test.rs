//! Filesystem-backed tests: Kindle documents directories, sidecars and
//! KDF databases.

mod common;

use std::fs;
use std::path::Path;

use common::*;
use kfxmeta::kfx::reader::{DRMION_MAGIC, sidecar_path};
use kfxmeta::{DecodeOptions, Decoded, Error, IonValue, decode_file, read_kindle_metadata};
use tempfile::TempDir;

fn drmion_book() -> Vec<u8> {
    let mut data = DRMION_MAGIC.to_vec();
    data.extend_from_slice(b"encrypted payload");
    data.extend_from_slice(&[0u8; 8]);
    data
}

fn write_sidecar(book: &Path, data: &[u8]) {
    let sidecar = sidecar_path(book);
    fs::create_dir_all(sidecar.parent().unwrap()).unwrap();
    fs::write(sidecar, data).unwrap();
}

#[test]
fn test_read_plain_kfx() {
    let dir = TempDir::new().unwrap();
    let book = dir.path().join("Short Works_B000FC1PWA.kfx");
    fs::write(&book, sample_book_bytes()).unwrap();

    let metadata = read_kindle_metadata(&book).unwrap();
    assert_eq!(metadata.title(), Some("Short Works"));
    assert_eq!(metadata.cover_image_data(), Some(COVER_JPEG));
}

#[test]
fn test_encrypted_book_reads_sidecar() {
    let dir = TempDir::new().unwrap();
    let book = dir.path().join("book.kfx");
    fs::write(&book, drmion_book()).unwrap();
    write_sidecar(&book, &sample_book_bytes());

    let metadata = read_kindle_metadata(&book).unwrap();
    assert_eq!(metadata.asin(), Some("B000FC1PWA"));
    assert_eq!(metadata.cde_content_type(), Some("EBOK"));
}

#[test]
fn test_encrypted_book_without_sidecar() {
    let dir = TempDir::new().unwrap();
    let book = dir.path().join("book.kfx");
    fs::write(&book, drmion_book()).unwrap();

    assert!(matches!(read_kindle_metadata(&book), Err(Error::Io(_))));
}

#[test]
fn test_sidecar_must_be_container() {
    let dir = TempDir::new().unwrap();
    let book = dir.path().join("book.kfx");
    fs::write(&book, drmion_book()).unwrap();
    write_sidecar(&book, &drmion_book());

    assert!(matches!(
        read_kindle_metadata(&book),
        Err(Error::Format { context: "CONT", .. })
    ));
}

#[test]
fn test_one_bad_file_does_not_stop_a_batch() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.kfx"), sample_book_bytes()).unwrap();
    fs::write(dir.path().join("b.kfx"), b"not a book").unwrap();
    fs::write(dir.path().join("c.kfx"), sample_book_bytes()).unwrap();

    let mut names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    names.sort();

    let results: Vec<_> = names.iter().map(read_kindle_metadata).collect();
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
}

#[test]
fn test_decode_drmion_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fragment.ion");
    let mut data = DRMION_MAGIC.to_vec();
    data.extend_from_slice(&[0xe0, 0x01, 0x00, 0xea, 0x83, b'a', b'b', b'c', 0x21, 0x07]);
    data.extend_from_slice(&[0u8; 8]);
    fs::write(&path, data).unwrap();

    let decoded = decode_file(&path, &DecodeOptions::default()).unwrap();
    assert_eq!(
        decoded,
        Decoded::Values(vec![IonValue::String("abc".into()), IonValue::Int(7)])
    );
}

#[cfg(feature = "kdf")]
mod kdf {
    use super::*;
    use kfxmeta::kfx::serialization::encode_document;
    use kfxmeta::{KdfDatabase, SymbolTable, TypedValue, extract_metadata};
    use rusqlite::{Connection, params};

    fn annotated(type_name: &str, value: IonValue) -> Vec<u8> {
        let typed = TypedValue::new("S1", type_name, value);
        encode_document(&IonValue::Typed(Box::new(typed)), &SymbolTable::builtin()).unwrap()
    }

    fn write_kdf(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE fragments (id TEXT PRIMARY KEY, payload_type TEXT, payload_value BLOB);",
        )
        .unwrap();

        let rows = [
            (
                "book_metadata",
                annotated(
                    "book_metadata",
                    book_metadata(vec![
                        record("title", string("Short Works")),
                        record("author", string("Epictetus")),
                    ]),
                ),
            ),
            (
                "S258",
                annotated(
                    "metadata",
                    IonValue::Struct(vec![("language".into(), string("en"))]),
                ),
            ),
            (
                "c0",
                annotated("reading_orders", IonValue::List(vec![])),
            ),
        ];
        for (id, payload) in rows {
            conn.execute(
                "INSERT INTO fragments VALUES (?1, 'blob', ?2)",
                params![id, payload],
            )
            .unwrap();
        }
        conn.execute("INSERT INTO fragments VALUES ('max_id', 'blob', x'00')", [])
            .unwrap();
        conn.execute("INSERT INTO fragments VALUES ('$ion_symbol_table', 'path', 'x')", [])
            .unwrap();
    }

    #[test]
    fn test_decode_kdf_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.kdf");
        write_kdf(&path);

        let Decoded::Entities(entities) = decode_file(&path, &DecodeOptions::default()).unwrap()
        else {
            panic!("expected entities");
        };
        assert_eq!(entities.len(), 3);

        let metadata = extract_metadata(&entities);
        assert_eq!(metadata.title(), Some("Short Works"));
        assert_eq!(metadata.author(), Some("Epictetus"));
        assert_eq!(metadata.language(), Some("en"));
    }

    #[test]
    fn test_kdf_metadata_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.kdf");
        write_kdf(&path);

        let db = KdfDatabase::open(&path).unwrap();
        assert_eq!(db.fragments().len(), 5);
        let entities = db.decode(&DecodeOptions::metadata_only()).unwrap();
        let types: Vec<_> = entities.iter().map(|e| e.type_name.as_str()).collect();
        assert_eq!(types, vec!["book_metadata", "metadata"]);
    }

    #[test]
    fn test_missing_kdf_is_error() {
        let dir = TempDir::new().unwrap();
        let result = KdfDatabase::open(dir.path().join("missing.kdf"));
        assert!(matches!(result, Err(Error::Sqlite(_))));
    }
}
