//! Error types for kfxmeta operations.

use thiserror::Error;

/// Errors that can occur while decoding KFX, KDF or Ion data.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "kdf")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Wrong magic number at a container, entity or Ion boundary.
    #[error("{context} magic number is incorrect ({})", hex(.found))]
    Format {
        context: &'static str,
        found: Vec<u8>,
    },

    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// A value's sub-fields did not consume exactly its declared length.
    #[error("declared length {declared} but {consumed} bytes were consumed")]
    LengthMismatch { declared: usize, consumed: usize },

    #[error("nesting deeper than {0} levels")]
    DepthExceeded(usize),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("no symbol id for {0:?}")]
    UnknownSymbol(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[cfg(feature = "json")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Space separated lowercase hex, used for magic numbers in diagnostics.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_shows_magic() {
        let err = Error::Format {
            context: "CONT",
            found: b"PK\x03\x04".to_vec(),
        };
        assert_eq!(err.to_string(), "CONT magic number is incorrect (50 4b 03 04)");
    }

    #[test]
    fn test_eof_message() {
        let err = Error::UnexpectedEof {
            needed: 8,
            remaining: 3,
        };
        assert_eq!(
            err.to_string(),
            "unexpected end of data: needed 8 bytes, 3 remaining"
        );
    }
}
