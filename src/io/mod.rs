//! Bounds-checked reading over in-memory byte buffers.

mod cursor;

pub use cursor::{ByteCursor, slice_at};
