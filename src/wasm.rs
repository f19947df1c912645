//! WASM bindings for reading Kindle metadata in the browser.
//!
//! This module exposes metadata and cover extraction to JavaScript via wasm-bindgen.

use wasm_bindgen::prelude::*;

use crate::kfx::json::to_json_pretty;
use crate::kindle_metadata_from_bytes;

/// Initialize panic hook for better error messages in the browser console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Extract book metadata from KFX container bytes.
///
/// Returns the merged metadata as a JSON object with sorted keys; the cover
/// image, if found, is the base64 `cover_image_data` field.
#[wasm_bindgen]
pub fn kfx_metadata_json(data: &[u8]) -> Result<String, JsValue> {
    let metadata = kindle_metadata_from_bytes(data).map_err(|e| JsValue::from_str(&e.to_string()))?;
    to_json_pretty(&metadata).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Extract the raw cover image bytes from KFX container bytes.
///
/// Returns `undefined` when the book has no resolvable cover.
#[wasm_bindgen]
pub fn kfx_cover_image(data: &[u8]) -> Result<Option<Vec<u8>>, JsValue> {
    let metadata = kindle_metadata_from_bytes(data).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(metadata.cover_image_data().map(<[u8]>::to_vec))
}
