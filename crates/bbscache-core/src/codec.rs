//! Serialization adapter between typed values and the remote store's wire form.
//!
//! Values are stored as JSON strings so that hash fields, list members and
//! flat keys all share one representation and stay readable from `redis-cli`.
//! Raw strings bypass this module entirely (`*_raw` store operations), which
//! rules out accidental double encoding.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, Result};

/// Encode a value into its wire representation.
pub fn encode<T>(value: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string(value).map_err(|e| CacheError::serialization(format!("encode: {e}")))
}

/// Decode a wire representation back into a value.
pub fn decode<T>(raw: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_str(raw).map_err(|e| CacheError::serialization(format!("decode: {e}")))
}

/// Whether an encoded value carries no data: `null`, `""`, `[]` or `{}`.
pub fn is_empty_encoding(raw: &str) -> bool {
    matches!(raw.trim(), "null" | "\"\"" | "[]" | "{}")
}

/// Encode every value of a field map, keeping field names untouched.
pub fn encode_fields<'a, T, I>(fields: I) -> Result<Vec<(String, String)>>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = (&'a str, &'a T)>,
{
    fields
        .into_iter()
        .map(|(field, value)| Ok((field.to_string(), encode(value)?)))
        .collect()
}
