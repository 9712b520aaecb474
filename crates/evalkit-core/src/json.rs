use crate::error::{AppError, AppResult};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::Digest;

pub const DETERMINISM_FIELD: &str = "determinism_hash";

pub fn to_canonical_value<T: Serialize>(value: &T) -> AppResult<Value> {
    let mut json_value = serde_json::to_value(value)
        .map_err(|e| AppError::internal(format!("json serialize error: {e}")))?;
    sort_json_value(&mut json_value);
    Ok(json_value)
}

pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> AppResult<Vec<u8>> {
    let json_value = to_canonical_value(value)?;
    serde_json::to_vec(&json_value)
        .map_err(|e| AppError::internal(format!("json encode error: {e}")))
}

pub fn to_canonical_json_pretty<T: Serialize>(value: &T) -> AppResult<String> {
    let json_value = to_canonical_value(value)?;
    serde_json::to_string_pretty(&json_value)
        .map_err(|e| AppError::internal(format!("json encode error: {e}")))
}

pub fn determinism_hash_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    hex::encode(digest)
}

/// Wraps `payload` as `{ "<field>": payload, "determinism_hash": sha256 }`.
///
/// The hash covers the canonical bytes of the payload alone, so readers can
/// recompute it from the `field` entry.
pub fn envelope_with_hash<T: Serialize>(field: &str, payload: &T) -> AppResult<Value> {
    if field == DETERMINISM_FIELD {
        return Err(AppError::internal("envelope field collides with hash field"));
    }
    let value = to_canonical_value(payload)?;
    let bytes = serde_json::to_vec(&value)
        .map_err(|e| AppError::internal(format!("json encode error: {e}")))?;
    let mut map = Map::new();
    map.insert(
        DETERMINISM_FIELD.to_string(),
        Value::String(determinism_hash_hex(&bytes)),
    );
    map.insert(field.to_string(), value);
    Ok(Value::Object(map))
}

pub fn verify_envelope(envelope: &Value, field: &str) -> AppResult<bool> {
    let obj = envelope
        .as_object()
        .ok_or_else(|| AppError::validation("envelope must be a json object"))?;
    let expected = obj
        .get(DETERMINISM_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::validation("envelope is missing determinism_hash"))?;
    let payload = obj
        .get(field)
        .ok_or_else(|| AppError::validation(format!("envelope is missing {field}")))?;
    let bytes = to_canonical_json_bytes(payload)?;
    Ok(determinism_hash_hex(&bytes) == expected)
}

fn sort_json_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            let mut new_map = Map::new();
            for key in keys {
                if let Some(mut v) = map.remove(&key) {
                    sort_json_value(&mut v);
                    new_map.insert(key, v);
                }
            }
            *map = new_map;
        }
        Value::Array(items) => {
            for item in items {
                sort_json_value(item);
            }
        }
        _ => {}
    }
}
