//! Best-effort field extraction from raw objects
//!
//! All access to schema-less item JSON goes through these helpers. A missing
//! path or a value of the wrong type reads as `None`; nothing here fails.

use serde_json::{Map, Value};

/// Value at `path`, descending through objects only.
pub fn field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.as_object()?.get(*key))
}

/// String at `path`.
pub fn str_field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    field(value, path)?.as_str()
}

/// Non-empty string at `path`.
pub fn non_empty_str_field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    str_field(value, path).filter(|s| !s.is_empty())
}

/// Array at `path`.
pub fn array_field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Vec<Value>> {
    field(value, path)?.as_array()
}

/// Object at `path`.
pub fn object_field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Map<String, Value>> {
    field(value, path)?.as_object()
}
