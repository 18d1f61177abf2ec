//! Picks one image URL out of a row's embedded image metadata.
//!
//! The catalog stores image descriptors as JSON text inside a single cell:
//! either a list of objects or a lone object. Each descriptor names its role
//! (`role`, or `angle` in older exports) and its `url`.

use serde_json::Value;

const ROLE_KEYS: [&str; 2] = ["role", "angle"];

fn descriptor_role(descriptor: &serde_json::Map<String, Value>) -> Option<&str> {
    ROLE_KEYS
        .iter()
        .find_map(|key| descriptor.get(*key).and_then(Value::as_str))
}

fn descriptor_url<'a>(descriptor: &'a serde_json::Map<String, Value>, role: &str) -> Option<&'a str> {
    let matches_role = descriptor_role(descriptor)
        .map(|r| r.trim().eq_ignore_ascii_case(role))
        .unwrap_or(false);
    if !matches_role {
        return None;
    }
    descriptor
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
}

/// Returns the first URL whose descriptor role equals `role`
/// (case-insensitive), or `None` for missing, empty or malformed text.
///
/// A descriptor with the right role but no usable `url` is passed over.
pub fn extract_role_url(text: Option<&str>, role: &str) -> Option<String> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }
    let parsed: Value = serde_json::from_str(text).ok()?;
    let role = role.trim();

    let url = match &parsed {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .find_map(|d| descriptor_url(d, role)),
        Value::Object(descriptor) => descriptor_url(descriptor, role),
        _ => None,
    };
    url.map(str::to_string)
}
