//! Dot-path field projection over dynamic resource JSON.
//!
//! Replaces jsonpath text scraping with structured access: a path like
//! `status.conditions[0].type` walks object keys and array indices, and a
//! missing segment yields `None` so callers handle absent fields explicitly.

use serde_json::Value;

/// Resolve a dot-path against a JSON value.
///
/// Segments are object keys, optionally suffixed with one or more `[n]`
/// array indices. Returns `None` if any segment is absent or of the wrong
/// shape.
#[must_use]
pub fn project<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        let (key, indices) = parse_segment(segment)?;
        if !key.is_empty() {
            current = current.as_object()?.get(key)?;
        }
        for idx in indices {
            current = current.as_array()?.get(idx)?;
        }
    }
    Some(current)
}

/// Project a path and return it as a string slice, if it is a JSON string.
#[must_use]
pub fn project_str<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    project(value, path).and_then(Value::as_str)
}

/// Split `key[1][2]` into the key and its index suffixes.
fn parse_segment(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(bracket) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };
    let key = &segment[..bracket];
    let mut indices = Vec::new();
    let mut rest = &segment[bracket..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        indices.push(stripped[..close].parse().ok()?);
        rest = &stripped[close + 1..];
    }
    if rest.is_empty() {
        Some((key, indices))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projects_nested_fields() {
        let obj = json!({
            "status": {
                "phase": "Ready",
                "conditions": [
                    {"type": "Available", "status": "True"},
                    {"type": "Degraded", "status": "False"},
                ],
            }
        });

        assert_eq!(project_str(&obj, "status.phase"), Some("Ready"));
        assert_eq!(
            project_str(&obj, "status.conditions[1].type"),
            Some("Degraded")
        );
        assert_eq!(
            project(&obj, "status.conditions[0]"),
            Some(&json!({"type": "Available", "status": "True"}))
        );
    }

    #[test]
    fn missing_segments_yield_none() {
        let obj = json!({"status": {"phase": "Ready"}});
        assert_eq!(project(&obj, "status.missing"), None);
        assert_eq!(project(&obj, "spec.phase"), None);
        assert_eq!(project(&obj, "status.phase[0]"), None);
        assert_eq!(project(&obj, ""), None);
    }

    #[test]
    fn index_out_of_bounds_yields_none() {
        let obj = json!({"items": [1, 2]});
        assert_eq!(project(&obj, "items[5]"), None);
        assert_eq!(project(&obj, "items[1]"), Some(&json!(2)));
    }
}
