//! Post-processing transforms for extracted columns.
//!
//! Each transform takes a dynamic cell (`serde_json::Value`, usually the JSON
//! form of an [`ExtractedValue`](crate::models::ExtractedValue)) and passes
//! inputs of an unexpected shape through as documented per function.

use serde_json::Value;

/// Prefix marking Dag Hammarskjöld Library identifiers in field 035
pub const DHL_PREFIX: &str = "(DHL)";

/// Delimiter used by [`join_values`]
pub const JOIN_DELIMITER: &str = "|";

/// Strings as-is, everything else in its JSON form
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `template` followed by the stringified value, e.g. a record URL from an id
pub fn add_link(value: &Value, template: &str) -> String {
    format!("{}{}", template, stringify(value))
}

/// First list element starting with `(DHL)`, prefix removed and trimmed.
///
/// `null` when no element matches; non-list input is returned unchanged.
pub fn normalize_identifier(value: &Value) -> Value {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|s| s.starts_with(DHL_PREFIX))
            .map(|s| Value::String(s.replace(DHL_PREFIX, "").trim().to_string()))
            .unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Each object of a list turned into its values joined by spaces.
///
/// Non-object elements are skipped; non-list input is returned unchanged.
pub fn flatten(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|group| {
                    Value::String(group.values().map(stringify).collect::<Vec<_>>().join(" "))
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// List elements stringified and joined with `|`; non-list input is returned unchanged
pub fn join_values(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(stringify)
                .collect::<Vec<_>>()
                .join(JOIN_DELIMITER),
        ),
        other => other.clone(),
    }
}

/// Values stored under `key` across the objects of a list.
///
/// `null` when no object has the key or the input is not a list.
pub fn project_subfield(value: &Value, key: &str) -> Value {
    let Value::Array(items) = value else {
        return Value::Null;
    };

    let values: Vec<Value> = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|group| group.get(key).cloned())
        .collect();

    if values.is_empty() {
        Value::Null
    } else {
        Value::Array(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_link() {
        assert_eq!(
            add_link(&json!("4012345"), "https://digitallibrary.un.org/record/"),
            "https://digitallibrary.un.org/record/4012345"
        );
        assert_eq!(add_link(&json!(17), "id-"), "id-17");
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(
            normalize_identifier(&json!(["(DHL)12345 ", "other"])),
            json!("12345")
        );
        assert_eq!(
            normalize_identifier(&json!(["(OCoLC)1", 5, "(DHL) 777"])),
            json!("777")
        );
        assert_eq!(normalize_identifier(&json!(["other"])), Value::Null);
        assert_eq!(normalize_identifier(&json!("scalar")), json!("scalar"));
    }

    #[test]
    fn test_flatten() {
        assert_eq!(
            flatten(&json!([{"a": "Security Council", "b": "1990"}, "skip", {"a": "GA"}])),
            json!(["Security Council 1990", "GA"])
        );
        assert_eq!(flatten(&Value::Null), Value::Null);
    }

    #[test]
    fn test_join_values() {
        assert_eq!(join_values(&json!(["a", "b"])), json!("a|b"));
        assert_eq!(join_values(&json!([])), json!(""));
        assert_eq!(join_values(&json!(5)), json!(5));
    }

    #[test]
    fn test_project_subfield() {
        let groups = json!([{"a": 1}, {"b": 2}, {"a": 3}]);
        assert_eq!(project_subfield(&groups, "a"), json!([1, 3]));
        assert_eq!(project_subfield(&groups, "z"), Value::Null);
        assert_eq!(project_subfield(&json!("x"), "a"), Value::Null);
    }

    #[test]
    fn test_transforms_on_extracted_values() {
        use crate::models::{ExtractedValue, FieldGroup};

        let mut group = FieldGroup::new();
        group.insert("a".to_string(), "PEACE".to_string());
        group.insert("b".to_string(), "SECURITY".to_string());

        let cell: Value = ExtractedValue::FieldGroups(vec![group]).into();
        assert_eq!(join_values(&flatten(&cell)), json!("PEACE SECURITY"));
        assert_eq!(project_subfield(&cell, "b"), json!(["SECURITY"]));

        let empty: Value = ExtractedValue::Empty.into();
        assert_eq!(join_values(&empty), Value::Null);
    }
}
