//! Declarative field-extraction rules.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::UNDL_ID_KEY;

/// Which node a rule extracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Whole data field, rendered as a code -> text map
    Field,
    /// Subfield text
    Subfield,
}

/// A caller-declared extraction rule.
///
/// `code: None` and `code: Some("")` are different rules: the former stops at
/// the data field, the latter selects subfields whose code is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Data field tag, e.g. "191"
    pub field: String,

    pub element: ElementKind,

    #[serde(default)]
    pub code: Option<String>,

    /// First indicator filter
    #[serde(default)]
    pub ind1: Option<String>,

    /// Output key
    pub name: String,
}

impl FieldSpec {
    /// Rule extracting whole data fields
    pub fn field(tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            field: tag.into(),
            element: ElementKind::Field,
            code: None,
            ind1: None,
            name: name.into(),
        }
    }

    /// Rule extracting the text of subfields with the given code
    pub fn subfield(tag: impl Into<String>, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            field: tag.into(),
            element: ElementKind::Subfield,
            code: Some(code.into()),
            ind1: None,
            name: name.into(),
        }
    }

    /// Narrow to fields carrying this first indicator
    pub fn with_ind1(mut self, ind1: impl Into<String>) -> Self {
        self.ind1 = Some(ind1.into());
        self
    }

    /// Narrow a field rule to a subfield code while keeping its element kind
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// TOML layout: a list of `[[fields]]` tables
#[derive(Debug, Deserialize)]
struct FieldSpecTable {
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

/// Errors loading a rule file
#[derive(Debug, thiserror::Error)]
pub enum FieldSpecError {
    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Rule name '{name}' in {path} is reserved for the record identifier")]
    ReservedName { path: String, name: String },
}

/// Parse rules from a JSON array
pub fn parse_field_specs_json(content: &str) -> Result<Vec<FieldSpec>, serde_json::Error> {
    serde_json::from_str(content)
}

/// Parse rules from TOML `[[fields]]` tables
pub fn parse_field_specs_toml(content: &str) -> Result<Vec<FieldSpec>, toml::de::Error> {
    toml::from_str::<FieldSpecTable>(content).map(|t| t.fields)
}

/// Load rules from a `.json` or `.toml` file (JSON unless the extension says otherwise)
pub fn load_field_specs(path: &Path) -> Result<Vec<FieldSpec>, FieldSpecError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| FieldSpecError::Io {
        path: display.clone(),
        message: e.to_string(),
    })?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let parsed = if is_toml {
        parse_field_specs_toml(&content).map_err(|e| e.to_string())
    } else {
        parse_field_specs_json(&content).map_err(|e| e.to_string())
    };

    let specs = parsed.map_err(|message| FieldSpecError::Parse {
        path: display.clone(),
        message,
    })?;

    if let Some(spec) = specs.iter().find(|s| s.name == UNDL_ID_KEY) {
        return Err(FieldSpecError::ReservedName {
            path: display,
            name: spec.name.clone(),
        });
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_json_code_absent_vs_empty() {
        let specs = parse_field_specs_json(
            r#"[
                {"field": "191", "element": "field", "name": "symbols"},
                {"field": "991", "element": "subfield", "code": "", "name": "blank"},
                {"field": "650", "element": "subfield", "code": null, "name": "subjects"}
            ]"#,
        )
        .unwrap();

        assert_eq!(specs[0].code, None);
        assert_eq!(specs[1].code, Some(String::new()));
        assert_eq!(specs[2].code, None);
        assert_eq!(specs[1].element, ElementKind::Subfield);
    }

    #[test]
    fn test_toml_specs() {
        let specs = parse_field_specs_toml(
            r#"
[[fields]]
field = "245"
element = "subfield"
code = "a"
name = "title"

[[fields]]
field = "710"
element = "field"
ind1 = "2"
name = "corporate"
"#,
        )
        .unwrap();

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0], FieldSpec::subfield("245", "a", "title"));
        assert_eq!(specs[1], FieldSpec::field("710", "corporate").with_ind1("2"));
    }

    #[test]
    fn test_load_field_specs_by_extension() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("fields.json");
        std::fs::write(
            &json_path,
            r#"[{"field": "269", "element": "subfield", "code": "a", "name": "date"}]"#,
        )
        .unwrap();

        let specs = load_field_specs(&json_path).unwrap();
        assert_eq!(specs, vec![FieldSpec::subfield("269", "a", "date")]);
    }

    #[test]
    fn test_load_field_specs_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_field_specs(&missing),
            Err(FieldSpecError::Io { .. })
        ));

        let reserved = dir.path().join("reserved.json");
        std::fs::write(
            &reserved,
            r#"[{"field": "001", "element": "field", "name": "undl_id"}]"#,
        )
        .unwrap();
        assert!(matches!(
            load_field_specs(&reserved),
            Err(FieldSpecError::ReservedName { name, .. }) if name == "undl_id"
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"[{"element": "field"}]"#).unwrap();
        assert!(matches!(
            load_field_specs(&bad),
            Err(FieldSpecError::Parse { .. })
        ));
    }
}
