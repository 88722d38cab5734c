//! Flat, tabular-friendly output of record extraction.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Output key always populated from control field `001`
pub const UNDL_ID_KEY: &str = "undl_id";

/// Subfield code -> text for one data field occurrence
pub type FieldGroup = IndexMap<String, String>;

/// Value extracted for one rule. The variant is fixed by how many nodes matched.
///
/// Serializes as `null`, a list of strings, or a list of objects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractedValue {
    /// No node matched
    #[default]
    Empty,
    /// Subfield texts, one per match
    Scalars(Vec<String>),
    /// One code -> text map per matched field
    FieldGroups(Vec<FieldGroup>),
}

impl ExtractedValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, ExtractedValue::Empty)
    }

    /// Number of matched nodes
    pub fn len(&self) -> usize {
        match self {
            ExtractedValue::Empty => 0,
            ExtractedValue::Scalars(values) => values.len(),
            ExtractedValue::FieldGroups(groups) => groups.len(),
        }
    }

    pub fn as_scalars(&self) -> Option<&[String]> {
        match self {
            ExtractedValue::Scalars(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_field_groups(&self) -> Option<&[FieldGroup]> {
        match self {
            ExtractedValue::FieldGroups(groups) => Some(groups),
            _ => None,
        }
    }
}

impl From<ExtractedValue> for serde_json::Value {
    fn from(value: ExtractedValue) -> Self {
        match value {
            ExtractedValue::Empty => serde_json::Value::Null,
            ExtractedValue::Scalars(values) => {
                serde_json::Value::Array(values.into_iter().map(serde_json::Value::String).collect())
            }
            ExtractedValue::FieldGroups(groups) => serde_json::Value::Array(
                groups
                    .into_iter()
                    .map(|group| {
                        serde_json::Value::Object(
                            group
                                .into_iter()
                                .map(|(k, v)| (k, serde_json::Value::String(v)))
                                .collect(),
                        )
                    })
                    .collect(),
            ),
        }
    }
}

/// One record flattened into output-name -> value.
///
/// Serializes exactly as [`ExtractedRecord::to_json`]: a rule named `undl_id`
/// replaces the identifier column instead of duplicating the key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedRecord {
    pub undl_id: Option<String>,
    pub values: IndexMap<String, ExtractedValue>,
}

impl Serialize for ExtractedRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl ExtractedRecord {
    pub fn new(undl_id: Option<String>) -> Self {
        Self {
            undl_id,
            values: IndexMap::new(),
        }
    }

    /// Value stored under an output name
    pub fn get(&self, name: &str) -> Option<&ExtractedValue> {
        self.values.get(name)
    }

    /// Output names whose rules matched nothing
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(k, _)| k.as_str())
    }

    /// Row as a JSON object, `undl_id` first
    pub fn to_json(&self) -> serde_json::Value {
        let mut row = serde_json::Map::new();
        row.insert(
            UNDL_ID_KEY.to_string(),
            self.undl_id
                .clone()
                .map_or(serde_json::Value::Null, serde_json::Value::String),
        );
        for (name, value) in &self.values {
            row.insert(name.clone(), value.clone().into());
        }
        serde_json::Value::Object(row)
    }
}
