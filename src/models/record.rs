//! MARC record tree as returned by the search API.

use serde::{Deserialize, Serialize};

/// Tag of the control field carrying the record identifier
pub const RECORD_ID_TAG: &str = "001";

/// A bibliographic record: leader, control fields and data fields in document order.
///
/// Records are immutable once decoded; the same tree is produced by both wire
/// encodings of the search API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// MARC leader, if the response carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,

    /// Control fields (tags 001-009)
    #[serde(default)]
    pub control_fields: Vec<ControlField>,

    /// Data fields (tags 010+)
    #[serde(default)]
    pub data_fields: Vec<DataField>,
}

impl RawRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of the first control field with the given tag
    pub fn control_field(&self, tag: &str) -> Option<&str> {
        self.control_fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    /// Record identifier taken from control field `001`
    pub fn id(&self) -> Option<&str> {
        self.control_field(RECORD_ID_TAG)
    }

    /// All data fields with the given tag, in document order
    pub fn fields_by_tag<'a, 't>(&'a self, tag: &'t str) -> impl Iterator<Item = &'a DataField> + 't
    where
        'a: 't,
    {
        self.data_fields.iter().filter(move |f| f.tag == tag)
    }

    /// Append a control field
    pub fn with_control_field(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.control_fields.push(ControlField {
            tag: tag.into(),
            value: value.into(),
        });
        self
    }

    /// Append a data field
    pub fn with_data_field(mut self, field: DataField) -> Self {
        self.data_fields.push(field);
        self
    }
}

/// A control field: a tag and its text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlField {
    pub tag: String,
    pub value: String,
}

/// A data field with indicators and ordered subfields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ind1: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ind2: Option<String>,

    #[serde(default)]
    pub subfields: Vec<Subfield>,
}

impl DataField {
    /// Create a data field without indicators
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Set the first indicator
    pub fn ind1(mut self, ind1: impl Into<String>) -> Self {
        self.ind1 = Some(ind1.into());
        self
    }

    /// Set the second indicator
    pub fn ind2(mut self, ind2: impl Into<String>) -> Self {
        self.ind2 = Some(ind2.into());
        self
    }

    /// Append a subfield
    pub fn subfield(mut self, code: impl Into<String>, value: impl Into<String>) -> Self {
        self.subfields.push(Subfield {
            code: code.into(),
            value: value.into(),
        });
        self
    }
}

/// A (code, text) subfield pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subfield {
    pub code: String,
    pub value: String,
}
