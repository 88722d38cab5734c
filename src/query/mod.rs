//! Compilation of [`FieldSpec`] rules into record selectors.
//!
//! A selector has three steps, applied in order:
//!
//! 1. match every data field with the rule's tag
//! 2. if the rule names a first indicator, keep only fields carrying it
//! 3. if the rule names a subfield code (the empty string included), descend
//!    into the subfields with exactly that code; otherwise stop at the field
//!
//! Each selector also has a canonical XPath-like rendering, e.g.
//! `datafield[@tag='191'][@ind1='1']/subfield[@code='a']`, which is what
//! `undl-harvest compile` prints.

use std::fmt;

use crate::models::{DataField, ElementKind, FieldSpec, RawRecord, Subfield};

/// Path selector over a record's data fields
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    pub tag: String,
    pub ind1: Option<String>,
    pub code: Option<String>,
}

/// A node matched by a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedNode<'a> {
    Field(&'a DataField),
    Subfield(&'a Subfield),
}

impl Selector {
    fn indicator_matches(&self, field: &DataField) -> bool {
        match &self.ind1 {
            Some(ind1) => field.ind1.as_deref() == Some(ind1.as_str()),
            None => true,
        }
    }

    /// Nodes matched in `record`, in document order
    pub fn select<'a>(&self, record: &'a RawRecord) -> Vec<MatchedNode<'a>> {
        let fields = record
            .fields_by_tag(&self.tag)
            .filter(|f| self.indicator_matches(f));

        match &self.code {
            None => fields.map(MatchedNode::Field).collect(),
            Some(code) => fields
                .flat_map(|f| f.subfields.iter().filter(move |s| &s.code == code))
                .map(MatchedNode::Subfield)
                .collect(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "datafield[@tag='{}']", self.tag)?;
        if let Some(ind1) = &self.ind1 {
            write!(f, "[@ind1='{}']", ind1)?;
        }
        if let Some(code) = &self.code {
            write!(f, "/subfield[@code='{}']", code)?;
        }
        Ok(())
    }
}

/// A rule together with its selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledQuery {
    pub spec: FieldSpec,
    pub selector: Selector,
}

impl CompiledQuery {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn element(&self) -> ElementKind {
        self.spec.element
    }

    /// Canonical string form of the selector
    pub fn query(&self) -> String {
        self.selector.to_string()
    }
}

/// Compile one rule.
///
/// An empty `ind1` counts as no filter; an empty `code` is a real code.
pub fn compile(spec: &FieldSpec) -> CompiledQuery {
    let selector = Selector {
        tag: spec.field.clone(),
        ind1: spec.ind1.clone().filter(|ind1| !ind1.is_empty()),
        code: spec.code.clone(),
    };

    CompiledQuery {
        spec: spec.clone(),
        selector,
    }
}

/// Compile rules, keeping their order
pub fn compile_all(specs: &[FieldSpec]) -> Vec<CompiledQuery> {
    specs.iter().map(compile).collect()
}
