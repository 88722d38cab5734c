//! Cardinality-aware extraction of compiled rules from a record.
//!
//! The shape of each value depends only on the rule's element kind and on
//! how many nodes its selector matched:
//!
//! | matches | `field` rule                 | `subfield` rule         |
//! |---------|------------------------------|-------------------------|
//! | 0       | `Empty`                      | `Empty`                 |
//! | n >= 1  | `FieldGroups` with n maps    | `Scalars` with n texts  |
//!
//! A matched field contributes a map of its own subfields (an empty map when it
//! has none). A matched subfield has no nested subfields and contributes `{}`
//! to a `field` rule. A field matched by a `subfield` rule without a code
//! contributes an empty string, since data fields carry no text of their own.

use crate::models::{
    ElementKind, ExtractedRecord, ExtractedValue, FieldGroup, FieldSpec, RawRecord,
};
use crate::query::{compile_all, CompiledQuery, MatchedNode};

/// Extract every compiled rule from `record`.
///
/// Extraction never fails: rules that match nothing yield `Empty`.
pub fn extract_record(record: &RawRecord, queries: &[CompiledQuery]) -> ExtractedRecord {
    let mut extracted = ExtractedRecord::new(record.id().map(str::to_string));

    for query in queries {
        let value = extract_value(record, query);
        extracted.values.insert(query.name().to_string(), value);
    }

    if extracted.missing().next().is_some() {
        tracing::trace!(
            "Record {:?} has no match for: {}",
            extracted.undl_id,
            extracted.missing().collect::<Vec<_>>().join(", ")
        );
    }

    extracted
}

/// Extract one rule from `record`
pub fn extract_value(record: &RawRecord, query: &CompiledQuery) -> ExtractedValue {
    let nodes = query.selector.select(record);
    if nodes.is_empty() {
        return ExtractedValue::Empty;
    }

    match query.element() {
        ElementKind::Field => {
            ExtractedValue::FieldGroups(nodes.into_iter().map(field_group).collect())
        }
        ElementKind::Subfield => {
            ExtractedValue::Scalars(nodes.into_iter().map(node_text).collect())
        }
    }
}

/// Compile `specs` and extract them from every record, preserving record order
pub fn extract_records(records: &[RawRecord], specs: &[FieldSpec]) -> Vec<ExtractedRecord> {
    let queries = compile_all(specs);
    records
        .iter()
        .map(|record| extract_record(record, &queries))
        .collect()
}

fn field_group(node: MatchedNode<'_>) -> FieldGroup {
    let mut group = FieldGroup::new();
    if let MatchedNode::Field(field) = node {
        // Repeated codes: last value wins, first position is kept
        for subfield in &field.subfields {
            group.insert(subfield.code.clone(), subfield.value.clone());
        }
    }
    group
}

fn node_text(node: MatchedNode<'_>) -> String {
    match node {
        MatchedNode::Subfield(subfield) => subfield.value.clone(),
        MatchedNode::Field(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataField;
    use crate::query::compile;

    fn group(pairs: &[(&str, &str)]) -> FieldGroup {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sample_record() -> RawRecord {
        RawRecord::new()
            .with_control_field("001", "4012345")
            .with_data_field(DataField::new("191").subfield("a", "x").subfield("b", "y"))
            .with_data_field(DataField::new("650").ind1("1").subfield("a", "PEACEKEEPING"))
            .with_data_field(DataField::new("650").ind1("1").subfield("a", "SANCTIONS"))
    }

    #[test]
    fn test_single_field_match() {
        let record = sample_record();
        let value = extract_value(&record, &compile(&FieldSpec::field("191", "symbol")));
        assert_eq!(
            value,
            ExtractedValue::FieldGroups(vec![group(&[("a", "x"), ("b", "y")])])
        );
    }

    #[test]
    fn test_repeated_field_match_keeps_order() {
        let record = sample_record();
        let value = extract_value(&record, &compile(&FieldSpec::field("650", "subjects")));
        assert_eq!(
            value,
            ExtractedValue::FieldGroups(vec![
                group(&[("a", "PEACEKEEPING")]),
                group(&[("a", "SANCTIONS")]),
            ])
        );
    }

    #[test]
    fn test_single_subfield_match_is_wrapped() {
        let record = sample_record();
        let value = extract_value(&record, &compile(&FieldSpec::subfield("191", "b", "b")));
        assert_eq!(value, ExtractedValue::Scalars(vec!["y".to_string()]));
    }

    #[test]
    fn test_repeated_subfield_match() {
        let record = sample_record();
        let value = extract_value(&record, &compile(&FieldSpec::subfield("650", "a", "s")));
        assert_eq!(
            value,
            ExtractedValue::Scalars(vec!["PEACEKEEPING".to_string(), "SANCTIONS".to_string()])
        );
    }

    #[test]
    fn test_zero_matches_still_sets_id() {
        let record = sample_record();
        let queries = compile_all(&[FieldSpec::subfield("245", "a", "title")]);
        let extracted = extract_record(&record, &queries);

        assert_eq!(extracted.undl_id.as_deref(), Some("4012345"));
        assert_eq!(extracted.get("title"), Some(&ExtractedValue::Empty));
    }

    #[test]
    fn test_missing_control_field() {
        let record = RawRecord::new().with_data_field(DataField::new("245").subfield("a", "T"));
        let extracted = extract_record(&record, &[]);
        assert!(extracted.undl_id.is_none());
        assert!(extracted.values.is_empty());
    }

    #[test]
    fn test_field_without_subfields_yields_empty_map() {
        let record = RawRecord::new().with_data_field(DataField::new("500"));
        let value = extract_value(&record, &compile(&FieldSpec::field("500", "notes")));
        assert_eq!(value, ExtractedValue::FieldGroups(vec![FieldGroup::new()]));
    }

    #[test]
    fn test_field_rule_with_code_yields_empty_maps() {
        let record = sample_record();
        let spec = FieldSpec::field("650", "subjects").with_code("a");
        let value = extract_value(&record, &compile(&spec));
        assert_eq!(
            value,
            ExtractedValue::FieldGroups(vec![FieldGroup::new(), FieldGroup::new()])
        );
    }

    #[test]
    fn test_repeated_code_last_value_wins() {
        let record = RawRecord::new().with_data_field(
            DataField::new("710")
                .subfield("a", "first")
                .subfield("b", "unit")
                .subfield("a", "second"),
        );
        let value = extract_value(&record, &compile(&FieldSpec::field("710", "corp")));
        let groups = value.as_field_groups().unwrap();
        assert_eq!(groups[0].get("a").map(String::as_str), Some("second"));
        assert_eq!(groups[0].keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let record = sample_record();
        let queries = compile_all(&[
            FieldSpec::field("191", "symbol"),
            FieldSpec::subfield("650", "a", "subjects"),
            FieldSpec::subfield("999", "z", "nothing"),
        ]);

        let first = extract_record(&record, &queries);
        let second = extract_record(&record, &queries);
        assert_eq!(first, second);
    }

    #[test]
    fn test_extract_records_preserves_order() {
        let records = vec![
            RawRecord::new().with_control_field("001", "1"),
            RawRecord::new().with_control_field("001", "2"),
        ];
        let rows = extract_records(&records, &[FieldSpec::field("191", "symbol")]);
        let ids: Vec<_> = rows.iter().map(|r| r.undl_id.as_deref()).collect();
        assert_eq!(ids, vec![Some("1"), Some("2")]);
    }
}
