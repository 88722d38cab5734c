//! Core data models for records, extraction rules and search pages.

mod extracted;
mod field_spec;
mod record;
mod search;

pub use extracted::{ExtractedRecord, ExtractedValue, FieldGroup, UNDL_ID_KEY};
pub use field_spec::{
    load_field_specs, parse_field_specs_json, parse_field_specs_toml, ElementKind, FieldSpec,
    FieldSpecError,
};
pub use record::{ControlField, DataField, RawRecord, Subfield, RECORD_ID_TAG};
pub use search::{
    FetchLog, LogEntry, PageResult, SearchParameters, WireFormat, CURSOR_PARAM, FORMAT_PARAM,
};
