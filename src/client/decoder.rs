//! Response decoders for the two wire encodings of a search page.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use crate::client::FetchError;
use crate::models::{ControlField, DataField, RawRecord, Subfield, WireFormat};

/// Envelope fields of one decoded 200 response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPage {
    pub total: Option<u64>,
    pub search_id: Option<String>,
    pub records: Vec<RawRecord>,
}

/// Decodes a response body of one wire encoding
pub trait ResponseDecoder: Send + Sync + std::fmt::Debug {
    /// Encoding requested through the `format` parameter
    fn format(&self) -> WireFormat;

    fn decode(&self, body: &str) -> Result<DecodedPage, FetchError>;
}

/// Decoder for the given wire format
pub fn decoder_for(format: WireFormat) -> Arc<dyn ResponseDecoder> {
    match format {
        WireFormat::Xml => Arc::new(MarcXmlDecoder),
        WireFormat::Json => Arc::new(JsonDecoder),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_total(value: &str) -> Result<Option<u64>, FetchError> {
    match non_empty(value) {
        None => Ok(None),
        Some(total) => total
            .parse::<u64>()
            .map(Some)
            .map_err(|e| FetchError::Parse(format!("Invalid total '{}': {}", total, e))),
    }
}

// ---------------------------------------------------------------------------
// MARC-XML
// ---------------------------------------------------------------------------

/// Remove namespace declarations and element prefixes from a MARC-XML body.
///
/// `<marc:record xmlns:marc="...">` becomes `<record>`.
pub fn strip_namespaces(xml: &str) -> Cow<'_, str> {
    static XMLNS: OnceLock<Regex> = OnceLock::new();
    static PREFIX: OnceLock<Regex> = OnceLock::new();

    let xmlns = XMLNS.get_or_init(|| {
        Regex::new(r#"\s+xmlns(?::\w+)?\s*=\s*("[^"]*"|'[^']*')"#).expect("valid xmlns regex")
    });
    let prefix = PREFIX.get_or_init(|| Regex::new(r"<(/?)\w+:").expect("valid prefix regex"));

    match xmlns.replace_all(xml, "") {
        Cow::Borrowed(unchanged) => prefix.replace_all(unchanged, "<$1"),
        Cow::Owned(stripped) => Cow::Owned(prefix.replace_all(&stripped, "<$1").into_owned()),
    }
}

/// Decoder for `format=xml` responses (MARC21 slim records inside a response envelope)
#[derive(Debug, Clone, Copy, Default)]
pub struct MarcXmlDecoder;

impl ResponseDecoder for MarcXmlDecoder {
    fn format(&self) -> WireFormat {
        WireFormat::Xml
    }

    fn decode(&self, body: &str) -> Result<DecodedPage, FetchError> {
        let xml = strip_namespaces(body);
        let mut reader = Reader::from_str(&xml);
        let mut builder = XmlPageBuilder::default();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => builder.open(&e)?,
                Ok(Event::Empty(e)) => {
                    builder.open(&e)?;
                    builder.close(e.local_name().as_ref())?;
                }
                Ok(Event::End(e)) => builder.close(e.local_name().as_ref())?,
                Ok(Event::Text(t)) => {
                    if builder.leaf.is_some() {
                        let text = t
                            .unescape()
                            .map_err(|e| FetchError::Parse(format!("XML: {}", e)))?;
                        builder.text.push_str(&text);
                    }
                }
                Ok(Event::CData(c)) => {
                    if builder.leaf.is_some() {
                        builder.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("XML error at byte {}", reader.buffer_position());
                    return Err(e.into());
                }
            }
        }

        builder.finish()
    }
}

/// Element whose text is being collected
#[derive(Debug)]
enum Leaf {
    Total,
    SearchId,
    Leader,
    ControlField(String),
    Subfield(String),
}

#[derive(Debug, Default)]
struct XmlPageBuilder {
    page: DecodedPage,
    record: Option<RawRecord>,
    field: Option<DataField>,
    leaf: Option<Leaf>,
    text: String,
    depth: usize,
    saw_root: bool,
    saw_envelope: bool,
}

impl XmlPageBuilder {
    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), FetchError> {
        self.depth += 1;
        self.saw_root = true;

        if matches!(
            e.local_name().as_ref(),
            b"total" | b"search_id" | b"collection" | b"record"
        ) {
            self.saw_envelope = true;
        }

        let leaf = match e.local_name().as_ref() {
            b"record" => {
                self.record = Some(RawRecord::new());
                None
            }
            b"datafield" if self.record.is_some() => {
                self.field = Some(DataField {
                    tag: attr(e, "tag").unwrap_or_default(),
                    ind1: attr(e, "ind1"),
                    ind2: attr(e, "ind2"),
                    subfields: Vec::new(),
                });
                None
            }
            b"subfield" if self.field.is_some() => {
                Some(Leaf::Subfield(attr(e, "code").unwrap_or_default()))
            }
            b"controlfield" if self.record.is_some() => {
                Some(Leaf::ControlField(attr(e, "tag").unwrap_or_default()))
            }
            b"leader" if self.record.is_some() => Some(Leaf::Leader),
            b"total" if self.record.is_none() => Some(Leaf::Total),
            b"search_id" if self.record.is_none() => Some(Leaf::SearchId),
            _ => None,
        };

        if leaf.is_some() {
            self.leaf = leaf;
            self.text.clear();
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> Result<(), FetchError> {
        self.depth = self.depth.saturating_sub(1);

        match name {
            b"record" => {
                if let Some(mut record) = self.record.take() {
                    if let Some(field) = self.field.take() {
                        record.data_fields.push(field);
                    }
                    self.page.records.push(record);
                }
            }
            b"datafield" => {
                if let (Some(record), Some(field)) = (self.record.as_mut(), self.field.take()) {
                    record.data_fields.push(field);
                }
            }
            b"subfield" | b"controlfield" | b"leader" | b"total" | b"search_id" => {
                self.finish_leaf()?;
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_leaf(&mut self) -> Result<(), FetchError> {
        let Some(leaf) = self.leaf.take() else {
            return Ok(());
        };
        let text = std::mem::take(&mut self.text);

        match leaf {
            Leaf::Total => self.page.total = parse_total(&text)?,
            Leaf::SearchId => self.page.search_id = non_empty(&text),
            Leaf::Leader => {
                if let Some(record) = self.record.as_mut() {
                    record.leader = Some(text);
                }
            }
            Leaf::ControlField(tag) => {
                if let Some(record) = self.record.as_mut() {
                    record.control_fields.push(ControlField { tag, value: text });
                }
            }
            Leaf::Subfield(code) => {
                if let Some(field) = self.field.as_mut() {
                    field.subfields.push(Subfield { code, value: text });
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<DecodedPage, FetchError> {
        if !self.saw_root {
            return Err(FetchError::Parse("XML: document has no root element".to_string()));
        }
        if self.depth != 0 || self.record.is_some() {
            return Err(FetchError::Parse("XML: unexpected end of document".to_string()));
        }
        if !self.saw_envelope {
            return Err(FetchError::Parse(
                "XML: not a search response (no total, search_id or collection)".to_string(),
            ));
        }
        Ok(self.page)
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Decoder for `format=json` responses.
///
/// Accepts the bare envelope or one wrapped in `response`, attribute keys
/// written as `@tag`/`#text` or as `tag`/`value`, and single elements where a
/// list is expected.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl ResponseDecoder for JsonDecoder {
    fn format(&self) -> WireFormat {
        WireFormat::Json
    }

    fn decode(&self, body: &str) -> Result<DecodedPage, FetchError> {
        let mut value: serde_json::Value = serde_json::from_str(body)?;
        if let Some(inner) = value.get_mut("response").map(serde_json::Value::take) {
            value = inner;
        }

        let is_envelope = value
            .as_object()
            .is_some_and(|object| ENVELOPE_KEYS.iter().any(|key| object.contains_key(*key)));
        if !is_envelope {
            return Err(FetchError::Parse(
                "JSON: not a search response (no total, search_id or collection)".to_string(),
            ));
        }

        let envelope: JsonEnvelope = serde_json::from_value(value)?;

        let records = envelope
            .collection
            .and_then(|c| c.record)
            .map(Vec::from)
            .unwrap_or_default()
            .into_iter()
            .map(RawRecord::from)
            .collect();

        Ok(DecodedPage {
            total: envelope.total,
            search_id: envelope.search_id.as_deref().and_then(non_empty),
            records,
        })
    }
}

/// Keys of which a search response carries at least one
const ENVELOPE_KEYS: [&str; 3] = ["total", "search_id", "collection"];

#[derive(Debug, Deserialize)]
struct JsonEnvelope {
    #[serde(default, deserialize_with = "deserialize_total")]
    total: Option<u64>,
    #[serde(default)]
    search_id: Option<String>,
    #[serde(default)]
    collection: Option<JsonCollection>,
}

#[derive(Debug, Deserialize)]
struct JsonCollection {
    #[serde(default)]
    record: Option<OneOrMany<JsonRecord>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRecord {
    #[serde(default)]
    leader: Option<String>,
    #[serde(default)]
    controlfield: Option<OneOrMany<JsonControlField>>,
    #[serde(default)]
    datafield: Option<OneOrMany<JsonDataField>>,
}

#[derive(Debug, Deserialize)]
struct JsonControlField {
    #[serde(rename = "@tag", alias = "tag", default)]
    tag: String,
    #[serde(rename = "#text", alias = "value", default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonDataField {
    #[serde(rename = "@tag", alias = "tag", default)]
    tag: String,
    #[serde(rename = "@ind1", alias = "ind1", default)]
    ind1: Option<String>,
    #[serde(rename = "@ind2", alias = "ind2", default)]
    ind2: Option<String>,
    #[serde(default)]
    subfield: Option<OneOrMany<JsonSubfield>>,
}

#[derive(Debug, Deserialize)]
struct JsonSubfield {
    #[serde(rename = "@code", alias = "code", default)]
    code: String,
    #[serde(rename = "#text", alias = "value", default)]
    value: Option<String>,
}

impl From<JsonRecord> for RawRecord {
    fn from(record: JsonRecord) -> Self {
        RawRecord {
            leader: record.leader,
            control_fields: record
                .controlfield
                .map(Vec::from)
                .unwrap_or_default()
                .into_iter()
                .map(|f| ControlField {
                    tag: f.tag,
                    value: f.value.unwrap_or_default(),
                })
                .collect(),
            data_fields: record
                .datafield
                .map(Vec::from)
                .unwrap_or_default()
                .into_iter()
                .map(|f| DataField {
                    tag: f.tag,
                    ind1: f.ind1,
                    ind2: f.ind2,
                    subfields: f
                        .subfield
                        .map(Vec::from)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|s| Subfield {
                            code: s.code,
                            value: s.value.unwrap_or_default(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn deserialize_total<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(u64),
        Text(String),
    }

    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(total)) => Ok(Some(total)),
        Some(NumberOrText::Text(text)) => parse_total(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML_PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <total>2</total>
  <search_id>CURSOR1</search_id>
  <collection xmlns="http://www.loc.gov/MARC21/slim">
    <record>
      <leader>00000nam a2200000 a 4500</leader>
      <controlfield tag="001">4012345</controlfield>
      <datafield tag="191" ind1=" " ind2=" ">
        <subfield code="a">A/RES/77/1</subfield>
        <subfield code="b">A/</subfield>
      </datafield>
      <datafield tag="245" ind1="1" ind2="0">
        <subfield code="a">Peace &amp; security</subfield>
      </datafield>
    </record>
    <record>
      <controlfield tag="001">4012346</controlfield>
      <datafield tag="500" ind1=" " ind2=" "/>
    </record>
  </collection>
</response>"#;

    const JSON_PAGE: &str = r##"{
  "total": 2,
  "search_id": "CURSOR1",
  "collection": {
    "record": [
      {
        "leader": "00000nam a2200000 a 4500",
        "controlfield": [{"@tag": "001", "#text": "4012345"}],
        "datafield": [
          {"@tag": "191", "@ind1": " ", "@ind2": " ", "subfield": [
            {"@code": "a", "#text": "A/RES/77/1"},
            {"@code": "b", "#text": "A/"}
          ]},
          {"@tag": "245", "@ind1": "1", "@ind2": "0", "subfield": {"@code": "a", "#text": "Peace & security"}}
        ]
      },
      {
        "controlfield": {"@tag": "001", "#text": "4012346"},
        "datafield": {"@tag": "500", "@ind1": " ", "@ind2": " "}
      }
    ]
  }
}"##;

    #[test]
    fn test_xml_page() {
        let page = MarcXmlDecoder.decode(XML_PAGE).unwrap();

        assert_eq!(page.total, Some(2));
        assert_eq!(page.search_id.as_deref(), Some("CURSOR1"));
        assert_eq!(page.records.len(), 2);

        let first = &page.records[0];
        assert_eq!(first.id(), Some("4012345"));
        assert_eq!(first.data_fields.len(), 2);
        assert_eq!(first.data_fields[0].ind1.as_deref(), Some(" "));
        assert_eq!(first.data_fields[1].subfields[0].value, "Peace & security");
        assert!(page.records[1].data_fields[0].subfields.is_empty());
    }

    #[test]
    fn test_xml_and_json_decode_identically() {
        let xml = MarcXmlDecoder.decode(XML_PAGE).unwrap();
        let json = JsonDecoder.decode(JSON_PAGE).unwrap();
        assert_eq!(xml, json);
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<response><total>1</total><search_id>S</search_id>
<marc:collection xmlns:marc="http://www.loc.gov/MARC21/slim">
<marc:record><marc:controlfield tag="001">9</marc:controlfield>
<marc:datafield tag="269" ind1=" " ind2=" "><marc:subfield code="a">2023-01-01</marc:subfield></marc:datafield>
</marc:record></marc:collection></response>"#;

        let page = MarcXmlDecoder.decode(xml).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id(), Some("9"));
        assert_eq!(page.records[0].data_fields[0].subfields[0].value, "2023-01-01");
    }

    #[test]
    fn test_strip_namespaces() {
        assert_eq!(
            strip_namespaces(r#"<collection xmlns="http://www.loc.gov/MARC21/slim"><record/></collection>"#),
            "<collection><record/></collection>"
        );
        assert_eq!(strip_namespaces("<a><b/></a>"), "<a><b/></a>");
    }

    #[test]
    fn test_xml_without_cursor() {
        let page = MarcXmlDecoder
            .decode("<response><total>0</total><collection/></response>")
            .unwrap();
        assert_eq!(page.total, Some(0));
        assert!(page.search_id.is_none());
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_xml_keeps_subfield_whitespace() {
        let xml = r#"<response><search_id>S</search_id><collection><record>
<datafield tag="035" ind1=" " ind2=" "><subfield code="a">(DHL)12345 </subfield></datafield>
</record></collection></response>"#;
        let page = MarcXmlDecoder.decode(xml).unwrap();
        assert_eq!(page.records[0].data_fields[0].subfields[0].value, "(DHL)12345 ");
    }

    #[test]
    fn test_xml_malformed() {
        assert!(matches!(
            MarcXmlDecoder.decode("<response><total>1</total><collection><record></collection>"),
            Err(FetchError::Parse(_))
        ));
        assert!(matches!(
            MarcXmlDecoder.decode("Internal Server Error"),
            Err(FetchError::Parse(_))
        ));
        assert!(matches!(
            MarcXmlDecoder.decode("<response><total>many</total></response>"),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_json_wrapped_and_string_total() {
        let body = r#"{"response": {"total": "3", "search_id": "X", "collection": null}}"#;
        let page = JsonDecoder.decode(body).unwrap();
        assert_eq!(page.total, Some(3));
        assert_eq!(page.search_id.as_deref(), Some("X"));
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_json_plain_keys() {
        let body = r#"{"total": 1, "search_id": "X", "collection": {"record": {
            "controlfield": [{"tag": "001", "value": "77"}],
            "datafield": [{"tag": "650", "ind1": "1", "subfield": [{"code": "a", "value": "TRADE"}]}]
        }}}"#;
        let page = JsonDecoder.decode(body).unwrap();
        assert_eq!(page.records[0].id(), Some("77"));
        assert_eq!(page.records[0].data_fields[0].subfields[0].value, "TRADE");
    }

    #[test]
    fn test_json_malformed() {
        assert!(matches!(
            JsonDecoder.decode("{not json"),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_json_without_envelope_is_parse_error() {
        for body in [
            r#"{"error": "quota exceeded"}"#,
            "[]",
            r#""maintenance""#,
            r#"{"response": {"message": "backend unavailable"}}"#,
        ] {
            assert!(
                matches!(JsonDecoder.decode(body), Err(FetchError::Parse(_))),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn test_json_wrapped_bad_total_is_parse_error() {
        assert!(matches!(
            JsonDecoder.decode(r#"{"response": {"total": "abc"}}"#),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_xml_without_envelope_is_parse_error() {
        assert!(matches!(
            MarcXmlDecoder.decode("<html><body>Service maintenance</body></html>"),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_decoder_for() {
        assert_eq!(decoder_for(WireFormat::Xml).format(), WireFormat::Xml);
        assert_eq!(decoder_for(WireFormat::Json).format(), WireFormat::Json);
    }
}
