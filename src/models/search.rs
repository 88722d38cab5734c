//! Search request, page and log models.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::client::FetchError;
use crate::models::RawRecord;

/// Reserved query parameter carrying the pagination cursor
pub const CURSOR_PARAM: &str = "search_id";

/// Reserved query parameter selecting the wire encoding
pub const FORMAT_PARAM: &str = "format";

/// Wire encoding requested from the search API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Xml,
    Json,
}

impl WireFormat {
    /// Value sent in the `format` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::Xml => "xml",
            WireFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied search parameters, in insertion order.
///
/// The map is never mutated by a fetch session. The cursor and the wire format
/// are layered on top of it by [`SearchParameters::request_pairs`] for every
/// request, overriding any caller value under the reserved keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchParameters(IndexMap<String, String>);

impl SearchParameters {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Query pairs for one request: caller parameters, then `format`, then the cursor if known
    pub fn request_pairs(&self, format: WireFormat, cursor: Option<&str>) -> Vec<(String, String)> {
        let mut pairs = self.0.clone();
        pairs.insert(FORMAT_PARAM.to_string(), format.as_str().to_string());
        if let Some(cursor) = cursor {
            pairs.insert(CURSOR_PARAM.to_string(), cursor.to_string());
        }
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SearchParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One page of search results
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    /// HTTP status of the final attempt (absent when no response arrived)
    pub status: Option<u16>,

    /// Total number of matching records, as declared by the server
    pub total: Option<u64>,

    /// Cursor for the next page; absent when the search is exhausted or invalid
    pub search_id: Option<String>,

    /// Records on this page, in server order
    pub records: Vec<RawRecord>,

    /// Failure that ended this page, if any
    pub error: Option<FetchError>,
}

impl PageResult {
    /// Whether the page was fetched and decoded without error
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status == Some(200)
    }

    /// Whether the server signalled there is nothing left to fetch
    pub fn is_exhausted(&self) -> bool {
        self.search_id.is_none() || self.records.is_empty()
    }
}

/// One line of the fetch log: the outcome of a single HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub status: Option<u16>,
    pub total: Option<u64>,
    pub record_count: usize,
    pub error: Option<String>,
    pub search_id: Option<String>,
}

/// Append-only log of every request made by a fetch session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchLog {
    entries: Vec<LogEntry>,
}

impl FetchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn extend(&mut self, other: FetchLog) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First total reported by the server
    pub fn total(&self) -> Option<u64> {
        self.entries.iter().find_map(|e| e.total)
    }

    /// Number of requests answered with 429
    pub fn rate_limited_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == Some(429))
            .count()
    }

    /// Records received across all logged requests
    pub fn record_count(&self) -> usize {
        self.entries.iter().map(|e| e.record_count).sum()
    }

    /// The last entry, which tells why a session stopped
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_pairs_first_page() {
        let params = SearchParameters::new()
            .param("p", "191__a:A/RES/*")
            .param("rg", "100");

        let pairs = params.request_pairs(WireFormat::Xml, None);
        assert_eq!(
            pairs,
            vec![
                ("p".to_string(), "191__a:A/RES/*".to_string()),
                ("rg".to_string(), "100".to_string()),
                ("format".to_string(), "xml".to_string()),
            ]
        );
    }

    #[test]
    fn test_request_pairs_with_cursor_leaves_params_untouched() {
        let params = SearchParameters::new().param("p", "security council");

        let pairs = params.request_pairs(WireFormat::Json, Some("abc"));
        assert!(pairs.contains(&("search_id".to_string(), "abc".to_string())));
        assert!(pairs.contains(&("format".to_string(), "json".to_string())));
        assert!(params.get("search_id").is_none());
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_cursor_overrides_caller_value() {
        let params = SearchParameters::new()
            .param("search_id", "stale")
            .param("p", "x");

        let pairs = params.request_pairs(WireFormat::Xml, Some("fresh"));
        let cursors: Vec<_> = pairs.iter().filter(|(k, _)| k == "search_id").collect();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].1, "fresh");
    }

    #[test]
    fn test_fetch_log_summary() {
        let mut log = FetchLog::new();
        log.push(LogEntry {
            status: Some(429),
            total: None,
            record_count: 0,
            error: Some("rate limited".to_string()),
            search_id: None,
        });
        log.push(LogEntry {
            status: Some(200),
            total: Some(3),
            record_count: 2,
            error: None,
            search_id: Some("abc".to_string()),
        });

        assert_eq!(log.len(), 2);
        assert_eq!(log.total(), Some(3));
        assert_eq!(log.rate_limited_count(), 1);
        assert_eq!(log.record_count(), 2);
    }
}
