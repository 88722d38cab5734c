//! Paginated retrieval from the UN Digital Library search API.
//!
//! The protocol is split along three seams:
//!
//! - [`Transport`] performs one HTTP GET and hands back status and body.
//!   [`HttpTransport`] talks to the real API; [`MockTransport`] replays
//!   scripted responses in tests.
//! - [`ResponseDecoder`] turns a 200 body into a [`DecodedPage`].
//!   [`MarcXmlDecoder`] and [`JsonDecoder`] are the two wire encodings of the
//!   same envelope (`total`, `search_id`, `collection/record`).
//! - [`FetchSession`] owns the search parameters, the cursor and the log, and
//!   runs the cursor/retry state machine one page at a time. [`BatchDriver`]
//!   loops a session until the announced total is reached.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use undl_harvest::client::{decoder_for, BatchDriver, FetchSession, HttpTransport};
//! use undl_harvest::config::ApiKey;
//! use undl_harvest::models::{SearchParameters, WireFormat};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(
//!     "https://digitallibrary.un.org/api/v1/search",
//!     ApiKey::new("secret"),
//!     std::time::Duration::from_secs(60),
//! )?;
//! let params = SearchParameters::new().param("p", "191__a:A/RES/77/*");
//! let session = FetchSession::new(Arc::new(transport), decoder_for(WireFormat::Xml), params);
//! let result = BatchDriver::new(session).run().await;
//! println!("{} records, complete: {}", result.records.len(), result.is_complete());
//! # Ok(())
//! # }
//! ```

mod batch;
mod decoder;
pub mod mock;
mod session;
mod transport;

pub use batch::{merge_logs, run_sessions, BatchDriver, BatchResult, StopReason};
pub use decoder::{
    decoder_for, strip_namespaces, DecodedPage, JsonDecoder, MarcXmlDecoder, ResponseDecoder,
};
pub use mock::MockTransport;
pub use session::FetchSession;
pub use transport::HttpTransport;

use async_trait::async_trait;

/// Raw HTTP response handed to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// One GET against the search endpoint with the given query pairs
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn get(&self, query: &[(String, String)]) -> Result<TransportResponse, FetchError>;
}

/// Errors that end a page fetch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// HTTP 429; retried with backoff before it is surfaced
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Non-200 response, network failure, or rate limit retries exhausted
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed response body
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(format!("HTTP: {}", err))
    }
}

impl From<quick_xml::Error> for FetchError {
    fn from(err: quick_xml::Error) -> Self {
        FetchError::Parse(format!("XML: {}", err))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(format!("JSON: {}", err))
    }
}

/// Best-effort message for a non-200 response
pub(crate) fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => {
            for key in ["error", "message", "detail"] {
                if let Some(serde_json::Value::String(message)) = map.get(key) {
                    return format!("{}: {}", status, message);
                }
            }
            format!("{}: {}", status, serde_json::Value::Object(map))
        }
        Ok(value) => format!("{}: {}", status, value),
        Err(_) => format!("{}: Unable to parse error message", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_json() {
        assert_eq!(
            error_message(401, r#"{"error": "Invalid token"}"#),
            "401: Invalid token"
        );
        assert_eq!(
            error_message(400, r#"{"detail": "bad query"}"#),
            "400: bad query"
        );
        assert_eq!(error_message(500, r#"{"code": 7}"#), r#"500: {"code":7}"#);
    }

    #[test]
    fn test_error_message_unparseable() {
        assert_eq!(
            error_message(502, "<html>Bad Gateway</html>"),
            "502: Unable to parse error message"
        );
    }

    #[test]
    fn test_decode_errors_convert_to_parse() {
        let json: FetchError = serde_json::from_str::<u64>("x").unwrap_err().into();
        assert!(matches!(json, FetchError::Parse(m) if m.starts_with("JSON: ")));

        let mut reader = quick_xml::Reader::from_str("<a></b>");
        let xml = loop {
            match reader.read_event() {
                Ok(quick_xml::events::Event::Eof) => panic!("mismatched tags accepted"),
                Ok(_) => continue,
                Err(e) => break FetchError::from(e),
            }
        };
        assert!(matches!(xml, FetchError::Parse(m) if m.starts_with("XML: ")));
    }

    #[test]
    fn test_rate_limited_detection() {
        assert!(FetchError::RateLimited.is_rate_limited());
        assert!(!FetchError::Parse("x".to_string()).is_rate_limited());
    }
}
