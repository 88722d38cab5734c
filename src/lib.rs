//! # UNDL Harvest
//!
//! Retrieves bibliographic records from the UN Digital Library search API and
//! flattens them into tabular-friendly rows with declarative extraction rules.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Records, extraction rules, search pages and the fetch log
//! - [`query`]: Compilation of extraction rules into record selectors
//! - [`extract`]: Cardinality-aware extraction of a record into a row
//! - [`client`]: Cursor pagination, rate-limit retry and wire decoding
//! - [`utils`]: HTTP client, retry, progress and post-processing transforms
//! - [`config`]: Configuration and credential management

pub mod client;
pub mod config;
pub mod extract;
pub mod models;
pub mod query;
pub mod utils;

// Re-export commonly used types
pub use client::{BatchDriver, BatchResult, FetchError, FetchSession};
pub use extract::{extract_record, extract_records};
pub use models::{ExtractedRecord, ExtractedValue, FieldSpec, RawRecord, SearchParameters};
pub use query::{compile, compile_all, CompiledQuery};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
