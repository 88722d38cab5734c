//! Utility modules supporting the harvest.
//!
//! - [`HttpClient`]: shared reqwest client with sensible timeouts
//! - [`RetryConfig`] / [`with_retry`]: fixed-backoff retry on HTTP 429
//! - [`ProgressReporter`]: record-count progress through `tracing`
//! - [`transform`]: post-processing of extracted columns
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use undl_harvest::utils::{with_retry, RetryConfig};
//!
//! # async fn fetch() -> Result<String, undl_harvest::client::FetchError> { Ok("page".to_string()) }
//! # #[tokio::main]
//! # async fn main() {
//! let config = RetryConfig::default().backoff(Duration::from_secs(60));
//! let outcome = with_retry(config, || fetch()).await;
//! println!("{} attempts", outcome.attempts);
//! # }
//! ```

mod http;
mod progress;
mod retry;
pub mod transform;

pub use http::{HttpClient, DEFAULT_TIMEOUT};
pub use progress::{ProgressReporter, DEFAULT_PROGRESS_INTERVAL};
pub use retry::{with_retry, RetryConfig, RetryOutcome, DEFAULT_BACKOFF, DEFAULT_MAX_RETRIES};
pub use transform::{add_link, flatten, join_values, normalize_identifier, project_subfield};
