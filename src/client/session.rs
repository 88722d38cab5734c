//! Cursor and retry state machine for one search.

use std::sync::Arc;

use crate::client::{error_message, FetchError, ResponseDecoder, Transport, TransportResponse};
use crate::models::{FetchLog, LogEntry, PageResult, SearchParameters};
use crate::utils::{with_retry, RetryConfig};

/// One paginated search.
///
/// The session owns its parameters, cursor, announced total and log; nothing
/// is shared between sessions, so several can run concurrently. Pages must be
/// fetched one after another because each request carries the cursor returned
/// by the previous one.
#[derive(Debug)]
pub struct FetchSession {
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn ResponseDecoder>,
    params: SearchParameters,
    cursor: Option<String>,
    total: Option<u64>,
    retry: RetryConfig,
    log: FetchLog,
}

impl FetchSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn ResponseDecoder>,
        params: SearchParameters,
    ) -> Self {
        Self {
            transport,
            decoder,
            params,
            cursor: None,
            total: None,
            retry: RetryConfig::default(),
            log: FetchLog::new(),
        }
    }

    /// Override the rate-limit retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn params(&self) -> &SearchParameters {
        &self.params
    }

    /// Cursor that the next request will carry
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Total announced by the first successful page
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn log(&self) -> &FetchLog {
        &self.log
    }

    pub fn into_log(self) -> FetchLog {
        self.log
    }

    /// Fetch the next page.
    ///
    /// Failures never escape: they are recorded on the returned page and in
    /// the log, one entry per HTTP request made.
    pub async fn fetch_page(&mut self) -> PageResult {
        let query = self
            .params
            .request_pairs(self.decoder.format(), self.cursor.as_deref());
        tracing::debug!(
            "Requesting page (cursor: {:?}, {} parameters)",
            self.cursor,
            query.len()
        );

        let transport = Arc::clone(&self.transport);
        let outcome = with_retry(self.retry, || {
            let transport = Arc::clone(&transport);
            let query = query.clone();
            async move {
                let response = transport.get(&query).await?;
                if response.status == 429 {
                    return Err(FetchError::RateLimited);
                }
                Ok(response)
            }
        })
        .await;

        let rate_limited_retried = match outcome.result {
            Err(FetchError::RateLimited) => outcome.rate_limited.saturating_sub(1),
            _ => outcome.rate_limited,
        };
        for _ in 0..rate_limited_retried {
            self.record(LogEntry {
                status: Some(429),
                total: self.total,
                record_count: 0,
                error: Some(format!(
                    "429: Too many requests, retrying in {:?}",
                    self.retry.backoff
                )),
                search_id: self.cursor.clone(),
            });
        }

        let page = match outcome.result {
            Ok(response) => self.handle_response(response),
            Err(FetchError::RateLimited) => PageResult {
                status: Some(429),
                total: self.total,
                error: Some(FetchError::Transport(format!(
                    "429: Too many requests after {} attempts",
                    outcome.attempts
                ))),
                ..Default::default()
            },
            Err(error) => {
                tracing::warn!("Request failed: {}", error);
                PageResult {
                    total: self.total,
                    error: Some(error),
                    ..Default::default()
                }
            }
        };

        let note = match &page.error {
            Some(error) => Some(error.to_string()),
            None if page.search_id.is_some() && page.records.is_empty() => {
                Some("200: No records".to_string())
            }
            None => None,
        };
        self.record(LogEntry {
            status: page.status,
            total: page.total,
            record_count: page.records.len(),
            error: note,
            search_id: page.search_id.clone(),
        });

        page
    }

    fn handle_response(&mut self, response: TransportResponse) -> PageResult {
        let mut page = PageResult {
            status: Some(response.status),
            total: self.total,
            ..Default::default()
        };

        if response.status != 200 {
            let message = error_message(response.status, &response.body);
            tracing::warn!("Search API returned an error: {}", message);
            page.error = Some(FetchError::Transport(message));
            return page;
        }

        let decoded = match self.decoder.decode(&response.body) {
            Ok(decoded) => decoded,
            Err(error) => {
                tracing::warn!("Could not decode {} response: {}", self.decoder.format(), error);
                page.error = Some(error);
                return page;
            }
        };

        if self.total.is_none() {
            if let Some(total) = decoded.total {
                tracing::info!("Total number of records: {}", total);
            }
            self.total = decoded.total;
        } else if decoded.total.is_some() && decoded.total != self.total {
            tracing::debug!(
                "Server total changed from {:?} to {:?}; keeping the first",
                self.total,
                decoded.total
            );
        }

        match &decoded.search_id {
            Some(search_id) => self.cursor = Some(search_id.clone()),
            None => tracing::warn!("No search_id in response; check the search parameters"),
        }

        page.total = self.total;
        page.search_id = decoded.search_id;
        page.records = decoded.records;
        page
    }

    /// Log a page abandoned by cancellation
    pub(crate) fn record_cancelled(&mut self) {
        tracing::warn!("Fetch cancelled (cursor: {:?})", self.cursor);
        self.record(LogEntry {
            status: None,
            total: self.total,
            record_count: 0,
            error: Some(
                FetchError::Transport("Cancelled before the page completed".to_string())
                    .to_string(),
            ),
            search_id: self.cursor.clone(),
        });
    }

    fn record(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }
}
