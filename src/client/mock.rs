//! Mock transport for testing purposes.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::client::{FetchError, Transport, TransportResponse};

/// A mock transport that replays scripted responses in order and records
/// the query of every request it receives.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, FetchError>>>,
    requests: Mutex<Vec<Vec<(String, String)>>>,
}

impl MockTransport {
    /// Create a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with the given status and body.
    pub fn push_response(&self, status: u16, body: impl Into<String>) {
        let mut guard = self.responses.lock().unwrap();
        guard.push_back(Ok(TransportResponse::new(status, body)));
    }

    /// Queue a transport failure.
    pub fn push_error(&self, error: FetchError) {
        let mut guard = self.responses.lock().unwrap();
        guard.push_back(Err(error));
    }

    /// Queries received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<(String, String)>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Scripted responses not consumed yet.
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, query: &[(String, String)]) -> Result<TransportResponse, FetchError> {
        self.requests.lock().unwrap().push(query.to_vec());

        let mut guard = self.responses.lock().unwrap();
        guard
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Transport("no scripted response left".to_string())))
    }
}
