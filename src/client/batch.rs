//! Drive a fetch session until the announced total has been gathered.

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::client::FetchSession;
use crate::models::{FetchLog, RawRecord};
use crate::utils::{ProgressReporter, DEFAULT_PROGRESS_INTERVAL};

/// Why a batch stopped requesting pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// As many records as announced were gathered
    Complete,
    /// The server returned no cursor or an empty page
    Exhausted,
    /// A page ended with a transport or parse error, or the batch was cancelled
    Failed,
}

/// Records and log of one finished session
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub records: Vec<RawRecord>,
    pub log: FetchLog,
    pub total: Option<u64>,
    pub stop: StopReason,
}

impl BatchResult {
    /// Whether every announced record was gathered
    pub fn is_complete(&self) -> bool {
        self.stop == StopReason::Complete
    }

    /// Announced records that were not gathered
    pub fn shortfall(&self) -> Option<u64> {
        self.total
            .map(|total| total.saturating_sub(self.records.len() as u64))
            .filter(|missing| *missing > 0)
    }
}

/// Loops a [`FetchSession`] until the local record count reaches the
/// server-reported total.
///
/// The loop also stops on a failed page, on a page without a cursor and on an
/// empty page; in those cases the partial records are kept and the shortfall
/// is visible through [`BatchResult::shortfall`] and the log.
///
/// A driver given a cancel signal through [`BatchDriver::cancel_on`] stops as
/// soon as the signal turns `true`, dropping the page in flight and returning
/// the records gathered so far.
#[derive(Debug)]
pub struct BatchDriver {
    session: FetchSession,
    progress: ProgressReporter,
    cancel: Option<watch::Receiver<bool>>,
}

impl BatchDriver {
    pub fn new(session: FetchSession) -> Self {
        Self {
            session,
            progress: ProgressReporter::new("harvest", DEFAULT_PROGRESS_INTERVAL),
            cancel: None,
        }
    }

    /// Stop the batch once `cancel` holds `true`
    pub fn cancel_on(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Report progress every `interval` records (0 disables periodic reports)
    pub fn progress_interval(mut self, interval: usize) -> Self {
        self.progress = ProgressReporter::new("harvest", interval);
        self
    }

    /// Fetch pages until the batch is complete or cannot continue
    pub async fn run(mut self) -> BatchResult {
        let mut records: Vec<RawRecord> = Vec::new();

        let stop = loop {
            if let Some(total) = self.session.total() {
                if records.len() as u64 >= total {
                    break StopReason::Complete;
                }
            }

            let page = match self.cancel.as_mut() {
                Some(cancel) => tokio::select! {
                    page = self.session.fetch_page() => page,
                    _ = cancelled(cancel) => {
                        self.session.record_cancelled();
                        break StopReason::Failed;
                    }
                },
                None => self.session.fetch_page().await,
            };
            let failed = page.error.is_some();
            let exhausted = page.is_exhausted();

            records.extend(page.records);
            self.progress.set_total(self.session.total());
            self.progress.update(records.len());

            if failed {
                break StopReason::Failed;
            }
            if exhausted {
                let complete = self
                    .session
                    .total()
                    .is_some_and(|total| records.len() as u64 >= total);
                break if complete {
                    StopReason::Complete
                } else {
                    StopReason::Exhausted
                };
            }
        };

        self.progress.finish(records.len());

        let total = self.session.total();
        let result = BatchResult {
            records,
            log: self.session.into_log(),
            total,
            stop,
        };

        if let Some(missing) = result.shortfall() {
            tracing::warn!(
                "Gathered {} of {} announced records ({} missing, stopped: {:?})",
                result.records.len(),
                total.unwrap_or_default(),
                missing,
                stop
            );
        }

        result
    }

    /// Run the batch on its own task
    pub fn spawn(self) -> JoinHandle<BatchResult> {
        tokio::spawn(self.run())
    }

    /// Run the batch and hand the result to a caller-owned channel
    pub async fn run_into(
        self,
        sender: mpsc::Sender<BatchResult>,
    ) -> Result<(), mpsc::error::SendError<BatchResult>> {
        let result = self.run().await;
        sender.send(result).await
    }
}

/// Resolves once the signal is `true`; never resolves if the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run independent sessions concurrently; results come back in input order
pub async fn run_sessions(drivers: Vec<BatchDriver>) -> Vec<BatchResult> {
    join_all(drivers.into_iter().map(BatchDriver::run)).await
}

/// Merge the logs of several sessions in order
pub fn merge_logs<'a>(results: impl IntoIterator<Item = &'a BatchResult>) -> FetchLog {
    let mut merged = FetchLog::new();
    for result in results {
        merged.extend(result.log.clone());
    }
    merged
}
