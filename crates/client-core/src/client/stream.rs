use futures::Stream;
use tokio::sync::broadcast;
use tracing::warn;

use crate::call::{CallId, CallRecord};

/// The record versions of one call
///
/// Yields the initial ringing record, then every later version, and ends
/// after the first terminal status.
#[derive(Debug)]
pub struct CallStream {
    call_id: CallId,
    initial: Option<CallRecord>,
    records: broadcast::Receiver<CallRecord>,
    finished: bool,
}

impl CallStream {
    pub(crate) fn new(initial: CallRecord, records: broadcast::Receiver<CallRecord>) -> Self {
        Self {
            call_id: initial.id,
            finished: initial.status.is_terminal(),
            initial: Some(initial),
            records,
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub async fn next(&mut self) -> Option<CallRecord> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        if self.finished {
            return None;
        }
        loop {
            match self.records.recv().await {
                Ok(record) => {
                    self.finished = record.status.is_terminal();
                    return Some(record);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(call_id = %self.call_id, skipped, "Call stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = CallRecord> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|record| (record, stream))
        })
    }
}
